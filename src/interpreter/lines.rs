// 该文件是 Diecai （叠彩山） 项目的一部分。
// src/interpreter/lines.rs - 姿态线解释器
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use serde_json::Value;

use crate::engine::Action;
use crate::error::VisError;
use crate::interpreter::{Interpreter, kind_allowed, quad, truthy_field};
use crate::options::{OverlayKind, RenderOptions};
use crate::palette;
use crate::source::SourceImage;
use crate::surface::Surface;

/// 姿态骨架线：每个姿态是一串 `[x1, y1, x2, y2]` 线段。
///
/// 不支持提取，姿态没有自然的子区域边界。
pub struct LineInterpreter;

// 姿态估计服务的外层容器字段
fn predication(prediction: &Value) -> &Value {
  for key in ["posesDetected", "predictions"] {
    if let Some(inner) = truthy_field(prediction, key) {
      return inner;
    }
  }
  prediction
}

// 线段本身，或在 'line' 字段携带线段的对象
fn line_of(item: &Value) -> Option<[f64; 4]> {
  if let Some(l) = truthy_field(item, "line") {
    return quad(l);
  }
  quad(item)
}

// 非空的线段序列（元素可以是裸线段或载线对象）
fn pose_lines(value: &Value) -> Option<Vec<[f64; 4]>> {
  let items = value.as_array()?;
  if items.is_empty() {
    return None;
  }
  items.iter().map(line_of).collect()
}

// 三种嵌套约定统一成“姿态的序列，每个姿态是线段的序列”
fn normalize(prediction: &Value) -> Option<Vec<Vec<[f64; 4]>>> {
  let p = predication(prediction);

  if let Some(line) = quad(p) {
    return Some(vec![vec![line]]);
  }
  if let Some(pose) = pose_lines(p) {
    return Some(vec![pose]);
  }

  let poses = p.as_array()?;
  if poses.is_empty() {
    return None;
  }
  poses
    .iter()
    .map(|pose| {
      if let Some(list) = truthy_field(pose, "poseLines") {
        return pose_lines(list);
      }
      if let Some(list) = truthy_field(pose, "pose_lines") {
        return pose_lines(list);
      }
      if let Some(lines) = pose_lines(pose) {
        return Some(lines);
      }
      quad(pose).map(|line| vec![line])
    })
    .collect()
}

impl Interpreter for LineInterpreter {
  fn kind(&self) -> OverlayKind {
    OverlayKind::Lines
  }

  fn supports(&self, action: Action) -> bool {
    matches!(action, Action::Overlay | Action::Annotate)
  }

  fn matches(&self, prediction: &Value, options: &RenderOptions) -> bool {
    kind_allowed(options, self.kind()) && normalize(prediction).is_some()
  }

  fn overlay(
    &self,
    prediction: &Value,
    surface: &mut Surface,
    options: &RenderOptions,
  ) -> Result<(), VisError> {
    let Some(poses) = normalize(prediction) else {
      return Ok(());
    };

    // 仅统一标量缩放，没有比例/绝对的轴拆分
    let scale = options.effective_scale();
    for (i, pose) in poses.iter().enumerate() {
      // 调色板按姿态取色，而不是按线段
      let color = palette::cycle(options.colors.as_deref(), i);
      for line in pose {
        let scaled = if scale == 1.0 {
          *line
        } else {
          line.map(|v| v * scale)
        };
        surface.draw_line(scaled, color, options.line_width);
      }
    }
    Ok(())
  }

  fn annotate(
    &self,
    prediction: &Value,
    image: &SourceImage,
    options: &RenderOptions,
  ) -> Result<Vec<u8>, VisError> {
    // 注解画在自然分辨率上，补偿显示缩放
    let display_width = image.display_width();
    let factor = if display_width > 0 {
      f64::from(image.natural_width()) / f64::from(display_width)
    } else {
      1.0
    };

    let mut opts = options.clone();
    opts.scale = Some(opts.effective_scale() * factor);

    let mut surface = Surface::from_image(image);
    self.overlay(prediction, &mut surface, &opts)?;
    Ok(surface.to_png()?)
  }
}
