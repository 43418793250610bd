// 该文件是 Diecai （叠彩山） 项目的一部分。
// src/interpreter/boxes.rs - 检测框解释器
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

use std::cmp::Ordering;

use image::RgbaImage;
use image::imageops;
use serde_json::Value;

use crate::engine::{Action, Extraction};
use crate::error::VisError;
use crate::interpreter::{Interpreter, kind_allowed, quad, truthy_field};
use crate::options::{OverlayKind, RenderOptions};
use crate::palette;
use crate::source::SourceImage;
use crate::surface::{Surface, encode_png};

/// 检测框：`[x1, y1, x2, y2]` 外加各家微服务的标签约定。
pub struct BoxInterpreter;

struct BoxDetection {
  bbox: [f64; 4],
  label: String,
}

// 解开外层容器：检测类微服务把结果放在 'predictions' 数组里，
// 同时报告是否发生了解包
fn predication(prediction: &Value) -> (&Value, bool) {
  match truthy_field(prediction, "predictions") {
    Some(inner) => (inner, true),
    None => (prediction, false),
  }
}

// 条目本身是框，或在 'detection_box' 字段携带框
fn item_box(item: &Value) -> Option<[f64; 4]> {
  if let Some(b) = truthy_field(item, "detection_box") {
    return quad(b);
  }
  quad(item)
}

// 形状测试通过时返回条目列表，裸框与裸对象包装成单元素
fn shape_items(prediction: &Value) -> Option<Vec<&Value>> {
  let (p, unwrapped) = predication(prediction);
  match p.as_array() {
    Some(items) => {
      if quad(p).is_some() {
        return Some(vec![p]);
      }
      if !items.is_empty() && items.iter().all(|item| item_box(item).is_some()) {
        return Some(items.iter().collect());
      }
      None
    }
    None => {
      // 'predictions' 载荷必须是数组，裸对象只在未包装的文档顶层接受
      if !unwrapped && item_box(p).is_some() {
        Some(vec![p])
      } else {
        None
      }
    }
  }
}

// 归一化坐标按 (y, x) 给出，交换为 (x, y) 顺序；绝对像素坐标原样保留
fn reorder_ratio_box(bbox: [f64; 4]) -> [f64; 4] {
  if bbox.iter().all(|v| *v <= 1.0) {
    [bbox[1], bbox[0], bbox[3], bbox[2]]
  } else {
    bbox
  }
}

// 候选标签的文本形式；空串与数字零按假值跳过，落到下一条规则
fn text_value(value: Option<&Value>) -> Option<String> {
  match value? {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(n.to_string()),
    Value::Bool(true) => Some("true".to_string()),
    _ => None,
  }
}

// 标签优先级：label > age_estimation > probability 百分比 > 置信度最高的表情
fn resolve_label(item: &Value) -> String {
  if let Some(label) = text_value(item.get("label")) {
    return label;
  }
  if let Some(label) = text_value(item.get("age_estimation")) {
    return label;
  }
  if let Some(p) = truthy_field(item, "probability").and_then(Value::as_f64) {
    return format!("{:.2}", p * 100.0);
  }
  if let Some(list) = truthy_field(item, "emotion_predictions").and_then(Value::as_array) {
    let prob = |e: &Value| e.get("probability").and_then(Value::as_f64).unwrap_or(0.0);
    let mut ranked: Vec<&Value> = list.iter().collect();
    // 稳定排序，平手取先出现者
    ranked.sort_by(|a, b| prob(b).partial_cmp(&prob(a)).unwrap_or(Ordering::Equal));
    if let Some(label) = ranked.first().and_then(|e| text_value(e.get("label"))) {
      return label;
    }
  }
  String::new()
}

fn transform(prediction: &Value) -> Option<Vec<BoxDetection>> {
  let items = shape_items(prediction)?;
  let detections = items
    .into_iter()
    .filter_map(|item| {
      let bbox = reorder_ratio_box(item_box(item)?);
      Some(BoxDetection {
        bbox,
        label: resolve_label(item),
      })
    })
    .collect();
  Some(detections)
}

// 坐标形式仅由第一个框判定：全部 ≤ 1 视为归一化比例
fn axis_scales(detections: &[BoxDetection], basis_w: u32, basis_h: u32, scale: f64) -> (f64, f64) {
  let is_ratio = detections[0].bbox.iter().all(|v| *v <= 1.0);
  if is_ratio {
    (f64::from(basis_w) * scale, f64::from(basis_h) * scale)
  } else {
    (scale, scale)
  }
}

fn scale_box(bbox: [f64; 4], scale_w: f64, scale_h: f64) -> [f64; 4] {
  [
    bbox[0] * scale_w,
    bbox[1] * scale_h,
    bbox[2] * scale_w,
    bbox[3] * scale_h,
  ]
}

// 裁剪矩形收进图像边界，退化框按 1×1 处理
fn crop_region(pixels: &RgbaImage, bbox: [f64; 4]) -> RgbaImage {
  let (iw, ih) = pixels.dimensions();
  let x = bbox[0].floor().clamp(0.0, f64::from(iw.saturating_sub(1))) as u32;
  let y = bbox[1].floor().clamp(0.0, f64::from(ih.saturating_sub(1))) as u32;
  let w = ((bbox[2] - bbox[0]).round().max(1.0) as u32).min(iw.saturating_sub(x).max(1));
  let h = ((bbox[3] - bbox[1]).round().max(1.0) as u32).min(ih.saturating_sub(y).max(1));
  imageops::crop_imm(pixels, x, y, w, h).to_image()
}

impl Interpreter for BoxInterpreter {
  fn kind(&self) -> OverlayKind {
    OverlayKind::Boxes
  }

  fn supports(&self, _action: Action) -> bool {
    true
  }

  fn matches(&self, prediction: &Value, options: &RenderOptions) -> bool {
    kind_allowed(options, self.kind()) && shape_items(prediction).is_some()
  }

  fn overlay(
    &self,
    prediction: &Value,
    surface: &mut Surface,
    options: &RenderOptions,
  ) -> Result<(), VisError> {
    let Some(detections) = transform(prediction) else {
      return Ok(());
    };
    if detections.is_empty() {
      return Ok(());
    }

    let scale = options.effective_scale();
    let (scale_w, scale_h) = axis_scales(&detections, surface.width(), surface.height(), scale);

    for (i, detection) in detections.iter().enumerate() {
      let bbox = scale_box(detection.bbox, scale_w, scale_h);
      let color = palette::cycle(options.colors.as_deref(), i);
      surface.draw_box(bbox, color, options.line_width);
      if !detection.label.is_empty() && options.label_enabled() {
        surface.draw_label(&detection.label, bbox[0], bbox[1], color);
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
    let mut surface = Surface::from_image(image);
    self.overlay(prediction, &mut surface, options)?;
    Ok(surface.to_png()?)
  }

  fn extract(
    &self,
    prediction: &Value,
    image: &SourceImage,
    options: &RenderOptions,
  ) -> Result<Vec<Extraction>, VisError> {
    let Some(detections) = transform(prediction) else {
      return Ok(Vec::new());
    };
    if detections.is_empty() {
      return Ok(Vec::new());
    }

    // 裁剪以自然分辨率为比例基准
    let scale = options.effective_scale();
    let (scale_w, scale_h) = axis_scales(
      &detections,
      image.natural_width(),
      image.natural_height(),
      scale,
    );

    let mut crops = Vec::with_capacity(detections.len());
    for detection in &detections {
      let bbox = scale_box(detection.bbox, scale_w, scale_h);
      let cropped = crop_region(image.pixels(), bbox);
      crops.push(Extraction {
        label: detection.label.clone(),
        image: encode_png(&cropped)?,
      });
    }
    Ok(crops)
  }
}
