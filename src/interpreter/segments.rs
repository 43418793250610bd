// 该文件是 Diecai （叠彩山） 项目的一部分。
// src/interpreter/segments.rs - 分割图解释器
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

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use serde_json::Value;
use tracing::debug;

use crate::engine::{Action, Extraction};
use crate::error::VisError;
use crate::interpreter::{Interpreter, kind_allowed, truthy_field};
use crate::options::{OverlayKind, RenderOptions};
use crate::palette;
use crate::source::SourceImage;
use crate::surface::{Surface, encode_png, trim_transparent};

/// 逐像素分割图：矩形的非负整数标签栅格。
pub struct SegmentInterpreter;

/// 叠加层的固定半透明度。
const OVERLAY_ALPHA: u8 = 175;

// 分割服务的外层容器字段
fn predication(prediction: &Value) -> &Value {
  for key in ["segmentationMap", "seg_map"] {
    if let Some(inner) = truthy_field(prediction, key) {
      return inner;
    }
  }
  prediction
}

// 一行非空的非负整数
fn row_values(value: &Value) -> Option<Vec<u32>> {
  let items = value.as_array()?;
  if items.is_empty() {
    return None;
  }
  items
    .iter()
    .map(|v| v.as_u64().and_then(|n| u32::try_from(n).ok()))
    .collect()
}

// 栅格必须是二维且矩形
fn grid_of(prediction: &Value) -> Option<Vec<Vec<u32>>> {
  let p = predication(prediction);
  let rows = p.as_array()?;
  if rows.is_empty() {
    return None;
  }
  let parsed: Vec<Vec<u32>> = rows.iter().map(row_values).collect::<Option<_>>()?;
  let width = parsed[0].len();
  if parsed.iter().any(|row| row.len() != width) {
    return None;
  }
  Some(parsed)
}

// 展开去重：自末行向前、行内自右向左，保留首见顺序
fn find_unique(grid: &[Vec<u32>]) -> Vec<u32> {
  let mut unique = Vec::new();
  for row in grid.iter().rev() {
    for &label in row.iter().rev() {
      if !unique.contains(&label) {
        unique.push(label);
      }
    }
  }
  unique
}

struct SegmentMask {
  image: RgbaImage,
  // 被强制的 alpha 字节在扁平 RGBA 缓冲中的位置
  masked_alpha: Vec<usize>,
}

// 逐像素着色：调色板按 label mod 长度取色，透明度由过滤与裁剪模式决定
fn render_mask(grid: &[Vec<u32>], options: &RenderOptions, crop: bool) -> SegmentMask {
  let height = grid.len() as u32;
  let width = grid[0].len() as u32;
  let colors = options.colors.as_deref();
  let filter = options.segments.as_deref();
  let exclude = options.exclude;

  let mut image = RgbaImage::new(width, height);
  let mut masked_alpha = Vec::new();

  for (j, row) in grid.iter().enumerate() {
    for (i, &label) in row.iter().enumerate() {
      let (color, alpha, record) = match filter {
        Some(set) if !set.contains(&label) => {
          if exclude {
            (palette::cycle(colors, label as usize), OVERLAY_ALPHA, false)
          } else {
            // 裁剪模式下用不透明黑充当掩膜占位
            ([0, 0, 0], if crop { 255 } else { 0 }, true)
          }
        }
        Some(_) => {
          let alpha = if exclude {
            if crop { OVERLAY_ALPHA } else { 0 }
          } else if crop {
            0
          } else {
            OVERLAY_ALPHA
          };
          (palette::cycle(colors, label as usize), alpha, exclude)
        }
        None => (palette::cycle(colors, label as usize), OVERLAY_ALPHA, false),
      };

      image.put_pixel(i as u32, j as u32, Rgba([color[0], color[1], color[2], alpha]));
      if record {
        masked_alpha.push((j * width as usize + i) * 4 + 3);
      }
    }
  }

  SegmentMask {
    image,
    masked_alpha,
  }
}

fn resize_to(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
  if image.dimensions() == (width, height) {
    image.clone()
  } else {
    imageops::resize(image, width, height, FilterType::Triangle)
  }
}

// 单个标签的隔离：源图像缩至栅格尺寸，按记录位置清除 alpha，再放回自然尺寸
fn isolate(image: &SourceImage, grid: &[Vec<u32>], segment: u32, options: &RenderOptions) -> RgbaImage {
  let mut crop_opts = options.clone();
  crop_opts.segments = Some(vec![segment]);
  let mask = render_mask(grid, &crop_opts, true);

  let (map_w, map_h) = mask.image.dimensions();
  let mut reduced = resize_to(image.pixels(), map_w, map_h);

  let data: &mut [u8] = &mut reduced;
  for &index in &mask.masked_alpha {
    if let Some(byte) = data.get_mut(index) {
      *byte = 0;
    }
  }

  resize_to(&reduced, image.natural_width(), image.natural_height())
}

impl Interpreter for SegmentInterpreter {
  fn kind(&self) -> OverlayKind {
    OverlayKind::Segments
  }

  fn supports(&self, _action: Action) -> bool {
    true
  }

  fn matches(&self, prediction: &Value, options: &RenderOptions) -> bool {
    kind_allowed(options, self.kind()) && grid_of(prediction).is_some()
  }

  fn overlay(
    &self,
    prediction: &Value,
    surface: &mut Surface,
    options: &RenderOptions,
  ) -> Result<(), VisError> {
    let Some(map) = grid_of(prediction) else {
      return Ok(());
    };
    let mask = render_mask(&map, options, false);
    surface.paste_scaled(&mask.image);
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
    let Some(map) = grid_of(prediction) else {
      return Ok(Vec::new());
    };

    let targets = match &options.segments {
      Some(list) => list.clone(),
      None => {
        let unique = find_unique(&map);
        debug!("未指定分割标签，提取全部: {unique:?}");
        unique
      }
    };

    let mut results = Vec::with_capacity(targets.len());
    for &segment in &targets {
      let isolated = isolate(image, &map, segment, options);
      let trimmed = trim_transparent(&isolated).ok_or(VisError::EmptySegment(segment))?;
      results.push(Extraction {
        label: segment.to_string(),
        image: encode_png(&trimmed)?,
      });
    }
    Ok(results)
  }
}
