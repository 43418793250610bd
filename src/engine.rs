// 该文件是 Diecai （叠彩山） 项目的一部分。
// src/engine.rs - 预测分发与三个公开入口
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

use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::backend::{RasterBackend, SurfaceId};
use crate::error::VisError;
use crate::interpreter::{self, Interpreter, truthy_field};
use crate::options::RenderOptions;
use crate::source::{ImageInput, SourceImage};

/// 三种可请求的操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  /// 画到与图像绑定的显示表面上
  Overlay,
  /// 生成叠加后的新图像
  Annotate,
  /// 逐个抠出检测到的区域
  Extract,
}

impl Action {
  pub fn as_str(self) -> &'static str {
    match self {
      Action::Overlay => "overlay",
      Action::Annotate => "annotate",
      Action::Extract => "extract",
    }
  }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 单个抠图结果：标签与 PNG 字节。
#[derive(Debug, Clone)]
pub struct Extraction {
  pub label: String,
  pub image: Vec<u8>,
}

/// overlay 的两种去向：挂到显示表面，或降级为编码输出。
#[derive(Debug)]
pub enum OverlayOutcome {
  Mounted(SurfaceId),
  Encoded(Vec<u8>),
}

// 按固定顺序扫描解释器；形状测试并不互斥，首个既认形状又支持操作者胜出
fn select(
  prediction: &Value,
  options: &RenderOptions,
  action: Action,
) -> Result<&'static dyn Interpreter, VisError> {
  let mut unsupported = None;
  for vis in interpreter::all() {
    if !vis.matches(prediction, options) {
      continue;
    }
    if vis.supports(action) {
      debug!("以 {} 解释器执行 {}", vis.kind(), action);
      return Ok(vis);
    }
    if unsupported.is_none() {
      unsupported = Some(vis.kind());
    }
  }

  if let Some(kind) = unsupported {
    return Err(VisError::UnsupportedAction { action, kind });
  }
  match options.kind {
    Some(kind) => Err(VisError::ShapeMismatch { action, kind }),
    None => Err(VisError::ShapeUnrecognized { action }),
  }
}

// 预测声明的参照尺寸：显式 width/height 选项优先，
// 其次 image_size 数组（[宽, 高]），再次 imageSize 对象
fn declared_size(prediction: &Value, options: &RenderOptions) -> (f64, f64) {
  if let (Some(width), Some(height)) = (options.width, options.height) {
    if width != 0 && height != 0 {
      return (f64::from(width), f64::from(height));
    }
  }
  if let Some(size) = truthy_field(prediction, "image_size") {
    let width = size.get(0).and_then(Value::as_f64).unwrap_or(0.0);
    let height = size.get(1).and_then(Value::as_f64).unwrap_or(0.0);
    return (width, height);
  }
  if let Some(size) = truthy_field(prediction, "imageSize") {
    let width = size.get("width").and_then(Value::as_f64).unwrap_or(0.0);
    let height = size.get("height").and_then(Value::as_f64).unwrap_or(0.0);
    return (width, height);
  }
  (0.0, 0.0)
}

// 缺省缩放比 = 展示高度 / 声明高度；调用方给了非零 scale 则不动
fn finalize(image: &SourceImage, prediction: &Value, mut options: RenderOptions) -> RenderOptions {
  if options.scale.is_none_or(|s| s == 0.0) {
    let (_, height) = declared_size(prediction, &options);
    let scale = if height != 0.0 {
      f64::from(image.display_height()) / height
    } else {
      1.0
    };
    debug!("按声明尺寸推导缩放比 {scale}");
    options.scale = Some(scale);
  }
  options
}

/// 分发引擎：持有栅格后端，将预测路由到匹配的解释器。
pub struct Engine<B> {
  backend: B,
}

impl<B: RasterBackend> Engine<B> {
  pub fn new(backend: B) -> Self {
    Engine { backend }
  }

  pub fn backend(&self) -> &B {
    &self.backend
  }

  pub fn backend_mut(&mut self) -> &mut B {
    &mut self.backend
  }

  /// 在图像的显示表面上叠加预测；无显示后端时降级为标注输出。
  pub fn overlay(
    &mut self,
    prediction: &Value,
    image: &SourceImage,
    options: RenderOptions,
  ) -> Result<OverlayOutcome, VisError> {
    let vis = select(prediction, &options, Action::Overlay)?;
    let options = finalize(image, prediction, options);
    match self.backend.overlay_surface(image) {
      Some((id, surface)) => {
        vis.overlay(prediction, surface, &options)?;
        Ok(OverlayOutcome::Mounted(id))
      }
      None => {
        debug!("无显示表面，降级为标注输出");
        Ok(OverlayOutcome::Encoded(vis.annotate(prediction, image, &options)?))
      }
    }
  }

  /// 生成把预测画进去的新 PNG 图像。
  pub fn annotate(
    &self,
    prediction: &Value,
    image: impl Into<ImageInput>,
    options: RenderOptions,
  ) -> Result<Vec<u8>, VisError> {
    let vis = select(prediction, &options, Action::Annotate)?;
    let image = image.into().resolve()?;
    let options = finalize(&image, prediction, options);
    let bytes = vis.annotate(prediction, &image, &options)?;
    debug!("标注完成，输出 {} 字节", bytes.len());
    Ok(bytes)
  }

  /// 把预测指出的每个区域裁成独立的 PNG 图像。
  pub fn extract(
    &self,
    prediction: &Value,
    image: impl Into<ImageInput>,
    options: RenderOptions,
  ) -> Result<Vec<Extraction>, VisError> {
    let vis = select(prediction, &options, Action::Extract)?;
    let image = image.into().resolve()?;
    let options = finalize(&image, prediction, options);
    let results = vis.extract(prediction, &image, &options)?;
    debug!("提取得到 {} 个结果", results.len());
    Ok(results)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::{Headless, SurfaceSession};
  use crate::options::OverlayKind;
  use crate::palette;
  use image::{Rgba, RgbaImage};
  use serde_json::json;

  fn white_image(width: u32, height: u32) -> SourceImage {
    SourceImage::new(RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])))
  }

  fn box_prediction() -> Value {
    json!({ "predictions": [{ "detection_box": [0.1, 0.2, 0.5, 0.6], "label": "cat" }] })
  }

  fn pose_prediction() -> Value {
    json!({ "posesDetected": [{ "poseLines": [[1.0, 2.0, 3.0, 4.0]] }] })
  }

  #[test]
  fn dispatch_scans_lines_then_segments_then_boxes() {
    let opts = RenderOptions::default();
    let quad = json!([1.0, 2.0, 3.0, 4.0]);
    assert_eq!(
      select(&quad, &opts, Action::Overlay).unwrap().kind(),
      OverlayKind::Lines
    );
    let grid = json!([[0, 1], [1, 0]]);
    assert_eq!(
      select(&grid, &opts, Action::Overlay).unwrap().kind(),
      OverlayKind::Segments
    );
    assert_eq!(
      select(&box_prediction(), &opts, Action::Overlay).unwrap().kind(),
      OverlayKind::Boxes
    );
  }

  #[test]
  fn extraction_of_bare_quad_falls_through_to_boxes() {
    // 线条解释器认得裸四元组但不支持抽取，应顺延到边框解释器
    let opts = RenderOptions::default();
    let quad = json!([10.0, 20.0, 30.0, 40.0]);
    assert_eq!(
      select(&quad, &opts, Action::Extract).unwrap().kind(),
      OverlayKind::Boxes
    );
  }

  #[test]
  fn pose_extraction_reports_unsupported_action() {
    let opts = RenderOptions::default();
    assert!(matches!(
      select(&pose_prediction(), &opts, Action::Extract),
      Err(VisError::UnsupportedAction {
        action: Action::Extract,
        kind: OverlayKind::Lines
      })
    ));
  }

  #[test]
  fn type_filter_mismatch_names_the_requested_kind() {
    let opts = RenderOptions {
      kind: Some(OverlayKind::Boxes),
      ..RenderOptions::default()
    };
    assert!(matches!(
      select(&pose_prediction(), &opts, Action::Overlay),
      Err(VisError::ShapeMismatch {
        action: Action::Overlay,
        kind: OverlayKind::Boxes
      })
    ));
  }

  #[test]
  fn unrecognized_shape_reports_generic_error() {
    let opts = RenderOptions::default();
    assert!(matches!(
      select(&json!("hello"), &opts, Action::Annotate),
      Err(VisError::ShapeUnrecognized {
        action: Action::Annotate
      })
    ));
  }

  #[test]
  fn scale_defaults_from_image_size_array() {
    let image = SourceImage::new(RgbaImage::new(10, 50));
    let prediction = json!({ "image_size": [80, 100] });
    let opts = finalize(&image, &prediction, RenderOptions::default());
    assert_eq!(opts.scale, Some(0.5));
  }

  #[test]
  fn scale_defaults_from_image_size_object() {
    let image = SourceImage::new(RgbaImage::new(10, 5));
    let prediction = json!({ "imageSize": { "width": 40, "height": 25 } });
    let opts = finalize(&image, &prediction, RenderOptions::default());
    assert_eq!(opts.scale, Some(0.2));
  }

  #[test]
  fn explicit_dimensions_take_precedence() {
    let image = SourceImage::new(RgbaImage::new(10, 40));
    let prediction = json!({ "image_size": [1, 1] });
    let opts = RenderOptions {
      width: Some(10),
      height: Some(20),
      ..RenderOptions::default()
    };
    let opts = finalize(&image, &prediction, opts);
    assert_eq!(opts.scale, Some(2.0));
  }

  #[test]
  fn caller_scale_survives_and_zero_is_replaced() {
    let image = SourceImage::new(RgbaImage::new(10, 50));
    let prediction = json!({ "image_size": [80, 100] });

    let opts = RenderOptions {
      scale: Some(3.0),
      ..RenderOptions::default()
    };
    assert_eq!(finalize(&image, &prediction, opts).scale, Some(3.0));

    let opts = RenderOptions {
      scale: Some(0.0),
      ..RenderOptions::default()
    };
    assert_eq!(finalize(&image, &prediction, opts).scale, Some(0.5));
  }

  #[test]
  fn undeclared_size_means_unit_scale() {
    let image = SourceImage::new(RgbaImage::new(10, 50));
    let opts = finalize(&image, &json!({}), RenderOptions::default());
    assert_eq!(opts.scale, Some(1.0));
  }

  #[test]
  fn annotate_scales_ratio_box_onto_canvas() {
    let engine = Engine::new(Headless);
    let bytes = engine
      .annotate(&box_prediction(), white_image(200, 100), RenderOptions::default())
      .unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), (200, 100));

    // 比例坐标经 y/x 交换与画布缩放落在 [40,10,120,50]
    let blue = palette::PALETTE[0];
    assert_eq!(*decoded.get_pixel(40, 10), Rgba([blue[0], blue[1], blue[2], 255]));
    assert_eq!(*decoded.get_pixel(120, 50), Rgba([blue[0], blue[1], blue[2], 255]));
    // 框内部保持原样
    assert_eq!(*decoded.get_pixel(80, 40), Rgba([255, 255, 255, 255]));
  }

  #[test]
  fn annotate_clips_runaway_geometry() {
    // 越界检测框与爆炸的换算比例只会被画布裁掉，不得中断渲染
    let engine = Engine::new(Headless);
    let huge = json!([{ "detection_box": [3.0e9, 3.0e9, 4.0e9, 4.0e9], "label": "x" }]);
    assert!(
      engine
        .annotate(&huge, white_image(8, 8), RenderOptions::default())
        .is_ok()
    );

    let tiny_declared = json!({
      "image_size": [1e-7, 1e-7],
      "predictions": [{ "detection_box": [0.1, 0.2, 0.5, 0.6], "label": "cat" }]
    });
    assert!(
      engine
        .annotate(&tiny_declared, white_image(64, 64), RenderOptions::default())
        .is_ok()
    );
  }

  #[test]
  fn headless_overlay_encodes_annotation() {
    let mut engine = Engine::new(Headless);
    let image = white_image(20, 10);
    let outcome = engine
      .overlay(&box_prediction(), &image, RenderOptions::default())
      .unwrap();
    match outcome {
      OverlayOutcome::Encoded(bytes) => {
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (20, 10));
      }
      OverlayOutcome::Mounted(id) => panic!("无显示后端不应挂载表面: {id}"),
    }
  }

  #[test]
  fn session_overlay_mounts_surface_and_reuses_it() {
    let mut engine = Engine::new(SurfaceSession::new());
    let image = white_image(10, 10);
    let quad = json!([2.0, 2.0, 8.0, 8.0]);

    let first = engine.overlay(&quad, &image, RenderOptions::default()).unwrap();
    let OverlayOutcome::Mounted(id) = first else {
      panic!("会话后端应挂载表面");
    };
    let surface = engine.backend().surface(id).unwrap();
    let blue = palette::PALETTE[0];
    assert_eq!(
      *surface.image().get_pixel(2, 2),
      Rgba([blue[0], blue[1], blue[2], 255])
    );

    // 同一图像再次叠加复用同一表面
    let second = engine.overlay(&quad, &image, RenderOptions::default()).unwrap();
    let OverlayOutcome::Mounted(second_id) = second else {
      panic!("会话后端应挂载表面");
    };
    assert_eq!(second_id, id);
  }

  #[test]
  fn shape_error_beats_image_resolution() {
    let engine = Engine::new(Headless);
    let err = engine
      .annotate(&json!("nonsense"), "/no/such/image.png", RenderOptions::default())
      .unwrap_err();
    assert!(matches!(err, VisError::ShapeUnrecognized { .. }));
  }
}
