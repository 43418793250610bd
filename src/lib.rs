// 该文件是 Diecai （叠彩山） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod backend;
pub mod engine;
pub mod error;
pub mod interpreter;
pub mod options;
pub mod palette;
pub mod source;
pub mod surface;

pub use backend::{Headless, RasterBackend, SurfaceId, SurfaceSession};
pub use engine::{Action, Engine, Extraction, OverlayOutcome};
pub use error::VisError;
pub use options::{OverlayKind, RenderOptions, parse_switch};
pub use source::{AcquireError, ImageInput, SourceImage};
pub use surface::Surface;

use serde_json::Value;

/// 无显示表面的环境里，叠加退化为标注。
pub fn overlay(
  prediction: &Value,
  image: impl Into<ImageInput>,
  options: RenderOptions,
) -> Result<Vec<u8>, VisError> {
  Engine::new(Headless).annotate(prediction, image, options)
}

/// 把预测画到图像副本上，返回 PNG 字节。
pub fn annotate(
  prediction: &Value,
  image: impl Into<ImageInput>,
  options: RenderOptions,
) -> Result<Vec<u8>, VisError> {
  Engine::new(Headless).annotate(prediction, image, options)
}

/// 把预测指出的区域逐个裁出，返回带标签的 PNG 字节。
pub fn extract(
  prediction: &Value,
  image: impl Into<ImageInput>,
  options: RenderOptions,
) -> Result<Vec<Extraction>, VisError> {
  Engine::new(Headless).extract(prediction, image, options)
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgba, RgbaImage};
  use serde_json::json;

  #[test]
  fn module_entry_points_run_on_a_headless_engine() {
    let image = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));
    let grid = json!([[0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]);

    let annotated = annotate(&grid, image.clone(), RenderOptions::default()).unwrap();
    let overlaid = overlay(&grid, image.clone(), RenderOptions::default()).unwrap();
    assert_eq!(annotated, overlaid);

    let results = extract(&grid, image, RenderOptions::default()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].label, "0");
  }
}
