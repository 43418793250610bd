// 该文件是 Diecai （叠彩山） 项目的一部分。
// src/source.rs - 图像来源与获取
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

use std::cell::Cell;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageReader, RgbaImage};
use thiserror::Error;
use tracing::debug;

use crate::backend::SurfaceId;

/// 图像获取阶段的错误。
#[derive(Error, Debug)]
pub enum AcquireError {
  #[error("读取图像失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("解码图像失败: {0}")]
  Decode(#[from] image::ImageError),
}

/// 一次调用的图像引用：路径、已编码字节或已解码图像。
pub enum ImageInput {
  /// 磁盘路径，解析时读取并解码。
  Path(PathBuf),
  /// 内存中的已编码图像字节，按内容猜测格式。
  Bytes(Vec<u8>),
  /// 已解码的图像，原样使用。
  Loaded(SourceImage),
}

impl ImageInput {
  /// 把引用解析为像素数据。
  pub fn resolve(self) -> Result<SourceImage, AcquireError> {
    match self {
      ImageInput::Path(path) => {
        debug!("读取图像文件: {}", path.display());
        let decoded = ImageReader::open(&path)?.decode()?;
        Ok(SourceImage::new(decoded.to_rgba8()))
      }
      ImageInput::Bytes(bytes) => {
        let decoded = ImageReader::new(Cursor::new(bytes))
          .with_guessed_format()?
          .decode()?;
        Ok(SourceImage::new(decoded.to_rgba8()))
      }
      ImageInput::Loaded(image) => Ok(image),
    }
  }
}

impl From<PathBuf> for ImageInput {
  fn from(path: PathBuf) -> Self {
    ImageInput::Path(path)
  }
}

impl From<&Path> for ImageInput {
  fn from(path: &Path) -> Self {
    ImageInput::Path(path.to_path_buf())
  }
}

impl From<&str> for ImageInput {
  fn from(path: &str) -> Self {
    ImageInput::Path(PathBuf::from(path))
  }
}

impl From<Vec<u8>> for ImageInput {
  fn from(bytes: Vec<u8>) -> Self {
    ImageInput::Bytes(bytes)
  }
}

impl From<&[u8]> for ImageInput {
  fn from(bytes: &[u8]) -> Self {
    ImageInput::Bytes(bytes.to_vec())
  }
}

impl From<SourceImage> for ImageInput {
  fn from(image: SourceImage) -> Self {
    ImageInput::Loaded(image)
  }
}

impl From<RgbaImage> for ImageInput {
  fn from(pixels: RgbaImage) -> Self {
    ImageInput::Loaded(SourceImage::new(pixels))
  }
}

/// 解码后的源图像。
///
/// 自然尺寸来自像素数据；显示尺寸可选，用于叠加表面与缩放推导。
/// 叠加标签的写入未加同步，同一图像上的并发叠加没有定义。
pub struct SourceImage {
  pixels: RgbaImage,
  display: Option<(u32, u32)>,
  overlay_tag: Cell<Option<SurfaceId>>,
}

impl SourceImage {
  pub fn new(pixels: RgbaImage) -> Self {
    SourceImage {
      pixels,
      display: None,
      overlay_tag: Cell::new(None),
    }
  }

  /// 声明图像当前的显示尺寸。
  pub fn with_display_size(mut self, width: u32, height: u32) -> Self {
    self.display = Some((width, height));
    self
  }

  pub fn natural_width(&self) -> u32 {
    self.pixels.width()
  }

  pub fn natural_height(&self) -> u32 {
    self.pixels.height()
  }

  /// 显示宽度，未声明时回落到自然宽度。
  pub fn display_width(&self) -> u32 {
    self.display.map_or_else(|| self.natural_width(), |(w, _)| w)
  }

  /// 显示高度，未声明时回落到自然高度。
  pub fn display_height(&self) -> u32 {
    self.display.map_or_else(|| self.natural_height(), |(_, h)| h)
  }

  pub fn pixels(&self) -> &RgbaImage {
    &self.pixels
  }

  pub(crate) fn overlay_tag(&self) -> Option<SurfaceId> {
    self.overlay_tag.get()
  }

  pub(crate) fn set_overlay_tag(&self, id: SurfaceId) {
    self.overlay_tag.set(Some(id));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::ImageFormat;

  fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
  }

  #[test]
  fn bytes_input_decodes_to_pixels() {
    let source = ImageInput::from(png_bytes(4, 3)).resolve().unwrap();
    assert_eq!(source.natural_width(), 4);
    assert_eq!(source.natural_height(), 3);
  }

  #[test]
  fn garbage_bytes_fail_acquisition() {
    let result = ImageInput::from(vec![0u8, 1, 2, 3]).resolve();
    assert!(result.is_err());
  }

  #[test]
  fn display_size_falls_back_to_natural() {
    let source = SourceImage::new(RgbaImage::new(8, 6));
    assert_eq!(source.display_width(), 8);
    assert_eq!(source.display_height(), 6);

    let scaled = SourceImage::new(RgbaImage::new(8, 6)).with_display_size(4, 3);
    assert_eq!(scaled.display_width(), 4);
    assert_eq!(scaled.display_height(), 3);
    assert_eq!(scaled.natural_height(), 6);
  }
}
