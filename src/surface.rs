// 该文件是 Diecai （叠彩山） 项目的一部分。
// src/surface.rs - 栅格绘制面与像素原语
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

use std::io::Cursor;
use std::sync::OnceLock;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::palette;
use crate::source::SourceImage;

/// 默认描边宽度。
pub const DEFAULT_LINE_WIDTH: u32 = 3;

// 标签牌渲染常量
const LABEL_FONT_SIZE: f32 = 14.0;
const LABEL_HEIGHT: f64 = 18.0;
const LABEL_PADDING: f64 = 5.0;

// 常见系统字体位置，取第一个能加载的
const FONT_PATHS: [&str; 5] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

static LABEL_FONT: OnceLock<Option<FontArc>> = OnceLock::new();

fn label_font() -> Option<&'static FontArc> {
  LABEL_FONT
    .get_or_init(|| {
      for path in FONT_PATHS {
        if let Ok(bytes) = std::fs::read(path) {
          if let Ok(font) = FontArc::try_from_vec(bytes) {
            debug!("标签字体: {path}");
            return Some(font);
          }
        }
      }
      warn!("未找到可用的系统字体，标签文本将被跳过");
      None
    })
    .as_ref()
}

fn measure_text(font: &FontArc, text: &str, px: f32) -> f32 {
  let scaled = font.as_scaled(PxScale::from(px));
  text
    .chars()
    .map(|c| scaled.h_advance(scaled.glyph_id(c)))
    .sum()
}

fn resolve_stroke(line_width: Option<u32>) -> u32 {
  match line_width {
    Some(width) if width > 0 => width,
    _ => DEFAULT_LINE_WIDTH,
  }
}

// Liang–Barsky 线段裁剪，矩形为闭区间 [x0, x1]×[y0, y1]；
// 线段全在矩形外或坐标非有限时返回 None
fn clip_segment(line: [f64; 4], x0: f64, y0: f64, x1: f64, y1: f64) -> Option<[f64; 4]> {
  if line.iter().any(|v| !v.is_finite()) {
    return None;
  }
  let [ax, ay, bx, by] = line;
  let (dx, dy) = (bx - ax, by - ay);
  let mut t0 = 0.0_f64;
  let mut t1 = 1.0_f64;
  for (p, q) in [(-dx, ax - x0), (dx, x1 - ax), (-dy, ay - y0), (dy, y1 - ay)] {
    if p == 0.0 {
      if q < 0.0 {
        return None;
      }
    } else {
      let r = q / p;
      if p < 0.0 {
        if r > t1 {
          return None;
        }
        t0 = t0.max(r);
      } else {
        if r < t0 {
          return None;
        }
        t1 = t1.min(r);
      }
    }
  }
  Some([ax + t0 * dx, ay + t0 * dy, ax + t1 * dx, ay + t1 * dy])
}

/// 解释器消费的绘制面。
///
/// 叠加时由后端提供并按显示尺寸建立，注解时从源图像复制而来。
pub struct Surface {
  image: RgbaImage,
}

impl Surface {
  /// 建立全透明的绘制面。
  pub fn new(width: u32, height: u32) -> Self {
    Surface {
      image: RgbaImage::new(width, height),
    }
  }

  /// 以源图像的自然尺寸复制出绘制面。
  pub fn from_image(image: &SourceImage) -> Self {
    Surface {
      image: image.pixels().clone(),
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  /// 清空为全透明。
  pub fn clear(&mut self) {
    self.image.fill(0);
  }

  /// 画一条线段，粗细按法向平铺单像素线实现。
  ///
  /// 线段先裁剪到画布外扩一圈描边的范围，全在画布外时不落笔。
  pub fn draw_line(&mut self, line: [f64; 4], color: [u8; 3], line_width: Option<u32>) {
    let (w, h) = self.image.dimensions();
    if w == 0 || h == 0 {
      return;
    }
    let stroke = resolve_stroke(line_width);
    let margin = f64::from(stroke);
    let Some([x1, y1, x2, y2]) =
      clip_segment(line, -margin, -margin, f64::from(w) + margin, f64::from(h) + margin)
    else {
      return;
    };

    let rgba = Rgba([color[0], color[1], color[2], 255]);
    let (x1, y1) = (x1 as f32, y1 as f32);
    let (x2, y2) = (x2 as f32, y2 as f32);

    let dx = x2 - x1;
    let dy = y2 - y1;
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
      draw_line_segment_mut(&mut self.image, (x1, y1), (x2, y2), rgba);
      return;
    }

    let (nx, ny) = (-dy / len, dx / len);
    for t in 0..stroke {
      let offset = t as f32 - (stroke as f32 - 1.0) / 2.0;
      let (ox, oy) = (nx * offset, ny * offset);
      draw_line_segment_mut(&mut self.image, (x1 + ox, y1 + oy), (x2 + ox, y2 + oy), rgba);
    }
  }

  /// 画一个矩形边框，`bbox` 为 `[x_min, y_min, x_max, y_max]` 像素坐标。
  pub fn draw_box(&mut self, bbox: [f64; 4], color: [u8; 3], line_width: Option<u32>) {
    let (w, h) = self.image.dimensions();
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (bbox[0].round() as i64).clamp(0, i64::from(w) - 1);
    let y_min = (bbox[1].round() as i64).clamp(0, i64::from(h) - 1);
    let x_max = (bbox[2].round() as i64).clamp(0, i64::from(w) - 1);
    let y_max = (bbox[3].round() as i64).clamp(0, i64::from(h) - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let rgba = Rgba([color[0], color[1], color[2], 255]);
    let stroke = resolve_stroke(line_width);
    // 逐圈向内收缩加粗
    for t in 0..i64::from(stroke) {
      let left = x_min + t;
      let top = y_min + t;
      let right = x_max - t;
      let bottom = y_max - t;
      if left >= right || top >= bottom {
        break;
      }
      let rect = Rect::at(left as i32, top as i32)
        .of_size((right - left) as u32 + 1, (bottom - top) as u32 + 1);
      draw_hollow_rect_mut(&mut self.image, rect, rgba);
    }
  }

  /// 在 `(x, y)` 锚点处画填充的标签牌与对比色文字。
  ///
  /// 标签默认翻到锚点上方，贴近上边缘时落回锚点行；
  /// 没有可用字体时整个标签跳过，画布外的部分按画布裁剪。
  pub fn draw_label(&mut self, text: &str, x: f64, y: f64, color: [u8; 3]) {
    let Some(font) = label_font() else {
      return;
    };
    let (w, h) = self.image.dimensions();
    if w == 0 || h == 0 || !x.is_finite() || !y.is_finite() {
      return;
    }

    let tag_x = if x - 1.0 < 1.0 {
      x
    } else {
      x - f64::from(DEFAULT_LINE_WIDTH) / 2.0
    };
    let tag_y = if y - LABEL_HEIGHT < 1.0 { y } else { y - LABEL_HEIGHT };

    let text_width = f64::from(measure_text(font, text, LABEL_FONT_SIZE));
    let tag_width = (text_width + LABEL_PADDING * 2.0).round().max(1.0);

    // 整块落在画布外的标签牌直接丢弃
    if tag_x >= f64::from(w)
      || tag_y >= f64::from(h)
      || tag_x + tag_width <= 0.0
      || tag_y + LABEL_HEIGHT <= 0.0
    {
      return;
    }

    let left = (tag_x.round() as i64).clamp(0, i64::from(w) - 1);
    let top = (tag_y.round() as i64).clamp(0, i64::from(h) - 1);
    let right = ((tag_x.round() + tag_width) as i64 - 1).clamp(left, i64::from(w) - 1);
    let bottom = ((tag_y.round() + LABEL_HEIGHT) as i64 - 1).clamp(top, i64::from(h) - 1);
    let rect = Rect::at(left as i32, top as i32)
      .of_size((right - left) as u32 + 1, (bottom - top) as u32 + 1);
    draw_filled_rect_mut(&mut self.image, rect, Rgba([color[0], color[1], color[2], 255]));

    let text_color = palette::contrast_color(color);
    draw_text_mut(
      &mut self.image,
      Rgba([text_color[0], text_color[1], text_color[2], 255]),
      (tag_x + LABEL_PADDING).round() as i32,
      (tag_y + (LABEL_HEIGHT - f64::from(LABEL_FONT_SIZE)) / 2.0).round() as i32,
      PxScale::from(LABEL_FONT_SIZE),
      font,
      text,
    );
  }

  /// 把另一幅图像缩放到本面尺寸后按透明度合成上来。
  pub fn paste_scaled(&mut self, source: &RgbaImage) {
    let (w, h) = self.image.dimensions();
    if w == 0 || h == 0 || source.width() == 0 || source.height() == 0 {
      return;
    }
    if source.dimensions() == (w, h) {
      imageops::overlay(&mut self.image, source, 0, 0);
    } else {
      let scaled = imageops::resize(source, w, h, FilterType::Triangle);
      imageops::overlay(&mut self.image, &scaled, 0, 0);
    }
  }

  /// 编码为 PNG 字节。
  pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
    encode_png(&self.image)
  }

  pub fn image(&self) -> &RgbaImage {
    &self.image
  }

  pub fn into_image(self) -> RgbaImage {
    self.image
  }
}

/// PNG 编码。
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
  let mut buffer = Cursor::new(Vec::new());
  image.write_to(&mut buffer, ImageFormat::Png)?;
  Ok(buffer.into_inner())
}

/// 裁掉四周全透明的行列，边界含首末非透明像素。
///
/// 整幅图都透明时返回 `None`。
pub fn trim_transparent(image: &RgbaImage) -> Option<RgbaImage> {
  let (left, top, right, bottom) = content_bounds(image)?;
  let trimmed = imageops::crop_imm(image, left, top, right - left + 1, bottom - top + 1).to_image();
  Some(trimmed)
}

// 四边独立扫描首个 alpha 非零的行列，返回 (left, top, right, bottom) 闭区间
fn content_bounds(image: &RgbaImage) -> Option<(u32, u32, u32, u32)> {
  let (w, h) = image.dimensions();
  let column_hit = |x: u32| (0..h).any(|y| image.get_pixel(x, y)[3] != 0);
  let row_hit = |y: u32| (0..w).any(|x| image.get_pixel(x, y)[3] != 0);

  let left = (0..w).find(|&x| column_hit(x))?;
  let right = (0..w).rev().find(|&x| column_hit(x))?;
  let top = (0..h).find(|&y| row_hit(y))?;
  let bottom = (0..h).rev().find(|&y| row_hit(y))?;
  Some((left, top, right, bottom))
}

#[cfg(test)]
mod tests {
  use super::*;

  const RED: [u8; 3] = [255, 0, 0];

  #[test]
  fn trim_touches_content_on_every_edge() {
    // 10×10 全透明，中心 4..=6 行列为 3×3 不透明块
    let mut image = RgbaImage::new(10, 10);
    for y in 4..=6 {
      for x in 4..=6 {
        image.put_pixel(x, y, Rgba([9, 9, 9, 255]));
      }
    }
    let trimmed = trim_transparent(&image).unwrap();
    assert_eq!(trimmed.dimensions(), (3, 3));
    assert_eq!(trimmed.get_pixel(0, 0)[3], 255);
  }

  #[test]
  fn trim_keeps_full_span_corners() {
    let mut image = RgbaImage::new(10, 10);
    image.put_pixel(0, 0, Rgba([1, 1, 1, 1]));
    image.put_pixel(9, 9, Rgba([1, 1, 1, 1]));
    let trimmed = trim_transparent(&image).unwrap();
    assert_eq!(trimmed.dimensions(), (10, 10));
  }

  #[test]
  fn trim_of_transparent_surface_is_none() {
    assert!(trim_transparent(&RgbaImage::new(6, 6)).is_none());
  }

  #[test]
  fn box_outline_sets_border_not_interior() {
    let mut surface = Surface::new(10, 10);
    surface.draw_box([2.0, 2.0, 7.0, 7.0], RED, Some(1));
    assert_eq!(surface.image().get_pixel(2, 2)[3], 255);
    assert_eq!(surface.image().get_pixel(7, 2)[3], 255);
    assert_eq!(surface.image().get_pixel(4, 4)[3], 0);
  }

  #[test]
  fn degenerate_box_draws_nothing() {
    let mut surface = Surface::new(10, 10);
    surface.draw_box([5.0, 5.0, 5.0, 9.0], RED, None);
    surface.draw_box([8.0, 3.0, 2.0, 9.0], RED, None);
    assert!(surface.image().pixels().all(|p| p[3] == 0));
  }

  #[test]
  fn line_stroke_widens_around_center() {
    let mut surface = Surface::new(12, 12);
    surface.draw_line([1.0, 5.0, 9.0, 5.0], RED, Some(3));
    for y in 4..=6 {
      assert_eq!(surface.image().get_pixel(5, y)[3], 255, "y={y}");
    }
    assert_eq!(surface.image().get_pixel(5, 2)[3], 0);
  }

  #[test]
  fn zero_length_line_is_a_point() {
    let mut surface = Surface::new(4, 4);
    surface.draw_line([2.0, 2.0, 2.0, 2.0], RED, Some(5));
    assert_eq!(surface.image().get_pixel(2, 2)[3], 255);
  }

  #[test]
  fn clear_resets_to_transparent() {
    let mut surface = Surface::new(4, 4);
    surface.draw_line([0.0, 0.0, 3.0, 3.0], RED, None);
    surface.clear();
    assert!(surface.image().pixels().all(|p| p[3] == 0));
    assert_eq!(surface.width(), 4);
  }

  #[test]
  fn label_does_not_panic_without_assertion_on_font() {
    // 字体是否存在取决于运行环境，只验证调用安全
    let mut surface = Surface::new(64, 32);
    surface.draw_label("cat", 10.0, 20.0, RED);
    surface.draw_label("", 0.0, 0.0, RED);
  }

  #[test]
  fn label_far_outside_canvas_draws_nothing() {
    // 锚点超出 i32 范围时，饱和坐标不得进入矩形运算
    let mut surface = Surface::new(8, 8);
    surface.draw_label("x", 3.0e9, 3.0e9, RED);
    surface.draw_label("x", -3.0e9, 4.0, RED);
    surface.draw_label("x", 4.0, f64::NAN, RED);
    assert!(surface.image().pixels().all(|p| p[3] == 0));
  }

  #[test]
  fn line_beyond_canvas_is_clipped_to_visible_span() {
    let mut surface = Surface::new(8, 8);
    surface.draw_line([3.0e9, 3.0e9, 4.0e9, 4.0e9], RED, Some(1));
    assert!(surface.image().pixels().all(|p| p[3] == 0));

    // 横穿画布的超长线段只画可见区间
    surface.draw_line([-1.0e9, 3.0, 1.0e9, 3.0], RED, Some(1));
    for x in 0..8 {
      assert_eq!(surface.image().get_pixel(x, 3)[3], 255, "x={x}");
    }
  }

  #[test]
  fn png_round_trip_keeps_dimensions() {
    let surface = Surface::new(5, 7);
    let bytes = surface.to_png().unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!(decoded.width(), 5);
    assert_eq!(decoded.height(), 7);
  }
}
