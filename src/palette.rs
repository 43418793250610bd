// 该文件是 Diecai （叠彩山） 项目的一部分。
// src/palette.rs - 调色板与对比色
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

/// 固定顺序的默认调色板。
pub const PALETTE: [[u8; 3]; 10] = [
  [31, 119, 180],  // blue
  [255, 127, 14],  // orange
  [44, 160, 44],   // green
  [214, 39, 40],   // red
  [148, 103, 189], // purple
  [140, 86, 75],   // brown
  [227, 119, 194], // pink
  [127, 127, 127], // gray
  [188, 189, 34],  // yellow
  [23, 190, 207],  // cyan
];

/// 与 [`PALETTE`] 同序的颜色名。
pub const PALETTE_NAMES: [&str; 10] = [
  "blue", "orange", "green", "red", "purple", "brown", "pink", "gray", "yellow", "cyan",
];

/// 按索引取色，越界时循环；`colors` 为调用方提供的调色板覆盖。
///
/// 空覆盖表视为未覆盖。
pub fn cycle(colors: Option<&[[u8; 3]]>, index: usize) -> [u8; 3] {
  match colors {
    Some(list) if !list.is_empty() => list[index % list.len()],
    _ => PALETTE[index % PALETTE.len()],
  }
}

/// 标签文本的对比色：按 W3C 亮度公式在黑白之间二选一。
pub fn contrast_color(rgb: [u8; 3]) -> [u8; 3] {
  let [r, g, b] = rgb;
  let brightness = (u32::from(r) * 299 + u32::from(g) * 587 + u32::from(b) * 114) as f64 / 1000.0;
  if brightness > 255.0 - brightness {
    [0, 0, 0]
  } else {
    [255, 255, 255]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cycle_wraps_past_palette_length() {
    assert_eq!(cycle(None, 0), PALETTE[0]);
    assert_eq!(cycle(None, 9), PALETTE[9]);
    assert_eq!(cycle(None, 10), PALETTE[0]);
    assert_eq!(cycle(None, 23), PALETTE[3]);
  }

  #[test]
  fn cycle_prefers_caller_palette() {
    let custom = [[1, 2, 3], [4, 5, 6]];
    assert_eq!(cycle(Some(&custom), 0), [1, 2, 3]);
    assert_eq!(cycle(Some(&custom), 3), [4, 5, 6]);
  }

  #[test]
  fn empty_override_falls_back_to_default() {
    assert_eq!(cycle(Some(&[]), 4), PALETTE[4]);
  }

  #[test]
  fn contrast_flips_between_black_and_white() {
    assert_eq!(contrast_color([255, 255, 255]), [0, 0, 0]);
    assert_eq!(contrast_color([0, 0, 0]), [255, 255, 255]);
    // 调色板首色（蓝）偏暗，标签文本应为白色
    assert_eq!(contrast_color(PALETTE[0]), [255, 255, 255]);
    // 黄色足够亮，标签文本应为黑色
    assert_eq!(contrast_color(PALETTE[8]), [0, 0, 0]);
  }
}
