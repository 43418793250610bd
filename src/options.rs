// 该文件是 Diecai （叠彩山） 项目的一部分。
// src/options.rs - 渲染选项与类型过滤
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
use std::str::FromStr;

use thiserror::Error;

/// 三种可视化类型，也是分发时的固定扫描顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayKind {
  /// 姿态骨架线
  Lines,
  /// 逐像素分割图
  Segments,
  /// 检测框
  Boxes,
}

impl OverlayKind {
  /// 按分发顺序列出全部类型。
  pub const ALL: [OverlayKind; 3] = [OverlayKind::Lines, OverlayKind::Segments, OverlayKind::Boxes];

  /// 类型的对外名称。
  pub fn as_str(self) -> &'static str {
    match self {
      OverlayKind::Lines => "lines",
      OverlayKind::Segments => "segments",
      OverlayKind::Boxes => "boxes",
    }
  }
}

impl fmt::Display for OverlayKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 字符串不是已知的可视化类型名。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("未知的可视化类型: '{0}'")]
pub struct UnknownKind(pub String);

impl FromStr for OverlayKind {
  type Err = UnknownKind;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lower = s.to_ascii_lowercase();
    OverlayKind::ALL
      .into_iter()
      .find(|kind| kind.as_str() == lower)
      .ok_or_else(|| UnknownKind(s.to_string()))
  }
}

/// 识别为“真”的开关字面量。
pub const SWITCH_TRUE: [&str; 4] = ["true", "yes", "on", "1"];
/// 识别为“假”的开关字面量。
pub const SWITCH_FALSE: [&str; 4] = ["false", "no", "off", "0"];

/// 在 API 边界把文本开关值归一化为布尔值。
///
/// 不区分大小写；不在两张表里的拼写返回 `None`，
/// 解释器内部永远只接触归一化之后的类型化取值。
pub fn parse_switch(value: &str) -> Option<bool> {
  let lower = value.trim().to_ascii_lowercase();
  if SWITCH_TRUE.contains(&lower.as_str()) {
    Some(true)
  } else if SWITCH_FALSE.contains(&lower.as_str()) {
    Some(false)
  } else {
    None
  }
}

/// 一次调用的渲染配置。
///
/// 未设置的字段按各解释器的默认行为处理。
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
  /// 限定分发到某一种可视化类型。
  pub kind: Option<OverlayKind>,
  /// 几何坐标的统一缩放因子；未设置时由引擎按声明分辨率推导。
  pub scale: Option<f64>,
  /// 覆盖默认调色板的 RGB 序列。
  pub colors: Option<Vec<[u8; 3]>>,
  /// 描边宽度，未设置时使用默认常量。
  pub line_width: Option<u32>,
  /// 是否渲染文本标签；未设置视为渲染。
  pub label: Option<bool>,
  /// 分割类型专用：要隔离的标签集合。
  pub segments: Option<Vec<u32>>,
  /// 分割类型专用：反转 `segments` 的选择。
  pub exclude: bool,
  /// 预测声明的宽度，优先于预测文档内的声明尺寸。
  pub width: Option<u32>,
  /// 预测声明的高度，优先于预测文档内的声明尺寸。
  pub height: Option<u32>,
}

impl RenderOptions {
  /// 生效的缩放因子，零值与未设置一样回落到 1。
  pub(crate) fn effective_scale(&self) -> f64 {
    match self.scale {
      Some(scale) if scale != 0.0 => scale,
      _ => 1.0,
    }
  }

  /// 是否绘制标签文本。
  pub(crate) fn label_enabled(&self) -> bool {
    self.label.unwrap_or(true)
  }
}
