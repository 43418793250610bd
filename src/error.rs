// 该文件是 Diecai （叠彩山） 项目的一部分。
// src/error.rs - 错误类型定义
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

use thiserror::Error;

use crate::engine::Action;
use crate::options::OverlayKind;
use crate::source::AcquireError;

/// 可视化流程的统一错误类型。
///
/// 所有错误在调用处同步抛出，没有重试，也没有部分结果。
#[derive(Error, Debug)]
pub enum VisError {
  /// 显式指定了类型，但该类型的解释器无法解析预测结构。
  #[error("类型 '{kind}' 无法以 '{action}' 处理该预测结构")]
  ShapeMismatch { action: Action, kind: OverlayKind },
  /// 未指定类型，且没有任何解释器接受该预测结构。
  #[error("无法确定预测结构的类型，或 '{action}' 不支持该预测结构")]
  ShapeUnrecognized { action: Action },
  /// 预测结构被某个解释器接受，但该解释器未实现请求的操作。
  #[error("类型 '{kind}' 不支持 '{action}' 操作")]
  UnsupportedAction { action: Action, kind: OverlayKind },
  /// 图像引用无法解析为像素数据。
  #[error("图像获取失败: {0}")]
  Acquire(#[from] AcquireError),
  /// 栅格处理（编码、缩放等）失败。
  #[error("图像处理错误: {0}")]
  Raster(#[from] image::ImageError),
  /// 请求裁剪的分割标签没有任何非透明像素。
  #[error("分割标签 {0} 没有非透明像素，无法裁剪")]
  EmptySegment(u32),
}
