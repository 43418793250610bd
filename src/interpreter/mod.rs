// 该文件是 Diecai （叠彩山） 项目的一部分。
// src/interpreter/mod.rs - 预测解释器接口
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

use crate::engine::{Action, Extraction};
use crate::error::VisError;
use crate::options::{OverlayKind, RenderOptions};
use crate::source::SourceImage;
use crate::surface::Surface;

mod boxes;
mod lines;
mod segments;

pub use self::boxes::BoxInterpreter;
pub use self::lines::LineInterpreter;
pub use self::segments::SegmentInterpreter;

/// 一种可视化类型的形状测试与渲染、提取逻辑。
pub trait Interpreter {
  /// 本解释器负责的可视化类型。
  fn kind(&self) -> OverlayKind;

  /// 是否实现了请求的操作。
  fn supports(&self, action: Action) -> bool;

  /// 形状测试：在 `options.kind` 过滤下预测结构是否可被解析。
  fn matches(&self, prediction: &Value, options: &RenderOptions) -> bool;

  /// 把检测集画到绘制面上。
  fn overlay(
    &self,
    prediction: &Value,
    surface: &mut Surface,
    options: &RenderOptions,
  ) -> Result<(), VisError>;

  /// 产出叠画了检测集的源图像 PNG 副本。
  fn annotate(
    &self,
    prediction: &Value,
    image: &SourceImage,
    options: &RenderOptions,
  ) -> Result<Vec<u8>, VisError>;

  /// 按检测逐个产出裁剪子图；默认不支持。
  fn extract(
    &self,
    _prediction: &Value,
    _image: &SourceImage,
    _options: &RenderOptions,
  ) -> Result<Vec<Extraction>, VisError> {
    Err(VisError::UnsupportedAction {
      action: Action::Extract,
      kind: self.kind(),
    })
  }
}

/// 固定分发顺序的解释器列表。
///
/// 形状测试并不互斥（裸的四数数组既像单条线也像单个框），顺序即语义。
pub(crate) fn all() -> [&'static dyn Interpreter; 3] {
  [&LineInterpreter, &SegmentInterpreter, &BoxInterpreter]
}

/// 类型过滤：未指定类型时全部放行。
pub(crate) fn kind_allowed(options: &RenderOptions, kind: OverlayKind) -> bool {
  options.kind.is_none_or(|k| k == kind)
}

/// 宽松的真值规则：null、false、零与空串为假，容器一律为真。
///
/// 模型服务的输出常用空值占位，字段探测都建立在这条规则上。
pub(crate) fn truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    Value::String(s) => !s.is_empty(),
    Value::Array(_) | Value::Object(_) => true,
  }
}

/// 取出真值字段，缺失或假值返回 `None`。
pub(crate) fn truthy_field<'a>(doc: &'a Value, key: &str) -> Option<&'a Value> {
  doc.get(key).filter(|v| truthy(v))
}

/// 四个非负数字组成的序列，框与线段共用的基本形状。
pub(crate) fn quad(value: &Value) -> Option<[f64; 4]> {
  let items = value.as_array()?;
  if items.len() != 4 {
    return None;
  }
  let mut out = [0.0; 4];
  for (slot, item) in out.iter_mut().zip(items) {
    let n = item.as_f64()?;
    if n < 0.0 {
      return None;
    }
    *slot = n;
  }
  Some(out)
}
