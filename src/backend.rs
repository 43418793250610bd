// 该文件是 Diecai （叠彩山） 项目的一部分。
// src/backend.rs - 显示表面后端
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

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use tracing::debug;

use crate::source::SourceImage;
use crate::surface::Surface;

/// 叠加表面的标识，幂等地标记在源图像上。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(i64);

impl fmt::Display for SurfaceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "diecai{}", self.0)
  }
}

/// 宿主注入的栅格后端能力。
///
/// 后端在引擎构造时选定一次，引擎内部不再区分运行环境。
pub trait RasterBackend {
  /// 为图像提供显示叠加表面。
  ///
  /// 返回 `None` 表示运行环境没有显示能力，叠加退化为注解语义。
  /// 已标记过的图像复用同一表面并先清空；未标记的图像按显示尺寸新建。
  fn overlay_surface(&mut self, image: &SourceImage) -> Option<(SurfaceId, &mut Surface)>;
}

/// 无显示环境：不提供叠加表面。
pub struct Headless;

impl RasterBackend for Headless {
  fn overlay_surface(&mut self, _image: &SourceImage) -> Option<(SurfaceId, &mut Surface)> {
    None
  }
}

/// 维护一组显示叠加表面的后端。
#[derive(Default)]
pub struct SurfaceSession {
  surfaces: HashMap<SurfaceId, Surface>,
  last_id: i64,
}

impl SurfaceSession {
  pub fn new() -> Self {
    SurfaceSession::default()
  }

  /// 查看某个表面的当前内容。
  pub fn surface(&self, id: SurfaceId) -> Option<&Surface> {
    self.surfaces.get(&id)
  }

  /// 取走并移除某个表面。
  pub fn take_surface(&mut self, id: SurfaceId) -> Option<Surface> {
    self.surfaces.remove(&id)
  }

  // 以毫秒时间戳派生标识，同毫秒内递增避免冲突
  fn mint_id(&mut self) -> SurfaceId {
    let mut stamp = Utc::now().timestamp_millis();
    if stamp <= self.last_id {
      stamp = self.last_id + 1;
    }
    self.last_id = stamp;
    SurfaceId(stamp)
  }
}

impl RasterBackend for SurfaceSession {
  fn overlay_surface(&mut self, image: &SourceImage) -> Option<(SurfaceId, &mut Surface)> {
    let id = match image.overlay_tag() {
      Some(id) => id,
      None => {
        let id = self.mint_id();
        image.set_overlay_tag(id);
        debug!("标记叠加表面: {id}");
        id
      }
    };

    let (w, h) = (image.display_width(), image.display_height());
    let surface = self.surfaces.entry(id).or_insert_with(|| Surface::new(w, h));
    // 表面始终对齐显示尺寸，并以空内容交给解释器
    if surface.width() != w || surface.height() != h {
      *surface = Surface::new(w, h);
    } else {
      surface.clear();
    }
    Some((id, surface))
  }
}
