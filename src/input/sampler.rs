// 该文件是 Fenjian （分拣） 项目的一部分。
// src/input/sampler.rs - 帧采样与缩放
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

use image::{
  RgbaImage,
  imageops::{self, FilterType},
};
use tracing::trace;

use crate::{
  frame::{InputShape, PixelFrame},
  input::VideoSource,
};

/// 缩放方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FitMode {
  /// 整帧拉伸到模型尺寸
  #[default]
  Stretch,
  /// 先按模型宽高比居中裁剪，再缩放
  CenterCrop,
}

/// 把视频源的当前帧绘制到固定尺寸的绘制面上。
///
/// 绘制面在每次采样时被覆盖，调用方拿到的是独立的 [`PixelFrame`]。
pub struct FrameSampler<S> {
  source: S,
  fit: FitMode,
  surface: RgbaImage,
}

impl<S: VideoSource> FrameSampler<S> {
  pub fn new(source: S, shape: InputShape, fit: FitMode) -> Self {
    Self {
      source,
      fit,
      surface: RgbaImage::new(shape.width, shape.height),
    }
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  pub fn source_mut(&mut self) -> &mut S {
    &mut self.source
  }

  /// 采样一帧；视频源尚未就绪时返回 `None`
  pub fn sample(&mut self) -> Option<PixelFrame> {
    let (width, height) = self.surface.dimensions();
    let frame = self.source.current_frame()?;

    if frame.dimensions() == (width, height) {
      self.surface.clone_from(frame);
    } else {
      self.surface = match self.fit {
        FitMode::Stretch => imageops::resize(frame, width, height, FilterType::Triangle),
        FitMode::CenterCrop => {
          let (x, y, w, h) = center_crop(frame.dimensions(), (width, height));
          let cropped = imageops::crop_imm(frame, x, y, w, h).to_image();
          imageops::resize(&cropped, width, height, FilterType::Triangle)
        }
      };
    }
    trace!("采样完成: {}x{}", width, height);

    Some(PixelFrame::from(self.surface.clone()))
  }
}

/// 源图中与目标宽高比一致的最大居中区域 `(x, y, w, h)`
fn center_crop(source: (u32, u32), target: (u32, u32)) -> (u32, u32, u32, u32) {
  let (sw, sh) = (source.0 as u64, source.1 as u64);
  let (tw, th) = (target.0.max(1) as u64, target.1.max(1) as u64);

  let (w, h) = if sw * th > sh * tw {
    ((sh * tw / th).max(1), sh)
  } else {
    (sw, (sw * th / tw).max(1))
  };
  let x = (sw - w.min(sw)) / 2;
  let y = (sh - h.min(sh)) / 2;
  (x as u32, y as u32, w as u32, h as u32)
}
