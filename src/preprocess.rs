// 该文件是 Fenjian （分拣） 项目的一部分。
// src/preprocess.rs - 像素到模型输入的预处理
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

use crate::frame::{Channels, InputShape, ModelInputBuffer, PixelFrame};

const LUMA_R: f64 = 0.2126;
const LUMA_G: f64 = 0.7152;
const LUMA_B: f64 = 0.0722;

/// 人眼加权亮度
pub fn luma(r: u8, g: u8, b: u8) -> f64 {
  LUMA_R * r as f64 + LUMA_G * g as f64 + LUMA_B * b as f64
}

/// 四舍五入并截断到 `[0, 255]` 的灰度字节
pub fn luma_byte(r: u8, g: u8, b: u8) -> u8 {
  luma(r, g, b).round().clamp(0.0, 255.0) as u8
}

/// 帧平均亮度，取值 `[0, 255]`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Brightness(f64);

impl Brightness {
  pub fn new(value: f64) -> Self {
    if value.is_nan() {
      return Self(0.0);
    }
    Self(value.clamp(0.0, 255.0))
  }

  pub fn value(&self) -> f64 {
    self.0
  }

  /// 亮度条的填充比例（百分比）
  pub fn indicator_percent(&self) -> u8 {
    (self.0 / 255.0 * 100.0).round().clamp(0.0, 100.0) as u8
  }
}

impl fmt::Display for Brightness {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:.1}", self.0)
  }
}

/// 计算整帧平均亮度，与通道布局无关
pub fn brightness(frame: &PixelFrame) -> Brightness {
  let count = frame.pixel_count();
  if count == 0 {
    return Brightness::default();
  }
  let sum: f64 = frame.pixels().map(|p| luma(p[0], p[1], p[2])).sum();
  Brightness::new(sum / count as f64)
}

/// 把 RGBA 帧打包为模型输入缓冲区，同时给出平均亮度。
///
/// - `Channels::Rgb`：逐像素复制 R,G,B，丢弃 alpha
/// - `Channels::Luma`：逐像素输出 [`luma_byte`]
///
/// 纯函数，不修改输入。
pub fn preprocess(frame: &PixelFrame, channels: Channels) -> (ModelInputBuffer, Brightness) {
  let shape = InputShape {
    width: frame.width(),
    height: frame.height(),
    channels,
  };

  let mut data = Vec::with_capacity(shape.buffer_len());
  match channels {
    Channels::Rgb => {
      for p in frame.pixels() {
        data.extend_from_slice(&p[..3]);
      }
    }
    Channels::Luma => {
      data.extend(frame.pixels().map(|p| luma_byte(p[0], p[1], p[2])));
    }
  }

  (ModelInputBuffer::from_parts(shape, data), brightness(frame))
}
