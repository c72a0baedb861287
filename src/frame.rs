// 该文件是 Fenjian （分拣） 项目的一部分。
// src/frame.rs - 像素帧与模型输入缓冲区定义
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

use thiserror::Error;

/// 模型输入宽度，需与分类器编译时的期望一致
pub const MODEL_WIDTH: u32 = 96;
/// 模型输入高度
pub const MODEL_HEIGHT: u32 = 96;
/// 模型输入通道数
pub const MODEL_CHANNELS: Channels = Channels::Rgb;

const RGBA_CHANNELS: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("不支持的通道数: {0}")]
  UnsupportedChannels(u32),
}

/// 模型输入通道布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Channels {
  /// 每像素一个亮度字节
  #[value(name = "1")]
  Luma,
  /// 每像素 R,G,B 三个字节
  #[value(name = "3")]
  Rgb,
}

impl Channels {
  pub fn count(self) -> usize {
    match self {
      Channels::Luma => 1,
      Channels::Rgb => 3,
    }
  }
}

impl TryFrom<u32> for Channels {
  type Error = FrameError;

  fn try_from(value: u32) -> Result<Self, Self::Error> {
    match value {
      1 => Ok(Channels::Luma),
      3 => Ok(Channels::Rgb),
      other => Err(FrameError::UnsupportedChannels(other)),
    }
  }
}

impl fmt::Display for Channels {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.count())
  }
}

/// 模型输入形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputShape {
  pub width: u32,
  pub height: u32,
  pub channels: Channels,
}

impl Default for InputShape {
  fn default() -> Self {
    Self {
      width: MODEL_WIDTH,
      height: MODEL_HEIGHT,
      channels: MODEL_CHANNELS,
    }
  }
}

impl InputShape {
  pub fn with_channels(mut self, channels: Channels) -> Self {
    self.channels = channels;
    self
  }

  pub fn pixels(&self) -> usize {
    self.width as usize * self.height as usize
  }

  pub fn buffer_len(&self) -> usize {
    self.pixels() * self.channels.count()
  }
}

impl fmt::Display for InputShape {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}x{}x{}", self.width, self.height, self.channels)
  }
}

/// 单次采样得到的 RGBA 像素帧，行优先存储，每像素 4 字节。
///
/// 每个 tick 生成一次，只归该 tick 所有。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFrame {
  width: u32,
  height: u32,
  data: Box<[u8]>,
}

impl PixelFrame {
  pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
    let expected = RGBA_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  /// 以同一颜色填充整帧
  pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
    let data = rgba
      .iter()
      .copied()
      .cycle()
      .take(RGBA_CHANNELS * width as usize * height as usize)
      .collect::<Vec<u8>>();
    Self {
      width,
      height,
      data: data.into_boxed_slice(),
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn pixel_count(&self) -> usize {
    self.width as usize * self.height as usize
  }

  pub fn as_rgba(&self) -> &[u8] {
    &self.data
  }

  /// 按像素迭代 `[R, G, B, A]`
  pub fn pixels(&self) -> impl Iterator<Item = &[u8]> {
    self.data.chunks_exact(RGBA_CHANNELS)
  }
}

impl From<image::RgbaImage> for PixelFrame {
  fn from(image: image::RgbaImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

/// 模型输入缓冲区。
///
/// 长度恒为 `width * height * channels`，只能由预处理器整体生成。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInputBuffer {
  shape: InputShape,
  data: Box<[u8]>,
}

impl ModelInputBuffer {
  pub(crate) fn from_parts(shape: InputShape, data: Vec<u8>) -> Self {
    debug_assert_eq!(data.len(), shape.buffer_len());
    Self {
      shape,
      data: data.into_boxed_slice(),
    }
  }

  pub fn shape(&self) -> InputShape {
    self.shape
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }
}

impl AsRef<[u8]> for ModelInputBuffer {
  fn as_ref(&self) -> &[u8] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pixel_frame_rejects_partial_data() {
    let err = PixelFrame::new(2, 2, vec![0; 15]).unwrap_err();
    assert_eq!(
      err,
      FrameError::LengthMismatch {
        expected: 16,
        actual: 15
      }
    );
  }

  #[test]
  fn filled_frame_repeats_color() {
    let frame = PixelFrame::filled(3, 2, [1, 2, 3, 4]);
    assert_eq!(frame.pixel_count(), 6);
    assert!(frame.pixels().all(|p| p == [1, 2, 3, 4]));
  }

  #[test]
  fn default_shape_matches_classifier_constants() {
    let shape = InputShape::default();
    assert_eq!(shape.to_string(), "96x96x3");
    assert_eq!(shape.buffer_len(), 96 * 96 * 3);
    assert_eq!(shape.with_channels(Channels::Luma).buffer_len(), 96 * 96);
  }

  #[test]
  fn channels_only_accept_luma_or_rgb() {
    assert_eq!(Channels::try_from(1), Ok(Channels::Luma));
    assert_eq!(Channels::try_from(3), Ok(Channels::Rgb));
    assert_eq!(
      Channels::try_from(4),
      Err(FrameError::UnsupportedChannels(4))
    );
  }
}
