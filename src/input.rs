// 该文件是 Fenjian （分拣） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use image::RgbaImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::FromUrl;

/// 视频源
pub trait VideoSource {
  /// 返回当前已解码的帧，不阻塞。
  ///
  /// 尚未解码出任何帧时返回 `None`。
  fn current_frame(&mut self) -> Option<&RgbaImage>;
}

/// 摄像头朝向偏好
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Facing {
  /// 后置（朝向环境）
  #[default]
  Environment,
  /// 前置（朝向用户）
  User,
}

impl fmt::Display for Facing {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Facing::Environment => f.write_str("environment"),
      Facing::User => f.write_str("user"),
    }
  }
}

/// 采集请求，宽高为期望值而非强制值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
  pub facing: Facing,
  pub width: u32,
  pub height: u32,
}

impl Default for CaptureRequest {
  fn default() -> Self {
    Self {
      facing: Facing::Environment,
      width: 1280,
      height: 720,
    }
  }
}

impl fmt::Display for CaptureRequest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}x{}", self.facing, self.width, self.height)
  }
}

mod sampler;
pub use self::sampler::{FitMode, FrameSampler};

#[cfg(feature = "read_image_file")]
mod image_file;
#[cfg(feature = "read_image_file")]
pub use self::image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "test_pattern_input")]
mod test_pattern;
#[cfg(feature = "test_pattern_input")]
pub use self::test_pattern::{Pattern, TestPatternInput, TestPatternInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{
  GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder,
};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "test_pattern_input")]
  #[error("Test pattern input error: {0}")]
  TestPatternInputError(#[from] TestPatternInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer input error: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
  #[error("Capture task failed: {0}")]
  Acquire(String),
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "test_pattern_input")]
  TestPattern(TestPatternInput),
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::open(url, &CaptureRequest::default())
  }
}

impl InputWrapper {
  /// 按 URL 方案打开视频源
  pub fn open(url: &Url, request: &CaptureRequest) -> Result<Self, InputError> {
    #[cfg(feature = "gstreamer_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == GStreamerInputPipelineBuilder::SCHEME {
        let input = GStreamerInputPipelineBuilder::from_url(url)?
          .request(request)
          .build()?;
        return Ok(InputWrapper::GStreamerInput(input));
      }
    }
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInput::SCHEME {
        let input = ImageFileInput::from_url(url)?;
        return Ok(InputWrapper::ReadImageFile(input));
      }
    }
    #[cfg(feature = "test_pattern_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == TestPatternInput::SCHEME {
        let input = TestPatternInput::open(url, request)?;
        return Ok(InputWrapper::TestPattern(input));
      }
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl VideoSource for InputWrapper {
  fn current_frame(&mut self) -> Option<&RgbaImage> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.current_frame(),
      #[cfg(feature = "test_pattern_input")]
      InputWrapper::TestPattern(input) => input.current_frame(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.current_frame(),
      #[allow(unreachable_patterns)]
      _ => None,
    }
  }
}

/// 异步获取视频源。打开设备可能阻塞，放到阻塞线程池执行。
pub async fn acquire(url: Url, request: CaptureRequest) -> Result<InputWrapper, InputError> {
  info!("请求视频源: {} ({})", url, request);
  let input = tokio::task::spawn_blocking(move || InputWrapper::open(&url, &request))
    .await
    .map_err(|e| InputError::Acquire(e.to_string()))??;
  info!("视频源已打开");
  Ok(input)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_request_prefers_environment_720p() {
    let request = CaptureRequest::default();
    assert_eq!(request.facing, Facing::Environment);
    assert_eq!((request.width, request.height), (1280, 720));
    assert_eq!(request.to_string(), "environment 1280x720");
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rtmp://example.com/live").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch(_))
    ));
  }

  #[cfg(feature = "test_pattern_input")]
  #[tokio::test]
  async fn acquire_opens_pattern_source() {
    let url = Url::parse("pattern://solid?r=10&g=20&b=30&width=4&height=2").unwrap();
    let mut input = acquire(url, CaptureRequest::default()).await.unwrap();
    let frame = input.current_frame().unwrap();
    assert_eq!(frame.dimensions(), (4, 2));
  }
}
