// 该文件是 Fenjian （分拣） 项目的一部分。
// src/input/test_pattern.rs - 测试图案输入
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

//! 合成视频源，用于无摄像头环境下的演示与测试：
//!
//! - `pattern://solid?r=255&g=255&b=255`
//! - `pattern://gradient`（水平黑到白渐变）
//! - `pattern://checker?size=16`
//!
//! 通用参数：`width`、`height`（默认取采集请求的期望分辨率），
//! `warmup`（前 N 次取帧返回未就绪，模拟摄像头尚未解码出首帧）。

use std::collections::HashMap;

use image::{Rgba, RgbaImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{CaptureRequest, VideoSource},
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TestPatternInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("Unknown pattern: {0}")]
  UnknownPattern(String),
  #[error("Invalid parameter: {name}={value}")]
  InvalidParameter { name: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
  Solid([u8; 3]),
  Gradient,
  Checker(u32),
}

impl Pattern {
  fn render(&self, width: u32, height: u32) -> RgbaImage {
    match *self {
      Pattern::Solid([r, g, b]) => RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255])),
      Pattern::Gradient => {
        let span = width.saturating_sub(1).max(1);
        RgbaImage::from_fn(width, height, |x, _| {
          let v = (x * 255 / span) as u8;
          Rgba([v, v, v, 255])
        })
      }
      Pattern::Checker(size) => {
        let size = size.max(1);
        RgbaImage::from_fn(width, height, |x, y| {
          if (x / size + y / size) % 2 == 0 {
            Rgba([255, 255, 255, 255])
          } else {
            Rgba([0, 0, 0, 255])
          }
        })
      }
    }
  }
}

pub struct TestPatternInput {
  image: RgbaImage,
  warmup: usize,
}

impl FromUrlWithScheme for TestPatternInput {
  const SCHEME: &'static str = "pattern";
}

impl FromUrl for TestPatternInput {
  type Error = TestPatternInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::open(url, &CaptureRequest::default())
  }
}

fn parse_param<T: std::str::FromStr>(
  query: &HashMap<String, String>,
  name: &str,
  default: T,
) -> Result<T, TestPatternInputError> {
  match query.get(name) {
    Some(value) => value
      .parse::<T>()
      .map_err(|_| TestPatternInputError::InvalidParameter {
        name: name.to_string(),
        value: value.clone(),
      }),
    None => Ok(default),
  }
}

impl TestPatternInput {
  pub fn new(pattern: Pattern, width: u32, height: u32) -> Self {
    Self {
      image: pattern.render(width, height),
      warmup: 0,
    }
  }

  pub fn with_warmup(mut self, warmup: usize) -> Self {
    self.warmup = warmup;
    self
  }

  pub fn open(url: &Url, request: &CaptureRequest) -> Result<Self, TestPatternInputError> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TestPatternInputError::SchemaMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let pattern = match url.host_str() {
      Some("solid") => Pattern::Solid([
        parse_param(&query, "r", 128u8)?,
        parse_param(&query, "g", 128u8)?,
        parse_param(&query, "b", 128u8)?,
      ]),
      Some("gradient") => Pattern::Gradient,
      Some("checker") => Pattern::Checker(parse_param(&query, "size", 16u32)?),
      other => {
        return Err(TestPatternInputError::UnknownPattern(
          other.unwrap_or_default().to_string(),
        ));
      }
    };
    let width = parse_param(&query, "width", request.width)?;
    let height = parse_param(&query, "height", request.height)?;
    let warmup = parse_param(&query, "warmup", 0usize)?;
    debug!("测试图案 {:?} {}x{}, 预热 {} 次", pattern, width, height, warmup);

    Ok(Self::new(pattern, width, height).with_warmup(warmup))
  }
}

impl VideoSource for TestPatternInput {
  fn current_frame(&mut self) -> Option<&RgbaImage> {
    if self.warmup > 0 {
      self.warmup -= 1;
      return None;
    }
    Some(&self.image)
  }
}
