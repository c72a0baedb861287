// 该文件是 Fenjian （分拣） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 摄像头输入
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

//! # GStreamer 视频输入模块
//!
//! 基于 GStreamer 的实时视频源，支持：
//! - 摄像头捕获（V4L2）：`gst://camera/dev/video0?width=1280&height=720&fps=30`
//! - 视频文件：`gst://file/path/to/video.mp4`
//!
//! 取帧不阻塞：appsink 只保留最新一帧，`current_frame` 用
//! `try_pull_sample` 轮询，管道尚未产出首帧时返回 `None`。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! ## Cargo 特性
//!
//! ```toml
//! [dependencies]
//! fenjian = { version = "0.1", features = ["gstreamer_input"] }
//! ```

use std::collections::HashMap;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{CaptureRequest, Facing, VideoSource},
};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbaImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

/// 等待管道进入播放状态的最长时间
const GSTREAMER_START_TIMEOUT_SECS: u64 = 5;

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://"）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format")]
  UnsupportedFormat,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误，通常意味着设备无法打开或无权限
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    width: u32,
    height: u32,
    fps: u32,
  },
  TargetFormat,
}

impl GStreamerInputBuilderItem {
  /// 不带分辨率约束的摄像头源，由设备自行协商格式
  fn fallback(&self) -> Option<String> {
    match self {
      GStreamerInputBuilderItem::CameraSource { camera, .. } => {
        Some(format!("v4l2src device={}", camera))
      }
      _ => None,
    }
  }

  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location={} ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        width,
        height,
        fps,
      } => {
        format!(
          "v4l2src device={} ! video/x-raw,width={},height={},framerate={}/1",
          camera, width, height, fps
        )
      }
      GStreamerInputBuilderItem::TargetFormat => {
        "videoconvert ! video/x-raw,format=RGBA".to_string()
      }
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  source: GStreamerInputBuilderItem,
  query: HashMap<String, String>,
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let source = match url.host_str() {
      Some("camera") => {
        let request = CaptureRequest::default();
        GStreamerInputBuilderItem::CameraSource {
          camera: url.path().to_string(),
          width: request.width,
          height: request.height,
          fps: 30,
        }
      }
      Some("file") => GStreamerInputBuilderItem::FileSource(url.path().to_string()),
      _ => return Err(GStreamerInputError::SchemeMismatch),
    };

    let mut builder = GStreamerInputPipelineBuilder { source, query };
    builder.apply_query();
    Ok(builder)
  }
}

impl GStreamerInputPipelineBuilder {
  /// 应用采集请求中的期望分辨率，URL 查询参数优先
  pub fn request(mut self, request: &CaptureRequest) -> Self {
    if let GStreamerInputBuilderItem::CameraSource { width, height, .. } = &mut self.source {
      *width = request.width;
      *height = request.height;
    }
    if request.facing != Facing::Environment {
      // V4L2 设备没有朝向信息，朝向由设备路径决定
      warn!("摄像头朝向偏好 {} 无法通过 V4L2 选择, 使用指定设备", request.facing);
    }
    self.apply_query();
    self
  }

  fn apply_query(&mut self) {
    let query = &self.query;
    if let GStreamerInputBuilderItem::CameraSource {
      width, height, fps, ..
    } = &mut self.source
    {
      let parse = |key: &str| query.get(key).and_then(|v| v.parse::<u32>().ok());
      *width = parse("width").unwrap_or(*width);
      *height = parse("height").unwrap_or(*height);
      *fps = parse("fps").unwrap_or(*fps);
    }
  }

  fn full_pipeline(source: &str) -> String {
    format!(
      "{} ! {} ! appsink max-buffers=1 drop=true sync=false name=sink",
      source,
      GStreamerInputBuilderItem::TargetFormat.to_pipeline()
    )
  }

  /// 期望分辨率的管道描述，以及摄像头无法满足时的退路
  fn pipelines(&self) -> (String, Option<String>) {
    (
      Self::full_pipeline(&self.source.to_pipeline()),
      self.source.fallback().map(|s| Self::full_pipeline(&s)),
    )
  }

  /// 期望分辨率只是偏好：协商失败时退回设备默认格式，由采样器统一缩放
  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let (preferred, fallback) = self.pipelines();
    match (Self::launch(&preferred), fallback) {
      (Ok(input), _) => Ok(input),
      (Err(e), Some(fallback)) => {
        warn!("摄像头不支持期望的格式 ({}), 使用设备默认格式", e);
        Self::launch(&fallback)
      }
      (Err(e), None) => Err(e),
    }
  }

  fn launch(full_pipeline: &str) -> Result<GStreamerInput, GStreamerInputError> {
    info!("GStreamer pipeline description: {}", full_pipeline);

    let pipeline = gst::parse::launch(full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;
    let (result, current, _) =
      pipeline.state(gst::ClockTime::from_seconds(GSTREAMER_START_TIMEOUT_SECS));
    if let Err(e) = result {
      error!("GStreamer 管道启动失败: {}", e);
      if let Err(e) = pipeline.set_state(gst::State::Null) {
        warn!("Failed to stop GStreamer pipeline: {}", e);
      }
      return Err(e.into());
    }
    debug!("GStreamer 管道状态: {:?}", current);

    Ok(GStreamerInput {
      pipeline,
      appsink,
      latest: None,
      failed: false,
    })
  }
}

/// GStreamer 实时视频源
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  latest: Option<RgbaImage>,
  /// 管道报错或流结束后不再返回缓存帧
  failed: bool,
}

impl GStreamerInput {
  /// 检查总线上的错误与流结束消息
  fn poll_bus(&mut self) {
    let Some(bus) = self.pipeline.bus() else {
      return;
    };
    while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error, gst::MessageType::Eos]) {
      match msg.view() {
        gst::MessageView::Error(err) => {
          error!("GStreamer 管道错误: {} ({:?})", err.error(), err.debug());
        }
        gst::MessageView::Eos(..) => warn!("视频流已结束"),
        _ => continue,
      }
      self.failed = true;
      self.latest = None;
    }
  }

  /// 视频流是否已失效
  pub fn is_failed(&self) -> bool {
    self.failed
  }
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl VideoSource for GStreamerInput {
  fn current_frame(&mut self) -> Option<&RgbaImage> {
    if !self.failed {
      self.poll_bus();
    }
    if self.failed {
      return None;
    }
    if let Some(sample) = self.appsink.try_pull_sample(gst::ClockTime::ZERO) {
      match convert_sample_to_rgba(sample) {
        Ok(image) => self.latest = Some(image),
        Err(e) => error!("Failed to fetch sample: {}", e),
      }
    }
    self.latest.as_ref()
  }
}

fn convert_sample_to_rgba(sample: gst::Sample) -> Result<RgbaImage, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  if video_info.format() != gst_video::VideoFormat::Rgba {
    return Err(GStreamerInputError::UnsupportedFormat);
  }

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;
  let row = width * 4;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();
  if stride < row || data.len() < stride * height.saturating_sub(1) + row {
    return Err(GStreamerInputError::PipelineError(format!(
      "Buffer size mismatch: stride {}, {} bytes for {}x{}",
      stride,
      data.len(),
      width,
      height
    )));
  }

  // 去掉行尾对齐填充
  let mut pixels = Vec::with_capacity(row * height);
  for y in 0..height {
    let start = y * stride;
    pixels.extend_from_slice(&data[start..start + row]);
  }

  RgbaImage::from_raw(width as u32, height as u32, pixels).ok_or_else(|| {
    GStreamerInputError::PipelineError("Failed to build RGBA image".to_string())
  })
}
