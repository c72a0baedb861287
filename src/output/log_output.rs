// 该文件是 Fenjian （分拣） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{OutputError, Present, Presentation, Status, TickReport},
};

/// 以结构化日志事件输出结果
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(LogOutput)
  }
}

impl Present for LogOutput {
  type Error = OutputError;

  fn present(&mut self, report: &TickReport) -> Result<(), Self::Error> {
    let presentation = Presentation::from(report);
    info!(
      tick = report.index,
      label = presentation.label.unwrap_or("-"),
      score = presentation.score.as_deref().unwrap_or("-"),
      brightness = %presentation.brightness,
      indicator = presentation.indicator_percent,
      buffer = report.buffer_len,
      "扫描结果"
    );
    Ok(())
  }

  fn status(&mut self, status: &Status) -> Result<(), Self::Error> {
    match status {
      Status::ClassifierDegraded { .. } | Status::CameraBlocked { .. } => warn!("{}", status),
      _ => info!("{}", status),
    }
    Ok(())
  }
}
