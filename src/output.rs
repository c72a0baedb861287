// 该文件是 Fenjian （分拣） 项目的一部分。
// src/output.rs - 结果展示
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
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::ClassificationResult, preprocess::Brightness};

/// 一次完成的 tick 交给展示层的记录
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
  /// 第几次完成的 tick，从 1 开始
  pub index: u64,
  pub brightness: Brightness,
  /// 降级模式下为 `None`
  pub classification: Option<ClassificationResult>,
  /// 模型输入缓冲区字节数
  pub buffer_len: usize,
}

/// 可直接显示的文本形式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
  pub label: Option<&'static str>,
  /// 两位小数
  pub score: Option<String>,
  /// 一位小数
  pub brightness: String,
  /// 亮度条比例，`[0, 100]`
  pub indicator_percent: u8,
}

impl From<&TickReport> for Presentation {
  fn from(report: &TickReport) -> Self {
    Self {
      label: report.classification.map(|c| c.label.as_str()),
      score: report.classification.map(|c| format!("{:.2}", c.score)),
      brightness: report.brightness.to_string(),
      indicator_percent: report.brightness.indicator_percent(),
    }
  }
}

impl Presentation {
  pub fn result_line(&self) -> Option<String> {
    match (&self.label, &self.score) {
      (Some(label), Some(score)) => Some(format!("Result: {} (score={})", label, score)),
      _ => None,
    }
  }

  pub fn brightness_line(&self) -> String {
    format!("Avg Brightness: {}", self.brightness)
  }

  /// 宽度为 `width` 个字符的亮度条
  pub fn bar(&self, width: usize) -> String {
    let filled = width
      .saturating_mul(self.indicator_percent as usize)
      .saturating_add(50)
      / 100;
    let filled = filled.min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
  }
}

/// 会话级状态提示，每种只报告一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
  LoadingClassifier,
  ClassifierReady,
  ClassifierDegraded { reason: String },
  CameraBlocked { reason: String },
  ScanningStarted,
  ScanningStopped { forced: bool },
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Status::LoadingClassifier => f.write_str("Result: loading classifier..."),
      Status::ClassifierReady => f.write_str("Result: classifier ready"),
      Status::ClassifierDegraded { reason } => write!(
        f,
        "Result: classifier unavailable, brightness only ({})",
        reason
      ),
      Status::CameraBlocked { reason } => write!(f, "Result: Camera blocked: {}", reason),
      Status::ScanningStarted => f.write_str("Scanning started"),
      Status::ScanningStopped { forced: false } => f.write_str("Scanning stopped"),
      Status::ScanningStopped { forced: true } => f.write_str("Scanning paused: view hidden"),
    }
  }
}

/// 结果展示层
pub trait Present {
  type Error;

  fn present(&mut self, report: &TickReport) -> Result<(), Self::Error>;

  fn status(&mut self, status: &Status) -> Result<(), Self::Error>;
}

mod log_output;
mod terminal;

pub use self::log_output::LogOutput;
pub use self::terminal::{MAX_BAR_WIDTH, TerminalOutput};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("参数无效: {name}={value}")]
  InvalidParameter { name: String, value: String },
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  Terminal(TerminalOutput<std::io::Stdout>),
  Log(LogOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      TerminalOutput::<std::io::Stdout>::SCHEME => {
        let output = TerminalOutput::from_url(url)?;
        Ok(OutputWrapper::Terminal(output))
      }
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Present for OutputWrapper {
  type Error = OutputError;

  fn present(&mut self, report: &TickReport) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Terminal(output) => output.present(report).map_err(OutputError::from),
      OutputWrapper::Log(output) => output.present(report).map_err(OutputError::from),
    }
  }

  fn status(&mut self, status: &Status) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Terminal(output) => output.status(status).map_err(OutputError::from),
      OutputWrapper::Log(output) => output.status(status).map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn report(classification: Option<ClassificationResult>, brightness: f64) -> TickReport {
    TickReport {
      index: 1,
      brightness: Brightness::new(brightness),
      classification,
      buffer_len: 96 * 96 * 3,
    }
  }

  #[test]
  fn classified_tick_shows_label_and_rounded_score() {
    let p = Presentation::from(&report(Some(ClassificationResult::new(1, 0.87654)), 201.34));
    assert_eq!(p.result_line().as_deref(), Some("Result: Plastic (score=0.88)"));
    assert_eq!(p.brightness_line(), "Avg Brightness: 201.3");
    assert_eq!(p.indicator_percent, 79);
  }

  #[test]
  fn invalid_label_text_ignores_score() {
    let p = Presentation::from(&report(Some(ClassificationResult::new(2, 0.99)), 10.0));
    assert_eq!(p.label, Some("Invalid"));
  }

  #[test]
  fn degraded_tick_has_brightness_only() {
    let p = Presentation::from(&report(None, 0.0));
    assert_eq!(p.result_line(), None);
    assert_eq!(p.brightness_line(), "Avg Brightness: 0.0");
    assert_eq!(p.bar(10), "[----------]");
  }

  #[test]
  fn bar_follows_indicator() {
    let p = Presentation::from(&report(None, 255.0));
    assert_eq!(p.bar(4), "[####]");
    let p = Presentation::from(&report(None, 127.5));
    assert_eq!(p.bar(10), "[#####-----]");
  }

  #[test]
  fn statuses_are_distinct() {
    let blocked = Status::CameraBlocked {
      reason: "permission denied".to_string(),
    };
    let degraded = Status::ClassifierDegraded {
      reason: "missing".to_string(),
    };
    assert_eq!(blocked.to_string(), "Result: Camera blocked: permission denied");
    assert_ne!(blocked.to_string(), degraded.to_string());
  }

  #[test]
  fn output_urls() {
    assert!(matches!(
      OutputWrapper::from_url(&Url::parse("log://").unwrap()),
      Ok(OutputWrapper::Log(_))
    ));
    assert!(matches!(
      OutputWrapper::from_url(&Url::parse("stdout://?bar=30").unwrap()),
      Ok(OutputWrapper::Terminal(_))
    ));
    assert!(matches!(
      OutputWrapper::from_url(&Url::parse("file:///tmp/out").unwrap()),
      Err(OutputError::SchemeMismatch(_))
    ));
  }
}
