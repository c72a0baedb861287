// 该文件是 Fenjian （分拣） 项目的一部分。
// src/output/terminal.rs - 终端输出
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

use std::io::Write;

use tracing::error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{OutputError, Present, Presentation, Status, TickReport},
};

const DEFAULT_BAR_WIDTH: usize = 20;
/// 亮度条最大宽度（字符）
pub const MAX_BAR_WIDTH: usize = 200;

/// 每个 tick 输出一行：结果、平均亮度与亮度条
pub struct TerminalOutput<W> {
  writer: W,
  bar_width: usize,
}

impl<W: Write> TerminalOutput<W> {
  pub fn new(writer: W) -> Self {
    Self {
      writer,
      bar_width: DEFAULT_BAR_WIDTH,
    }
  }

  /// 设置亮度条宽度，截断到 `[1, MAX_BAR_WIDTH]`
  pub fn with_bar_width(mut self, bar_width: usize) -> Self {
    self.bar_width = bar_width.clamp(1, MAX_BAR_WIDTH);
    self
  }

  pub fn into_inner(self) -> W {
    self.writer
  }
}

impl FromUrlWithScheme for TerminalOutput<std::io::Stdout> {
  const SCHEME: &'static str = "stdout";
}

impl FromUrl for TerminalOutput<std::io::Stdout> {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }

    let mut output = TerminalOutput::new(std::io::stdout());
    for (key, value) in url.query_pairs() {
      if key == "bar" {
        let width = value
          .parse::<usize>()
          .ok()
          .filter(|w| (1..=MAX_BAR_WIDTH).contains(w))
          .ok_or_else(|| OutputError::InvalidParameter {
            name: key.to_string(),
            value: value.to_string(),
          })?;
        output = output.with_bar_width(width);
      }
    }
    Ok(output)
  }
}

impl<W: Write> Present for TerminalOutput<W> {
  type Error = std::io::Error;

  fn present(&mut self, report: &TickReport) -> Result<(), Self::Error> {
    let presentation = Presentation::from(report);
    let result = presentation
      .result_line()
      .unwrap_or_else(|| "Result: --".to_string());
    writeln!(
      self.writer,
      "{} | {} {} {:>3}%",
      result,
      presentation.brightness_line(),
      presentation.bar(self.bar_width),
      presentation.indicator_percent
    )?;
    self.writer.flush()
  }

  fn status(&mut self, status: &Status) -> Result<(), Self::Error> {
    writeln!(self.writer, "{}", status)?;
    self.writer.flush()
  }
}
