// 该文件是 Fenjian （分拣） 项目的一部分。
// src/bin/simple_oneshot.rs - 单帧分类
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

use anyhow::{Result, anyhow};
use clap::Parser;
use url::Url;

use fenjian::{
  FromUrl,
  frame::InputShape,
  gateway::InferenceGateway,
  input::{CaptureRequest, FitMode, FrameSampler, InputWrapper},
  model::LogisticLumaBuilder,
  output::{Present, TerminalOutput, TickReport},
  preprocess::preprocess,
};
use tracing::info;

/// Fenjian 单帧分类
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 分类器模型
  #[arg(long, value_name = "MODEL", default_value = "builtin://luma-sigmoid")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 缩放方式
  #[arg(long, value_enum, default_value_t = FitMode::Stretch)]
  pub fit: FitMode,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);

  let shape = InputShape::default();
  let source = InputWrapper::open(&args.input, &CaptureRequest::default())?;
  let mut sampler = FrameSampler::new(source, shape, args.fit);

  let mut gateway = InferenceGateway::new(shape);
  let model = args.model.clone();
  gateway
    .initialize(async move { LogisticLumaBuilder::from_url(&model)?.load().await })
    .await;

  let frame = sampler
    .sample()
    .ok_or_else(|| anyhow!("视频源尚未就绪"))?;

  info!("开始推理...");
  let now = std::time::Instant::now();
  let (buffer, brightness) = preprocess(&frame, shape.channels);
  let classification = match gateway.failure() {
    Some(reason) => {
      info!("分类器不可用, 仅输出亮度: {}", reason);
      None
    }
    None => Some(gateway.classify(&buffer)?),
  };
  info!("推理完成，耗时: {:.2?}", now.elapsed());

  let report = TickReport {
    index: 1,
    brightness,
    classification,
    buffer_len: buffer.len(),
  };
  TerminalOutput::new(std::io::stdout()).present(&report)?;

  Ok(())
}
