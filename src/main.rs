// 该文件是 Fenjian （分拣） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::{io::BufRead, thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

use fenjian::{
  FromUrl,
  frame::InputShape,
  input::{self, CaptureRequest, InputWrapper},
  model::{LogisticLumaBuilder, LogisticLumaModule},
  output::OutputWrapper,
  task::{ControlEvent, ScanConfig, ScanController},
};

/// 在独立线程中读取标准输入的控制命令
fn read_commands(tx: UnboundedSender<ControlEvent>) {
  let stdin = std::io::stdin();
  for line in stdin.lock().lines() {
    let line = match line {
      Ok(line) => line,
      Err(e) => {
        warn!("读取标准输入失败: {}", e);
        break;
      }
    };
    if line.trim().is_empty() {
      continue;
    }
    match line.parse::<ControlEvent>() {
      Ok(event) => {
        if tx.send(event).is_err() {
          break;
        }
      }
      Err(command) => warn!(
        "未知命令: {} (可用: start, stop, toggle, hide, show, quit)",
        command
      ),
    }
  }
  debug!("标准输入已关闭, 不再读取命令");
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出: {}", args.output);

  let config = ScanConfig {
    shape: InputShape::default().with_channels(args.channels),
    period: Duration::from_millis(args.period_ms),
    fit: args.fit,
    max_ticks: args.frame_number,
  };
  info!("模型输入形状: {}, 扫描周期: {:?}", config.shape, config.period);

  let output = OutputWrapper::from_url(&args.output)?;

  let (tx, rx) = mpsc::unbounded_channel();

  let ctrlc_tx = tx.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = ctrlc_tx.send(ControlEvent::Shutdown);
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  let stdin_tx = tx.clone();
  thread::spawn(move || read_commands(stdin_tx));

  if args.autostart {
    tx.send(ControlEvent::Start)?;
  }

  let model = args.model.clone();
  let load = async move { LogisticLumaBuilder::from_url(&model)?.load().await };
  let acquire = input::acquire(args.input.clone(), CaptureRequest::default());

  let mut controller: ScanController<InputWrapper, LogisticLumaModule, OutputWrapper> =
    ScanController::new(config, output);
  let readiness = controller.start_up(load, acquire).await?;
  info!("分类器状态: {}, 输入 start 开始扫描", readiness);

  let ticks = controller.run(rx).await;
  info!("任务结束, 共完成 {} 次扫描", ticks);

  Ok(())
}
