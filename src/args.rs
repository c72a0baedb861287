// 该文件是 Fenjian （分拣） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

use fenjian::{frame::Channels, input::FitMode};

/// Fenjian 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 分类器模型
  /// - 内置: builtin://luma-sigmoid?weight=6&bias=-3&threshold=0.5
  /// - 参数文件: linear:///path/to/params.json
  #[arg(long, value_name = "MODEL", default_value = "builtin://luma-sigmoid")]
  pub model: Url,

  /// 视频来源
  /// - 图片: image:///path/to/frame.png
  /// - 测试图案: pattern://solid?r=255&g=255&b=255
  /// - 摄像头: gst://camera/dev/video0?width=1280&height=720
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 结果输出（stdout://?bar=20 或 log://）
  #[arg(long, value_name = "OUTPUT", default_value = "stdout://")]
  pub output: Url,

  /// 模型输入通道数（1 或 3）
  #[arg(long, value_enum, default_value_t = Channels::Rgb)]
  pub channels: Channels,

  /// 扫描周期（毫秒）
  #[arg(long, default_value_t = 500, value_parser = clap::value_parser!(u64).range(1..))]
  pub period_ms: u64,

  /// 缩放方式
  #[arg(long, value_enum, default_value_t = FitMode::Stretch)]
  pub fit: FitMode,

  /// 启动后立即开始扫描
  #[arg(long)]
  pub autostart: bool,

  /// 完成指定次数的 tick 后退出
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}
