// 该文件是 Fenjian （分拣） 项目的一部分。
// src/task/timer.rs - 扫描周期定时器
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

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// 默认扫描周期
pub const SCAN_PERIOD: Duration = Duration::from_millis(500);

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// 已布置的周期定时器。
///
/// 持有该值即表示定时器处于活动状态；首次触发在布置后一个周期，
/// 错过的触发会被合并，不会补发。
#[derive(Debug)]
pub struct TickTimer {
  interval: Interval,
}

impl TickTimer {
  pub fn arm(period: Duration) -> Self {
    let period = period.max(MIN_PERIOD);
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!("定时器已布置, 周期 {:?}", period);
    Self { interval }
  }

  pub fn period(&self) -> Duration {
    self.interval.period()
  }

  pub async fn tick(&mut self) -> Instant {
    self.interval.tick().await
  }

  /// 解除定时器，之后不会再有新的触发
  pub fn disarm(self) {
    debug!("定时器已解除");
  }
}
