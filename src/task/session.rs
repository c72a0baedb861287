// 该文件是 Fenjian （分拣） 项目的一部分。
// src/task/session.rs - 扫描会话状态机
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

//! 会话状态：`Idle → Loading → {Ready, Degraded} ⇄ Scanning`。
//!
//! 定时器保存在 `Scanning` 变体内部，离开该状态即解除定时器，
//! 因此“定时器存在当且仅当正在扫描”由类型保证。

use std::{fmt, mem, time::Duration};

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{gateway::Readiness, task::timer::TickTimer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
  Idle,
  Loading,
  Ready,
  Degraded,
  Scanning,
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Phase::Idle => f.write_str("idle"),
      Phase::Loading => f.write_str("loading"),
      Phase::Ready => f.write_str("ready"),
      Phase::Degraded => f.write_str("degraded"),
      Phase::Scanning => f.write_str("scanning"),
    }
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
  #[error("非法的状态转换: {from} -> {to}")]
  InvalidTransition { from: Phase, to: Phase },
}

#[derive(Debug)]
enum ScanState {
  Idle,
  Loading,
  Ready,
  Degraded,
  Scanning {
    /// 停止扫描后回到的状态
    resume: Readiness,
    timer: TickTimer,
  },
}

#[derive(Debug)]
pub struct ScanSession {
  state: ScanState,
}

impl Default for ScanSession {
  fn default() -> Self {
    Self::new()
  }
}

impl ScanSession {
  pub fn new() -> Self {
    Self {
      state: ScanState::Idle,
    }
  }

  pub fn phase(&self) -> Phase {
    match self.state {
      ScanState::Idle => Phase::Idle,
      ScanState::Loading => Phase::Loading,
      ScanState::Ready => Phase::Ready,
      ScanState::Degraded => Phase::Degraded,
      ScanState::Scanning { .. } => Phase::Scanning,
    }
  }

  /// 分类器就绪状态；扫描中返回扫描前的状态
  pub fn readiness(&self) -> Readiness {
    match self.state {
      ScanState::Idle | ScanState::Loading => Readiness::Loading,
      ScanState::Ready => Readiness::Ready,
      ScanState::Degraded => Readiness::Degraded,
      ScanState::Scanning { resume, .. } => resume,
    }
  }

  pub fn is_scanning(&self) -> bool {
    matches!(self.state, ScanState::Scanning { .. })
  }

  pub fn has_timer(&self) -> bool {
    self.is_scanning()
  }

  /// 当前扫描周期
  pub fn period(&self) -> Option<Duration> {
    match &self.state {
      ScanState::Scanning { timer, .. } => Some(timer.period()),
      _ => None,
    }
  }

  fn invalid(&self, to: Phase) -> SessionError {
    SessionError::InvalidTransition {
      from: self.phase(),
      to,
    }
  }

  pub fn begin_loading(&mut self) -> Result<(), SessionError> {
    match self.state {
      ScanState::Idle => {
        self.state = ScanState::Loading;
        Ok(())
      }
      _ => Err(self.invalid(Phase::Loading)),
    }
  }

  pub fn finish_loading(&mut self, readiness: Readiness) -> Result<(), SessionError> {
    let next = match readiness {
      Readiness::Ready => ScanState::Ready,
      Readiness::Degraded => ScanState::Degraded,
      Readiness::Loading => return Err(self.invalid(Phase::Loading)),
    };
    match self.state {
      ScanState::Loading => {
        self.state = next;
        Ok(())
      }
      _ => Err(self.invalid(Phase::from(readiness))),
    }
  }

  /// 开始扫描并布置定时器。
  ///
  /// 已在扫描时返回 `Ok(false)`，不会布置第二个定时器。
  pub fn start_scanning(&mut self, period: Duration) -> Result<bool, SessionError> {
    let resume = match self.state {
      ScanState::Ready => Readiness::Ready,
      ScanState::Degraded => Readiness::Degraded,
      ScanState::Scanning { .. } => return Ok(false),
      ScanState::Idle | ScanState::Loading => return Err(self.invalid(Phase::Scanning)),
    };
    self.state = ScanState::Scanning {
      resume,
      timer: TickTimer::arm(period),
    };
    info!("开始扫描 ({})", resume);
    Ok(true)
  }

  /// 停止扫描并解除定时器；未在扫描时为空操作，返回 `false`
  pub fn stop_scanning(&mut self) -> bool {
    if !self.is_scanning() {
      return false;
    }
    match mem::replace(&mut self.state, ScanState::Idle) {
      ScanState::Scanning { resume, timer } => {
        timer.disarm();
        self.state = match resume {
          Readiness::Degraded => ScanState::Degraded,
          _ => ScanState::Ready,
        };
        info!("停止扫描, 回到 {}", self.phase());
        true
      }
      other => {
        self.state = other;
        false
      }
    }
  }

  /// 等待下一次触发；未在扫描时永不完成
  pub async fn next_tick(&mut self) -> Instant {
    match &mut self.state {
      ScanState::Scanning { timer, .. } => {
        let at = timer.tick().await;
        debug!("定时器触发");
        at
      }
      _ => std::future::pending().await,
    }
  }
}

impl From<Readiness> for Phase {
  fn from(readiness: Readiness) -> Self {
    match readiness {
      Readiness::Loading => Phase::Loading,
      Readiness::Ready => Phase::Ready,
      Readiness::Degraded => Phase::Degraded,
    }
  }
}
