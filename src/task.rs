// 该文件是 Fenjian （分拣） 项目的一部分。
// src/task.rs - 扫描控制器
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

use std::{fmt, future::Future, str::FromStr, time::Duration};

use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, trace, warn};

use crate::{
  frame::InputShape,
  gateway::{InferenceGateway, Readiness},
  input::{FitMode, FrameSampler, VideoSource},
  model::ClassifierModule,
  output::{Present, Status, TickReport},
  preprocess::preprocess,
};

mod session;
mod timer;

pub use self::session::{Phase, ScanSession, SessionError};
pub use self::timer::{SCAN_PERIOD, TickTimer};

/// 视图可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
  Visible,
  Hidden,
}

/// 控制事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
  Start,
  Stop,
  Toggle,
  Visibility(Visibility),
  Shutdown,
}

impl FromStr for ControlEvent {
  type Err = String;

  /// 解析命令行输入的控制命令
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "start" => Ok(ControlEvent::Start),
      "stop" => Ok(ControlEvent::Stop),
      "toggle" | "t" => Ok(ControlEvent::Toggle),
      "hide" => Ok(ControlEvent::Visibility(Visibility::Hidden)),
      "show" => Ok(ControlEvent::Visibility(Visibility::Visible)),
      "quit" | "exit" | "q" => Ok(ControlEvent::Shutdown),
      other => Err(other.to_string()),
    }
  }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
  pub shape: InputShape,
  pub period: Duration,
  pub fit: FitMode,
  /// 完成指定次数的 tick 后退出
  pub max_ticks: Option<usize>,
}

impl Default for ScanConfig {
  fn default() -> Self {
    Self {
      shape: InputShape::default(),
      period: SCAN_PERIOD,
      fit: FitMode::default(),
      max_ticks: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
  /// 未在扫描
  Skipped,
  /// 视频源尚无可用帧
  NotReady,
  Completed(TickReport),
}

#[derive(Error, Debug)]
pub enum ScanError {
  #[error("摄像头不可用: {0}")]
  CameraBlocked(String),
  #[error("会话状态错误: {0}")]
  Session(#[from] SessionError),
}

/// 扫描控制器，会话状态只在这里被修改
pub struct ScanController<S, M, P> {
  config: ScanConfig,
  session: ScanSession,
  sampler: Option<FrameSampler<S>>,
  gateway: InferenceGateway<M>,
  presenter: P,
  visibility: Visibility,
  completed: u64,
}

impl<S, M, P> ScanController<S, M, P>
where
  S: VideoSource,
  M: ClassifierModule,
  P: Present,
  P::Error: fmt::Display,
{
  pub fn new(config: ScanConfig, presenter: P) -> Self {
    Self {
      gateway: InferenceGateway::new(config.shape),
      config,
      session: ScanSession::new(),
      sampler: None,
      presenter,
      visibility: Visibility::Visible,
      completed: 0,
    }
  }

  pub fn session(&self) -> &ScanSession {
    &self.session
  }

  pub fn gateway(&self) -> &InferenceGateway<M> {
    &self.gateway
  }

  pub fn presenter(&self) -> &P {
    &self.presenter
  }

  pub fn completed_ticks(&self) -> u64 {
    self.completed
  }

  pub fn visibility(&self) -> Visibility {
    self.visibility
  }

  fn report(&mut self, status: Status) {
    debug!("状态: {:?}", status);
    if let Err(e) = self.presenter.status(&status) {
      warn!("状态输出失败: {}", e);
    }
  }

  /// 并发加载分类器与获取视频源。
  ///
  /// 分类器加载失败只会进入降级模式；视频源获取失败则整个会话无法继续。
  pub async fn start_up<L, LE, A, AE>(
    &mut self,
    load: L,
    acquire: A,
  ) -> Result<Readiness, ScanError>
  where
    L: Future<Output = Result<M, LE>>,
    LE: fmt::Display,
    A: Future<Output = Result<S, AE>>,
    AE: fmt::Display,
  {
    self.session.begin_loading()?;
    self.report(Status::LoadingClassifier);

    let (readiness, source) = tokio::join!(self.gateway.initialize(load), acquire);
    self.session.finish_loading(readiness)?;
    // 之后 tick 只看会话状态，网关不会再改变
    debug_assert_eq!(self.session.readiness(), self.gateway.readiness());

    let status = match readiness {
      Readiness::Ready => Status::ClassifierReady,
      _ => Status::ClassifierDegraded {
        reason: self.gateway.failure().unwrap_or("unknown").to_string(),
      },
    };
    self.report(status);

    match source {
      Ok(source) => {
        self.sampler = Some(FrameSampler::new(source, self.config.shape, self.config.fit));
        info!("启动完成: {}", self.session.phase());
        Ok(readiness)
      }
      Err(e) => {
        error!("无法获取视频源: {}", e);
        let reason = e.to_string();
        self.report(Status::CameraBlocked {
          reason: reason.clone(),
        });
        Err(ScanError::CameraBlocked(reason))
      }
    }
  }

  /// 处理控制事件，返回 `false` 表示应当退出
  pub fn handle(&mut self, event: ControlEvent) -> bool {
    debug!("控制事件: {:?}", event);
    match event {
      ControlEvent::Start => self.start(),
      ControlEvent::Stop => self.stop(),
      ControlEvent::Toggle => {
        if self.session.is_scanning() {
          self.stop();
        } else {
          self.start();
        }
      }
      ControlEvent::Visibility(Visibility::Hidden) => self.hide(),
      ControlEvent::Visibility(Visibility::Visible) => {
        self.visibility = Visibility::Visible;
        debug!("视图可见, 等待用户重新开始扫描");
      }
      ControlEvent::Shutdown => return false,
    }
    true
  }

  fn start(&mut self) {
    if self.visibility == Visibility::Hidden {
      warn!("视图已隐藏, 忽略开始扫描");
      return;
    }
    if self.sampler.is_none() {
      warn!("没有可用的视频源, 忽略开始扫描");
      return;
    }
    match self.session.start_scanning(self.config.period) {
      Ok(true) => self.report(Status::ScanningStarted),
      Ok(false) => debug!("已在扫描中"),
      Err(e) => warn!("忽略开始扫描: {}", e),
    }
  }

  fn stop(&mut self) {
    if self.session.stop_scanning() {
      self.report(Status::ScanningStopped { forced: false });
    }
  }

  fn hide(&mut self) {
    self.visibility = Visibility::Hidden;
    if self.session.stop_scanning() {
      self.report(Status::ScanningStopped { forced: true });
    }
  }

  /// 执行一次 tick：采样、预处理、（就绪时）分类、展示
  pub fn tick(&mut self) -> TickOutcome {
    if !self.session.is_scanning() {
      return TickOutcome::Skipped;
    }
    let Some(sampler) = self.sampler.as_mut() else {
      return TickOutcome::Skipped;
    };
    let Some(frame) = sampler.sample() else {
      trace!("视频源未就绪, 跳过本次 tick");
      return TickOutcome::NotReady;
    };

    let (buffer, brightness) = preprocess(&frame, self.config.shape.channels);
    let classification = match self.session.readiness() {
      Readiness::Ready => match self.gateway.classify(&buffer) {
        Ok(result) => Some(result),
        Err(e) => {
          warn!("分类失败: {}", e);
          None
        }
      },
      _ => None,
    };

    self.completed += 1;
    let report = TickReport {
      index: self.completed,
      brightness,
      classification,
      buffer_len: buffer.len(),
    };
    if let Err(e) = self.presenter.present(&report) {
      warn!("结果输出失败: {}", e);
    }
    TickOutcome::Completed(report)
  }

  fn limit_reached(&self) -> bool {
    self
      .config
      .max_ticks
      .map(|n| self.completed >= n as u64)
      .unwrap_or(false)
  }

  /// 事件循环，返回已完成的 tick 数
  pub async fn run(&mut self, mut events: UnboundedReceiver<ControlEvent>) -> u64 {
    info!("开始任务...");
    loop {
      tokio::select! {
        biased;
        event = events.recv() => match event {
          Some(event) => {
            if !self.handle(event) {
              info!("收到退出事件，退出任务循环");
              break;
            }
          }
          None => {
            warn!("控制通道已关闭，退出任务循环");
            break;
          }
        },
        _ = self.session.next_tick() => {
          if let TickOutcome::Completed(_) = self.tick() {
            if self.limit_reached() {
              info!("达到指定帧数 {}, 退出任务循环", self.completed);
              break;
            }
          }
        }
      }
    }
    self.stop();
    self.completed
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Label, LogisticLumaModule, LogisticParams, ModelError};
  use image::{Rgba, RgbaImage};
  use std::convert::Infallible;

  struct StubSource {
    image: RgbaImage,
    pending: usize,
  }

  impl VideoSource for StubSource {
    fn current_frame(&mut self) -> Option<&RgbaImage> {
      if self.pending > 0 {
        self.pending -= 1;
        return None;
      }
      Some(&self.image)
    }
  }

  fn gray(level: u8, pending: usize) -> StubSource {
    StubSource {
      image: RgbaImage::from_pixel(32, 24, Rgba([level, level, level, 255])),
      pending,
    }
  }

  #[derive(Default)]
  struct Recorder {
    reports: Vec<TickReport>,
    statuses: Vec<Status>,
  }

  impl Present for Recorder {
    type Error = Infallible;

    fn present(&mut self, report: &TickReport) -> Result<(), Self::Error> {
      self.reports.push(report.clone());
      Ok(())
    }

    fn status(&mut self, status: &Status) -> Result<(), Self::Error> {
      self.statuses.push(status.clone());
      Ok(())
    }
  }

  type Controller = ScanController<StubSource, LogisticLumaModule, Recorder>;

  async fn controller(source: StubSource, loads: bool) -> Controller {
    let mut controller = Controller::new(ScanConfig::default(), Recorder::default());
    let load = async move {
      if loads {
        Ok(LogisticLumaModule::new(LogisticParams::default()))
      } else {
        Err(ModelError::UnknownBuiltin("missing".to_string()))
      }
    };
    controller
      .start_up(load, async move { Ok::<_, Infallible>(source) })
      .await
      .unwrap();
    controller
  }

  #[test]
  fn parses_commands() {
    assert_eq!("start".parse::<ControlEvent>(), Ok(ControlEvent::Start));
    assert_eq!(
      " Hide\n".parse::<ControlEvent>(),
      Ok(ControlEvent::Visibility(Visibility::Hidden))
    );
    assert_eq!("q".parse::<ControlEvent>(), Ok(ControlEvent::Shutdown));
    assert_eq!("pause".parse::<ControlEvent>(), Err("pause".to_string()));
  }

  #[tokio::test]
  async fn start_up_reports_ready_once() {
    let controller = controller(gray(200, 0), true).await;
    assert_eq!(controller.session().phase(), Phase::Ready);
    assert_eq!(
      controller.presenter().statuses,
      vec![Status::LoadingClassifier, Status::ClassifierReady]
    );
  }

  #[tokio::test]
  async fn camera_failure_is_terminal() {
    let mut controller = Controller::new(ScanConfig::default(), Recorder::default());
    let result = controller
      .start_up(
        async { Ok::<_, Infallible>(LogisticLumaModule::new(LogisticParams::default())) },
        async { Err::<StubSource, _>("permission denied") },
      )
      .await;
    assert!(matches!(result, Err(ScanError::CameraBlocked(_))));
    assert_eq!(
      controller.presenter().statuses.last(),
      Some(&Status::CameraBlocked {
        reason: "permission denied".to_string()
      })
    );

    // 无视频源时开始扫描被忽略
    controller.handle(ControlEvent::Start);
    assert!(!controller.session().is_scanning());
  }

  #[tokio::test]
  async fn tick_outside_scanning_is_skipped() {
    let mut controller = controller(gray(200, 0), true).await;
    assert_eq!(controller.tick(), TickOutcome::Skipped);
    assert!(controller.presenter().reports.is_empty());
  }

  #[tokio::test]
  async fn not_ready_frame_is_silent() {
    let mut controller = controller(gray(200, 1), true).await;
    controller.handle(ControlEvent::Start);
    assert_eq!(controller.tick(), TickOutcome::NotReady);
    assert!(controller.presenter().reports.is_empty());
    assert!(controller.session().is_scanning());

    assert!(matches!(controller.tick(), TickOutcome::Completed(_)));
    assert_eq!(controller.completed_ticks(), 1);
  }

  #[tokio::test]
  async fn ready_tick_classifies() {
    let mut controller = controller(gray(230, 0), true).await;
    controller.handle(ControlEvent::Start);
    let TickOutcome::Completed(report) = controller.tick() else {
      panic!("tick should complete");
    };
    assert_eq!(report.index, 1);
    assert_eq!(report.buffer_len, 96 * 96 * 3);
    assert!((report.brightness.value() - 230.0).abs() < 1e-6);
    assert_eq!(report.classification.unwrap().label, Label::Plastic);
    assert_eq!(controller.gateway().module().unwrap().live_allocations(), 0);
  }

  #[tokio::test]
  async fn degraded_tick_reports_brightness_only() {
    let mut controller = controller(gray(40, 0), false).await;
    assert_eq!(controller.session().phase(), Phase::Degraded);
    assert_eq!(
      controller.presenter().statuses[1],
      Status::ClassifierDegraded {
        reason: "未知的内置模型: missing".to_string()
      }
    );

    controller.handle(ControlEvent::Start);
    for _ in 0..3 {
      let TickOutcome::Completed(report) = controller.tick() else {
        panic!("tick should complete");
      };
      assert!(report.classification.is_none());
      assert!((report.brightness.value() - 40.0).abs() < 1e-6);
    }
  }

  #[tokio::test]
  async fn hidden_wins_and_toggle_restarts() {
    let mut controller = controller(gray(10, 0), true).await;
    controller.handle(ControlEvent::Toggle);
    assert!(controller.session().is_scanning());

    controller.handle(ControlEvent::Visibility(Visibility::Hidden));
    assert_eq!(controller.session().phase(), Phase::Ready);
    assert!(!controller.session().has_timer());

    // 可见不会自动恢复
    controller.handle(ControlEvent::Visibility(Visibility::Visible));
    assert!(!controller.session().is_scanning());

    controller.handle(ControlEvent::Toggle);
    assert!(controller.session().is_scanning());
    assert_eq!(
      &controller.presenter().statuses[2..],
      &[
        Status::ScanningStarted,
        Status::ScanningStopped { forced: true },
        Status::ScanningStarted,
      ]
    );
    assert!(!controller.handle(ControlEvent::Shutdown));
  }

  #[tokio::test]
  async fn start_is_ignored_while_hidden() {
    let mut controller = controller(gray(120, 0), true).await;
    controller.handle(ControlEvent::Start);
    controller.handle(ControlEvent::Visibility(Visibility::Hidden));
    assert_eq!(controller.visibility(), Visibility::Hidden);

    controller.handle(ControlEvent::Start);
    controller.handle(ControlEvent::Toggle);
    assert!(!controller.session().is_scanning());
    assert!(!controller.session().has_timer());
    assert_eq!(controller.tick(), TickOutcome::Skipped);
    assert!(controller.presenter().reports.is_empty());

    controller.handle(ControlEvent::Visibility(Visibility::Visible));
    controller.handle(ControlEvent::Start);
    assert!(controller.session().is_scanning());
    assert!(matches!(controller.tick(), TickOutcome::Completed(_)));
  }

  #[tokio::test]
  async fn session_and_gateway_agree_on_readiness() {
    for loads in [true, false] {
      let mut controller = controller(gray(120, 0), loads).await;
      assert_eq!(
        controller.session().readiness(),
        controller.gateway().readiness()
      );
      controller.handle(ControlEvent::Start);
      assert_eq!(
        controller.session().readiness(),
        controller.gateway().readiness()
      );
    }
  }
}
