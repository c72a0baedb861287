// 该文件是 Fenjian （分拣） 项目的一部分。
// tests/scan_session.rs - 扫描会话集成测试
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

#![cfg(feature = "test_pattern_input")]

use std::{convert::Infallible, time::Duration};

use tokio::{
  sync::mpsc,
  time::{self, Instant},
};
use url::Url;

use fenjian::{
  FromUrl,
  frame::{Channels, InputShape},
  gateway::Readiness,
  input::{self, CaptureRequest, InputWrapper, TestPatternInput},
  model::{Label, LogisticLumaBuilder, LogisticLumaModule},
  output::{Present, Status, TickReport},
  task::{ControlEvent, Phase, ScanConfig, ScanController, ScanError, Visibility},
};

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

type Controller = ScanController<TestPatternInput, LogisticLumaModule, Recorder>;

async fn start(model: &str, pattern: &str, max_ticks: Option<usize>) -> Controller {
  let config = ScanConfig {
    max_ticks,
    ..ScanConfig::default()
  };
  let mut controller = Controller::new(config, Recorder::default());
  let model = Url::parse(model).unwrap();
  let pattern = Url::parse(pattern).unwrap();
  controller
    .start_up(
      async move { LogisticLumaBuilder::from_url(&model)?.load().await },
      async move { TestPatternInput::open(&pattern, &CaptureRequest::default()) },
    )
    .await
    .unwrap();
  controller
}

fn started_count(statuses: &[Status]) -> usize {
  statuses
    .iter()
    .filter(|s| **s == Status::ScanningStarted)
    .count()
}

#[tokio::test(start_paused = true)]
async fn white_frames_are_plastic_every_period() {
  let mut controller = start(
    "builtin://luma-sigmoid",
    "pattern://solid?r=255&g=255&b=255&width=64&height=48",
    Some(3),
  )
  .await;
  let (tx, rx) = mpsc::unbounded_channel();
  tx.send(ControlEvent::Start).unwrap();

  let begin = Instant::now();
  let ticks = controller.run(rx).await;

  assert_eq!(ticks, 3);
  assert_eq!(begin.elapsed(), Duration::from_millis(1500));
  let reports = &controller.presenter().reports;
  assert_eq!(
    reports.iter().map(|r| r.index).collect::<Vec<_>>(),
    vec![1, 2, 3]
  );
  for report in reports {
    let result = report.classification.unwrap();
    assert_eq!(result.label, Label::Plastic);
    assert!(result.score > 0.9 && result.score <= 1.0);
    assert_eq!(report.brightness.indicator_percent(), 100);
  }
  // 达到帧数后定时器被解除
  assert_eq!(controller.session().phase(), Phase::Ready);
  assert!(!controller.session().has_timer());
  assert_eq!(controller.gateway().module().unwrap().live_allocations(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_parameter_file_degrades_to_brightness_only() {
  let mut controller = start(
    "linear:///definitely/not/here.json",
    "pattern://solid?r=0&g=0&b=0&width=8&height=8",
    Some(2),
  )
  .await;
  assert_eq!(controller.gateway().readiness(), Readiness::Degraded);

  let (tx, rx) = mpsc::unbounded_channel();
  tx.send(ControlEvent::Start).unwrap();
  assert_eq!(controller.run(rx).await, 2);

  let recorder = controller.presenter();
  assert!(recorder.reports.iter().all(|r| r.classification.is_none()));
  assert!(recorder.reports.iter().all(|r| r.brightness.value() == 0.0));
  let degraded = recorder
    .statuses
    .iter()
    .filter(|s| matches!(s, Status::ClassifierDegraded { .. }))
    .count();
  assert_eq!(degraded, 1);
  assert_eq!(controller.session().phase(), Phase::Degraded);
}

#[tokio::test(start_paused = true)]
async fn hiding_cancels_pending_ticks() {
  let mut controller = start(
    "builtin://luma-sigmoid",
    "pattern://gradient?width=32&height=32",
    None,
  )
  .await;
  let (tx, rx) = mpsc::unbounded_channel();
  tx.send(ControlEvent::Start).unwrap();

  let events = tx.clone();
  tokio::spawn(async move {
    time::sleep(Duration::from_millis(1250)).await;
    events
      .send(ControlEvent::Visibility(Visibility::Hidden))
      .unwrap();
    time::sleep(Duration::from_millis(1750)).await;
    events.send(ControlEvent::Shutdown).unwrap();
  });

  let ticks = controller.run(rx).await;

  // 500ms 与 1000ms 两次，隐藏之后不再触发
  assert_eq!(ticks, 2);
  assert_eq!(controller.session().phase(), Phase::Ready);
  assert!(!controller.session().has_timer());
  assert_eq!(
    controller.presenter().statuses.last(),
    Some(&Status::ScanningStopped { forced: true })
  );
}

#[tokio::test(start_paused = true)]
async fn repeated_start_keeps_a_single_timer() {
  let mut controller = start(
    "builtin://luma-sigmoid",
    "pattern://checker?size=4&width=16&height=16",
    Some(4),
  )
  .await;
  let (tx, rx) = mpsc::unbounded_channel();
  for _ in 0..3 {
    tx.send(ControlEvent::Start).unwrap();
  }

  let begin = Instant::now();
  assert_eq!(controller.run(rx).await, 4);
  assert_eq!(begin.elapsed(), Duration::from_millis(2000));
  assert_eq!(started_count(&controller.presenter().statuses), 1);
}

#[tokio::test(start_paused = true)]
async fn warming_source_skips_silently() {
  let mut controller = start(
    "builtin://luma-sigmoid",
    "pattern://solid?warmup=2&width=8&height=8",
    Some(1),
  )
  .await;
  let (tx, rx) = mpsc::unbounded_channel();
  tx.send(ControlEvent::Start).unwrap();

  let begin = Instant::now();
  assert_eq!(controller.run(rx).await, 1);
  assert_eq!(begin.elapsed(), Duration::from_millis(1500));
  assert_eq!(controller.presenter().reports.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn parameter_file_overrides_builtin_weights() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("inverted.json");
  std::fs::write(&path, r#"{ "weight": -6.0, "bias": 3.0 }"#).unwrap();
  let model = format!("linear://{}", path.display());

  let mut controller = start(
    &model,
    "pattern://solid?r=255&g=255&b=255&width=8&height=8",
    Some(1),
  )
  .await;
  let (tx, rx) = mpsc::unbounded_channel();
  tx.send(ControlEvent::Start).unwrap();
  controller.run(rx).await;

  let result = controller.presenter().reports[0].classification.unwrap();
  assert_eq!(result.label, Label::Paper);
}

#[tokio::test]
async fn unknown_camera_blocks_the_session() {
  let mut controller: ScanController<InputWrapper, LogisticLumaModule, Recorder> =
    ScanController::new(ScanConfig::default(), Recorder::default());
  let camera = Url::parse("rtsp://camera.local/stream").unwrap();
  let result = controller
    .start_up(
      LogisticLumaBuilder::builtin().load(),
      input::acquire(camera, CaptureRequest::default()),
    )
    .await;

  assert!(matches!(result, Err(ScanError::CameraBlocked(_))));
  let recorder = controller.presenter();
  let blocked = recorder
    .statuses
    .iter()
    .filter(|s| matches!(s, Status::CameraBlocked { .. }))
    .count();
  assert_eq!(blocked, 1);

  // 没有视频源，开始扫描被忽略
  let (tx, rx) = mpsc::unbounded_channel();
  tx.send(ControlEvent::Start).unwrap();
  tx.send(ControlEvent::Shutdown).unwrap();
  assert_eq!(controller.run(rx).await, 0);
  assert_eq!(started_count(&controller.presenter().statuses), 0);
}

#[tokio::test(start_paused = true)]
async fn luma_session_classifies_single_channel_buffers() {
  let config = ScanConfig {
    shape: InputShape::default().with_channels(Channels::Luma),
    max_ticks: Some(2),
    ..ScanConfig::default()
  };
  let mut controller = Controller::new(config, Recorder::default());
  let pattern = Url::parse("pattern://solid?r=250&g=250&b=250&width=40&height=30").unwrap();
  controller
    .start_up(
      LogisticLumaBuilder::builtin().load(),
      async move { TestPatternInput::open(&pattern, &CaptureRequest::default()) },
    )
    .await
    .unwrap();
  assert_eq!(controller.gateway().shape().channels, Channels::Luma);

  let (tx, rx) = mpsc::unbounded_channel();
  tx.send(ControlEvent::Start).unwrap();
  assert_eq!(controller.run(rx).await, 2);

  for report in &controller.presenter().reports {
    assert_eq!(report.buffer_len, 96 * 96);
    let result = report.classification.unwrap();
    assert_eq!(result.label, Label::Plastic);
    assert_eq!(result.raw_label, 1);
  }
  assert_eq!(controller.gateway().module().unwrap().live_allocations(), 0);
}
