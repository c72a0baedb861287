// 该文件是 Fenjian （分拣） 项目的一部分。
// src/gateway.rs - 推理网关
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

//! # 推理网关
//!
//! 持有分类器模块的整个生命周期：
//!
//! - 启动时异步加载一次，成功后设置输入形状并进入 `Ready`
//! - 加载失败进入 `Degraded`，本会话内不再重试
//! - 每次 `classify` 都在模块内分配、拷贝、推理并释放，分配与释放严格成对

use std::fmt;
use std::future::Future;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::{InputShape, ModelInputBuffer},
  model::{BufferHandle, ClassificationResult, ClassifierModule, ModuleError},
};

/// 分类器就绪状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Readiness {
  Loading,
  Ready,
  Degraded,
}

impl fmt::Display for Readiness {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Readiness::Loading => f.write_str("loading"),
      Readiness::Ready => f.write_str("ready"),
      Readiness::Degraded => f.write_str("degraded"),
    }
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GatewayError {
  #[error("分类器未就绪: {0}")]
  NotReady(Readiness),
  #[error("输入形状不匹配: 期望 {expected}, 实际 {actual}")]
  ShapeMismatch {
    expected: InputShape,
    actual: InputShape,
  },
  #[error("缓冲区传输失败: {0}")]
  Transfer(#[from] ModuleError),
}

enum GatewayState<M> {
  Loading,
  Ready(M),
  Degraded { reason: String },
}

pub struct InferenceGateway<M> {
  shape: InputShape,
  state: GatewayState<M>,
}

impl<M: ClassifierModule> InferenceGateway<M> {
  pub fn new(shape: InputShape) -> Self {
    Self {
      shape,
      state: GatewayState::Loading,
    }
  }

  pub fn shape(&self) -> InputShape {
    self.shape
  }

  pub fn readiness(&self) -> Readiness {
    match self.state {
      GatewayState::Loading => Readiness::Loading,
      GatewayState::Ready(_) => Readiness::Ready,
      GatewayState::Degraded { .. } => Readiness::Degraded,
    }
  }

  /// 加载失败的原因
  pub fn failure(&self) -> Option<&str> {
    match &self.state {
      GatewayState::Degraded { reason } => Some(reason),
      _ => None,
    }
  }

  pub fn module(&self) -> Option<&M> {
    match &self.state {
      GatewayState::Ready(module) => Some(module),
      _ => None,
    }
  }

  /// 加载分类器模块。只有第一次调用会等待 `load`。
  pub async fn initialize<F, E>(&mut self, load: F) -> Readiness
  where
    F: Future<Output = Result<M, E>>,
    E: fmt::Display,
  {
    if !matches!(self.state, GatewayState::Loading) {
      warn!("分类器已完成初始化 ({}), 不再重新加载", self.readiness());
      return self.readiness();
    }

    info!("正在加载分类器...");
    self.state = match load.await {
      Ok(mut module) => {
        module.set_input_shape(
          self.shape.width as i32,
          self.shape.height as i32,
          self.shape.channels.count() as i32,
        );
        info!("分类器就绪, 输入形状 {}", self.shape);
        GatewayState::Ready(module)
      }
      Err(e) => {
        error!("分类器加载失败, 进入仅亮度模式: {}", e);
        GatewayState::Degraded {
          reason: e.to_string(),
        }
      }
    };
    self.readiness()
  }

  /// 对一个模型输入缓冲区执行推理
  pub fn classify(
    &mut self,
    buffer: &ModelInputBuffer,
  ) -> Result<ClassificationResult, GatewayError> {
    let readiness = self.readiness();
    let GatewayState::Ready(module) = &mut self.state else {
      return Err(GatewayError::NotReady(readiness));
    };
    if buffer.shape() != self.shape {
      return Err(GatewayError::ShapeMismatch {
        expected: self.shape,
        actual: buffer.shape(),
      });
    }

    let mut transfer = ScopedTransfer::new(module, buffer.as_bytes())?;
    let (raw_label, score) = transfer.classify(self.shape);
    drop(transfer);

    let result = ClassificationResult::new(raw_label, score);
    debug!(
      "buffer={} bytes, label={}, score={:.3}",
      buffer.len(),
      raw_label,
      result.score
    );
    Ok(result)
  }
}

/// 模块内的一次缓冲区传输。
///
/// 构造时分配并写入，析构时释放，任何退出路径都会释放。
pub struct ScopedTransfer<'m, M: ClassifierModule> {
  module: &'m mut M,
  handle: BufferHandle,
}

impl<'m, M: ClassifierModule> ScopedTransfer<'m, M> {
  pub fn new(module: &'m mut M, bytes: &[u8]) -> Result<Self, ModuleError> {
    let handle = module.allocate(bytes.len())?;
    let transfer = ScopedTransfer { module, handle };
    transfer.module.write(handle, bytes)?;
    Ok(transfer)
  }

  pub fn handle(&self) -> BufferHandle {
    self.handle
  }

  /// 调用 `classify_image`，紧接着读取分数
  pub fn classify(&mut self, shape: InputShape) -> (i32, f32) {
    let label = self.module.classify_image(
      self.handle,
      shape.width as i32,
      shape.height as i32,
      shape.channels.count() as i32,
    );
    (label, self.module.get_last_score())
  }
}

impl<M: ClassifierModule> Drop for ScopedTransfer<'_, M> {
  fn drop(&mut self) {
    self.module.release(self.handle);
  }
}
