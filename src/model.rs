// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model.rs - 分类器模块边界
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

/// 分类标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
  Paper,
  Plastic,
  /// 分类器返回了 {0, 1} 之外的值
  Invalid,
}

impl Label {
  pub fn from_raw(raw: i32) -> Self {
    match raw {
      0 => Label::Paper,
      1 => Label::Plastic,
      _ => Label::Invalid,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Label::Paper => "Paper",
      Label::Plastic => "Plastic",
      Label::Invalid => "Invalid",
    }
  }
}

impl fmt::Display for Label {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationResult {
  pub label: Label,
  /// 置信度，恒在 `[0, 1]` 内
  pub score: f32,
  /// 分类器返回的原始标签值
  pub raw_label: i32,
}

impl ClassificationResult {
  pub fn new(raw_label: i32, score: f32) -> Self {
    let score = if score.is_nan() {
      0.0
    } else {
      score.clamp(0.0, 1.0)
    };
    Self {
      label: Label::from_raw(raw_label),
      score,
      raw_label,
    }
  }
}

/// 模块地址空间内的缓冲区句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u32);

impl fmt::Display for BufferHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModuleError {
  #[error("模块内存不足: 请求 {requested} 字节")]
  OutOfMemory { requested: usize },
  #[error("未知的缓冲区句柄: {0}")]
  UnknownHandle(BufferHandle),
  #[error("写入越界: 缓冲区容量 {capacity} 字节, 写入 {len} 字节")]
  Overflow { capacity: usize, len: usize },
}

/// 外部分类器模块。
///
/// 形状参数与返回值沿用模块原生的整数约定：
/// `classify_image` 返回的标签只有 0 和 1 有意义，
/// `get_last_score` 仅在紧随 `classify_image` 之后有效。
pub trait ClassifierModule {
  fn set_input_shape(&mut self, width: i32, height: i32, channels: i32);

  fn classify_image(&mut self, buffer: BufferHandle, width: i32, height: i32, channels: i32) -> i32;

  fn get_last_score(&self) -> f32;

  /// 在模块地址空间内分配 `len` 字节
  fn allocate(&mut self, len: usize) -> Result<BufferHandle, ModuleError>;

  fn write(&mut self, buffer: BufferHandle, bytes: &[u8]) -> Result<(), ModuleError>;

  /// 释放缓冲区，重复释放为空操作
  fn release(&mut self, buffer: BufferHandle);
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("未知的内置模型: {0}")]
  UnknownBuiltin(String),
  #[error("模型参数无效: {name}={value}")]
  InvalidParameter { name: String, value: String },
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型参数解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
}

mod arena;
mod logistic_luma;

pub use self::arena::Arena;
pub use self::logistic_luma::{LogisticLumaBuilder, LogisticLumaModule, LogisticParams};
