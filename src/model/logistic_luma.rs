// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model/logistic_luma.rs - 内置亮度逻辑回归分类器
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

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl,
  frame::{MODEL_CHANNELS, MODEL_HEIGHT, MODEL_WIDTH},
  model::{Arena, BufferHandle, ClassifierModule, ModelError, ModuleError},
  preprocess::luma,
};

const BUILTIN_SCHEME: &str = "builtin";
const LINEAR_SCHEME: &str = "linear";
const BUILTIN_NAME: &str = "luma-sigmoid";

/// 输入形状不符或句柄无效时返回的标签
const LABEL_SHAPE_MISMATCH: i32 = -1;

/// 逻辑回归参数：`prob = sigmoid(weight * feature + bias)`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogisticParams {
  pub weight: f64,
  pub bias: f64,
  pub threshold: f64,
}

impl Default for LogisticParams {
  fn default() -> Self {
    // 越亮越像塑料
    Self {
      weight: 6.0,
      bias: -3.0,
      threshold: 0.5,
    }
  }
}

enum ParamSource {
  Inline(LogisticParams),
  File(PathBuf),
}

/// 分类器加载器
///
/// - `builtin://luma-sigmoid?weight=6&bias=-3&threshold=0.5`
/// - `linear:///path/to/params.json`
pub struct LogisticLumaBuilder {
  source: ParamSource,
}

impl FromUrl for LogisticLumaBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      BUILTIN_SCHEME => {
        let name = url.host_str().unwrap_or_default();
        if name != BUILTIN_NAME {
          error!("未知的内置模型: {}", name);
          return Err(ModelError::UnknownBuiltin(name.to_string()));
        }

        let mut params = LogisticParams::default();
        for (key, value) in url.query_pairs() {
          let slot = match &*key {
            "weight" => &mut params.weight,
            "bias" => &mut params.bias,
            "threshold" => &mut params.threshold,
            other => {
              warn!("忽略未知的模型参数: {}", other);
              continue;
            }
          };
          *slot = value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ModelError::InvalidParameter {
              name: key.to_string(),
              value: value.to_string(),
            })?;
        }
        Ok(Self::with_params(params))
      }
      LINEAR_SCHEME => Ok(LogisticLumaBuilder {
        source: ParamSource::File(PathBuf::from(url.path())),
      }),
      other => {
        error!(
          "URI scheme mismatch: expected '{}' or '{}', found '{}'",
          BUILTIN_SCHEME, LINEAR_SCHEME, other
        );
        Err(ModelError::SchemeMismatch(other.to_string()))
      }
    }
  }
}

impl LogisticLumaBuilder {
  pub fn builtin() -> Self {
    Self::with_params(LogisticParams::default())
  }

  pub fn with_params(params: LogisticParams) -> Self {
    LogisticLumaBuilder {
      source: ParamSource::Inline(params),
    }
  }

  pub async fn load(self) -> Result<LogisticLumaModule, ModelError> {
    let params = match self.source {
      ParamSource::Inline(params) => {
        info!("加载内置模型: {}", BUILTIN_NAME);
        params
      }
      ParamSource::File(path) => {
        info!("加载模型参数文件: {}", path.display());
        let text = tokio::fs::read_to_string(&path).await?;
        serde_json::from_str::<LogisticParams>(&text)?
      }
    };
    debug!(
      "模型参数: weight={}, bias={}, threshold={}",
      params.weight, params.bias, params.threshold
    );
    info!("模型加载完成");
    Ok(LogisticLumaModule::new(params))
  }
}

/// 以平均亮度为唯一特征的逻辑回归分类器
#[derive(Debug)]
pub struct LogisticLumaModule {
  params: LogisticParams,
  shape: (i32, i32, i32),
  last_score: f32,
  arena: Arena,
}

impl LogisticLumaModule {
  pub fn new(params: LogisticParams) -> Self {
    Self {
      params,
      shape: (
        MODEL_WIDTH as i32,
        MODEL_HEIGHT as i32,
        MODEL_CHANNELS.count() as i32,
      ),
      last_score: 0.0,
      arena: Arena::new(),
    }
  }

  pub fn params(&self) -> &LogisticParams {
    &self.params
  }

  pub fn live_allocations(&self) -> usize {
    self.arena.live()
  }

  pub fn arena(&self) -> &Arena {
    &self.arena
  }

  /// 归一化平均亮度，取值 `[0, 1]`
  fn feature(pixels: &[u8], channels: i32) -> f64 {
    let sum: f64 = if channels == 3 {
      pixels
        .chunks_exact(3)
        .map(|p| luma(p[0], p[1], p[2]) / 255.0)
        .sum()
    } else {
      pixels.iter().map(|&p| p as f64 / 255.0).sum()
    };
    let count = pixels.len() / channels as usize;
    if count == 0 { 0.0 } else { sum / count as f64 }
  }
}

impl ClassifierModule for LogisticLumaModule {
  fn set_input_shape(&mut self, width: i32, height: i32, channels: i32) {
    if width > 0 && height > 0 && (channels == 1 || channels == 3) {
      self.shape = (width, height, channels);
      debug!("输入形状设置为 {}x{}x{}", width, height, channels);
    } else {
      warn!(
        "忽略无效的输入形状 {}x{}x{}, 保持 {:?}",
        width, height, channels, self.shape
      );
    }
  }

  fn classify_image(
    &mut self,
    buffer: BufferHandle,
    width: i32,
    height: i32,
    channels: i32,
  ) -> i32 {
    if (width, height, channels) != self.shape {
      self.last_score = 0.0;
      return LABEL_SHAPE_MISMATCH;
    }
    let len = (width as usize) * (height as usize) * (channels as usize);
    let Some(pixels) = self.arena.get(buffer).filter(|p| p.len() >= len) else {
      self.last_score = 0.0;
      return LABEL_SHAPE_MISMATCH;
    };

    let feature = Self::feature(&pixels[..len], channels);
    let logit = self.params.weight * feature + self.params.bias;
    let prob = 1.0 / (1.0 + (-logit).exp());
    self.last_score = prob as f32;

    if prob >= self.params.threshold { 1 } else { 0 }
  }

  fn get_last_score(&self) -> f32 {
    self.last_score
  }

  fn allocate(&mut self, len: usize) -> Result<BufferHandle, ModuleError> {
    self.arena.allocate(len)
  }

  fn write(&mut self, buffer: BufferHandle, bytes: &[u8]) -> Result<(), ModuleError> {
    self.arena.write(buffer, bytes)
  }

  fn release(&mut self, buffer: BufferHandle) {
    self.arena.release(buffer);
  }
}
