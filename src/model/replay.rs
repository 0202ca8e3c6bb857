// 该文件是 Qianli （千里眼） 项目的一部分。
// src/model/replay.rs - 回放推理引擎
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

//! # 回放推理引擎
//!
//! 从 JSON 描述文件加载一组事先捕获的原始输出张量，对每一帧原样
//! 回放。它把前向传播保持为一个不透明函数，用来在没有 NPU/加速器
//! 的机器上驱动完整的后处理管线与端到端测试。
//!
//! ## 描述文件格式
//!
//! ```json
//! {
//!   "input_width": 416,
//!   "input_height": 416,
//!   "class_count": 80,
//!   "outputs": [
//!     { "row_len": 84, "data": [0.5, 0.5, 0.2, 0.2, ...] }
//!   ]
//! }
//! ```
//!
//! ## URL 方案
//!
//! `replay:///path/to/capture.json`

use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::model::{EngineError, ImageTensor, InferenceEngine, OutputTensor};
use crate::{FromUrl, FromUrlWithScheme};

pub struct ReplayEngine {
  input_width: u32,
  input_height: u32,
  class_count: usize,
  outputs: Vec<OutputTensor>,
}

impl ReplayEngine {
  pub fn from_path(path: &str) -> Result<Self, EngineError> {
    info!("加载回放模型描述: {}", path);
    let bytes = std::fs::read(path)?;
    Self::from_slice(&bytes)
  }

  pub fn from_slice(bytes: &[u8]) -> Result<Self, EngineError> {
    let value: Value = serde_json::from_slice(bytes)?;

    let input_width = field_u64(&value, "input_width")? as u32;
    let input_height = field_u64(&value, "input_height")? as u32;
    let class_count = field_u64(&value, "class_count")? as usize;

    let raw_outputs = value
      .get("outputs")
      .and_then(Value::as_array)
      .ok_or_else(|| EngineError::Invalid("缺少 outputs 数组".to_string()))?;

    let mut outputs = Vec::with_capacity(raw_outputs.len());
    for (idx, layer) in raw_outputs.iter().enumerate() {
      let row_len = field_u64(layer, "row_len")? as usize;
      let data = layer
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| EngineError::Invalid(format!("输出层 {} 缺少 data 数组", idx)))?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| EngineError::Invalid(format!("输出层 {} 含非数值元素", idx)))?;

      if row_len != 4 + class_count {
        return Err(EngineError::Invalid(format!(
          "输出层 {} 行长 {} 与类别数 {} 不符",
          idx,
          row_len,
          class_count
        )));
      }

      outputs.push(OutputTensor::new(data, row_len)?);
    }

    debug!(
      "回放模型就绪: 输入 {}x{}, {} 类, {} 个输出层",
      input_width,
      input_height,
      class_count,
      outputs.len()
    );

    Ok(ReplayEngine {
      input_width,
      input_height,
      class_count,
      outputs,
    })
  }
}

fn field_u64(value: &Value, key: &str) -> Result<u64, EngineError> {
  value
    .get(key)
    .and_then(Value::as_u64)
    .ok_or_else(|| EngineError::Invalid(format!("缺少字段 {}", key)))
}

impl FromUrlWithScheme for ReplayEngine {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayEngine {
  type Error = EngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(EngineError::UnsupportedScheme(url.scheme().to_string()));
    }
    Self::from_path(url.path())
  }
}

impl InferenceEngine for ReplayEngine {
  fn input_width(&self) -> u32 {
    self.input_width
  }

  fn input_height(&self) -> u32 {
    self.input_height
  }

  fn class_count(&self) -> usize {
    self.class_count
  }

  fn forward(&self, _input: &ImageTensor) -> Result<Vec<OutputTensor>, EngineError> {
    Ok(self.outputs.clone())
  }
}
