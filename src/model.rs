// 该文件是 Qianli （千里眼） 项目的一部分。
// src/model.rs - 推理引擎边界
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

use image::RgbImage;
use thiserror::Error;
use url::Url;

#[cfg(feature = "replay_model")]
mod replay;
#[cfg(feature = "replay_model")]
pub use self::replay::ReplayEngine;

#[derive(Error, Debug)]
pub enum TensorError {
  #[error("输出行长度 {0} 无效")]
  RowLenInvalid(usize),
  #[error("输出长度 {len} 不是行长度 {row_len} 的整数倍")]
  Misaligned { len: usize, row_len: usize },
}

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("推理失败: {0}")]
  Inference(String),
  #[error("模型输出布局错误: {0}")]
  Tensor(#[from] TensorError),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[cfg(feature = "replay_model")]
  #[error("模型描述解析错误: {0}")]
  Parse(#[from] serde_json::Error),
  #[cfg(feature = "replay_model")]
  #[error("模型描述无效: {0}")]
  Invalid(String),
  #[error("URI 方案不支持: {0}")]
  UnsupportedScheme(String),
}

/// 预处理后的输入张量
///
/// NHWC 排布的 RGB 浮点数据，已缩放到网络输入尺寸并归一化到 0-1。
pub struct ImageTensor {
  pub data: Vec<f32>,
  pub width: u32,
  pub height: u32,
}

/// 缩放并归一化一帧图像，得到引擎输入
pub fn tensorize(image: &RgbImage, width: u32, height: u32) -> ImageTensor {
  let resized = image::imageops::resize(image, width, height, image::imageops::FilterType::Triangle);
  let data = resized.into_raw().iter().map(|&v| v as f32 / 255.0).collect();

  ImageTensor {
    data,
    width,
    height,
  }
}

/// 单个原始输出层
///
/// 由定长行 `[cx, cy, w, h, s_1, ..., s_C]` 平铺而成，
/// 坐标为相对网络输入的归一化值。
#[derive(Clone, Debug)]
pub struct OutputTensor {
  data: Box<[f32]>,
  row_len: usize,
}

impl OutputTensor {
  pub fn new(data: Vec<f32>, row_len: usize) -> Result<Self, TensorError> {
    if row_len == 0 {
      return Err(TensorError::RowLenInvalid(row_len));
    }
    if data.len() % row_len != 0 {
      return Err(TensorError::Misaligned {
        len: data.len(),
        row_len,
      });
    }

    Ok(OutputTensor {
      data: data.into_boxed_slice(),
      row_len,
    })
  }

  pub fn row_len(&self) -> usize {
    self.row_len
  }

  pub fn row_count(&self) -> usize {
    self.data.len() / self.row_len
  }

  pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
    self.data.chunks_exact(self.row_len)
  }
}

/// 推理引擎边界
///
/// 前向传播是一个不透明函数：输入预处理张量，产出一组原始输出层。
/// 权重加载与缓存是引擎实现的事，管线一概不管。实现若持有内部暂存
/// 缓冲，则不应声明 `Sync`，由调用方逐 worker 克隆或串行访问。
pub trait InferenceEngine {
  /// 网络输入宽度
  fn input_width(&self) -> u32;

  /// 网络输入高度
  fn input_height(&self) -> u32;

  /// 网络输出的类别数
  fn class_count(&self) -> usize;

  /// 执行一次前向传播
  fn forward(&self, input: &ImageTensor) -> Result<Vec<OutputTensor>, EngineError>;
}

/// 按 URI 方案打开推理引擎
pub fn open_engine(url: &Url) -> Result<Box<dyn InferenceEngine>, EngineError> {
  #[cfg(feature = "replay_model")]
  {
    use crate::{FromUrl, FromUrlWithScheme};

    if url.scheme() == ReplayEngine::SCHEME {
      return Ok(Box::new(ReplayEngine::from_url(url)?));
    }
  }

  Err(EngineError::UnsupportedScheme(url.scheme().to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tensor_rows_are_fixed_length() {
    let tensor = OutputTensor::new(vec![0.0; 12], 6).unwrap();
    assert_eq!(tensor.row_count(), 2);
    assert!(tensor.rows().all(|row| row.len() == 6));
  }

  #[test]
  fn misaligned_tensor_is_rejected() {
    assert!(matches!(
      OutputTensor::new(vec![0.0; 13], 6),
      Err(TensorError::Misaligned { len: 13, row_len: 6 })
    ));
    assert!(matches!(
      OutputTensor::new(vec![0.0; 4], 0),
      Err(TensorError::RowLenInvalid(0))
    ));
  }

  #[test]
  fn tensorize_normalizes_to_unit_range() {
    let image = RgbImage::from_pixel(8, 8, image::Rgb([255, 0, 128]));
    let tensor = tensorize(&image, 4, 4);

    assert_eq!(tensor.width, 4);
    assert_eq!(tensor.height, 4);
    assert_eq!(tensor.data.len(), 4 * 4 * 3);
    assert!(tensor.data.iter().all(|&v| (0.0..=1.0).contains(&v)));
    assert_eq!(tensor.data[0], 1.0);
    assert_eq!(tensor.data[1], 0.0);
  }
}
