// 该文件是 Qianli （千里眼） 项目的一部分。
// src/pipeline.rs - 单帧处理流水线
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

use std::sync::Arc;

use image::RgbImage;
use thiserror::Error;
use tracing::debug;

use crate::detector::{Detection, decode_outputs, filter_confident, non_max_suppression};
use crate::input::Frame;
use crate::labels::{ClassLabels, LabelsError};
use crate::model::{EngineError, InferenceEngine, tensorize};
use crate::output::Annotator;

/// 默认置信度阈值
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
/// 默认 NMS IoU 阈值
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.4;

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("推理失败: {0}")]
  Inference(#[from] EngineError),
  #[error(transparent)]
  Labels(#[from] LabelsError),
}

/// 一帧的处理结果
pub struct ProcessedFrame {
  /// 标注后的图像
  pub image: RgbImage,
  /// NMS 之后存活的检测
  pub detections: Vec<Detection>,
  /// 源帧序号
  pub index: u64,
  /// 源帧时间戳（毫秒）
  pub timestamp_ms: u64,
}

/// 单帧处理流水线
///
/// 张量化 → 推理 → 解码 → 置信度过滤 → 逐类 NMS → 标注，
/// 每帧独立处理，不依赖帧间状态。
pub struct FramePipeline {
  engine: Box<dyn InferenceEngine>,
  confidence_threshold: f32,
  iou_threshold: f32,
  annotator: Annotator,
}

impl FramePipeline {
  /// 创建流水线
  ///
  /// 名称表条目数与模型类别数不一致时立即报错，不会带着
  /// 错位的名称表跑完整个流。
  pub fn new(
    engine: Box<dyn InferenceEngine>,
    labels: Arc<ClassLabels>,
  ) -> Result<Self, PipelineError> {
    labels.ensure_matches(engine.class_count())?;

    Ok(FramePipeline {
      engine,
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      annotator: Annotator::new(labels),
    })
  }

  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold;
    self
  }

  /// 处理一帧
  pub fn process(&self, frame: &Frame) -> Result<ProcessedFrame, PipelineError> {
    let tensor = tensorize(
      &frame.image,
      self.engine.input_width(),
      self.engine.input_height(),
    );
    let outputs = self.engine.forward(&tensor)?;

    let decoded = decode_outputs(
      &outputs,
      frame.image.width() as f32,
      frame.image.height() as f32,
    );
    let confident = filter_confident(decoded, self.confidence_threshold);
    let detections = non_max_suppression(confident, self.iou_threshold);

    debug!(
      "帧 {}: {} 条检测通过过滤与 NMS",
      frame.index,
      detections.len()
    );

    let mut image = frame.image.clone();
    self.annotator.draw_detections(&mut image, &detections);

    Ok(ProcessedFrame {
      image,
      detections,
      index: frame.index,
      timestamp_ms: frame.timestamp_ms,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{ImageTensor, OutputTensor};

  /// 返回固定张量的推理引擎
  struct FixedEngine {
    class_count: usize,
    outputs: Vec<OutputTensor>,
  }

  impl InferenceEngine for FixedEngine {
    fn input_width(&self) -> u32 {
      32
    }

    fn input_height(&self) -> u32 {
      32
    }

    fn class_count(&self) -> usize {
      self.class_count
    }

    fn forward(&self, _input: &ImageTensor) -> Result<Vec<OutputTensor>, EngineError> {
      Ok(self.outputs.clone())
    }
  }

  fn labels(names: &[&str]) -> Arc<ClassLabels> {
    Arc::new(ClassLabels::from_names(
      names.iter().map(|s| s.to_string()).collect(),
    ))
  }

  fn frame(width: u32, height: u32) -> Frame {
    Frame {
      image: RgbImage::new(width, height),
      index: 0,
      timestamp_ms: 0,
    }
  }

  #[test]
  fn label_count_mismatch_is_rejected_at_construction() {
    let engine = FixedEngine {
      class_count: 3,
      outputs: Vec::new(),
    };
    let result = FramePipeline::new(Box::new(engine), labels(&["cat", "dog"]));
    assert!(matches!(
      result,
      Err(PipelineError::Labels(LabelsError::ConfigMismatch { .. }))
    ));
  }

  #[test]
  fn confident_detection_survives_full_pipeline() {
    let rows = vec![
      0.5, 0.5, 0.2, 0.2, 0.9, 0.1, // 类别 0，高置信度
      0.1, 0.1, 0.1, 0.1, 0.3, 0.2, // 低置信度，被过滤
    ];
    let engine = FixedEngine {
      class_count: 2,
      outputs: vec![OutputTensor::new(rows, 6).unwrap()],
    };
    let pipeline = FramePipeline::new(Box::new(engine), labels(&["cat", "dog"])).unwrap();

    let processed = pipeline.process(&frame(100, 100)).unwrap();
    assert_eq!(processed.detections.len(), 1);
    assert_eq!(processed.detections[0].class_id, 0);
    assert!((processed.detections[0].bbox.x - 40.0).abs() < 1e-3);
  }

  #[test]
  fn empty_output_produces_untouched_image() {
    let engine = FixedEngine {
      class_count: 1,
      outputs: Vec::new(),
    };
    let pipeline = FramePipeline::new(Box::new(engine), labels(&["cat"])).unwrap();

    let source = frame(16, 16);
    let processed = pipeline.process(&source).unwrap();
    assert!(processed.detections.is_empty());
    assert_eq!(processed.image, source.image);
  }

  #[test]
  fn threshold_overrides_apply() {
    let rows = vec![0.5, 0.5, 0.2, 0.2, 0.45];
    let engine = FixedEngine {
      class_count: 1,
      outputs: vec![OutputTensor::new(rows, 5).unwrap()],
    };
    let pipeline = FramePipeline::new(Box::new(engine), labels(&["cat"]))
      .unwrap()
      .with_confidence_threshold(0.4);

    let processed = pipeline.process(&frame(64, 64)).unwrap();
    assert_eq!(processed.detections.len(), 1);
  }
}
