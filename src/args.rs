// 该文件是 Qianli （千里眼） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::{Parser, ValueEnum};
use url::Url;

use qianli::stream::ErrorPolicy;

/// Qianli 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理引擎来源
  /// 支持格式:
  /// - 回放引擎: replay:///path/to/outputs.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源
  /// 支持格式:
  /// - 图片: image:///path/to/still.jpg
  /// - 视频: video:///path/to/clip.mp4
  /// - 摄像头: camera:///dev/video0?width=640&height=480
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出目标
  /// 支持格式:
  /// - 图片: image:///path/to/out.png
  /// - 视频: video:///path/to/out.mp4
  /// - 记录: record:///path/to/detections.jsonl
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 类别名称表文件（每行一个名称）
  #[arg(long, value_name = "FILE", default_value = "labels/coco.names")]
  pub labels: PathBuf,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.4", value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 最大处理帧数（仅对视频/摄像头有效）
  #[arg(long, value_name = "COUNT")]
  pub max_frames: Option<u64>,

  /// 推理失败时的处理策略
  #[arg(long, value_enum, default_value_t = OnInferenceError::Abort)]
  pub on_inference_error: OnInferenceError,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OnInferenceError {
  /// 跳过出错的帧继续处理
  Continue,
  /// 立即终止
  Abort,
}

impl From<OnInferenceError> for ErrorPolicy {
  fn from(value: OnInferenceError) -> Self {
    match value {
      OnInferenceError::Continue => ErrorPolicy::Continue,
      OnInferenceError::Abort => ErrorPolicy::Abort,
    }
  }
}
