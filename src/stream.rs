// 该文件是 Qianli （千里眼） 项目的一部分。
// src/stream.rs - 连续流驱动
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
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::input::{InputError, InputSource};
use crate::output::{OutputError, OutputWriter};
use crate::pipeline::{FramePipeline, PipelineError};

#[derive(Error, Debug)]
pub enum StreamError {
  #[error("输入源错误: {0}")]
  Source(#[from] InputError),
  #[error("帧处理错误: {0}")]
  Pipeline(#[from] PipelineError),
  #[error("输出错误: {0}")]
  Sink(#[from] OutputError),
}

/// 流驱动状态
///
/// `Idle → Streaming` 后进入三个终止态之一；终止态不再迭代。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
  /// 尚未开始
  Idle,
  /// 正在逐帧处理
  Streaming,
  /// 被取消或到达帧数上限
  Stopped,
  /// 输入源已读完
  Exhausted,
  /// 因错误终止
  Failed,
}

/// 推理错误处理策略
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorPolicy {
  /// 记录并跳过出错的帧
  Continue,
  /// 立即终止整个流
  Abort,
}

/// 取消令牌
///
/// 只在帧边界检查，已经开始处理的帧会完整跑完。
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::Relaxed);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::Relaxed)
  }
}

/// 一次流运行的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
  /// 成功处理的帧数
  pub frames: u64,
  /// 跳过的帧数（解码失败或按策略跳过的推理失败）
  pub skipped: u64,
  /// 输出的检测总数
  pub detections: u64,
}

/// 连续流驱动
///
/// 从输入源逐帧拉取，经流水线处理后写入输出。拉取式：上一帧
/// 写完才取下一帧，慢消费自然反压到源头。
pub struct StreamDriver {
  pipeline: FramePipeline,
  policy: ErrorPolicy,
  max_frames: Option<u64>,
  state: StreamState,
}

impl StreamDriver {
  pub fn new(pipeline: FramePipeline) -> Self {
    StreamDriver {
      pipeline,
      policy: ErrorPolicy::Abort,
      max_frames: None,
      state: StreamState::Idle,
    }
  }

  /// 设置推理错误处理策略
  pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
    self.policy = policy;
    self
  }

  /// 设置最大处理帧数，到达后提前停止
  pub fn with_max_frames(mut self, max_frames: u64) -> Self {
    self.max_frames = Some(max_frames);
    self
  }

  pub fn state(&self) -> StreamState {
    self.state
  }

  /// 跑完整个流
  ///
  /// 返回时 `state()` 为终止态。`Failed` 之外的路径都会调用
  /// `sink.finish()`；源在返回前被 drop，设备句柄随之释放。
  pub fn run(
    &mut self,
    source: Box<dyn InputSource>,
    sink: &mut dyn OutputWriter,
    cancel: &CancelToken,
  ) -> Result<StreamSummary, StreamError> {
    let mut source = source;
    let multi_frame = source.kind().is_multi_frame();
    let mut summary = StreamSummary::default();

    self.state = StreamState::Streaming;

    loop {
      if cancel.is_cancelled() {
        info!("收到取消信号，在帧边界停止");
        self.state = StreamState::Stopped;
        break;
      }

      let frame = match source.next() {
        None => {
          self.state = StreamState::Exhausted;
          break;
        }
        Some(Ok(frame)) => frame,
        Some(Err(e @ InputError::DecodeFailure(_))) if multi_frame => {
          // 多帧源上坏帧只损失一帧画面
          warn!("跳过解码失败的帧: {}", e);
          summary.skipped += 1;
          continue;
        }
        Some(Err(e)) => {
          error!("输入源错误: {}", e);
          self.state = StreamState::Failed;
          return Err(StreamError::Source(e));
        }
      };

      let processed = match self.pipeline.process(&frame) {
        Ok(processed) => processed,
        Err(e) => match self.policy {
          ErrorPolicy::Continue => {
            warn!("帧 {} 推理失败，按策略跳过: {}", frame.index, e);
            summary.skipped += 1;
            continue;
          }
          ErrorPolicy::Abort => {
            error!("帧 {} 推理失败，终止流: {}", frame.index, e);
            self.state = StreamState::Failed;
            return Err(StreamError::Pipeline(e));
          }
        },
      };

      summary.detections += processed.detections.len() as u64;
      if let Err(e) = sink.write_frame(&processed) {
        error!("输出写入失败: {}", e);
        self.state = StreamState::Failed;
        return Err(StreamError::Sink(e));
      }
      summary.frames += 1;

      if let Some(max) = self.max_frames
        && summary.frames >= max
      {
        info!("到达帧数上限 {}，停止", max);
        self.state = StreamState::Stopped;
        break;
      }
    }

    drop(source);
    sink.finish()?;

    info!(
      "流结束: {:?}, {} 帧, {} 跳过, {} 条检测",
      self.state, summary.frames, summary.skipped, summary.detections
    );
    Ok(summary)
  }
}
