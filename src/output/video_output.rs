// 该文件是 Qianli （千里眼） 项目的一部分。
// src/output/video_output.rs - GStreamer 视频文件输出
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

//! # GStreamer 视频文件输出模块
//!
//! 将标注后的帧编码为视频文件。容器与编码器由输出文件扩展名决定：
//!
//! - **MP4** (H.264)
//! - **MKV** (Matroska, H.264)
//! - **WebM** (VP8)
//!
//! ## Cargo 特性
//!
//! 在 `Cargo.toml` 中启用 `gstreamer_output` 特性。

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use tracing::{info, warn};

use crate::output::{OutputError, OutputWriter};
use crate::pipeline::ProcessedFrame;

/// GStreamer 视频文件输出
///
/// appsrc 接收 RGB 帧，管道内转换编码后写入文件。帧时间戳按固定
/// 帧率合成，与输入帧的到达时刻无关。`finish` 发送 EOS 并等待
/// 复用器落盘，不调用则容器可能缺少索引无法播放。
pub struct VideoOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  fps: f64,
  frame_count: u64,
  finished: bool,
}

impl VideoOutput {
  pub fn open(path: &str, width: u32, height: u32, fps: f64) -> Result<Self, OutputError> {
    gst::init().map_err(|e| OutputError::Encode(format!("GStreamer 初始化失败: {e}")))?;

    let description = pipeline_description(path);

    info!("GStreamer 输出管道: {}", description);

    let pipeline = gst::parse::launch(&description)
      .map_err(|e| OutputError::Encode(format!("{path}: 管道创建失败: {e}")))?
      .downcast::<gst::Pipeline>()
      .map_err(|_| OutputError::Encode(format!("{path}: 管道类型错误")))?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or_else(|| OutputError::Encode(format!("{path}: 找不到 appsrc")))?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| OutputError::Encode(format!("{path}: appsrc 类型错误")))?;

    let fps = if fps > 0.0 { fps } else { 30.0 };
    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGB")
      .field("width", width as i32)
      .field("height", height as i32)
      .field("framerate", gst::Fraction::new(fps.round() as i32, 1))
      .build();

    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);

    pipeline
      .set_state(gst::State::Playing)
      .map_err(|e| OutputError::Encode(format!("{path}: 无法启动管道: {e}")))?;

    info!("视频输出已创建: {}x{} @ {} fps -> {}", width, height, fps, path);

    Ok(VideoOutput {
      pipeline,
      appsrc,
      fps,
      frame_count: 0,
      finished: false,
    })
  }

  fn frame_duration_ns(&self) -> u64 {
    (1_000_000_000.0 / self.fps) as u64
  }
}

/// location 加引号，含空格或 `!` 的路径不会撕裂管道描述
fn pipeline_description(path: &str) -> String {
  let encode_chain = if path.ends_with(".mkv") {
    "videoconvert ! video/x-raw,format=I420 ! x264enc speed-preset=fast ! h264parse ! matroskamux"
  } else if path.ends_with(".webm") {
    "videoconvert ! vp8enc ! webmmux"
  } else {
    "videoconvert ! video/x-raw,format=I420 \
     ! x264enc speed-preset=fast tune=zerolatency ! h264parse ! mp4mux"
  };
  format!("appsrc name=src ! {} ! filesink location=\"{}\"", encode_chain, path)
}

impl OutputWriter for VideoOutput {
  fn write_frame(&mut self, frame: &ProcessedFrame) -> Result<(), OutputError> {
    let data = frame.image.as_raw();
    let mut buffer = gst::Buffer::with_size(data.len())
      .map_err(|e| OutputError::Encode(format!("缓冲区创建失败: {e}")))?;

    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or_else(|| OutputError::Encode("缓冲区不可写".to_string()))?;
      let mut map = buffer_ref
        .map_writable()
        .map_err(|e| OutputError::Encode(format!("缓冲区映射失败: {e}")))?;
      map.copy_from_slice(data);
    }

    let pts = self.frame_count * self.frame_duration_ns();
    self.frame_count += 1;

    {
      // with_size 成功后必有独占引用，上面已验证过
      if let Some(buffer_ref) = buffer.get_mut() {
        buffer_ref.set_pts(gst::ClockTime::from_nseconds(pts));
        buffer_ref.set_duration(gst::ClockTime::from_nseconds(self.frame_duration_ns()));
      }
    }

    self
      .appsrc
      .push_buffer(buffer)
      .map_err(|e| OutputError::Encode(format!("帧推送失败: {e:?}")))?;

    Ok(())
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    if self.finished {
      return Ok(());
    }
    self.finished = true;

    self
      .appsrc
      .end_of_stream()
      .map_err(|e| OutputError::Encode(format!("EOS 发送失败: {e:?}")))?;

    // 等待复用器写完文件尾，超时上限防止管道卡死时挂起
    if let Some(bus) = self.pipeline.bus() {
      use gst::MessageView;
      let timeout = gst::ClockTime::from_seconds(10);
      match bus.timed_pop_filtered(timeout, &[gst::MessageType::Eos, gst::MessageType::Error]) {
        Some(msg) => {
          if let MessageView::Error(err) = msg.view() {
            return Err(OutputError::Encode(format!("编码管道错误: {}", err.error())));
          }
        }
        None => warn!("等待 EOS 超时，输出文件可能不完整"),
      }
    }

    self
      .pipeline
      .set_state(gst::State::Null)
      .map_err(|e| OutputError::Encode(format!("管道停止失败: {e}")))?;

    info!("视频输出完成，共 {} 帧", self.frame_count);
    Ok(())
  }
}

impl Drop for VideoOutput {
  fn drop(&mut self) {
    if !self.finished {
      if let Err(e) = self.finish() {
        warn!("视频输出收尾失败: {}", e);
      }
    }
  }
}
