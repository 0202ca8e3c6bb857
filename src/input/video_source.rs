// 该文件是 Qianli （千里眼） 项目的一部分。
// src/input/video_source.rs - GStreamer 视频文件输入源
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

//! # GStreamer 视频文件输入模块
//!
//! 通过 GStreamer 解码视频文件，逐帧产出 RGB 图像。
//!
//! ## 系统依赖
//!
//! 使用前需要安装 GStreamer 开发库：
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! ## Cargo 特性
//!
//! 在 `Cargo.toml` 中启用 `gstreamer_input` 特性。

use image::RgbImage;
use tracing::{error, info, warn};
use url::Url;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;

use crate::input::{Frame, InputError, InputSource, SourceKind};
use crate::{FromUrl, FromUrlWithScheme};

/// GStreamer 视频文件输入源
///
/// 管道形如 `filesrc ! decodebin ! videoconvert ! RGB ! appsink`。
/// appsink 限制两帧缓冲且不丢帧，文件内容按顺序完整产出。
/// 打开时预取第一帧以确定分辨率与帧率。
pub struct VideoSource {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  pending: Option<RgbImage>,
  width: u32,
  height: u32,
  fps: Option<f64>,
  frame_index: u64,
  done: bool,
}

impl FromUrlWithScheme for VideoSource {
  const SCHEME: &'static str = "video";
}

impl FromUrl for VideoSource {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::UnsupportedScheme(url.scheme().to_string()));
    }
    Self::open(url.path())
  }
}

impl VideoSource {
  fn open(path: &str) -> Result<Self, InputError> {
    gst::init().map_err(|e| InputError::SourceUnavailable(format!("GStreamer 初始化失败: {e}")))?;

    if !std::path::Path::new(path).exists() {
      return Err(InputError::SourceUnavailable(format!("视频文件不存在: {path}")));
    }

    let description = pipeline_description(path);
    info!("GStreamer 输入管道: {}", description);

    let pipeline = gst::parse::launch(&description)
      .map_err(|e| InputError::SourceUnavailable(format!("{path}: 管道创建失败: {e}")))?
      .downcast::<gst::Pipeline>()
      .map_err(|_| InputError::SourceUnavailable(format!("{path}: 管道类型错误")))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or_else(|| InputError::SourceUnavailable(format!("{path}: 找不到 appsink")))?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| InputError::SourceUnavailable(format!("{path}: appsink 类型错误")))?;

    pipeline
      .set_state(gst::State::Playing)
      .map_err(|e| InputError::SourceUnavailable(format!("{path}: 无法启动管道: {e}")))?;

    // 预取首帧确定视频属性，空文件或无法解码的文件在这里暴露
    let sample = appsink.pull_sample().map_err(|e| {
      let _ = pipeline.set_state(gst::State::Null);
      InputError::DecodeFailure(format!("{path}: 无法解码首帧: {e}"))
    })?;

    let (image, info) = match sample_to_image(&sample) {
      Ok(decoded) => decoded,
      Err(e) => {
        let _ = pipeline.set_state(gst::State::Null);
        return Err(e);
      }
    };

    let fps = {
      let rate = info.fps();
      if rate.denom() > 0 && rate.numer() > 0 {
        Some(rate.numer() as f64 / rate.denom() as f64)
      } else {
        None
      }
    };

    info!(
      "视频已打开: {} ({}x{} @ {:?} fps)",
      path,
      info.width(),
      info.height(),
      fps
    );

    Ok(VideoSource {
      pipeline,
      appsink,
      width: info.width(),
      height: info.height(),
      fps,
      pending: Some(image),
      frame_index: 0,
      done: false,
    })
  }

  fn timestamp_ms(&self) -> u64 {
    match self.fps {
      Some(fps) if fps > 0.0 => (self.frame_index as f64 * 1000.0 / fps) as u64,
      _ => 0,
    }
  }
}

/// location 加引号，含空格或 `!` 的路径不会撕裂管道描述
fn pipeline_description(path: &str) -> String {
  format!(
    "filesrc location=\"{}\" ! decodebin ! videoconvert ! video/x-raw,format=RGB \
     ! appsink max-buffers=2 name=sink",
    path
  )
}

fn sample_to_image(sample: &gst::Sample) -> Result<(RgbImage, gst_video::VideoInfo), InputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| InputError::DecodeFailure("样本缺少缓冲区".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| InputError::DecodeFailure("样本缺少 caps".to_string()))?;

  let info = gst_video::VideoInfo::from_caps(caps)
    .map_err(|_| InputError::DecodeFailure("无法从 caps 解析视频信息".to_string()))?;

  if info.format() != gst_video::VideoFormat::Rgb {
    return Err(InputError::DecodeFailure(format!(
      "不支持的视频格式: {:?}",
      info.format()
    )));
  }

  let width = info.width();
  let height = info.height();

  let map = buffer
    .map_readable()
    .map_err(|e| InputError::DecodeFailure(format!("无法读取缓冲区: {e}")))?;
  let data = map.as_slice();

  let expected = (width * height * 3) as usize;
  if data.len() < expected {
    return Err(InputError::DecodeFailure(format!(
      "缓冲区过小: 期望 {} 字节，实际 {} 字节",
      expected,
      data.len()
    )));
  }

  let image = RgbImage::from_raw(width, height, data[..expected].to_vec())
    .ok_or_else(|| InputError::DecodeFailure("缓冲区无法构成 RGB 图像".to_string()))?;

  Ok((image, info))
}

impl Drop for VideoSource {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止 GStreamer 管道失败: {}", e);
    }
  }
}

impl Iterator for VideoSource {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }

    let image = if let Some(image) = self.pending.take() {
      image
    } else {
      if self.appsink.is_eos() {
        self.done = true;
        return None;
      }
      let sample = match self.appsink.pull_sample() {
        Ok(sample) => sample,
        Err(e) => {
          // EOS 与错误在 pull_sample 上无法区分，复查 EOS 标志
          if self.appsink.is_eos() {
            self.done = true;
            return None;
          }
          error!("拉取样本失败: {}", e);
          self.done = true;
          return Some(Err(InputError::DecodeFailure(format!("拉取样本失败: {e}"))));
        }
      };
      match sample_to_image(&sample) {
        Ok((image, _)) => image,
        // 单帧解码失败不终止序列，由调用方决定是否跳过
        Err(e) => return Some(Err(e)),
      }
    };

    let frame = Frame {
      image,
      index: self.frame_index,
      timestamp_ms: self.timestamp_ms(),
    };
    self.frame_index += 1;
    Some(Ok(frame))
  }
}

impl InputSource for VideoSource {
  fn kind(&self) -> SourceKind {
    SourceKind::Video
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    self.fps
  }
}
