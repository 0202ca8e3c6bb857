// 该文件是 Qianli （千里眼） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::time::Duration;

use image::RgbImage;
use thiserror::Error;
use url::Url;

mod camera_source;
mod image_source;
#[cfg(feature = "gstreamer_input")]
mod video_source;

pub use self::camera_source::CameraSource;
pub use self::image_source::ImageSource;
#[cfg(feature = "gstreamer_input")]
pub use self::video_source::VideoSource;

#[derive(Error, Debug)]
pub enum InputError {
  #[error("无法打开输入源: {0}")]
  SourceUnavailable(String),
  #[error("帧解码失败: {0}")]
  DecodeFailure(String),
  #[error("摄像头在 {0:?} 内未产出帧")]
  AcquisitionTimeout(Duration),
  #[error("URI 方案不支持: {0}")]
  UnsupportedScheme(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

/// 一帧输入
pub struct Frame {
  /// RGB 图像数据（原始尺寸）
  pub image: RgbImage,
  /// 帧序号
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

/// 输入源类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
  /// 静态图片
  Image,
  /// 视频文件
  Video,
  /// V4L2 摄像头
  Camera,
}

impl SourceKind {
  /// 多帧源上单帧解码失败可跳过，单帧源则为致命错误
  pub fn is_multi_frame(self) -> bool {
    !matches!(self, SourceKind::Image)
  }
}

/// 输入源
///
/// 拉取式迭代器：下一帧只在上一帧处理完后被请求，源自身不做缓冲。
/// 迭代结束（`None`）表示流耗尽；源句柄随 drop 释放。
pub trait InputSource: Iterator<Item = Result<Frame, InputError>> {
  fn kind(&self) -> SourceKind;

  fn width(&self) -> u32;

  fn height(&self) -> u32;

  fn fps(&self) -> Option<f64>;
}

/// 按 URI 方案打开输入源
///
/// - `image:///path/to/still.jpg`
/// - `video:///path/to/clip.mp4`（需要 `gstreamer_input` 特性）
/// - `camera:///dev/video0?width=640&height=480&timeout-ms=3000`
pub fn open_input(url: &Url) -> Result<Box<dyn InputSource>, InputError> {
  use crate::{FromUrl, FromUrlWithScheme};

  match url.scheme() {
    ImageSource::SCHEME => Ok(Box::new(ImageSource::from_url(url)?)),
    CameraSource::SCHEME => Ok(Box::new(CameraSource::from_url(url)?)),
    #[cfg(feature = "gstreamer_input")]
    VideoSource::SCHEME => Ok(Box::new(VideoSource::from_url(url)?)),
    other => Err(InputError::UnsupportedScheme(other.to_string())),
  }
}
