// 该文件是 Qianli （千里眼） 项目的一部分。
// src/output.rs - 结果输出
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

pub mod draw;

mod image_output;
#[cfg(feature = "record_output")]
mod record_output;
#[cfg(feature = "gstreamer_output")]
mod video_output;

pub use self::draw::Annotator;
pub use self::image_output::ImageOutput;
#[cfg(feature = "record_output")]
pub use self::record_output::RecordOutput;
#[cfg(feature = "gstreamer_output")]
pub use self::video_output::VideoOutput;

use thiserror::Error;
use url::Url;

use crate::pipeline::ProcessedFrame;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("URI 方案不支持: {0}")]
  UnsupportedScheme(String),
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("编码失败: {0}")]
  Encode(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

/// 输出写入器
///
/// 每帧调用一次 `write_frame`；流结束时必须调用 `finish` 落盘收尾。
pub trait OutputWriter {
  /// 写入一帧处理结果
  fn write_frame(&mut self, frame: &ProcessedFrame) -> Result<(), OutputError>;

  /// 完成写入
  fn finish(&mut self) -> Result<(), OutputError>;
}

/// 按 URI 方案创建输出写入器
///
/// - `image:///path/to/out.png`
/// - `video:///path/to/out.mp4`（需要 `gstreamer_output` 特性）
/// - `record:///path/to/detections.jsonl`（需要 `record_output` 特性）
pub fn open_output(
  url: &Url,
  width: u32,
  height: u32,
  fps: Option<f64>,
) -> Result<Box<dyn OutputWriter>, OutputError> {
  use crate::{FromUrl, FromUrlWithScheme};

  #[cfg(not(feature = "gstreamer_output"))]
  let _ = (width, height, fps);

  match url.scheme() {
    ImageOutput::SCHEME => Ok(Box::new(ImageOutput::from_url(url)?)),
    #[cfg(feature = "record_output")]
    RecordOutput::SCHEME => Ok(Box::new(RecordOutput::from_url(url)?)),
    #[cfg(feature = "gstreamer_output")]
    VideoOutput::SCHEME => Ok(Box::new(VideoOutput::open(
      url.path(),
      width,
      height,
      fps.unwrap_or(30.0),
    )?)),
    other => Err(OutputError::UnsupportedScheme(other.to_string())),
  }
}
