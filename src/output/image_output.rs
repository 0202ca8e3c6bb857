// 该文件是 Qianli （千里眼） 项目的一部分。
// src/output/image_output.rs - 图片输出
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

use tracing::info;
use url::Url;

use crate::output::{OutputError, OutputWriter};
use crate::pipeline::ProcessedFrame;
use crate::{FromUrl, FromUrlWithScheme};

/// 图片输出
///
/// 把标注后的帧保存为图片文件，格式由扩展名决定。
/// 多帧输入时后写的帧覆盖先写的，留下最后一帧。
pub struct ImageOutput {
  path: PathBuf,
  frames_written: u64,
}

impl FromUrlWithScheme for ImageOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::UnsupportedScheme(url.scheme().to_string()));
    }

    let path = PathBuf::from(url.path());
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
      && !parent.exists()
    {
      std::fs::create_dir_all(parent)?;
    }

    Ok(ImageOutput {
      path,
      frames_written: 0,
    })
  }
}

impl OutputWriter for ImageOutput {
  fn write_frame(&mut self, frame: &ProcessedFrame) -> Result<(), OutputError> {
    frame.image.save(&self.path)?;
    self.frames_written += 1;
    Ok(())
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    info!("图片输出完成: {} ({} 帧)", self.path.display(), self.frames_written);
    Ok(())
  }
}
