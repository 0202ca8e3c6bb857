// 该文件是 Qianli （千里眼） 项目的一部分。
// src/input/image_source.rs - 图片输入源
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

use image::{ImageReader, RgbImage};
use url::Url;

use crate::input::{Frame, InputError, InputSource, SourceKind};
use crate::{FromUrl, FromUrlWithScheme};

/// 静态图片输入源
///
/// 打开即解码，恰好产出一帧。JPEG 与 PNG 由 `image` 特性保证，
/// 其余格式随 `image` crate 的默认解码器。
pub struct ImageSource {
  image: Option<RgbImage>,
  width: u32,
  height: u32,
}

impl FromUrlWithScheme for ImageSource {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageSource {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::UnsupportedScheme(url.scheme().to_string()));
    }

    let path = url.path();
    let image = ImageReader::open(path)
      .map_err(|e| InputError::SourceUnavailable(format!("{}: {}", path, e)))?
      .decode()
      .map_err(|e| InputError::DecodeFailure(format!("{}: {}", path, e)))?
      .to_rgb8();

    let width = image.width();
    let height = image.height();

    Ok(ImageSource {
      image: Some(image),
      width,
      height,
    })
  }
}

impl Iterator for ImageSource {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take().map(|image| {
      Ok(Frame {
        image,
        index: 0,
        timestamp_ms: 0,
      })
    })
  }
}

impl InputSource for ImageSource {
  fn kind(&self) -> SourceKind {
    SourceKind::Image
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    None
  }
}
