// 该文件是 Qianli （千里眼） 项目的一部分。
// src/output/record_output.rs - 检测记录输出
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

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;
use url::Url;

use crate::labels::ClassLabels;
use crate::output::{OutputError, OutputWriter};
use crate::pipeline::ProcessedFrame;
use crate::{FromUrl, FromUrlWithScheme};

/// 检测记录输出
///
/// 把每帧的检测结果追加为一行 JSON（JSON Lines），不保存图像本身。
/// 查询参数 `always=1` 时空帧也记录，默认只记录有检测的帧。
pub struct RecordOutput {
  path: PathBuf,
  writer: BufWriter<File>,
  labels: Option<Arc<ClassLabels>>,
  always: bool,
  records: u64,
}

impl FromUrlWithScheme for RecordOutput {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::UnsupportedScheme(url.scheme().to_string()));
    }

    let always = url.query_pairs().any(|(k, _)| k == "always");
    Self::create(PathBuf::from(url.path()), always)
  }
}

impl RecordOutput {
  fn create(path: PathBuf, always: bool) -> Result<Self, OutputError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
      && !parent.exists()
    {
      std::fs::create_dir_all(parent)?;
    }

    let writer = BufWriter::new(File::create(&path)?);
    Ok(RecordOutput {
      path,
      writer,
      labels: None,
      always,
      records: 0,
    })
  }

  /// 附带名称表后记录里带类别名称，否则只有类别编号
  pub fn with_labels(mut self, labels: Arc<ClassLabels>) -> Self {
    self.labels = Some(labels);
    self
  }
}

impl OutputWriter for RecordOutput {
  fn write_frame(&mut self, frame: &ProcessedFrame) -> Result<(), OutputError> {
    if frame.detections.is_empty() && !self.always {
      return Ok(());
    }

    let detections: Vec<serde_json::Value> = frame
      .detections
      .iter()
      .map(|det| {
        let mut value = json!({
          "class_id": det.class_id,
          "confidence": det.confidence,
          "x": det.bbox.x,
          "y": det.bbox.y,
          "width": det.bbox.width,
          "height": det.bbox.height,
        });
        if let Some(labels) = &self.labels {
          value["class_name"] = json!(labels.name_or_unknown(det.class_id));
        }
        value
      })
      .collect();

    let record = json!({
      "recorded_at": Utc::now().to_rfc3339(),
      "frame_index": frame.index,
      "timestamp_ms": frame.timestamp_ms,
      "detections": detections,
    });

    writeln!(self.writer, "{}", record)?;
    self.records += 1;
    Ok(())
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    self.writer.flush()?;
    info!("检测记录完成: {} ({} 条)", self.path.display(), self.records);
    Ok(())
  }
}
