// 该文件是 Qianli （千里眼） 项目的一部分。
// src/detector/decode.rs - 原始输出行解码
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

use tracing::warn;

use crate::detector::{BoundingBox, Detection};
use crate::model::OutputTensor;

/// 一行原始输出中边界框占用的元素数（cx, cy, w, h）
pub(crate) const BOX_FIELDS: usize = 4;

/// 解码一行原始输出 `[cx, cy, w, h, s_1, ..., s_C]`
///
/// 坐标为相对网络输入的归一化值，按原始图像尺寸换算为绝对像素。
/// 类别取得分最高的索引，得分相同时先出现者胜出；全零或全负的
/// 得分也会落在索引 0 上，由后续置信度过滤淘汰。不做任何阈值判断。
pub fn decode_row(row: &[f32], width: f32, height: f32) -> Detection {
  let scores = &row[BOX_FIELDS..];

  let mut class_id = 0usize;
  let mut confidence = scores[0];
  for (idx, &score) in scores.iter().enumerate().skip(1) {
    if score > confidence {
      confidence = score;
      class_id = idx;
    }
  }

  let center_x = row[0] * width;
  let center_y = row[1] * height;
  let box_w = row[2] * width;
  let box_h = row[3] * height;

  Detection {
    bbox: BoundingBox {
      x: center_x - box_w / 2.0,
      y: center_y - box_h / 2.0,
      width: box_w,
      height: box_h,
    },
    class_id,
    confidence,
  }
}

/// 解码全部输出层的全部行
///
/// 每行恰好处理一次。行长不足 5 的输出层属于布局违例，整层跳过并告警。
pub fn decode_outputs(outputs: &[OutputTensor], width: f32, height: f32) -> Vec<Detection> {
  let mut candidates = Vec::new();

  for (layer, output) in outputs.iter().enumerate() {
    if output.row_len() <= BOX_FIELDS {
      warn!("输出层 {} 行长 {} 过短，跳过", layer, output.row_len());
      continue;
    }

    for row in output.rows() {
      candidates.push(decode_row(row, width, height));
    }
  }

  candidates
}
