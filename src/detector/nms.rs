// 该文件是 Qianli （千里眼） 项目的一部分。
// src/detector/nms.rs - 非极大值抑制
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

use crate::detector::Detection;

/// 逐类别非极大值抑制
///
/// 按置信度降序（稳定排序，得分相同时保持输入顺序）贪心选取幸存者，
/// 剔除与幸存者同类且 IoU 严格大于阈值的后续候选。不同类别的重叠框
/// 互不抑制。空输入给出空输出，单个候选恒为幸存者。
pub fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
  candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let mut survivors = Vec::new();

  while !candidates.is_empty() {
    let best = candidates.remove(0);
    candidates
      .retain(|det| det.class_id != best.class_id || best.bbox.iou(&det.bbox) <= iou_threshold);
    survivors.push(best);
  }

  survivors
}
