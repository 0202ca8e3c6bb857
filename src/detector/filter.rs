// 该文件是 Qianli （千里眼） 项目的一部分。
// src/detector/filter.rs - 候选框置信度过滤
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

/// 过滤低置信度候选框
///
/// 保留置信度严格大于阈值的候选，原有相对顺序不变。
pub fn filter_confident(candidates: Vec<Detection>, threshold: f32) -> Vec<Detection> {
  candidates
    .into_iter()
    .filter(|det| det.confidence > threshold)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detector::BoundingBox;

  fn det(confidence: f32) -> Detection {
    Detection {
      bbox: BoundingBox {
        x: 0.0,
        y: 0.0,
        width: 10.0,
        height: 10.0,
      },
      class_id: 0,
      confidence,
    }
  }

  #[test]
  fn comparison_is_strictly_greater_than() {
    let out = filter_confident(vec![det(0.5), det(0.51)], 0.5);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].confidence, 0.51);
  }

  #[test]
  fn relative_order_is_preserved() {
    let out = filter_confident(vec![det(0.9), det(0.6), det(0.8)], 0.5);
    let confidences: Vec<f32> = out.iter().map(|d| d.confidence).collect();
    assert_eq!(confidences, vec![0.9, 0.6, 0.8]);
  }

  #[test]
  fn empty_input_gives_empty_output() {
    assert!(filter_confident(Vec::new(), 0.5).is_empty());
  }

  #[test]
  fn raising_threshold_never_increases_survivors() {
    let candidates = vec![det(0.3), det(0.5), det(0.7), det(0.9)];
    let mut previous = usize::MAX;
    for threshold in [0.0, 0.25, 0.5, 0.75, 1.0] {
      let survivors = filter_confident(candidates.clone(), threshold).len();
      assert!(survivors <= previous);
      previous = survivors;
    }
  }
}
