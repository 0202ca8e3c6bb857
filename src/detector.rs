// 该文件是 Qianli （千里眼） 项目的一部分。
// src/detector.rs - 检测结果类型定义
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

mod decode;
mod filter;
mod nms;

pub use self::decode::{decode_outputs, decode_row};
pub use self::filter::filter_confident;
pub use self::nms::non_max_suppression;

/// 轴对齐边界框
///
/// 坐标为原始图像的绝对像素，左上角加宽高。
/// 解码阶段允许坐标越过图像边界，渲染前再做裁剪。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
  /// 左上角 x 坐标
  pub x: f32,
  /// 左上角 y 坐标
  pub y: f32,
  /// 宽度
  pub width: f32,
  /// 高度
  pub height: f32,
}

impl BoundingBox {
  pub fn area(&self) -> f32 {
    self.width * self.height
  }

  /// 计算两个边界框的交并比
  ///
  /// 无重叠时为 0.0，完全重合时为 1.0；退化的零面积并集按 0.0 处理。
  pub fn iou(&self, other: &BoundingBox) -> f32 {
    let x1 = self.x.max(other.x);
    let y1 = self.y.max(other.y);
    let x2 = (self.x + self.width).min(other.x + other.width);
    let y2 = (self.y + self.height).min(other.y + other.height);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

/// 单个检测结果
///
/// 由解码器创建，经过滤与抑制后交给标注器，帧渲染完成即丢弃。
#[derive(Clone, Debug)]
pub struct Detection {
  /// 边界框（原始图像像素坐标）
  pub bbox: BoundingBox,
  /// 类别索引
  pub class_id: usize,
  /// 置信度
  pub confidence: f32,
}
