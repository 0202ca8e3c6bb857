// 该文件是 Qianli （千里眼） 项目的一部分。
// src/output/draw.rs - 检测结果标注
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

use std::sync::Arc;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detector::Detection;
use crate::labels::ClassLabels;

/// 标签文字在框上方的偏移（像素）
const LABEL_OFFSET: i32 = 10;

/// 检测结果标注器
///
/// 在图像上绘制边界框与 `名称 置信度%` 标签。颜色按类别索引
/// 从 HSV 色环均匀取样，同类检测颜色一致。
pub struct Annotator {
  /// 类别名称表
  labels: Arc<ClassLabels>,
  /// 字体
  font: FontArc,
  /// 字体大小
  font_scale: PxScale,
  /// 边界框颜色映射
  colors: Vec<Rgb<u8>>,
}

impl Annotator {
  /// 创建一个新的标注器
  pub fn new(labels: Arc<ClassLabels>) -> Self {
    // 使用内置的默认字体数据
    let font_data = include_bytes!("../../assets/DejaVuSans.ttf");
    let font = FontArc::try_from_slice(font_data).expect("无法加载字体");

    let class_count = labels.len().max(1);
    let colors: Vec<Rgb<u8>> = (0..class_count)
      .map(|i| {
        let hue = (i as f32 / class_count as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      labels,
      font,
      font_scale: PxScale::from(16.0),
      colors,
    }
  }

  /// 在图像上绘制检测结果
  ///
  /// 越界的框裁剪到图像边界内；没有检测时图像保持原样。
  pub fn draw_detections(&self, image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
      let color = self.colors[detection.class_id % self.colors.len()];

      // 越过左/上边界的部分同时从宽高里扣掉，右/下边缘保持在原框上
      let clipped_width = detection.bbox.width + detection.bbox.x.min(0.0);
      let clipped_height = detection.bbox.height + detection.bbox.y.min(0.0);

      let x = detection.bbox.x.max(0.0) as i32;
      let y = detection.bbox.y.max(0.0) as i32;
      let width = clipped_width.min(image.width() as f32 - x as f32).max(0.0) as u32;
      let height = clipped_height.min(image.height() as f32 - y as f32).max(0.0) as u32;

      if width > 0 && height > 0 {
        let rect = Rect::at(x, y).of_size(width, height);
        draw_hollow_rect_mut(image, rect, color);

        // 绘制第二个边框以增加可见度
        if width > 2 && height > 2 {
          let inner_rect = Rect::at(x + 1, y + 1).of_size(width - 2, height - 2);
          draw_hollow_rect_mut(image, inner_rect, color);
        }
      }

      let label = format!(
        "{} {:.2}%",
        self.labels.name_or_unknown(detection.class_id),
        detection.confidence * 100.0
      );
      let text_y = (y - LABEL_OFFSET).max(0);

      draw_text_mut(image, color, x, text_y, self.font_scale, &self.font, &label);
    }
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detector::BoundingBox;

  fn annotator() -> Annotator {
    let labels = ClassLabels::from_names(vec!["cat".to_string(), "dog".to_string()]);
    Annotator::new(Arc::new(labels))
  }

  fn detection(x: f32, y: f32, w: f32, h: f32, class_id: usize) -> Detection {
    Detection {
      bbox: BoundingBox {
        x,
        y,
        width: w,
        height: h,
      },
      class_id,
      confidence: 0.9,
    }
  }

  #[test]
  fn no_detections_leaves_image_untouched() {
    let original = RgbImage::from_pixel(32, 32, Rgb([7, 7, 7]));
    let mut annotated = original.clone();
    annotator().draw_detections(&mut annotated, &[]);
    assert_eq!(original, annotated);
  }

  #[test]
  fn drawing_changes_pixels() {
    let original = RgbImage::from_pixel(64, 64, Rgb([0, 0, 0]));
    let mut annotated = original.clone();
    annotator().draw_detections(&mut annotated, &[detection(10.0, 20.0, 30.0, 20.0, 0)]);
    assert_ne!(original, annotated);
  }

  #[test]
  fn out_of_bounds_box_does_not_panic() {
    let mut image = RgbImage::new(32, 32);
    let detections = vec![
      detection(-10.0, -10.0, 100.0, 100.0, 0),
      detection(31.0, 31.0, 50.0, 50.0, 1),
      detection(100.0, 100.0, 10.0, 10.0, 0),
    ];
    annotator().draw_detections(&mut image, &detections);
  }

  #[test]
  fn left_clipped_box_keeps_its_right_edge() {
    let background = Rgb([0, 0, 0]);
    let mut image = RgbImage::from_pixel(150, 150, background);
    // 框 x=-10 宽 20，真实右边缘在 x=10；放低避开上方的标签文字
    annotator().draw_detections(&mut image, &[detection(-10.0, 120.0, 20.0, 10.0, 0)]);

    // 裁剪后的外框右边缘落在第 9 列
    assert_ne!(*image.get_pixel(9, 128), background);
    // 未扣掉越界量时边框会画到第 19 列
    assert_eq!(*image.get_pixel(19, 128), background);
  }

  #[test]
  fn unknown_class_uses_wrapped_color() {
    let mut image = RgbImage::new(32, 32);
    annotator().draw_detections(&mut image, &[detection(2.0, 2.0, 10.0, 10.0, 99)]);
  }

  #[test]
  fn hsv_primaries() {
    assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Rgb([255, 0, 0]));
    assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), Rgb([0, 255, 0]));
    assert_eq!(hsv_to_rgb(240.0, 1.0, 1.0), Rgb([0, 0, 255]));
  }
}
