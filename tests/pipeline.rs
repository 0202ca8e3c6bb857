// 该文件是 Qianli （千里眼） 项目的一部分。
// tests/pipeline.rs - 端到端集成测试
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

//! 回放引擎 + 图片输入 + 记录输出的完整链路测试，不依赖硬件。

use std::path::PathBuf;
use std::sync::Arc;

use image::{Rgb, RgbImage};
use url::Url;

use qianli::input::open_input;
use qianli::labels::ClassLabels;
use qianli::model::open_engine;
use qianli::output::open_output;
use qianli::pipeline::FramePipeline;
use qianli::stream::{CancelToken, StreamDriver, StreamState};

struct Workspace {
  dir: PathBuf,
}

impl Workspace {
  fn new(name: &str) -> Self {
    let dir = std::env::temp_dir().join(format!("qianli-e2e-{name}"));
    std::fs::create_dir_all(&dir).unwrap();
    Workspace { dir }
  }

  fn path(&self, file: &str) -> PathBuf {
    self.dir.join(file)
  }

  fn url(&self, scheme: &str, file: &str) -> Url {
    Url::parse(&format!("{}://{}", scheme, self.path(file).display())).unwrap()
  }
}

impl Drop for Workspace {
  fn drop(&mut self) {
    std::fs::remove_dir_all(&self.dir).ok();
  }
}

/// 两个类别、一条高置信度检测的回放描述
fn write_replay_model(ws: &Workspace, rows: &[f32], row_len: usize) -> Url {
  let class_count = row_len - 4;
  let model = serde_json::json!({
    "input_width": 32,
    "input_height": 32,
    "class_count": class_count,
    "outputs": [{ "row_len": row_len, "data": rows }],
  });
  let path = ws.path("model.json");
  std::fs::write(&path, serde_json::to_vec(&model).unwrap()).unwrap();
  Url::parse(&format!("replay://{}", path.display())).unwrap()
}

fn write_labels(ws: &Workspace, names: &[&str]) -> PathBuf {
  let path = ws.path("labels.names");
  std::fs::write(&path, names.join("\n")).unwrap();
  path
}

fn write_source_image(ws: &Workspace, width: u32, height: u32) -> Url {
  let image = RgbImage::from_pixel(width, height, Rgb([40, 80, 120]));
  let path = ws.path("input.png");
  image.save(&path).unwrap();
  ws.url("image", "input.png")
}

#[test]
fn replay_engine_through_record_output() {
  let ws = Workspace::new("record");

  let model_url = write_replay_model(
    &ws,
    &[
      0.5, 0.5, 0.2, 0.2, 0.9, 0.1, // 类别 0，保留
      0.5, 0.5, 0.21, 0.21, 0.0, 0.85, // 类别 1，与上框重叠但类别不同，保留
      0.1, 0.1, 0.05, 0.05, 0.3, 0.1, // 低置信度，过滤
    ],
    6,
  );
  let labels_path = write_labels(&ws, &["cat", "dog"]);
  let input_url = write_source_image(&ws, 100, 100);
  let output_url = ws.url("record", "detections.jsonl");

  let labels = Arc::new(ClassLabels::from_file(&labels_path).unwrap());
  let engine = open_engine(&model_url).unwrap();
  let pipeline = FramePipeline::new(engine, labels).unwrap();

  let source = open_input(&input_url).unwrap();
  let mut sink = open_output(&output_url, source.width(), source.height(), source.fps()).unwrap();

  let mut driver = StreamDriver::new(pipeline);
  let summary = driver
    .run(source, sink.as_mut(), &CancelToken::new())
    .unwrap();

  assert_eq!(driver.state(), StreamState::Exhausted);
  assert_eq!(summary.frames, 1);
  // 逐类 NMS：两个重叠但类别不同的框都要存活
  assert_eq!(summary.detections, 2);

  let contents = std::fs::read_to_string(ws.path("detections.jsonl")).unwrap();
  let record: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
  assert_eq!(record["detections"].as_array().unwrap().len(), 2);
}

#[test]
fn replay_engine_through_image_output() {
  let ws = Workspace::new("image");

  let model_url = write_replay_model(&ws, &[0.5, 0.5, 0.4, 0.4, 0.95], 5);
  let labels_path = write_labels(&ws, &["cat"]);
  let input_url = write_source_image(&ws, 64, 64);
  let output_url = ws.url("image", "annotated.png");

  let labels = Arc::new(ClassLabels::from_file(&labels_path).unwrap());
  let engine = open_engine(&model_url).unwrap();
  let pipeline = FramePipeline::new(engine, labels).unwrap();

  let source = open_input(&input_url).unwrap();
  let mut sink = open_output(&output_url, source.width(), source.height(), source.fps()).unwrap();

  StreamDriver::new(pipeline)
    .run(source, sink.as_mut(), &CancelToken::new())
    .unwrap();

  let annotated = image::open(ws.path("annotated.png")).unwrap().to_rgb8();
  assert_eq!(annotated.dimensions(), (64, 64));
  // 有检测时标注必须落在像素上
  let plain = RgbImage::from_pixel(64, 64, Rgb([40, 80, 120]));
  assert_ne!(annotated, plain);
}

#[test]
fn empty_model_output_leaves_image_unchanged() {
  let ws = Workspace::new("empty");

  let model = serde_json::json!({
    "input_width": 32,
    "input_height": 32,
    "class_count": 1,
    "outputs": [],
  });
  std::fs::write(ws.path("model.json"), serde_json::to_vec(&model).unwrap()).unwrap();
  let model_url = Url::parse(&format!("replay://{}", ws.path("model.json").display())).unwrap();

  let labels_path = write_labels(&ws, &["cat"]);
  let input_url = write_source_image(&ws, 48, 48);
  let output_url = ws.url("image", "annotated.png");

  let labels = Arc::new(ClassLabels::from_file(&labels_path).unwrap());
  let engine = open_engine(&model_url).unwrap();
  let pipeline = FramePipeline::new(engine, labels).unwrap();

  let source = open_input(&input_url).unwrap();
  let mut sink = open_output(&output_url, source.width(), source.height(), source.fps()).unwrap();

  let summary = StreamDriver::new(pipeline)
    .run(source, sink.as_mut(), &CancelToken::new())
    .unwrap();
  assert_eq!(summary.detections, 0);

  let annotated = image::open(ws.path("annotated.png")).unwrap().to_rgb8();
  let plain = RgbImage::from_pixel(48, 48, Rgb([40, 80, 120]));
  assert_eq!(annotated, plain);
}

#[test]
fn label_mismatch_fails_before_streaming() {
  let ws = Workspace::new("mismatch");

  let model_url = write_replay_model(&ws, &[0.5, 0.5, 0.2, 0.2, 0.9, 0.1], 6);
  let labels_path = write_labels(&ws, &["only-one"]);

  let labels = Arc::new(ClassLabels::from_file(&labels_path).unwrap());
  let engine = open_engine(&model_url).unwrap();
  assert!(FramePipeline::new(engine, labels).is_err());
}
