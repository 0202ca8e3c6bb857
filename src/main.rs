// 该文件是 Qianli （千里眼） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use qianli::input::open_input;
use qianli::labels::ClassLabels;
use qianli::model::open_engine;
use qianli::output::open_output;
use qianli::pipeline::FramePipeline;
use qianli::stream::{CancelToken, StreamDriver};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型来源: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出目标: {}", args.output);
  info!("置信度阈值: {}", args.confidence);
  info!("NMS 阈值: {}", args.nms_threshold);

  let labels = Arc::new(
    ClassLabels::from_file(&args.labels)
      .with_context(|| format!("无法加载名称表 {}", args.labels.display()))?,
  );
  info!("名称表已加载: {} 个类别", labels.len());

  let engine = open_engine(&args.model).context("无法打开推理引擎")?;
  info!(
    "推理引擎就绪: 输入 {}x{}, {} 个类别",
    engine.input_width(),
    engine.input_height(),
    engine.class_count()
  );

  let pipeline = FramePipeline::new(engine, labels)
    .context("流水线创建失败")?
    .with_confidence_threshold(args.confidence)
    .with_iou_threshold(args.nms_threshold);

  let source = open_input(&args.input).context("无法打开输入源")?;
  info!(
    "输入源已打开: {:?} {}x{}",
    source.kind(),
    source.width(),
    source.height()
  );

  let mut sink = open_output(&args.output, source.width(), source.height(), source.fps())
    .context("无法创建输出")?;

  let cancel = CancelToken::new();
  {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || {
      info!("收到 Ctrl-C，停止中...");
      cancel.cancel();
    })
    .context("无法注册 Ctrl-C 处理器")?;
  }

  let mut driver = StreamDriver::new(pipeline).with_policy(args.on_inference_error.into());
  if let Some(max_frames) = args.max_frames {
    driver = driver.with_max_frames(max_frames);
  }

  let summary = driver.run(source, sink.as_mut(), &cancel)?;

  info!(
    "处理完成: {} 帧, {} 跳过, {} 条检测 -> {}",
    summary.frames, summary.skipped, summary.detections, args.output
  );

  Ok(())
}
