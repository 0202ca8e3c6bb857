// 该文件是 Qianli （千里眼） 项目的一部分。
// src/input/camera_source.rs - V4L2 摄像头输入源
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

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::{info, warn};
use url::Url;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::input::{Frame, InputError, InputSource, SourceKind};
use crate::{FromUrl, FromUrlWithScheme};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_TIMEOUT_MS: u64 = 3000;
const CAPTURE_BUFFERS: u32 = 4;

/// V4L2 摄像头输入源
///
/// 设备与捕获流由一个采集线程独占持有，帧事件经容量为 1 的同步通道
/// 送回，天然形成背压：上一帧处理完之前最多只有一帧在途。设备打开
/// 与每次取帧都受有界超时约束，超时即显式报错而不是挂起。
pub struct CameraSource {
  rx: mpsc::Receiver<CaptureEvent>,
  stop: Arc<AtomicBool>,
  worker: Option<JoinHandle<()>>,
  width: u32,
  height: u32,
  fps: u32,
  timeout: Duration,
  frame_index: u64,
  start_time: Instant,
  failed: bool,
}

enum CaptureEvent {
  Frame(RgbImage),
  Error(InputError),
}

struct CameraConfig {
  device_path: String,
  width: u32,
  height: u32,
  fps: u32,
}

impl FromUrlWithScheme for CameraSource {
  const SCHEME: &'static str = "camera";
}

impl FromUrl for CameraSource {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::UnsupportedScheme(url.scheme().to_string()));
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let config = CameraConfig {
      device_path: url.path().to_string(),
      width: query
        .get("width")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_WIDTH),
      height: query
        .get("height")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_HEIGHT),
      fps: query.get("fps").and_then(|v| v.parse().ok()).unwrap_or(30),
    };
    let timeout = Duration::from_millis(
      query
        .get("timeout-ms")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT_MS),
    );

    Self::open(config, timeout)
  }
}

impl CameraSource {
  fn open(config: CameraConfig, timeout: Duration) -> Result<Self, InputError> {
    let stop = Arc::new(AtomicBool::new(false));
    // 容量 1：采集线程最多超前一帧，处理完才拉下一帧
    let (tx, rx) = mpsc::sync_channel(1);
    // v4l 的 Stream 持有 mmap 指针不可跨线程传递，设备在采集线程内打开，
    // 打开结果经一次性通道送回
    let (ready_tx, ready_rx) = mpsc::sync_channel(1);

    let fps = config.fps;
    let worker = {
      let stop = stop.clone();
      std::thread::spawn(move || capture_loop(config, tx, ready_tx, stop))
    };

    let (width, height) = match ready_rx.recv_timeout(timeout) {
      Ok(Ok(dims)) => dims,
      Ok(Err(e)) => return Err(e),
      Err(_) => return Err(InputError::AcquisitionTimeout(timeout)),
    };

    info!("摄像头已打开: {}x{} @ {} fps", width, height, fps);

    Ok(CameraSource {
      rx,
      stop,
      worker: Some(worker),
      width,
      height,
      fps,
      timeout,
      frame_index: 0,
      start_time: Instant::now(),
      failed: false,
    })
  }
}

fn capture_loop(
  config: CameraConfig,
  tx: SyncSender<CaptureEvent>,
  ready_tx: SyncSender<Result<(u32, u32), InputError>>,
  stop: Arc<AtomicBool>,
) {
  let (device, width, height) = match open_device(&config) {
    Ok(opened) => opened,
    Err(e) => {
      let _ = ready_tx.send(Err(e));
      return;
    }
  };

  let mut stream = match Stream::with_buffers(&device, Type::VideoCapture, CAPTURE_BUFFERS) {
    Ok(stream) => stream,
    Err(e) => {
      let _ = ready_tx.send(Err(InputError::SourceUnavailable(format!(
        "{}: 无法创建捕获流: {}",
        config.device_path, e
      ))));
      return;
    }
  };

  if ready_tx.send(Ok((width, height))).is_err() {
    return;
  }

  while !stop.load(Ordering::Relaxed) {
    let event = match stream.next() {
      Ok((buffer, _meta)) => match RgbImage::from_raw(width, height, yuyv_to_rgb(buffer)) {
        Some(image) => CaptureEvent::Frame(image),
        None => CaptureEvent::Error(InputError::DecodeFailure(
          "YUYV 缓冲区尺寸与协商格式不符".to_string(),
        )),
      },
      Err(e) => CaptureEvent::Error(InputError::SourceUnavailable(format!(
        "{}: 捕获失败: {}",
        config.device_path, e
      ))),
    };

    let fatal = matches!(&event, CaptureEvent::Error(InputError::SourceUnavailable(_)));

    if !deliver(&tx, event) {
      break;
    }

    if fatal {
      break;
    }
  }
}

/// 把采集事件送往消费侧，通道断开时返回 false
///
/// 帧可丢：接收方尚未消费上一帧时放弃当前帧，保持只处理最新画面。
/// 错误不可丢：阻塞等待通道腾出位置，消费侧 drop 时会清空通道，
/// 不会死锁。
fn deliver(tx: &SyncSender<CaptureEvent>, event: CaptureEvent) -> bool {
  match event {
    CaptureEvent::Frame(_) => !matches!(tx.try_send(event), Err(TrySendError::Disconnected(_))),
    CaptureEvent::Error(_) => tx.send(event).is_ok(),
  }
}

fn open_device(config: &CameraConfig) -> Result<(Device, u32, u32), InputError> {
  let device = Device::with_path(&config.device_path).map_err(|e| {
    InputError::SourceUnavailable(format!("{}: {}", config.device_path, e))
  })?;

  let mut format = device.format().map_err(|e| {
    InputError::SourceUnavailable(format!("{}: 无法读取格式: {}", config.device_path, e))
  })?;
  format.width = config.width;
  format.height = config.height;
  format.fourcc = FourCC::new(b"YUYV");

  let format = device.set_format(&format).map_err(|e| {
    InputError::SourceUnavailable(format!("{}: 无法设置格式: {}", config.device_path, e))
  })?;

  if format.fourcc != FourCC::new(b"YUYV") {
    return Err(InputError::SourceUnavailable(format!(
      "{}: 设备不支持 YUYV，协商结果为 {}",
      config.device_path, format.fourcc
    )));
  }

  if format.width != config.width || format.height != config.height {
    warn!(
      "摄像头分辨率协商为 {}x{}（请求 {}x{}）",
      format.width, format.height, config.width, config.height
    );
  }

  Ok((device, format.width, format.height))
}

/// YUYV (YUV 4:2:2) 转 RGB，BT.601 系数
fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
  let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);

  for chunk in yuyv.chunks_exact(4) {
    let y0 = chunk[0] as f32;
    let u = chunk[1] as f32 - 128.0;
    let y1 = chunk[2] as f32;
    let v = chunk[3] as f32 - 128.0;

    for y in [y0, y1] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb
}

impl Drop for CameraSource {
  fn drop(&mut self) {
    self.stop.store(true, Ordering::Relaxed);
    // 清空通道让采集线程从阻塞的 send 返回
    while self.rx.try_recv().is_ok() {}
    if let Some(worker) = self.worker.take() {
      let _ = worker.join();
    }
  }
}

impl Iterator for CameraSource {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.failed {
      return None;
    }

    match self.rx.recv_timeout(self.timeout) {
      Ok(CaptureEvent::Frame(image)) => {
        let frame = Frame {
          image,
          index: self.frame_index,
          timestamp_ms: self.start_time.elapsed().as_millis() as u64,
        };
        self.frame_index += 1;
        Some(Ok(frame))
      }
      Ok(CaptureEvent::Error(e)) => {
        if matches!(e, InputError::SourceUnavailable(_)) {
          self.failed = true;
        }
        Some(Err(e))
      }
      Err(RecvTimeoutError::Timeout) => {
        self.failed = true;
        Some(Err(InputError::AcquisitionTimeout(self.timeout)))
      }
      Err(RecvTimeoutError::Disconnected) => None,
    }
  }
}

impl InputSource for CameraSource {
  fn kind(&self) -> SourceKind {
    SourceKind::Camera
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    Some(self.fps as f64)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yuyv_conversion_handles_grey_midpoint() {
    // Y=128, U=V=128 是中性灰，两个像素同值
    let rgb = yuyv_to_rgb(&[128, 128, 128, 128]);
    assert_eq!(rgb, vec![128, 128, 128, 128, 128, 128]);
  }

  #[test]
  fn yuyv_conversion_ignores_trailing_bytes() {
    let rgb = yuyv_to_rgb(&[128, 128, 128, 128, 0, 0]);
    assert_eq!(rgb.len(), 6);
  }

  #[test]
  fn fatal_error_behind_a_buffered_frame_is_not_lost() {
    let (tx, rx) = mpsc::sync_channel(1);
    // 通道里还压着一帧未消费
    tx.try_send(CaptureEvent::Frame(RgbImage::new(2, 2))).unwrap();

    let producer = std::thread::spawn(move || {
      deliver(
        &tx,
        CaptureEvent::Error(InputError::SourceUnavailable("设备断开".to_string())),
      )
    });

    assert!(matches!(rx.recv().unwrap(), CaptureEvent::Frame(_)));
    assert!(matches!(
      rx.recv().unwrap(),
      CaptureEvent::Error(InputError::SourceUnavailable(_))
    ));
    assert!(producer.join().unwrap());
  }

  #[test]
  fn frames_are_dropped_when_consumer_lags() {
    let (tx, rx) = mpsc::sync_channel(1);
    assert!(deliver(&tx, CaptureEvent::Frame(RgbImage::new(2, 2))));
    // 满载时帧被放弃而不是阻塞
    assert!(deliver(&tx, CaptureEvent::Frame(RgbImage::new(2, 2))));
    assert!(matches!(rx.recv().unwrap(), CaptureEvent::Frame(_)));
    assert!(rx.try_recv().is_err());
  }

  #[test]
  fn missing_device_fails_instead_of_hanging() {
    let url = Url::parse("camera:///dev/video-does-not-exist?timeout-ms=500").unwrap();
    let started = Instant::now();
    let result = CameraSource::from_url(&url);
    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(5));
  }
}
