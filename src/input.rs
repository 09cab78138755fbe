// 该文件是 Tanzhao （探照） 项目的一部分。
// src/input.rs - 窗口/设备帧输入
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

use std::{path::PathBuf, time::Instant};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{FromUrl, config::CaptureConfig, frame::Frame};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("未找到窗口: {0}")]
  WindowNotFound(String),
  #[error("窗口已失效: {0}")]
  WindowClosed(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("设备错误: {0}")]
  DeviceError(String),
  #[error("没有可读取的图像: {0}")]
  EmptySequence(PathBuf),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("URI 缺少窗口名称")]
  MissingWindowName,
}

/// 视频/摄像头设备
///
/// `read` 返回 `Ok(None)` 表示本次读到空帧（设备未就绪或媒体已结束）。
pub trait CaptureDevice {
  fn read(&mut self) -> Result<Option<RgbImage>, InputError>;
  fn is_opened(&self) -> bool;
  fn release(&mut self);
}

/// 已定位的窗口，每次 `capture` 都重新抓取
pub trait WindowCapture {
  fn title(&self) -> &str;
  fn capture(&mut self) -> Result<RgbImage, InputError>;
}

/// 按名称片段查找窗口
pub trait WindowLocator {
  type Window: WindowCapture + 'static;

  fn find_window(&self, partial_name: &str) -> Option<Self::Window>;
}

enum SourceMode {
  Window {
    window: Box<dyn WindowCapture>,
    // 最近一次成功抓取的画面，抓取失败但窗口仍有效时复用
    last: Option<RgbImage>,
  },
  Device {
    device: Box<dyn CaptureDevice>,
    attempts: u32,
  },
}

/// 帧输入源，构造时确定窗口模式或设备模式
pub struct FrameSource {
  mode: SourceMode,
  index: u64,
  opened_at: Instant,
}

impl FrameSource {
  pub fn from_window(window: impl WindowCapture + 'static) -> Self {
    info!("输入源: 窗口 {}", window.title());
    Self::with_mode(SourceMode::Window {
      window: Box::new(window),
      last: None,
    })
  }

  /// 查找窗口并创建输入源，找不到时返回 [`InputError::WindowNotFound`]
  pub fn find_window<L: WindowLocator>(locator: &L, partial_name: &str) -> Result<Self, InputError> {
    match locator.find_window(partial_name) {
      Some(window) => Ok(Self::from_window(window)),
      None => {
        error!("未找到窗口: {}", partial_name);
        Err(InputError::WindowNotFound(partial_name.to_string()))
      }
    }
  }

  pub fn from_device(device: impl CaptureDevice + 'static, config: &CaptureConfig) -> Self {
    info!("输入源: 采集设备, 单帧最多读取 {} 次", config.attempts);
    Self::with_mode(SourceMode::Device {
      device: Box::new(device),
      attempts: config.attempts.max(1),
    })
  }

  fn with_mode(mode: SourceMode) -> Self {
    Self {
      mode,
      index: 0,
      opened_at: Instant::now(),
    }
  }

  pub fn is_window(&self) -> bool {
    matches!(self.mode, SourceMode::Window { .. })
  }

  /// 获取下一帧，返回空帧表示没有更多输入
  pub fn update(&mut self) -> Frame {
    let image = match &mut self.mode {
      SourceMode::Window { window, last } => capture_window(window.as_mut(), last),
      SourceMode::Device { device, attempts } => read_with_retry(device.as_mut(), *attempts),
    };

    match image {
      Some(image) if image.width() > 0 && image.height() > 0 => {
        let frame = Frame::new(
          image,
          self.index,
          self.opened_at.elapsed().as_millis() as u64,
        );
        self.index += 1;
        frame
      }
      _ => Frame::empty(),
    }
  }
}

/// 窗口失效时返回 `None`；其他抓取错误返回上一帧（没有上一帧时为 `None`）
fn capture_window(window: &mut dyn WindowCapture, last: &mut Option<RgbImage>) -> Option<RgbImage> {
  match window.capture() {
    Ok(image) if image.width() > 0 && image.height() > 0 => {
      *last = Some(image.clone());
      Some(image)
    }
    Ok(_) => {
      warn!("窗口 {} 抓取到空画面, 沿用上一帧", window.title());
      last.clone()
    }
    Err(InputError::WindowClosed(title)) => {
      warn!("窗口已失效: {}", title);
      *last = None;
      None
    }
    Err(e) => {
      warn!("窗口 {} 抓取失败, 沿用上一帧: {}", window.title(), e);
      last.clone()
    }
  }
}

fn read_with_retry(device: &mut dyn CaptureDevice, attempts: u32) -> Option<RgbImage> {
  for attempt in 1..=attempts {
    match device.read() {
      Ok(Some(image)) if image.width() > 0 && image.height() > 0 => return Some(image),
      Ok(_) => debug!("第 {} 次读取得到空帧", attempt),
      Err(e) => warn!("第 {} 次读取失败: {}", attempt, e),
    }
  }
  debug!("连续 {} 次读取均为空帧", attempts);
  None
}

impl Iterator for FrameSource {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    let frame = self.update();
    if frame.is_empty() { None } else { Some(frame) }
  }
}

impl Drop for FrameSource {
  fn drop(&mut self) {
    if let SourceMode::Device { device, .. } = &mut self.mode
      && device.is_opened()
    {
      info!("释放采集设备");
      device.release();
    }
  }
}

/// 由 URI 描述的输入源
///
/// - `window://<窗口名称片段>?dir=<快照目录>`
/// - `folder:///path/to/frames`
/// - `image:///path/to/frame.png`
/// - `v4l:///dev/video0`
#[derive(Debug, Clone, PartialEq)]
pub enum InputSpec {
  Window { name: String, snapshots: PathBuf },
  Folder(PathBuf),
  Image(PathBuf),
  V4l(PathBuf),
}

impl FromUrl for InputSpec {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      "window" => {
        let raw = url.host_str().ok_or(InputError::MissingWindowName)?;
        let name = urlencoding::decode(raw)
          .map_err(|_| InputError::MissingWindowName)?
          .into_owned();
        let snapshots = url
          .query_pairs()
          .find(|(k, _)| k == "dir")
          .map(|(_, v)| PathBuf::from(v.as_ref()))
          .unwrap_or_else(|| PathBuf::from("."));
        Ok(InputSpec::Window { name, snapshots })
      }
      "folder" => Ok(InputSpec::Folder(PathBuf::from(url.path()))),
      "image" => Ok(InputSpec::Image(PathBuf::from(url.path()))),
      "v4l" => {
        let path = if url.path().is_empty() {
          "/dev/video0"
        } else {
          url.path()
        };
        Ok(InputSpec::V4l(PathBuf::from(path)))
      }
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl InputSpec {
  pub fn open(&self, config: &CaptureConfig) -> Result<FrameSource, InputError> {
    match self {
      InputSpec::Window { name, snapshots } => {
        FrameSource::find_window(&SnapshotWindows::new(snapshots), name)
      }
      InputSpec::Folder(path) | InputSpec::Image(path) => Ok(FrameSource::from_device(
        ImageSequenceDevice::open(path)?,
        config,
      )),
      #[cfg(feature = "v4l_input")]
      InputSpec::V4l(path) => Ok(FrameSource::from_device(V4lDevice::open(path)?, config)),
      #[cfg(not(feature = "v4l_input"))]
      InputSpec::V4l(_) => Err(InputError::DeviceError(
        "未启用 v4l_input 特性".to_string(),
      )),
    }
  }
}

mod image_sequence;
mod snapshot_window;
pub use self::image_sequence::ImageSequenceDevice;
pub use self::snapshot_window::{SnapshotWindow, SnapshotWindows};

#[cfg(feature = "v4l_input")]
mod v4l_device;
#[cfg(feature = "v4l_input")]
pub use self::v4l_device::V4lDevice;

#[cfg(test)]
mod tests {
  use super::*;
  use std::{
    cell::Cell,
    collections::VecDeque,
    rc::Rc,
  };

  /// 按脚本返回帧的模拟设备
  struct ScriptedDevice {
    script: VecDeque<Option<RgbImage>>,
    reads: Rc<Cell<usize>>,
    released: Rc<Cell<bool>>,
  }

  impl ScriptedDevice {
    fn new(empties: usize, then_frame: bool) -> Self {
      let mut script: VecDeque<Option<RgbImage>> = (0..empties).map(|_| None).collect();
      if then_frame {
        script.push_back(Some(RgbImage::new(4, 3)));
      }
      Self {
        script,
        reads: Rc::new(Cell::new(0)),
        released: Rc::new(Cell::new(false)),
      }
    }
  }

  impl CaptureDevice for ScriptedDevice {
    fn read(&mut self) -> Result<Option<RgbImage>, InputError> {
      self.reads.set(self.reads.get() + 1);
      Ok(self.script.pop_front().flatten())
    }

    fn is_opened(&self) -> bool {
      !self.released.get()
    }

    fn release(&mut self) {
      self.released.set(true);
    }
  }

  struct FlakyWindow {
    captures: usize,
    closed_after: usize,
  }

  impl WindowCapture for FlakyWindow {
    fn title(&self) -> &str {
      "flaky"
    }

    fn capture(&mut self) -> Result<RgbImage, InputError> {
      self.captures += 1;
      if self.captures > self.closed_after {
        Err(InputError::WindowClosed("flaky".to_string()))
      } else {
        Ok(RgbImage::new(8, 6))
      }
    }
  }

  struct NoWindows;

  impl WindowLocator for NoWindows {
    type Window = FlakyWindow;

    fn find_window(&self, _partial_name: &str) -> Option<Self::Window> {
      None
    }
  }

  #[test]
  fn device_frame_on_last_allowed_attempt_is_returned() {
    let device = ScriptedDevice::new(19, true);
    let reads = device.reads.clone();
    let mut source = FrameSource::from_device(device, &CaptureConfig::default());

    let frame = source.update();
    assert!(!frame.is_empty());
    assert_eq!(frame.width(), 4);
    assert_eq!(reads.get(), 20);
  }

  #[test]
  fn device_gives_up_after_retry_bound() {
    let device = ScriptedDevice::new(21, true);
    let reads = device.reads.clone();
    let mut source = FrameSource::from_device(device, &CaptureConfig::default());

    assert!(source.update().is_empty());
    assert_eq!(reads.get(), 20);
  }

  /// 前 `errors` 次读取报错，之后返回一帧
  struct GlitchyDevice {
    errors: usize,
    reads: Rc<Cell<usize>>,
  }

  impl CaptureDevice for GlitchyDevice {
    fn read(&mut self) -> Result<Option<RgbImage>, InputError> {
      self.reads.set(self.reads.get() + 1);
      if self.reads.get() <= self.errors {
        Err(InputError::DeviceError("glitch".to_string()))
      } else {
        Ok(Some(RgbImage::new(5, 5)))
      }
    }

    fn is_opened(&self) -> bool {
      true
    }

    fn release(&mut self) {}
  }

  #[test]
  fn device_read_errors_count_towards_retry_bound() {
    let reads = Rc::new(Cell::new(0));
    let device = GlitchyDevice {
      errors: usize::MAX,
      reads: reads.clone(),
    };
    let mut source = FrameSource::from_device(device, &CaptureConfig { attempts: 3 });

    assert!(source.update().is_empty());
    assert_eq!(reads.get(), 3);
  }

  #[test]
  fn device_frame_after_read_errors_is_returned() {
    let reads = Rc::new(Cell::new(0));
    let device = GlitchyDevice {
      errors: 19,
      reads: reads.clone(),
    };
    let mut source = FrameSource::from_device(device, &CaptureConfig::default());

    let frame = source.update();
    assert_eq!(frame.width(), 5);
    assert_eq!(reads.get(), 20);
  }

  #[test]
  fn device_is_released_on_drop() {
    let device = ScriptedDevice::new(0, true);
    let released = device.released.clone();
    let source = FrameSource::from_device(device, &CaptureConfig::default());

    assert!(!released.get());
    drop(source);
    assert!(released.get());
  }

  #[test]
  fn frames_are_indexed_in_capture_order() {
    let mut source = FrameSource::from_window(FlakyWindow {
      captures: 0,
      closed_after: 3,
    });
    let indices: Vec<u64> = source.by_ref().map(|frame| frame.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert!(source.is_window());
  }

  #[test]
  fn closed_window_yields_empty_frame() {
    let mut source = FrameSource::from_window(FlakyWindow {
      captures: 0,
      closed_after: 0,
    });
    assert!(source.update().is_empty());
  }

  /// 按脚本依次返回抓取结果
  struct ScriptedWindow {
    script: VecDeque<Result<RgbImage, InputError>>,
  }

  impl WindowCapture for ScriptedWindow {
    fn title(&self) -> &str {
      "scripted"
    }

    fn capture(&mut self) -> Result<RgbImage, InputError> {
      self
        .script
        .pop_front()
        .unwrap_or_else(|| Err(InputError::WindowClosed("scripted".to_string())))
    }
  }

  #[test]
  fn transient_window_error_reuses_last_frame() {
    let mut source = FrameSource::from_window(ScriptedWindow {
      script: VecDeque::from([
        Ok(RgbImage::from_pixel(3, 2, image::Rgb([9, 9, 9]))),
        Err(InputError::DeviceError("truncated snapshot".to_string())),
        Ok(RgbImage::new(0, 0)),
      ]),
    });

    let first = source.update();
    let stale = source.update();
    assert!(!stale.is_empty());
    assert_eq!(stale.image, first.image);
    assert_eq!(stale.index, 1);

    assert_eq!(source.update().image, first.image);
    assert!(source.update().is_empty());
  }

  #[test]
  fn window_error_before_first_capture_yields_empty_frame() {
    let mut source = FrameSource::from_window(ScriptedWindow {
      script: VecDeque::from([Err(InputError::DeviceError("busy".to_string()))]),
    });
    assert!(source.update().is_empty());
  }

  #[test]
  fn missing_window_is_reported_with_name() {
    let result = FrameSource::find_window(&NoWindows, "Counter");
    assert!(matches!(result, Err(InputError::WindowNotFound(name)) if name == "Counter"));
  }

  #[test]
  fn input_spec_parses_supported_schemes() {
    let spec = InputSpec::from_url(&Url::parse("window://Counter%20Strike?dir=/tmp/shots").unwrap())
      .unwrap();
    assert_eq!(
      spec,
      InputSpec::Window {
        name: "Counter Strike".to_string(),
        snapshots: PathBuf::from("/tmp/shots"),
      }
    );

    let spec = InputSpec::from_url(&Url::parse("folder:///data/frames").unwrap()).unwrap();
    assert_eq!(spec, InputSpec::Folder(PathBuf::from("/data/frames")));

    let spec = InputSpec::from_url(&Url::parse("v4l:///dev/video2").unwrap()).unwrap();
    assert_eq!(spec, InputSpec::V4l(PathBuf::from("/dev/video2")));

    assert!(matches!(
      InputSpec::from_url(&Url::parse("rtsp://camera/stream").unwrap()),
      Err(InputError::SchemeMismatch(_))
    ));
  }
}
