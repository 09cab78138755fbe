// 该文件是 Tanzhao （探照） 项目的一部分。
// src/task.rs - 帧循环任务
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

use std::{
  sync::mpsc::Receiver,
  time::{Duration, Instant},
};

use anyhow::Context;
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::{
  config::DEFAULT_QUIT_KEY,
  frame::Frame,
  model::{DetectResult, Model},
  output::{PredictionRecorder, Render, annotate::Annotator, transform::RegionTransform},
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<TaskSummary, Self::Error>;
}

const INITIAL_FRAME_RATE: f64 = 30.0;
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// 一次帧率采样：平均每帧耗时（毫秒）与平滑后的帧率
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
  pub average_ms: f64,
  pub rate: f64,
}

/// 指数平滑的帧率统计
///
/// 累计耗时超过一秒时：`rate = 0.5 * frames + 0.5 * rate`，帧数清零，
/// 累计耗时减去一秒（不清零）。
#[derive(Debug, Clone)]
pub struct FrameRate {
  frames: u32,
  rate: f64,
  accumulated: Duration,
}

impl Default for FrameRate {
  fn default() -> Self {
    Self {
      frames: 0,
      rate: INITIAL_FRAME_RATE,
      accumulated: Duration::ZERO,
    }
  }
}

impl FrameRate {
  pub fn rate(&self) -> f64 {
    self.rate
  }

  /// 记录一帧的耗时，满一个统计窗口时返回采样
  pub fn tick(&mut self, elapsed: Duration) -> Option<RateSample> {
    self.accumulated += elapsed;
    self.frames += 1;

    if self.accumulated <= RATE_WINDOW {
      return None;
    }

    self.rate = self.frames as f64 * 0.5 + self.rate * 0.5;
    self.frames = 0;
    self.accumulated -= RATE_WINDOW;
    let average_ms = 1000.0 / if self.rate == 0.0 { 0.001 } else { self.rate };

    Some(RateSample {
      average_ms,
      rate: self.rate,
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
  /// 输入源返回空帧
  Exhausted,
  QuitKey,
  Interrupted,
  FrameLimit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskSummary {
  pub frames: u64,
  pub detections: usize,
  pub rate: f64,
  pub reason: StopReason,
}

/// 连续处理帧，直到输入耗尽、按下退出键、收到中断或达到帧数上限
pub struct ContinuousTask {
  annotator: Annotator,
  transform: Option<Box<dyn RegionTransform>>,
  recorder: Option<PredictionRecorder>,
  frame_number: Option<usize>,
  quit_key: u32,
  stop: Option<Receiver<()>>,
}

impl ContinuousTask {
  pub fn new(annotator: Annotator) -> Self {
    Self {
      annotator,
      transform: None,
      recorder: None,
      frame_number: None,
      quit_key: DEFAULT_QUIT_KEY,
      stop: None,
    }
  }

  /// 不设置时画边框，设置后用变换结果替换检测区域
  pub fn with_transform(mut self, transform: Option<Box<dyn RegionTransform>>) -> Self {
    self.transform = transform;
    self
  }

  pub fn with_recorder(mut self, recorder: Option<PredictionRecorder>) -> Self {
    self.recorder = recorder;
    self
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_quit_key(mut self, quit_key: u32) -> Self {
    self.quit_key = quit_key;
    self
  }

  /// 每帧结束时检查一次，收到消息即退出
  pub fn with_stop_signal(mut self, stop: Receiver<()>) -> Self {
    self.stop = Some(stop);
    self
  }

  fn annotate(&self, image: &mut RgbImage, result: &DetectResult) {
    match &self.transform {
      Some(transform) => self
        .annotator
        .draw_with(image, &result.items, transform.as_ref()),
      None => self.annotator.draw(image, &result.items),
    }
  }

  fn should_stop(&self, processed: u64) -> Option<StopReason> {
    if let Some(stop) = &self.stop
      && stop.try_recv().is_ok()
    {
      warn!("中断信号接收，退出任务循环");
      return Some(StopReason::Interrupted);
    }
    if let Some(n) = self.frame_number
      && processed >= n as u64
    {
      info!("达到指定帧数 {}, 退出任务循环", n);
      return Some(StopReason::FrameLimit);
    }
    None
  }
}

impl<I, M, O, ME, RE> Task<I, M, O> for ContinuousTask
where
  I: Iterator<Item = Frame>,
  M: Model<Input = RgbImage, Output = DetectResult, Error = ME>,
  O: Render<Error = RE>,
  ME: std::error::Error + Send + Sync + 'static,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, mut output: O) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let mut frame_rate = FrameRate::default();
    let mut processed = 0u64;
    let mut detections = 0usize;
    let mut reason = StopReason::Exhausted;

    for mut frame in input {
      let begin = Instant::now();
      debug!(
        "处理第 {} 帧图像 ({}x{}, {} ms)",
        frame.index,
        frame.width(),
        frame.height(),
        frame.timestamp_ms
      );

      let result = model
        .infer(&frame.image)
        .with_context(|| format!("第 {} 帧推理失败", frame.index))?;

      if let Some(recorder) = &self.recorder {
        recorder
          .record(&frame, &result.items)
          .with_context(|| format!("第 {} 帧记录失败", frame.index))?;
      }

      self.annotate(&mut frame.image, &result);
      output.show(&frame.image).context("显示输出失败")?;

      processed += 1;
      detections += result.len();

      if let Some(sample) = frame_rate.tick(begin.elapsed()) {
        info!("{:.3},{:.3}", sample.average_ms, sample.rate);
      }

      if output.poll_key() == Some(self.quit_key) {
        info!("收到退出键，退出任务循环");
        reason = StopReason::QuitKey;
        break;
      }
      if let Some(stop) = self.should_stop(processed) {
        reason = stop;
        break;
      }
    }

    if reason == StopReason::Exhausted {
      info!("输入源没有更多帧");
    }
    info!("任务完成，共处理 {} 帧, {} 个检测", processed, detections);

    Ok(TaskSummary {
      frames: processed,
      detections,
      rate: frame_rate.rate(),
      reason,
    })
  }
}
