// 该文件是 Tanzhao （探照） 项目的一部分。
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

use std::{path::PathBuf, sync::mpsc, thread, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use url::Url;

use tanzhao::{
  FromUrl,
  config::Config,
  input::InputSpec,
  model::{Detector, TractEngineBuilder},
  output::{
    OutputWrapper, PredictionRecorder,
    annotate::Annotator,
    transform::{EdgeOutlineTransform, OutlineTransform, RegionTransform},
  },
  task::{ContinuousTask, Task},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransformKind {
  /// 在检测区域上画框，类别名写在框内
  Outline,
  /// 描出检测区域内物体的轮廓
  Edges,
  /// 画框，类别名写在框上方
  #[value(name = "none")]
  Plain,
}

impl TransformKind {
  fn build(self) -> Option<Box<dyn RegionTransform>> {
    match self {
      TransformKind::Outline => Some(Box::new(OutlineTransform::default())),
      TransformKind::Edges => Some(Box::new(EdgeOutlineTransform)),
      TransformKind::Plain => None,
    }
  }
}

/// Tanzhao 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型路径，例如 onnx:///path/to/model.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源：window://<窗口名>?dir=<快照目录>、folder://、image://、v4l://
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出：image://、folder://、null://
  #[arg(long, value_name = "OUTPUT", default_value = "null://")]
  pub output: Url,
  /// JSON 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 预测结果记录目录，覆盖配置文件
  #[arg(long, value_name = "DIR")]
  pub record: Option<PathBuf>,
  /// 标签字体文件，覆盖配置文件
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
  #[arg(long, value_enum, default_value_t = TransformKind::Outline)]
  pub transform: TransformKind,
  /// 最多处理的帧数，0 表示不限制
  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 0)]
  pub frame_number: usize,
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
  #[arg(long, value_name = "THRESHOLD")]
  pub nms_threshold: Option<f32>,
}

impl Args {
  fn load_config(&self) -> Result<Config> {
    let mut config = match &self.config {
      Some(path) => {
        Config::load(path).with_context(|| format!("加载配置文件失败: {}", path.display()))?
      }
      None => Config::default(),
    };

    if let Some(confidence) = self.confidence {
      config.detector.confidence_threshold = confidence;
    }
    if let Some(nms) = self.nms_threshold {
      config.detector.nms_threshold = nms;
    }
    if self.record.is_some() {
      config.record = self.record.clone();
    }
    if self.font.is_some() {
      config.font = self.font.clone();
    }

    config.validate().context("配置无效")?;
    Ok(config)
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = args.load_config()?;
  info!(
    "置信度阈值: {}, NMS 阈值: {}, 类别数: {}",
    config.detector.confidence_threshold,
    config.detector.nms_threshold,
    config.classes.len()
  );

  let engine = TractEngineBuilder::from_url(&args.model)?
    .build(config.detector.input_width, config.detector.input_height)?;
  let detector = Detector::new(engine, &config.detector, &config.classes)?;

  let source = InputSpec::from_url(&args.input)?
    .open(&config.capture)
    .with_context(|| format!("打开输入源失败: {}", args.input))?;
  let output = OutputWrapper::from_url(&args.output)?;

  let mut annotator = Annotator::new(config.classes.clone());
  if let Some(font) = &config.font {
    annotator = annotator.with_font(Annotator::load_font(font)?);
  }
  let recorder = config
    .record
    .as_ref()
    .map(|dir| PredictionRecorder::create(dir, &config.classes))
    .transpose()?;

  let (tx, rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .context("设置 Ctrl-C 处理函数失败")?;

  let task = ContinuousTask::new(annotator)
    .with_transform(args.transform.build())
    .with_recorder(recorder)
    .with_frame_number((args.frame_number > 0).then_some(args.frame_number))
    .with_quit_key(config.quit_key)
    .with_stop_signal(rx);

  let summary = task.run_task(source, detector, output)?;
  info!(
    "处理完成: {} 帧, {} 个检测, 帧率 {:.2}, 结束原因 {:?}",
    summary.frames, summary.detections, summary.rate, summary.reason
  );

  Ok(())
}
