// 该文件是 Tanzhao （探照） 项目的一部分。
// src/output/record.rs - 预测结果转储
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::{config::ClassTable, frame::Frame, model::Detection};

const LABELS_DIR: &str = "labels";
const IMAGES_DIR: &str = "images";
const LABEL_MAP_FILE: &str = "labelled.labels";

#[derive(Error, Debug)]
pub enum RecordError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("空帧无法记录")]
  EmptyFrame,
}

/// 把每帧的原始图像和归一化标注写成训练集格式
///
/// 目录结构：
/// - `labelled.labels`：每行一个类别名
/// - `labels/<帧号>.txt`：每行 `class_id cx cy w h`，均按帧尺寸归一化
/// - `images/<帧号>.png`：未标注的原始帧
pub struct PredictionRecorder {
  directory: PathBuf,
}

impl PredictionRecorder {
  pub fn create(directory: impl Into<PathBuf>, classes: &ClassTable) -> Result<Self, RecordError> {
    let directory = directory.into();
    std::fs::create_dir_all(directory.join(LABELS_DIR))?;
    std::fs::create_dir_all(directory.join(IMAGES_DIR))?;

    let mut label_map = classes.names().join("\n");
    label_map.push('\n');
    std::fs::write(directory.join(LABEL_MAP_FILE), label_map)?;

    info!("预测结果记录目录: {}", directory.display());
    Ok(Self { directory })
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn file_stem(frame: &Frame) -> String {
    format!("{:06}", frame.index)
  }

  pub fn record(&self, frame: &Frame, detections: &[Detection]) -> Result<(), RecordError> {
    if frame.is_empty() {
      return Err(RecordError::EmptyFrame);
    }

    let stem = Self::file_stem(frame);
    let cols = frame.width() as f64;
    let rows = frame.height() as f64;

    let lines: String = detections
      .iter()
      .map(|d| {
        let b = &d.bbox;
        let cx = (b.x as f64 + b.width as f64 / 2.) / cols;
        let cy = (b.y as f64 + b.height as f64 / 2.) / rows;
        format!(
          "{} {} {} {} {}\n",
          d.class_id,
          cx,
          cy,
          b.width as f64 / cols,
          b.height as f64 / rows
        )
      })
      .collect();

    let label_path = self.directory.join(LABELS_DIR).join(format!("{}.txt", stem));
    std::fs::write(&label_path, lines)?;
    let image_path = self.directory.join(IMAGES_DIR).join(format!("{}.png", stem));
    frame.image.save(&image_path)?;

    debug!("记录帧 {}: {} 个检测", stem, detections.len());
    Ok(())
  }
}
