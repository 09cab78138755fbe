// 该文件是 Tanzhao （探照） 项目的一部分。
// src/input/image_sequence.rs - 图片序列输入设备
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
  collections::VecDeque,
  path::{Path, PathBuf},
};

use image::{ImageReader, RgbImage};
use tracing::{debug, info};

use super::{CaptureDevice, InputError};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

pub(crate) fn is_image_file(path: &Path) -> bool {
  path.is_file()
    && path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
      .unwrap_or(false)
}

/// 把目录中的图片（按文件名排序）或单张图片当作媒体播放
pub struct ImageSequenceDevice {
  pending: VecDeque<PathBuf>,
  opened: bool,
}

impl ImageSequenceDevice {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, InputError> {
    let path = path.as_ref();

    let mut files = if path.is_dir() {
      std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_image_file(p))
        .collect::<Vec<_>>()
    } else if is_image_file(path) {
      vec![path.to_path_buf()]
    } else {
      Vec::new()
    };

    if files.is_empty() {
      return Err(InputError::EmptySequence(path.to_path_buf()));
    }
    files.sort();
    info!("图片序列 {}: 共 {} 帧", path.display(), files.len());

    Ok(Self {
      pending: files.into(),
      opened: true,
    })
  }

  pub fn remaining(&self) -> usize {
    self.pending.len()
  }
}

impl CaptureDevice for ImageSequenceDevice {
  fn read(&mut self) -> Result<Option<RgbImage>, InputError> {
    if !self.opened {
      return Ok(None);
    }
    let Some(path) = self.pending.pop_front() else {
      return Ok(None);
    };

    debug!("读取图片: {}", path.display());
    let image = ImageReader::open(&path)?.decode()?.to_rgb8();
    Ok(Some(image))
  }

  fn is_opened(&self) -> bool {
    self.opened
  }

  fn release(&mut self) {
    self.opened = false;
    self.pending.clear();
  }
}
