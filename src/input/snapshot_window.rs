// 该文件是 Tanzhao （探照） 项目的一部分。
// src/input/snapshot_window.rs - 窗口快照输入
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

use image::{ImageReader, RgbImage};
use tracing::debug;

use super::{InputError, WindowCapture, WindowLocator, image_sequence::is_image_file};

/// 窗口快照目录
///
/// 外部截图工具持续把每个窗口的画面写到 `<目录>/<窗口标题>.png`，
/// 文件名包含给定片段（区分大小写）的第一个文件即为目标窗口。
pub struct SnapshotWindows {
  directory: PathBuf,
}

impl SnapshotWindows {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
    }
  }
}

impl WindowLocator for SnapshotWindows {
  type Window = SnapshotWindow;

  fn find_window(&self, partial_name: &str) -> Option<Self::Window> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(&self.directory)
      .ok()?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|p| is_image_file(p))
      .collect();
    candidates.sort();

    candidates.into_iter().find_map(|path| {
      let title = path.file_stem()?.to_str()?.to_string();
      if title.contains(partial_name) {
        debug!("匹配窗口: {} ({})", title, path.display());
        Some(SnapshotWindow { path, title })
      } else {
        None
      }
    })
  }
}

pub struct SnapshotWindow {
  path: PathBuf,
  title: String,
}

impl SnapshotWindow {
  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl WindowCapture for SnapshotWindow {
  fn title(&self) -> &str {
    &self.title
  }

  fn capture(&mut self) -> Result<RgbImage, InputError> {
    if !self.path.exists() {
      return Err(InputError::WindowClosed(self.title.clone()));
    }
    Ok(ImageReader::open(&self.path)?.decode()?.to_rgb8())
  }
}
