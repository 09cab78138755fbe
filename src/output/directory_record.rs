// 该文件是 Tanzhao （探照） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::PathBuf;

use chrono::{DateTime, Datelike, Utc};
use image::RgbImage;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{OutputError, Render},
};

/// 把标注后的帧按日期分目录保存：`<目录>/<年>/<月>/<日>/<时-分-秒>-<序号>.png`
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: u16,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = OutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(uri.scheme().to_string()));
    }
    Ok(Self::new(uri.path()))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      frame_counter: 0,
    }
  }

  // 序号 16 位循环
  fn frame_id(&mut self) -> u16 {
    self.frame_counter = self.frame_counter.wrapping_add(1);
    self.frame_counter
  }

  fn frame_path(&mut self, now: DateTime<Utc>) -> Result<PathBuf, OutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    let filename = format!("{}-{:04X}.png", now.format("%H-%M-%S"), self.frame_id());
    Ok(directory.join(filename))
  }
}

impl Render for DirectoryRecordOutput {
  type Error = OutputError;

  fn show(&mut self, frame: &RgbImage) -> Result<(), Self::Error> {
    let path = self.frame_path(Utc::now())?;
    frame.save(&path)?;
    debug!("记录帧: {}", path.display());
    Ok(())
  }
}
