// 该文件是 Tanzhao （探照） 项目的一部分。
// src/output.rs - 输出定义
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

use image::RgbImage;
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

/// 显示端：每帧调用一次 `show`，随后轮询一次按键
pub trait Render {
  type Error;
  fn show(&mut self, frame: &RgbImage) -> Result<(), Self::Error>;

  /// 没有按键时返回 `None`
  fn poll_key(&mut self) -> Option<u32> {
    None
  }
}

pub mod annotate;
pub mod transform;

mod record;
pub use self::record::{PredictionRecorder, RecordError};

mod save_image_file;
pub use self::save_image_file::SaveImageFileOutput;

mod directory_record;
pub use self::directory_record::DirectoryRecordOutput;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("字体文件无效: {0}")]
  InvalidFont(PathBuf),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 丢弃所有帧
#[derive(Debug, Default)]
pub struct NullOutput;

impl FromUrlWithScheme for NullOutput {
  const SCHEME: &'static str = "null";
}

impl FromUrl for NullOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(NullOutput)
  }
}

impl Render for NullOutput {
  type Error = OutputError;

  fn show(&mut self, _frame: &RgbImage) -> Result<(), Self::Error> {
    Ok(())
  }
}

pub enum OutputWrapper {
  SaveImageFileOutput(SaveImageFileOutput),
  DirectoryRecordOutput(DirectoryRecordOutput),
  NullOutput(NullOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      SaveImageFileOutput::SCHEME => Ok(OutputWrapper::SaveImageFileOutput(
        SaveImageFileOutput::from_url(url)?,
      )),
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecordOutput(
        DirectoryRecordOutput::from_url(url)?,
      )),
      NullOutput::SCHEME => Ok(OutputWrapper::NullOutput(NullOutput::from_url(url)?)),
      other => Err(OutputError::SchemeMismatch(format!(
        "不支持的输出方式 '{}'",
        other
      ))),
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn show(&mut self, frame: &RgbImage) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::SaveImageFileOutput(output) => output.show(frame),
      OutputWrapper::DirectoryRecordOutput(output) => output.show(frame),
      OutputWrapper::NullOutput(output) => output.show(frame),
    }
  }

  fn poll_key(&mut self) -> Option<u32> {
    match self {
      OutputWrapper::SaveImageFileOutput(output) => output.poll_key(),
      OutputWrapper::DirectoryRecordOutput(output) => output.poll_key(),
      OutputWrapper::NullOutput(output) => output.poll_key(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wrapper_dispatches_on_scheme() {
    let url = Url::parse("null://").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::NullOutput(_))
    ));

    let url = Url::parse("image:///tmp/out.png").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::SaveImageFileOutput(_))
    ));

    let url = Url::parse("folder:///tmp/frames").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::DirectoryRecordOutput(_))
    ));
  }

  #[test]
  fn wrapper_rejects_unknown_scheme() {
    let url = Url::parse("rtsp://localhost/live").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn null_output_never_reports_keys() {
    let mut output = NullOutput;
    output.show(&RgbImage::new(2, 2)).unwrap();
    assert_eq!(output.poll_key(), None);
  }
}
