// 该文件是 Tanzhao （探照） 项目的一部分。
// src/frame.rs - 帧与模型输入定义
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

use image::RgbImage;

const RGB_CHANNELS: usize = 3;

pub trait AsNchwFrame {
  fn as_nchw(&self) -> &[f32];
}

pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
}

/// 采集得到的一帧图像
///
/// 宽或高为 0 的帧表示输入已结束。
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒，自输入源打开起）
  pub timestamp_ms: u64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64, timestamp_ms: u64) -> Self {
    Self {
      image,
      index,
      timestamp_ms,
    }
  }

  pub fn empty() -> Self {
    Self {
      image: RgbImage::new(0, 0),
      index: 0,
      timestamp_ms: 0,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.image.width() == 0 || self.image.height() == 0
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 送入推理引擎的固定尺寸输入
///
/// 同时保留 NHWC 字节与归一化（1/255）后的 NCHW 浮点数据，
/// 推理后端按需取用。
#[derive(Debug, Clone)]
pub struct ModelInput {
  image: RgbImage,
  nchw: Box<[f32]>,
}

impl From<RgbImage> for ModelInput {
  fn from(image: RgbImage) -> Self {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let plane = width * height;
    let mut nchw = vec![0f32; plane * RGB_CHANNELS];

    for (idx, pixel) in image.pixels().enumerate() {
      for c in 0..RGB_CHANNELS {
        nchw[c * plane + idx] = pixel[c] as f32 / 255.0;
      }
    }

    Self {
      image,
      nchw: nchw.into_boxed_slice(),
    }
  }
}

impl ModelInput {
  pub fn width(&self) -> usize {
    self.image.width() as usize
  }

  pub fn height(&self) -> usize {
    self.image.height() as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }
}

impl AsNhwcFrame for ModelInput {
  fn as_nhwc(&self) -> &[u8] {
    self.image.as_raw()
  }
}

impl AsNchwFrame for ModelInput {
  fn as_nchw(&self) -> &[f32] {
    &self.nchw
  }
}
