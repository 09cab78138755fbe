// 该文件是 Tanzhao （探照） 项目的一部分。
// src/preprocess.rs - 图像预处理
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

use image::{RgbImage, imageops};

use crate::frame::ModelInput;

/// 将任意宽高比的图像补零成正方形，原图位于左上角
pub fn reformat(image: &RgbImage) -> RgbImage {
  let side = image.width().max(image.height());
  let mut square = RgbImage::new(side, side);
  imageops::replace(&mut square, image, 0, 0);
  square
}

/// 模型坐标到正方形画布坐标的缩放系数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
  pub x: f32,
  pub y: f32,
}

impl ScaleFactors {
  pub const IDENTITY: ScaleFactors = ScaleFactors { x: 1.0, y: 1.0 };
}

#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
  input_width: u32,
  input_height: u32,
}

impl Preprocessor {
  pub fn new(input_width: u32, input_height: u32) -> Self {
    Self {
      input_width,
      input_height,
    }
  }

  /// 补零、缩放到模型输入尺寸，并计算回算系数
  pub fn prepare(&self, image: &RgbImage) -> (ModelInput, ScaleFactors) {
    let square = reformat(image);
    let factors = ScaleFactors {
      x: square.width() as f32 / self.input_width as f32,
      y: square.height() as f32 / self.input_height as f32,
    };

    let resized = if square.dimensions() == (self.input_width, self.input_height) {
      square
    } else {
      imageops::resize(
        &square,
        self.input_width,
        self.input_height,
        imageops::FilterType::Triangle,
      )
    };

    (ModelInput::from(resized), factors)
  }
}
