// 该文件是 Tanzhao （探照） 项目的一部分。
// src/output/transform.rs - 检测区域图像变换
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

use image::{GrayImage, Rgb, RgbImage, imageops};
use imageproc::{
  contrast::otsu_level,
  distance_transform::Norm,
  drawing::draw_hollow_rect_mut,
  filter::gaussian_blur_f32,
  morphology::{dilate, erode},
  rect::Rect,
};

/// 作用于单个检测区域的变换，输出尺寸必须与输入一致
pub trait RegionTransform {
  fn apply(&self, region: &RgbImage, color: Rgb<u8>) -> RgbImage;
}

/// 沿区域边缘画矩形框
#[derive(Debug, Clone, Copy)]
pub struct OutlineTransform {
  pub thickness: u32,
}

impl Default for OutlineTransform {
  fn default() -> Self {
    Self { thickness: 3 }
  }
}

impl RegionTransform for OutlineTransform {
  fn apply(&self, region: &RgbImage, color: Rgb<u8>) -> RgbImage {
    let mut output = region.clone();
    draw_outline(&mut output, 0, 0, region.width(), region.height(), self.thickness, color);
    output
  }
}

/// 在 `(x, y, width, height)` 处画指定粗细的空心矩形，向内加粗
pub(crate) fn draw_outline(
  image: &mut RgbImage,
  x: i32,
  y: i32,
  width: u32,
  height: u32,
  thickness: u32,
  color: Rgb<u8>,
) {
  for t in 0..thickness {
    let (w, h) = (width.saturating_sub(2 * t), height.saturating_sub(2 * t));
    if w == 0 || h == 0 {
      break;
    }
    let rect = Rect::at(x + t as i32, y + t as i32).of_size(w, h);
    draw_hollow_rect_mut(image, rect, color);
  }
}

const BLUR_SIGMA: f32 = 1.0;
const CLOSE_ITERATIONS: u8 = 2;

/// 描出区域内物体的轮廓
///
/// 灰度 → 高斯模糊 → 闭运算 → 形态学梯度 → Otsu 二值化，
/// 掩码内的像素涂成类别颜色。
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeOutlineTransform;

impl EdgeOutlineTransform {
  fn edge_mask(region: &RgbImage) -> GrayImage {
    let grey = imageops::grayscale(region);
    let blurred = gaussian_blur_f32(&grey, BLUR_SIGMA);

    // 3x3 结构元素重复 n 次等价于 LInf 半径 n
    let closed = erode(
      &dilate(&blurred, Norm::LInf, CLOSE_ITERATIONS),
      Norm::LInf,
      CLOSE_ITERATIONS,
    );
    let dilated = dilate(&closed, Norm::LInf, 1);
    let eroded = erode(&closed, Norm::LInf, 1);

    let mut gradient = dilated;
    for (g, e) in gradient.pixels_mut().zip(eroded.pixels()) {
      g.0[0] = g.0[0].saturating_sub(e.0[0]);
    }

    let level = otsu_level(&gradient);
    for pixel in gradient.pixels_mut() {
      pixel.0[0] = if pixel.0[0] > level { 255 } else { 0 };
    }
    gradient
  }
}

impl RegionTransform for EdgeOutlineTransform {
  fn apply(&self, region: &RgbImage, color: Rgb<u8>) -> RgbImage {
    let mut output = region.clone();
    if region.width() == 0 || region.height() == 0 {
      return output;
    }

    let mask = Self::edge_mask(region);
    for (pixel, m) in output.pixels_mut().zip(mask.pixels()) {
      if m.0[0] == 255 {
        *pixel = color;
      }
    }
    output
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const RED: Rgb<u8> = Rgb([255, 0, 0]);

  fn square_on_background() -> RgbImage {
    RgbImage::from_fn(40, 40, |x, y| {
      if (12..28).contains(&x) && (12..28).contains(&y) {
        Rgb([230, 230, 230])
      } else {
        Rgb([20, 20, 20])
      }
    })
  }

  #[test]
  fn outline_preserves_dimensions_and_paints_border() {
    let region = RgbImage::new(10, 6);
    let output = OutlineTransform::default().apply(&region, RED);

    assert_eq!(output.dimensions(), region.dimensions());
    assert_eq!(*output.get_pixel(0, 0), RED);
    assert_eq!(*output.get_pixel(2, 2), RED);
    assert_eq!(*output.get_pixel(9, 5), RED);
    assert_eq!(*output.get_pixel(4, 3), Rgb([0, 0, 0]));
  }

  #[test]
  fn outline_on_tiny_region_does_not_panic() {
    let output = OutlineTransform::default().apply(&RgbImage::new(1, 1), RED);
    assert_eq!(*output.get_pixel(0, 0), RED);
  }

  #[test]
  fn edge_outline_paints_edges_only() {
    let region = square_on_background();
    let output = EdgeOutlineTransform.apply(&region, RED);

    assert_eq!(output.dimensions(), region.dimensions());
    // 边缘附近被涂色，远离边缘的位置保持原样
    assert_eq!(*output.get_pixel(12, 20), RED);
    assert_eq!(*output.get_pixel(20, 20), Rgb([230, 230, 230]));
    assert_eq!(*output.get_pixel(1, 1), Rgb([20, 20, 20]));
  }

  #[test]
  fn edge_outline_handles_empty_region() {
    let output = EdgeOutlineTransform.apply(&RgbImage::new(0, 0), RED);
    assert_eq!(output.dimensions(), (0, 0));
  }
}
