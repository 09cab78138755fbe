// 该文件是 Tanzhao （探照） 项目的一部分。
// src/output/annotate.rs - 检测结果绘制
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage, imageops};
use imageproc::drawing::draw_text_mut;
use tracing::{debug, warn};

use crate::{
  config::ClassTable,
  geometry::BoxRect,
  model::Detection,
  output::{
    OutputError,
    transform::{RegionTransform, draw_outline},
  },
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 24.0;
// 区域变换后写在框内的标签用一半字号
const REGION_LABEL_FONT_SIZE: f32 = LABEL_FONT_SIZE / 2.0;
const LABEL_OFFSET: i32 = 5;
const OUTLINE_THICKNESS: u32 = 3;
const LABEL_COLOR: [u8; 3] = [255, 0, 0]; // 红色

pub struct Annotator {
  classes: ClassTable,
  font: Option<FontArc>,
  font_size: f32,
  region_font_size: f32,
  label_color: Rgb<u8>,
}

impl Annotator {
  pub fn new(classes: ClassTable) -> Self {
    Self {
      classes,
      font: None,
      font_size: LABEL_FONT_SIZE,
      region_font_size: REGION_LABEL_FONT_SIZE,
      label_color: Rgb(LABEL_COLOR),
    }
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  /// 设置框上方标签的字号，框内标签取其一半
  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self.region_font_size = font_size / 2.0;
    self
  }

  pub fn font_size(&self) -> f32 {
    self.font_size
  }

  pub fn region_font_size(&self) -> f32 {
    self.region_font_size
  }

  pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc, OutputError> {
    let data = std::fs::read(path.as_ref())?;
    FontArc::try_from_vec(data).map_err(|_| OutputError::InvalidFont(path.as_ref().to_path_buf()))
  }

  pub fn classes(&self) -> &ClassTable {
    &self.classes
  }

  /// 裁剪到画面内，裁剪后为空的框返回 `None`
  fn visible_box(detection: &Detection, image: &RgbImage) -> Option<BoxRect> {
    let rect = detection.bbox.clamp(image.width(), image.height());
    if rect.is_empty() { None } else { Some(rect) }
  }

  /// 画边框，并在框上方写类别名
  pub fn draw(&self, image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
      let Some(rect) = Self::visible_box(detection, image) else {
        debug!("检测框在画面外, 跳过: {:?}", detection.bbox);
        continue;
      };
      let color = self.classes.color(detection.class_id);

      draw_outline(
        image,
        rect.x,
        rect.y,
        rect.width as u32,
        rect.height as u32,
        OUTLINE_THICKNESS,
        color,
      );

      let label_y = rect.y - LABEL_OFFSET - self.font_size as i32;
      self.draw_label(
        image,
        detection.class_id,
        (rect.x, label_y),
        self.font_size,
        self.label_color,
      );
    }
  }

  /// 用 `transform` 的结果替换检测区域，再在框内左上角写类别名
  pub fn draw_with(
    &self,
    image: &mut RgbImage,
    detections: &[Detection],
    transform: &dyn RegionTransform,
  ) {
    for detection in detections {
      let Some(rect) = Self::visible_box(detection, image) else {
        debug!("检测框在画面外, 跳过: {:?}", detection.bbox);
        continue;
      };
      let color = self.classes.color(detection.class_id);

      let region = imageops::crop_imm(
        &*image,
        rect.x as u32,
        rect.y as u32,
        rect.width as u32,
        rect.height as u32,
      )
      .to_image();
      let output = transform.apply(&region, color);

      if output.dimensions() != region.dimensions() {
        warn!(
          "区域变换改变了尺寸: {:?} -> {:?}",
          region.dimensions(),
          output.dimensions()
        );
      } else {
        imageops::replace(image, &output, rect.x as i64, rect.y as i64);
      }

      self.draw_label(
        image,
        detection.class_id,
        (rect.x, rect.y),
        self.region_font_size,
        color,
      );
    }
  }

  fn draw_label(
    &self,
    image: &mut RgbImage,
    class_id: usize,
    (x, y): (i32, i32),
    font_size: f32,
    color: Rgb<u8>,
  ) {
    let Some(font) = &self.font else {
      debug!("未加载字体, 跳过标签 {}", self.classes.name(class_id));
      return;
    };

    draw_text_mut(
      image,
      color,
      x,
      y.max(0),
      PxScale::from(font_size),
      font,
      self.classes.name(class_id),
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::output::transform::OutlineTransform;

  fn annotator() -> Annotator {
    let classes = ClassTable::new(
      vec!["a".into(), "b".into(), "c".into()],
      vec![[9, 9, 9], [200, 0, 0]],
    )
    .unwrap();
    Annotator::new(classes)
  }

  fn detection(class_id: usize, x: i32, y: i32, w: i32, h: i32) -> Detection {
    Detection {
      class_id,
      confidence: 0.9,
      bbox: BoxRect::new(x, y, w, h),
    }
  }

  #[test]
  fn region_labels_use_half_the_outline_label_size() {
    let annotator = annotator();
    assert_eq!(annotator.font_size(), 24.0);
    assert_eq!(annotator.region_font_size(), 12.0);

    let annotator = annotator.with_font_size(30.0);
    assert_eq!(annotator.font_size(), 30.0);
    assert_eq!(annotator.region_font_size(), 15.0);
  }

  #[test]
  fn draw_outlines_with_wrapped_class_color() {
    let mut image = RgbImage::new(50, 40);
    annotator().draw(&mut image, &[detection(2, 10, 10, 20, 15)]);

    // 类别 2 使用颜色表第 0 项
    assert_eq!(*image.get_pixel(10, 10), Rgb([9, 9, 9]));
    assert_eq!(*image.get_pixel(12, 12), Rgb([9, 9, 9]));
    assert_eq!(*image.get_pixel(20, 17), Rgb([0, 0, 0]));
  }

  #[test]
  fn draw_clamps_boxes_that_leave_the_frame() {
    let mut image = RgbImage::new(30, 30);
    annotator().draw(&mut image, &[detection(1, -10, 20, 60, 40)]);

    assert_eq!(*image.get_pixel(0, 29), Rgb([200, 0, 0]));
    assert_eq!(*image.get_pixel(29, 20), Rgb([200, 0, 0]));
  }

  #[test]
  fn draw_skips_boxes_entirely_outside() {
    let mut image = RgbImage::new(30, 30);
    annotator().draw(&mut image, &[detection(0, 100, 100, 10, 10)]);
    assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }

  #[test]
  fn draw_with_replaces_only_the_region() {
    struct Fill;
    impl RegionTransform for Fill {
      fn apply(&self, region: &RgbImage, color: Rgb<u8>) -> RgbImage {
        RgbImage::from_pixel(region.width(), region.height(), color)
      }
    }

    let mut image = RgbImage::new(20, 20);
    annotator().draw_with(&mut image, &[detection(1, 5, 5, 4, 3)], &Fill);

    assert_eq!(*image.get_pixel(5, 5), Rgb([200, 0, 0]));
    assert_eq!(*image.get_pixel(8, 7), Rgb([200, 0, 0]));
    assert_eq!(*image.get_pixel(9, 7), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(8, 8), Rgb([0, 0, 0]));
  }

  #[test]
  fn draw_with_ignores_resizing_transforms() {
    struct Shrink;
    impl RegionTransform for Shrink {
      fn apply(&self, _region: &RgbImage, color: Rgb<u8>) -> RgbImage {
        RgbImage::from_pixel(1, 1, color)
      }
    }

    let mut image = RgbImage::new(20, 20);
    annotator().draw_with(&mut image, &[detection(1, 5, 5, 4, 3)], &Shrink);
    assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }

  #[test]
  fn draw_with_outline_matches_plain_outline_region() {
    let mut image = RgbImage::new(20, 20);
    annotator().draw_with(
      &mut image,
      &[detection(1, 2, 2, 10, 10)],
      &OutlineTransform::default(),
    );
    assert_eq!(*image.get_pixel(2, 2), Rgb([200, 0, 0]));
    assert_eq!(*image.get_pixel(11, 11), Rgb([200, 0, 0]));
  }
}
