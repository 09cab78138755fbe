// 该文件是 Tanzhao （探照） 项目的一部分。
// src/geometry.rs - 边界框几何工具
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

/// 像素坐标下的轴对齐矩形，(x, y) 为左上角
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoxRect {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

impl BoxRect {
  pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn area(&self) -> i64 {
    if self.width <= 0 || self.height <= 0 {
      return 0;
    }
    self.width as i64 * self.height as i64
  }

  pub fn is_empty(&self) -> bool {
    self.area() == 0
  }

  /// 右边界，用 i64 计算避免溢出
  pub fn right(&self) -> i64 {
    self.x as i64 + self.width as i64
  }

  pub fn bottom(&self) -> i64 {
    self.y as i64 + self.height as i64
  }

  pub fn intersection(&self, other: &BoxRect) -> BoxRect {
    let x1 = self.x.max(other.x);
    let y1 = self.y.max(other.y);
    let x2 = self.right().min(other.right());
    let y2 = self.bottom().min(other.bottom());

    if x2 <= x1 as i64 || y2 <= y1 as i64 {
      return BoxRect::default();
    }
    // 两个 i32 矩形的交集宽高可能超出 i32，饱和到上限
    let width = (x2 - x1 as i64).min(i32::MAX as i64) as i32;
    let height = (y2 - y1 as i64).min(i32::MAX as i64) as i32;
    BoxRect::new(x1, y1, width, height)
  }

  /// 交并比
  pub fn iou(&self, other: &BoxRect) -> f32 {
    let intersection = self.intersection(other).area();
    let union = self.area() + other.area() - intersection;

    if union > 0 {
      (intersection as f64 / union as f64) as f32
    } else {
      0.0
    }
  }

  /// 将矩形裁剪到 `[0, width) x [0, height)` 范围内
  ///
  /// 左上角先被拉回画面内，超出右/下边界的部分被截断；
  /// 完全在画面外的矩形会退化为零面积。
  pub fn clamp(&self, width: u32, height: u32) -> BoxRect {
    let (frame_w, frame_h) = (width as i32, height as i32);
    let mut rect = *self;

    if rect.is_empty()
      || rect.x >= frame_w
      || rect.y >= frame_h
      || rect.right() <= 0
      || rect.bottom() <= 0
    {
      rect.x = rect.x.clamp(0, (frame_w - 1).max(0));
      rect.y = rect.y.clamp(0, (frame_h - 1).max(0));
      rect.width = 0;
      rect.height = 0;
      return rect;
    }

    rect.x = rect.x.clamp(0, (frame_w - 1).max(0));
    rect.y = rect.y.clamp(0, (frame_h - 1).max(0));

    if rect.right() >= frame_w as i64 {
      rect.width = frame_w - rect.x;
    }
    if rect.bottom() >= frame_h as i64 {
      rect.height = frame_h - rect.y;
    }

    rect.width = rect.width.max(0);
    rect.height = rect.height.max(0);
    rect
  }
}
