// 该文件是 Tanzhao （探照） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use std::cmp::Ordering;

use crate::{geometry::BoxRect, model::Detection};

/// 贪心 NMS，不区分类别
///
/// 只考虑分数严格大于 `score_threshold` 的框；按分数降序（同分保持原顺序）
/// 依次保留，与已保留框 IoU 超过 `nms_threshold` 的框被丢弃。
/// 返回保留框在输入中的下标，顺序即保留顺序。
pub fn nms_boxes(
  boxes: &[BoxRect],
  scores: &[f32],
  score_threshold: f32,
  nms_threshold: f32,
) -> Vec<usize> {
  debug_assert_eq!(boxes.len(), scores.len());

  let mut order: Vec<usize> = (0..boxes.len().min(scores.len()))
    .filter(|&idx| scores[idx] > score_threshold)
    .collect();
  order.sort_by(|&a, &b| {
    scores[b]
      .partial_cmp(&scores[a])
      .unwrap_or(Ordering::Equal)
  });

  let mut kept: Vec<usize> = Vec::with_capacity(order.len());
  for idx in order {
    let overlaps = kept
      .iter()
      .any(|&k| boxes[k].iou(&boxes[idx]) > nms_threshold);
    if !overlaps {
      kept.push(idx);
    }
  }

  kept
}

/// 对检测结果直接做 NMS，返回保留的检测
pub fn suppress(detections: &[Detection], score_threshold: f32, nms_threshold: f32) -> Vec<Detection> {
  let boxes: Vec<BoxRect> = detections.iter().map(|d| d.bbox).collect();
  let scores: Vec<f32> = detections.iter().map(|d| d.confidence).collect();

  nms_boxes(&boxes, &scores, score_threshold, nms_threshold)
    .into_iter()
    .map(|idx| detections[idx].clone())
    .collect()
}
