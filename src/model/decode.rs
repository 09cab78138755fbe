// 该文件是 Tanzhao （探照） 项目的一部分。
// src/model/decode.rs - 检测输出解码
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

use thiserror::Error;
use tracing::debug;

use crate::{
  config::{ConfigError, DetectorConfig},
  geometry::BoxRect,
  model::{Detection, nms::nms_boxes},
  preprocess::ScaleFactors,
};

// 每行布局: [cx, cy, w, h, objectness, class_0, class_1, ...]
const CENTER_X_OFFSET: usize = 0;
const CENTER_Y_OFFSET: usize = 1;
const WIDTH_OFFSET: usize = 2;
const HEIGHT_OFFSET: usize = 3;
const OBJECTNESS_OFFSET: usize = 4;
const CLASS_SCORES_OFFSET: usize = 5;

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
  #[error("输出张量长度不足: 期望至少 {expected}, 实际 {actual}")]
  TensorTooShort { expected: usize, actual: usize },
}

/// 将固定步长的原始输出解析为检测结果，并执行 NMS
#[derive(Debug, Clone)]
pub struct Decoder {
  confidence_threshold: f32,
  nms_threshold: f32,
  nms_score_threshold: f32,
  rows: usize,
  class_count: usize,
}

impl Decoder {
  pub fn new(config: &DetectorConfig, class_count: usize) -> Result<Self, ConfigError> {
    config.validate()?;
    if class_count == 0 {
      return Err(ConfigError::EmptyClassTable);
    }

    Ok(Self {
      confidence_threshold: config.confidence_threshold,
      nms_threshold: config.nms_threshold,
      nms_score_threshold: config.nms_score_threshold(),
      rows: config.rows,
      class_count,
    })
  }

  /// 每行的浮点数个数
  pub fn stride(&self) -> usize {
    CLASS_SCORES_OFFSET + self.class_count
  }

  pub fn class_count(&self) -> usize {
    self.class_count
  }

  /// NMS 前的分数下限
  pub fn nms_score_threshold(&self) -> f32 {
    self.nms_score_threshold
  }

  pub fn decode(&self, tensor: &[f32], factors: ScaleFactors) -> Result<Vec<Detection>, DecodeError> {
    let stride = self.stride();
    let expected = self.rows * stride;
    if tensor.len() < expected {
      return Err(DecodeError::TensorTooShort {
        expected,
        actual: tensor.len(),
      });
    }

    let mut class_ids = Vec::new();
    let mut confidences = Vec::new();
    let mut boxes = Vec::new();

    for row in tensor[..expected].chunks_exact(stride) {
      if let Some((class_id, confidence, bbox)) = self.decode_row(row, factors) {
        class_ids.push(class_id);
        confidences.push(confidence);
        boxes.push(bbox);
      }
    }
    debug!("阈值过滤后剩余 {} 个候选框", boxes.len());

    let kept = nms_boxes(
      &boxes,
      &confidences,
      self.nms_score_threshold,
      self.nms_threshold,
    );

    Ok(
      kept
        .into_iter()
        .map(|idx| Detection {
          class_id: class_ids[idx],
          confidence: confidences[idx],
          bbox: boxes[idx],
        })
        .collect(),
    )
  }

  fn decode_row(&self, row: &[f32], factors: ScaleFactors) -> Option<(usize, f32, BoxRect)> {
    let confidence = row[OBJECTNESS_OFFSET];
    if confidence < self.confidence_threshold {
      return None;
    }

    let (class_id, class_score) = argmax(&row[CLASS_SCORES_OFFSET..])?;
    if class_score <= self.confidence_threshold {
      return None;
    }

    let cx = row[CENTER_X_OFFSET] as f64;
    let cy = row[CENTER_Y_OFFSET] as f64;
    let w = row[WIDTH_OFFSET] as f64;
    let h = row[HEIGHT_OFFSET] as f64;
    let (fx, fy) = (factors.x as f64, factors.y as f64);

    let bbox = BoxRect::new(
      ((cx - 0.5 * w) * fx) as i32,
      ((cy - 0.5 * h) * fy) as i32,
      (w * fx) as i32,
      (h * fy) as i32,
    );

    Some((class_id, confidence, bbox))
  }
}

/// 最大值及其下标，相同分数取第一个
fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
  let mut iter = scores.iter().copied().enumerate();
  let first = iter.next()?;
  Some(iter.fold(first, |best, (idx, score)| {
    if score > best.1 { (idx, score) } else { best }
  }))
}

#[cfg(test)]
mod tests {
  use super::*;

  const CLASSES: usize = 2;
  const STRIDE: usize = 5 + CLASSES;

  fn decoder(rows: usize) -> Decoder {
    let config = DetectorConfig {
      rows,
      ..DetectorConfig::default()
    };
    Decoder::new(&config, CLASSES).unwrap()
  }

  fn row(cx: f32, cy: f32, w: f32, h: f32, obj: f32, scores: [f32; CLASSES]) -> Vec<f32> {
    let mut row = vec![cx, cy, w, h, obj];
    row.extend_from_slice(&scores);
    row
  }

  fn tensor(rows: &[Vec<f32>]) -> Vec<f32> {
    rows.concat()
  }

  #[test]
  fn single_candidate_round_trips_coordinates() {
    let data = tensor(&[row(320.0, 320.0, 64.0, 64.0, 0.9, [0.95, 0.1])]);
    let detections = decoder(1).decode(&data, ScaleFactors::IDENTITY).unwrap();

    assert_eq!(
      detections,
      vec![Detection {
        class_id: 0,
        confidence: 0.9,
        bbox: BoxRect::new(288, 288, 64, 64),
      }]
    );
  }

  #[test]
  fn low_objectness_rejects_row_regardless_of_class_scores() {
    for obj in [0.0, 0.3, 0.59] {
      let data = tensor(&[row(100.0, 100.0, 20.0, 20.0, obj, [1.0, 1.0])]);
      assert!(decoder(1).decode(&data, ScaleFactors::IDENTITY).unwrap().is_empty());
    }
  }

  #[test]
  fn objectness_at_threshold_is_accepted() {
    let data = tensor(&[row(100.0, 100.0, 20.0, 20.0, 0.6, [0.1, 0.7])]);
    let detections = decoder(1).decode(&data, ScaleFactors::IDENTITY).unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].class_id, 1);
  }

  #[test]
  fn weak_top_class_rejects_row() {
    for top in [0.2, 0.5, 0.6] {
      let data = tensor(&[row(100.0, 100.0, 20.0, 20.0, 0.99, [top, top / 2.0])]);
      assert!(decoder(1).decode(&data, ScaleFactors::IDENTITY).unwrap().is_empty());
    }
  }

  #[test]
  fn argmax_prefers_first_on_ties() {
    assert_eq!(argmax(&[0.7, 0.9, 0.9]), Some((1, 0.9)));
    assert_eq!(argmax(&[]), None);
  }

  #[test]
  fn factors_scale_axes_independently() {
    let data = tensor(&[row(10.0, 10.0, 4.0, 2.0, 0.8, [0.9, 0.0])]);
    let factors = ScaleFactors { x: 3.0, y: 0.5 };
    let detections = decoder(1).decode(&data, factors).unwrap();
    assert_eq!(detections[0].bbox, BoxRect::new(24, 4, 12, 1));
  }

  #[test]
  fn coordinates_truncate_toward_zero() {
    let data = tensor(&[row(1.0, 1.0, 3.0, 3.0, 0.8, [0.9, 0.0])]);
    let detections = decoder(1).decode(&data, ScaleFactors::IDENTITY).unwrap();
    // left = -0.5 -> 0
    assert_eq!(detections[0].bbox, BoxRect::new(0, 0, 3, 3));
  }

  #[test]
  fn empty_result_when_nothing_passes() {
    let data = vec![0.0; 4 * STRIDE];
    assert!(decoder(4).decode(&data, ScaleFactors::IDENTITY).unwrap().is_empty());
  }

  #[test]
  fn short_tensor_is_an_error() {
    let data = vec![0.0; 3 * STRIDE];
    assert_eq!(
      decoder(4).decode(&data, ScaleFactors::IDENTITY),
      Err(DecodeError::TensorTooShort {
        expected: 4 * STRIDE,
        actual: 3 * STRIDE
      })
    );
  }

  #[test]
  fn trailing_data_beyond_rows_is_ignored() {
    let mut data = tensor(&[row(50.0, 50.0, 10.0, 10.0, 0.1, [0.0, 0.0])]);
    data.extend(row(50.0, 50.0, 10.0, 10.0, 0.9, [0.9, 0.0]));
    assert!(decoder(1).decode(&data, ScaleFactors::IDENTITY).unwrap().is_empty());
  }

  #[test]
  fn overlapping_pair_keeps_higher_confidence() {
    let data = tensor(&[
      row(100.0, 100.0, 50.0, 50.0, 0.85, [0.9, 0.0]),
      row(101.0, 100.0, 50.0, 50.0, 0.88, [0.0, 0.9]),
    ]);
    let detections = decoder(2).decode(&data, ScaleFactors::IDENTITY).unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].confidence, 0.88);
    assert_eq!(detections[0].class_id, 1);
  }

  #[test]
  fn separated_pair_keeps_both_in_confidence_order() {
    let data = tensor(&[
      row(100.0, 100.0, 50.0, 50.0, 0.7, [0.9, 0.0]),
      row(300.0, 300.0, 50.0, 50.0, 0.95, [0.9, 0.0]),
    ]);
    let detections = decoder(2).decode(&data, ScaleFactors::IDENTITY).unwrap();
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].confidence, 0.95);
    assert_eq!(detections[1].confidence, 0.7);
  }

  #[test]
  fn huge_boxes_pass_through_nms_without_overflow() {
    let data = tensor(&[
      row(3.0e9, 10.0, 1.0e9, 10.0, 0.9, [0.9, 0.0]),
      row(3.0e9, 10.0, 1.0e9, 10.0, 0.8, [0.9, 0.0]),
    ]);
    let detections = decoder(2).decode(&data, ScaleFactors::IDENTITY).unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].bbox.x, i32::MAX);
  }

  #[test]
  fn score_floor_comes_from_config() {
    let config = DetectorConfig {
      confidence_threshold: 0.5,
      nms_threshold: 0.3,
      ..DetectorConfig::default()
    };
    let decoder = Decoder::new(&config, CLASSES).unwrap();
    assert_eq!(decoder.nms_score_threshold(), config.nms_score_threshold());
  }

  #[test]
  fn zero_classes_is_a_configuration_error() {
    assert!(matches!(
      Decoder::new(&DetectorConfig::default(), 0),
      Err(ConfigError::EmptyClassTable)
    ));
  }
}
