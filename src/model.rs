// 该文件是 Tanzhao （探照） 项目的一部分。
// src/model.rs - 模型
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
use thiserror::Error;
use tracing::debug;

use crate::{
  config::{ClassTable, ConfigError, DetectorConfig},
  frame::ModelInput,
  geometry::BoxRect,
  preprocess::Preprocessor,
};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 推理引擎返回的原始输出张量
#[derive(Debug, Clone, PartialEq)]
pub struct RawTensor {
  pub shape: Vec<usize>,
  pub data: Vec<f32>,
}

impl RawTensor {
  pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
    Self { shape, data }
  }
}

/// 推理后端
///
/// 只约定输入输出：输入为归一化后的固定尺寸图像，输出为若干原始张量，
/// 其中第一个张量为检测结果。
pub trait InferenceEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, input: &ModelInput) -> Result<Vec<RawTensor>, Self::Error>;

  /// 第一个输出张量的形状（若后端可以提前得知）
  fn output_shape(&self) -> Option<Vec<usize>> {
    None
  }
}

/// 单个检测结果，坐标为原始帧像素
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub class_id: usize,
  pub confidence: f32,
  pub bbox: BoxRect,
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }
}

impl From<Vec<Detection>> for DetectResult {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("配置错误: {0}")]
  ConfigError(#[from] ConfigError),
  #[error("推理错误: {0}")]
  EngineError(Box<dyn std::error::Error + Send + Sync>),
  #[error("推理引擎没有返回任何输出")]
  NoOutput,
  #[error("解码错误: {0}")]
  DecodeError(#[from] DecodeError),
}

/// 预处理、推理、解码串联起来的检测器
pub struct Detector<E> {
  engine: E,
  preprocessor: Preprocessor,
  decoder: Decoder,
}

impl<E: InferenceEngine> Detector<E> {
  pub fn new(engine: E, config: &DetectorConfig, classes: &ClassTable) -> Result<Self, DetectorError> {
    let decoder = Decoder::new(config, classes.len())?;

    if let Some(shape) = engine.output_shape() {
      debug!("模型输出形状: {:?}", shape);
      if let Some(&last) = shape.last()
        && last != decoder.stride()
      {
        return Err(
          ConfigError::StrideMismatch {
            expected: decoder.stride(),
            actual: last,
          }
          .into(),
        );
      }
    }

    Ok(Self {
      engine,
      preprocessor: Preprocessor::new(config.input_width, config.input_height),
      decoder,
    })
  }

  pub fn decoder(&self) -> &Decoder {
    &self.decoder
  }
}

impl<E: InferenceEngine> Model for Detector<E> {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = DetectorError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let (model_input, factors) = self.preprocessor.prepare(input);
    debug!("执行模型推理, 缩放系数: {:?}", factors);

    let outputs = self
      .engine
      .infer(&model_input)
      .map_err(|e| DetectorError::EngineError(Box::new(e)))?;
    let first = outputs.first().ok_or(DetectorError::NoOutput)?;

    let detections = self.decoder.decode(&first.data, factors)?;
    debug!("检测到 {} 个物体", detections.len());
    Ok(detections.into())
  }
}

mod decode;
mod nms;
pub use self::decode::{DecodeError, Decoder};
pub use self::nms::{nms_boxes, suppress};

#[cfg(feature = "onnx_tract")]
mod tract_engine;
#[cfg(feature = "onnx_tract")]
pub use self::tract_engine::{TractEngine, TractEngineBuilder, TractEngineError};
