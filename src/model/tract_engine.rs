// 该文件是 Tanzhao （探照） 项目的一部分。
// src/model/tract_engine.rs - 基于 tract 的 ONNX 推理后端
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
use tract_onnx::prelude::*;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{AsNchwFrame, ModelInput},
  model::{InferenceEngine, RawTensor},
};

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

#[derive(Error, Debug)]
pub enum TractEngineError {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("输入尺寸不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  InputShapeMismatch {
    expected: (usize, usize),
    actual: (usize, usize),
  },
  #[error("推理错误: {0}")]
  InferenceError(String),
}

impl TractEngineError {
  fn load(e: TractError) -> Self {
    TractEngineError::ModelLoadError(format!("{e:#}"))
  }

  fn inference(e: TractError) -> Self {
    TractEngineError::InferenceError(format!("{e:#}"))
  }
}

pub struct TractEngineBuilder {
  model_path: String,
}

impl FromUrlWithScheme for TractEngineBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for TractEngineBuilder {
  type Error = TractEngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(TractEngineError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(TractEngineBuilder {
      model_path: url.path().to_string(),
    })
  }
}

impl TractEngineBuilder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
    }
  }

  pub fn build(self, input_width: u32, input_height: u32) -> Result<TractEngine, TractEngineError> {
    let (width, height) = (input_width as usize, input_height as usize);
    info!("加载模型文件: {}", self.model_path);

    let plan = tract_onnx::onnx()
      .model_for_path(&self.model_path)
      .map_err(TractEngineError::load)?
      .with_input_fact(
        0,
        InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, height, width)),
      )
      .map_err(TractEngineError::load)?
      .into_optimized()
      .map_err(TractEngineError::load)?
      .into_runnable()
      .map_err(TractEngineError::load)?;
    info!("模型加载完成");

    Ok(TractEngine {
      plan,
      width,
      height,
    })
  }
}

/// 在 CPU 上运行 ONNX 模型
pub struct TractEngine {
  plan: OnnxPlan,
  width: usize,
  height: usize,
}

impl InferenceEngine for TractEngine {
  type Error = TractEngineError;

  fn infer(&self, input: &ModelInput) -> Result<Vec<RawTensor>, Self::Error> {
    if (input.width(), input.height()) != (self.width, self.height) {
      return Err(TractEngineError::InputShapeMismatch {
        expected: (self.width, self.height),
        actual: (input.width(), input.height()),
      });
    }

    let tensor = Tensor::from_shape(&[1, 3, self.height, self.width], input.as_nchw())
      .map_err(TractEngineError::inference)?;
    let outputs = self
      .plan
      .run(tvec!(tensor.into()))
      .map_err(TractEngineError::inference)?;

    let mut tensors = Vec::with_capacity(outputs.len());
    for output in outputs.iter() {
      let view = output
        .to_array_view::<f32>()
        .map_err(TractEngineError::inference)?;
      tensors.push(RawTensor::new(
        view.shape().to_vec(),
        view.iter().copied().collect(),
      ));
    }
    debug!("模型输出数量: {}", tensors.len());

    Ok(tensors)
  }

  fn output_shape(&self) -> Option<Vec<usize>> {
    let fact = self.plan.model().output_fact(0).ok()?;
    fact.shape.as_concrete().map(|shape| shape.to_vec())
  }
}
