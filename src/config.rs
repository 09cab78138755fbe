// 该文件是 Tanzhao （探照） 项目的一部分。
// src/config.rs - 运行配置
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

use std::path::{Path, PathBuf};

use image::Rgb;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;
pub const DEFAULT_INPUT_WIDTH: u32 = 640;
pub const DEFAULT_INPUT_HEIGHT: u32 = 640;
pub const DEFAULT_ROWS: usize = 25200;
pub const DEFAULT_CAPTURE_ATTEMPTS: u32 = 20;
/// ESC 键
pub const DEFAULT_QUIT_KEY: u32 = 27;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("类别表为空")]
  EmptyClassTable,
  #[error("颜色表为空")]
  EmptyColorTable,
  #[error("阈值 {name} 超出范围 [0, 1]: {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("模型输入尺寸无效: {0}x{1}")]
  InvalidInputSize(u32, u32),
  #[error("模型输出行数必须大于 0")]
  InvalidRows,
  #[error("采集重试次数必须大于 0")]
  InvalidCaptureAttempts,
  #[error("模型输出形状与配置不符: 期望每行 {expected} 个值, 实际 {actual}")]
  StrideMismatch { expected: usize, actual: usize },
}

/// 类别名称与显示颜色
///
/// 颜色表可以比名称表短，按 `class_id % colors.len()` 循环取色。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawClassTable")]
pub struct ClassTable {
  names: Vec<String>,
  colors: Vec<[u8; 3]>,
}

#[derive(Deserialize)]
struct RawClassTable {
  names: Vec<String>,
  colors: Vec<[u8; 3]>,
}

impl TryFrom<RawClassTable> for ClassTable {
  type Error = ConfigError;

  fn try_from(raw: RawClassTable) -> Result<Self, Self::Error> {
    ClassTable::new(raw.names, raw.colors)
  }
}

impl Default for ClassTable {
  fn default() -> Self {
    Self {
      names: vec!["CT".to_string(), "T".to_string()],
      colors: vec![[0, 111, 255], [255, 0, 50]],
    }
  }
}

impl ClassTable {
  pub fn new(names: Vec<String>, colors: Vec<[u8; 3]>) -> Result<Self, ConfigError> {
    if names.is_empty() {
      return Err(ConfigError::EmptyClassTable);
    }
    if colors.is_empty() {
      return Err(ConfigError::EmptyColorTable);
    }
    Ok(Self { names, colors })
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }

  pub fn name(&self, class_id: usize) -> &str {
    self
      .names
      .get(class_id)
      .map(String::as_str)
      .unwrap_or("unknown")
  }

  pub fn color(&self, class_id: usize) -> Rgb<u8> {
    Rgb(self.colors[class_id % self.colors.len()])
  }
}

/// 解码与 NMS 参数
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
  /// 目标置信度与类别分数共用的阈值
  pub confidence_threshold: f32,
  /// NMS IoU 阈值
  pub nms_threshold: f32,
  pub input_width: u32,
  pub input_height: u32,
  /// 模型每次推理固定输出的行数
  pub rows: usize,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
      input_width: DEFAULT_INPUT_WIDTH,
      input_height: DEFAULT_INPUT_HEIGHT,
      rows: DEFAULT_ROWS,
    }
  }
}

impl DetectorConfig {
  /// 送入 NMS 的分数下限，低于逐行过滤所用的阈值。
  pub fn nms_score_threshold(&self) -> f32 {
    self.confidence_threshold * self.nms_threshold
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    check_unit("confidence_threshold", self.confidence_threshold)?;
    check_unit("nms_threshold", self.nms_threshold)?;
    if self.input_width == 0 || self.input_height == 0 {
      return Err(ConfigError::InvalidInputSize(
        self.input_width,
        self.input_height,
      ));
    }
    if self.rows == 0 {
      return Err(ConfigError::InvalidRows);
    }
    Ok(())
  }
}

fn check_unit(name: &'static str, value: f32) -> Result<(), ConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(ConfigError::ThresholdOutOfRange { name, value })
  }
}

/// 设备采集参数
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
  /// 设备模式下单次 `update` 最多读取的次数
  pub attempts: u32,
}

impl Default for CaptureConfig {
  fn default() -> Self {
    Self {
      attempts: DEFAULT_CAPTURE_ATTEMPTS,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
  pub detector: DetectorConfig,
  pub capture: CaptureConfig,
  pub classes: ClassTable,
  /// 标签字体文件（TTF/OTF）
  pub font: Option<PathBuf>,
  /// 调试记录目录，设置后逐帧写出标签与原图
  pub record: Option<PathBuf>,
  pub quit_key: u32,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      detector: DetectorConfig::default(),
      capture: CaptureConfig::default(),
      classes: ClassTable::default(),
      font: None,
      record: None,
      quit_key: DEFAULT_QUIT_KEY,
    }
  }
}

impl Config {
  /// 从 JSON 文件加载配置，缺省字段使用默认值
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    debug!("加载配置文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    self.detector.validate()?;
    if self.capture.attempts == 0 {
      return Err(ConfigError::InvalidCaptureAttempts);
    }
    Ok(())
  }
}
