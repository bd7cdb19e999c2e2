// 该文件是 Fenjian （分拣） 项目的一部分。
// src/config.rs - 模型与后处理配置
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
use url::Url;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.45;
pub const DEFAULT_FILTER_THRESHOLD: f32 = 0.6;
pub const DEFAULT_INPUT_SIZE: u32 = 768;
/// 输入边长上限，张量占用 3·S² 个 f32
pub const MAX_INPUT_SIZE: u32 = 4096;

/// 类别顺序与模型输出通道一一对应，不可随意调整
pub const DEFAULT_CLASS_NAMES: [&str; 4] = ["Bio-Medical", "Plastic", "Construction", "Horticulture"];

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("阈值 {name} 超出范围 [0, 1]: {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("输入尺寸必须大于 0")]
  ZeroInputSize,
  #[error("输入尺寸 {0} 超过上限 {MAX_INPUT_SIZE}")]
  InputSizeTooLarge(u32),
  #[error("类别列表不能为空")]
  EmptyClassNames,
  #[error("无法解析参数 {key}={value}")]
  InvalidValue { key: String, value: String },
}

/// 模型与后处理配置
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
  /// 候选框置信度阈值
  pub confidence_threshold: f32,
  /// NMS IoU 阈值
  pub nms_threshold: f32,
  /// 报告过滤阈值，比候选框阈值更严格
  pub filter_threshold: f32,
  /// 模型输入边长（正方形）
  pub input_size: u32,
  /// 类别名称，下标即模型输出中的类别偏移
  pub class_names: Vec<String>,
}

impl Default for ModelConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
      filter_threshold: DEFAULT_FILTER_THRESHOLD,
      input_size: DEFAULT_INPUT_SIZE,
      class_names: DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
    }
  }
}

impl ModelConfig {
  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_nms_threshold(mut self, threshold: f32) -> Self {
    self.nms_threshold = threshold;
    self
  }

  pub fn with_filter_threshold(mut self, threshold: f32) -> Self {
    self.filter_threshold = threshold;
    self
  }

  pub fn with_input_size(mut self, size: u32) -> Self {
    self.input_size = size;
    self
  }

  pub fn with_class_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
    self.class_names = names.into_iter().map(Into::into).collect();
    self
  }

  /// [H, W]
  pub fn input_shape(&self) -> [u32; 2] {
    [self.input_size, self.input_size]
  }

  pub fn num_classes(&self) -> usize {
    self.class_names.len()
  }

  /// 从模型 URL 的查询参数中读取覆盖项，例如
  /// `onnx:///models/best.onnx?confidence=0.3&nms=0.5&filter=0.6&size=640&classes=a,b`
  pub fn with_url_query(mut self, url: &Url) -> Result<Self, ConfigError> {
    for (key, value) in url.query_pairs() {
      debug!("模型参数: {}={}", key, value);
      match key.as_ref() {
        "confidence" => self.confidence_threshold = parse_value(&key, &value)?,
        "nms" => self.nms_threshold = parse_value(&key, &value)?,
        "filter" => self.filter_threshold = parse_value(&key, &value)?,
        "size" => self.input_size = parse_value(&key, &value)?,
        "classes" => {
          self.class_names = value
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        }
        // 其他参数交给推理后端
        _ => {}
      }
    }
    Ok(self)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    for (name, value) in [
      ("confidence", self.confidence_threshold),
      ("nms", self.nms_threshold),
      ("filter", self.filter_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { name, value });
      }
    }
    if self.input_size == 0 {
      return Err(ConfigError::ZeroInputSize);
    }
    if self.input_size > MAX_INPUT_SIZE {
      return Err(ConfigError::InputSizeTooLarge(self.input_size));
    }
    if self.class_names.is_empty() {
      return Err(ConfigError::EmptyClassNames);
    }
    Ok(())
  }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
  value.trim().parse().map_err(|_| ConfigError::InvalidValue {
    key: key.to_string(),
    value: value.to_string(),
  })
}
