// 该文件是 Fenjian （分拣） 项目的一部分。
// src/classifier.rs - 垃圾分类流水线
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

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  config::ModelConfig,
  input::{PreprocessError, RawImage, preprocess},
  model::{DecodeError, Detection, InferenceEngine, decode, suppress},
  output::ClassificationReport,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ClassifyError {
  #[error("model not loaded")]
  ModelNotReady,
  #[error(transparent)]
  Preprocess(#[from] PreprocessError),
  #[error("inference failed: {0}")]
  Inference(#[source] BoxError),
  #[error("failed to decode model output: {0}")]
  Decode(#[from] DecodeError),
}

impl ClassifyError {
  /// 服务暂不可用（模型未加载）
  pub fn is_unavailable(&self) -> bool {
    matches!(self, ClassifyError::ModelNotReady)
  }

  /// 输入图像本身有问题
  pub fn is_client_error(&self) -> bool {
    matches!(self, ClassifyError::Preprocess(_))
  }
}

/// 模型信息
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
  pub loaded: bool,
  pub input_shape: [u32; 2],
  pub class_names: Vec<String>,
  pub input_names: Vec<String>,
  pub output_names: Vec<String>,
}

/// 持有推理会话与配置，按顺序执行 预处理 -> 推理 -> 解码 -> NMS -> 汇总。
///
/// 会话只在构造时注入一次；`classify` 只需要 `&self`，可在多个线程间共享。
pub struct WasteClassifier<E> {
  engine: Option<E>,
  config: ModelConfig,
}

impl<E: InferenceEngine> WasteClassifier<E> {
  pub fn new(engine: E, config: ModelConfig) -> Self {
    info!("类别: {}", config.class_names.join(", "));
    Self {
      engine: Some(engine),
      config,
    }
  }

  /// 模型加载失败时使用，所有请求都会返回 [`ClassifyError::ModelNotReady`]
  pub fn unloaded(config: ModelConfig) -> Self {
    Self {
      engine: None,
      config,
    }
  }

  pub fn is_loaded(&self) -> bool {
    self.engine.is_some()
  }

  pub fn config(&self) -> &ModelConfig {
    &self.config
  }

  /// 运行检测，返回 NMS 后的结果（尚未经过报告阈值过滤）
  pub fn detect(&self, image: &RawImage) -> Result<Vec<Detection>, ClassifyError> {
    let engine = self.engine.as_ref().ok_or(ClassifyError::ModelNotReady)?;

    let tensor = preprocess(image, self.config.input_size)?;
    let output = engine
      .infer(&tensor)
      .map_err(|e| ClassifyError::Inference(Box::new(e)))?;
    debug!("模型输出形状: {:?}", output.dims());

    let candidates = decode(
      &output,
      self.config.num_classes(),
      self.config.confidence_threshold,
      tensor.letterbox(),
    )?;
    debug!("NMS 前预测数: {}", candidates.len());

    let detections = suppress(candidates, self.config.nms_threshold);
    debug!("NMS 后预测数: {}", detections.len());

    Ok(detections)
  }

  /// 对一张图像进行分类。失败时带上 house_id 记录日志后再返回错误。
  pub fn classify(
    &self,
    image: &RawImage,
    house_id: &str,
  ) -> Result<ClassificationReport, ClassifyError> {
    info!(house_id, "处理分类请求, 图像 {} 字节", image.len());

    let detections = self.detect(image).inspect_err(|e| {
      error!(house_id, "分类失败: {}", e);
    })?;

    let report = ClassificationReport::aggregate(
      &detections,
      &self.config.class_names,
      self.config.filter_threshold,
      house_id,
    );
    info!(
      house_id,
      "分类完成: {} ({} 个检测)",
      report.inference.as_str(),
      report.detections.len()
    );

    Ok(report)
  }

  pub fn model_info(&self) -> ModelInfo {
    let (input_names, output_names) = match &self.engine {
      Some(engine) => (
        engine.input_names().to_vec(),
        engine.output_names().to_vec(),
      ),
      None => (Vec::new(), Vec::new()),
    };

    ModelInfo {
      loaded: self.is_loaded(),
      input_shape: self.config.input_shape(),
      class_names: self.config.class_names.clone(),
      input_names,
      output_names,
    }
  }
}
