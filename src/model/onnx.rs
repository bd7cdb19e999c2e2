// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理会话
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

use std::sync::Mutex;

use ort::logging::LogLevel;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNchwTensor,
  model::{InferenceEngine, RawOutputTensor, TensorShapeError},
};

#[derive(Error, Debug)]
pub enum OnnxError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("推理会话锁已失效")]
  LockPoisoned,
  #[error("输出张量错误: {0}")]
  OutputError(#[from] TensorShapeError),
}

pub struct OnnxSessionBuilder {
  model_path: String,
  intra_threads: Option<usize>,
}

impl FromUrlWithScheme for OnnxSessionBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxSessionBuilder {
  type Error = OnnxError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let intra_threads = url
      .query_pairs()
      .find(|(k, _)| k == "threads")
      .map(|(_, v)| {
        v.parse::<usize>()
          .map_err(|_| OnnxError::ModelPathError(format!("无效的线程数: {}", v)))
      })
      .transpose()?;

    Ok(OnnxSessionBuilder {
      model_path: url.path().to_string(),
      intra_threads,
    })
  }
}

impl OnnxSessionBuilder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
      intra_threads: None,
    }
  }

  pub fn intra_threads(mut self, threads: usize) -> Self {
    self.intra_threads = Some(threads);
    self
  }

  pub fn model_path(&self) -> &str {
    &self.model_path
  }

  pub fn build(self) -> Result<OnnxSession, OnnxError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 ONNX Runtime 推理会话");
    let mut builder = Session::builder()?
      .with_log_level(LogLevel::Error)?
      .with_optimization_level(GraphOptimizationLevel::Level3)?;
    if let Some(threads) = self.intra_threads {
      builder = builder.with_intra_threads(threads)?;
    }
    let session = builder.commit_from_memory(&model_data)?;

    let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
    let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

    if input_names.is_empty() || output_names.is_empty() {
      error!(
        "模型输入/输出数量异常: {} / {}",
        input_names.len(),
        output_names.len()
      );
      return Err(OnnxError::ModelInvalid(format!(
        "模型至少需要一个输入和一个输出，实际为 {} 个输入、{} 个输出",
        input_names.len(),
        output_names.len()
      )));
    }

    info!("模型加载完成");
    info!("输入名称: {}", input_names.join(", "));
    info!("输出名称: {}", output_names.join(", "));

    Ok(OnnxSession {
      session: Mutex::new(session),
      input_names,
      output_names,
    })
  }
}

/// ONNX 推理会话。`Session::run` 需要可变借用，因此用互斥锁串行化并发调用。
pub struct OnnxSession {
  session: Mutex<Session>,
  input_names: Vec<String>,
  output_names: Vec<String>,
}

impl InferenceEngine for OnnxSession {
  type Error = OnnxError;

  fn infer(&self, input: &RgbNchwTensor) -> Result<RawOutputTensor, Self::Error> {
    let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
    let tensor = TensorRef::from_array_view((dims, input.as_slice()))?;

    let mut session = self.session.lock().map_err(|_| OnnxError::LockPoisoned)?;

    debug!("执行模型推理");
    let outputs = session.run(ort::inputs![self.input_names[0].as_str() => tensor])?;

    let (shape, data) = outputs[self.output_names[0].as_str()].try_extract_tensor::<f32>()?;
    let dims: Vec<i64> = shape.iter().copied().collect();
    debug!("模型输出形状: {:?}", dims);
    debug!(
      "前几个输出值: {:?}",
      &data[..data.len().min(20)]
    );

    Ok(RawOutputTensor::from_i64_dims(&dims, data.to_vec())?)
  }

  fn input_names(&self) -> &[String] {
    &self.input_names
  }

  fn output_names(&self) -> &[String] {
    &self.output_names
  }
}
