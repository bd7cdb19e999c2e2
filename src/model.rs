// 该文件是 Fenjian （分拣） 项目的一部分。
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

use crate::frame::RgbNchwTensor;

/// 推理后端。会话在进程启动时创建一次，之后以只读引用在多个请求间共享。
pub trait InferenceEngine: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, input: &RgbNchwTensor) -> Result<RawOutputTensor, Self::Error>;
  fn input_names(&self) -> &[String];
  fn output_names(&self) -> &[String];
}

/// 解码得到的候选框，坐标已映射回原图空间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  /// 中心 x
  pub x: f32,
  /// 中心 y
  pub y: f32,
  pub width: f32,
  pub height: f32,
  /// 最大类别分数
  pub confidence: f32,
  pub class_index: usize,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，已取整
}

/// NMS 之后保留下来的候选框
pub type Detection = Candidate;

mod decode;
mod nms;
mod onnx;
mod tensor;

pub use self::decode::{DecodeError, OutputLayout, decode};
pub use self::nms::{IOU_EPSILON, iou, suppress};
pub use self::onnx::{OnnxError, OnnxSession, OnnxSessionBuilder};
pub use self::tensor::{RawOutputTensor, TensorShapeError, TensorView};
