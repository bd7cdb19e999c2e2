// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model/decode.rs - 输出张量解码
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
use tracing::{debug, error};

use crate::{
  frame::Letterbox,
  model::{Candidate, RawOutputTensor, TensorView},
};

/// x, y, w, h
const BOX_FIELDS: usize = 4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
  #[error("无法识别的输出张量形状 {dims:?} (类别数 {num_classes})")]
  UnsupportedShape { dims: Vec<usize>, num_classes: usize },
}

/// 输出张量布局，由形状推断，每次解码只判断一次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
  /// [1, 4 + C, N]，同一字段的所有预测连续存放
  Transposed { num_predictions: usize },
  /// [1, N, stride]，每个预测占据连续的 stride 个值
  Standard { num_predictions: usize, stride: usize },
}

/// 单个预测的原始值（模型空间）
#[derive(Debug, Clone, Copy, PartialEq)]
struct Prediction {
  x: f32,
  y: f32,
  w: f32,
  h: f32,
  score: f32,
  class_index: usize,
}

impl OutputLayout {
  pub fn infer(dims: &[usize], num_classes: usize) -> Result<Self, DecodeError> {
    let unsupported = || DecodeError::UnsupportedShape {
      dims: dims.to_vec(),
      num_classes,
    };
    let row = BOX_FIELDS + num_classes;

    match *dims {
      [batch, _, _] if batch == 0 || num_classes == 0 => Err(unsupported()),
      [_, channels, num_predictions] if channels == row => {
        Ok(OutputLayout::Transposed { num_predictions })
      }
      [_, num_predictions, stride] if stride >= row => Ok(OutputLayout::Standard {
        num_predictions,
        stride,
      }),
      _ => Err(unsupported()),
    }
  }

  pub fn num_predictions(&self) -> usize {
    match *self {
      OutputLayout::Transposed { num_predictions } => num_predictions,
      OutputLayout::Standard { num_predictions, .. } => num_predictions,
    }
  }

  /// 第 `prediction` 个预测的第 `field` 个值，只读取第一个批次
  fn value(&self, view: &TensorView<'_>, prediction: usize, field: usize) -> Option<f32> {
    match self {
      OutputLayout::Transposed { .. } => view.get(&[0, field, prediction]),
      OutputLayout::Standard { .. } => view.get(&[0, prediction, field]),
    }
  }

  fn prediction(
    &self,
    view: &TensorView<'_>,
    index: usize,
    num_classes: usize,
  ) -> Option<Option<Prediction>> {
    let x = self.value(view, index, 0)?;
    let y = self.value(view, index, 1)?;
    let w = self.value(view, index, 2)?;
    let h = self.value(view, index, 3)?;

    // 严格大于，分数相同时保留先出现的类别
    let mut best: Option<(usize, f32)> = None;
    for c in 0..num_classes {
      let score = self.value(view, index, BOX_FIELDS + c)?;
      if score.is_nan() {
        continue;
      }
      if best.is_none_or(|(_, top)| score > top) {
        best = Some((c, score));
      }
    }

    Some(best.map(|(class_index, score)| Prediction {
      x,
      y,
      w,
      h,
      score,
      class_index,
    }))
  }
}

/// JavaScript `Math.round` 语义：.5 向正无穷取整。
///
/// 不能写成 `(v + 0.5).floor()`：略小于 0.5 的值相加后会进位到 1.0。
fn round_half_up(v: f32) -> f32 {
  // f32::round 把 .5 远离零取整，只有负数的 .5 需要回调
  let r = v.round();
  if v - r == 0.5 { r + 1.0 } else { r }
}

/// 把原始输出张量解码为候选框。
///
/// 置信度为所有类别分数中的最大值，只有 `confidence >= confidence_threshold`
/// 且为正数的预测会被保留。坐标先减去信箱填充再除以缩放系数，映射回原图。
pub fn decode(
  output: &RawOutputTensor,
  num_classes: usize,
  confidence_threshold: f32,
  letterbox: &Letterbox,
) -> Result<Vec<Candidate>, DecodeError> {
  let layout = OutputLayout::infer(output.dims(), num_classes).inspect_err(|e| error!("{}", e))?;
  debug!("输出形状 {:?}, 布局 {:?}", output.dims(), layout);

  let view = output.view();
  let mut candidates = Vec::new();

  for i in 0..layout.num_predictions() {
    let prediction = layout
      .prediction(&view, i, num_classes)
      .ok_or_else(|| DecodeError::UnsupportedShape {
        dims: output.dims().to_vec(),
        num_classes,
      })?;

    // 所有类别分数为 NaN
    let Some(p) = prediction else {
      continue;
    };

    if p.score <= 0.0 || p.score < confidence_threshold {
      continue;
    }

    let (x, y, width, height) = letterbox.to_original(p.x, p.y, p.w, p.h);
    candidates.push(Candidate {
      x,
      y,
      width,
      height,
      confidence: p.score,
      class_index: p.class_index,
      bbox: [
        round_half_up(x - width / 2.0),
        round_half_up(y - height / 2.0),
        round_half_up(x + width / 2.0),
        round_half_up(y + height / 2.0),
      ],
    });
  }

  debug!(
    "{} 个预测中 {} 个通过置信度阈值 {}",
    layout.num_predictions(),
    candidates.len(),
    confidence_threshold
  );

  Ok(candidates)
}
