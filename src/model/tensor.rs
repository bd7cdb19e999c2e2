// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model/tensor.rs - 输出张量与按步长访问的视图
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

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorShapeError {
  #[error("张量维度无效: {0:?}")]
  InvalidDims(Vec<i64>),
  #[error("张量数据长度 {actual} 与形状 {dims:?} 不匹配 (期望 {expected})")]
  LengthMismatch {
    dims: Vec<usize>,
    expected: usize,
    actual: usize,
  },
}

/// 推理后端返回的原始输出：形状 + 扁平 f32 缓冲区
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutputTensor {
  dims: Vec<usize>,
  data: Vec<f32>,
}

impl RawOutputTensor {
  pub fn new(dims: Vec<usize>, data: Vec<f32>) -> Result<Self, TensorShapeError> {
    let expected = dims.iter().product::<usize>();
    if expected != data.len() {
      return Err(TensorShapeError::LengthMismatch {
        dims,
        expected,
        actual: data.len(),
      });
    }
    Ok(Self { dims, data })
  }

  /// ONNX Runtime 的形状使用 i64，动态维度为负数
  pub fn from_i64_dims(dims: &[i64], data: Vec<f32>) -> Result<Self, TensorShapeError> {
    let dims = dims
      .iter()
      .map(|&d| usize::try_from(d))
      .collect::<Result<Vec<_>, _>>()
      .map_err(|_| TensorShapeError::InvalidDims(dims.to_vec()))?;
    Self::new(dims, data)
  }

  pub fn dims(&self) -> &[usize] {
    &self.dims
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }

  pub fn view(&self) -> TensorView<'_> {
    TensorView::new(&self.dims, &self.data)
  }
}

/// 行主序张量视图，隐藏扁平缓冲区的下标运算
#[derive(Debug, Clone)]
pub struct TensorView<'a> {
  shape: &'a [usize],
  strides: Vec<usize>,
  data: &'a [f32],
}

impl<'a> TensorView<'a> {
  /// 调用方保证 `data.len()` 等于形状各维乘积
  fn new(shape: &'a [usize], data: &'a [f32]) -> Self {
    let mut strides = vec![1usize; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
      strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    Self {
      shape,
      strides,
      data,
    }
  }

  pub fn shape(&self) -> &[usize] {
    self.shape
  }

  pub fn strides(&self) -> &[usize] {
    &self.strides
  }

  pub fn rank(&self) -> usize {
    self.shape.len()
  }

  /// 多维下标对应的扁平偏移，越界返回 None
  pub fn offset(&self, index: &[usize]) -> Option<usize> {
    if index.len() != self.shape.len() {
      return None;
    }
    index
      .iter()
      .zip(self.shape)
      .zip(&self.strides)
      .try_fold(0usize, |acc, ((&i, &dim), &stride)| {
        (i < dim).then_some(acc + i * stride)
      })
  }

  pub fn get(&self, index: &[usize]) -> Option<f32> {
    self.offset(index).and_then(|offset| self.data.get(offset).copied())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_length_mismatch() {
    let err = RawOutputTensor::new(vec![1, 2, 3], vec![0.0; 5]).unwrap_err();
    assert_eq!(
      err,
      TensorShapeError::LengthMismatch {
        dims: vec![1, 2, 3],
        expected: 6,
        actual: 5
      }
    );
  }

  #[test]
  fn test_negative_dims() {
    assert_eq!(
      RawOutputTensor::from_i64_dims(&[1, -1, 8], vec![]),
      Err(TensorShapeError::InvalidDims(vec![1, -1, 8]))
    );
  }

  #[test]
  fn test_strides_and_offsets() {
    let data: Vec<f32> = (0..24).map(|v| v as f32).collect();
    let tensor = RawOutputTensor::new(vec![2, 3, 4], data).unwrap();
    let view = tensor.view();

    assert_eq!(view.rank(), 3);
    assert_eq!(view.strides(), &[12, 4, 1]);
    assert_eq!(view.offset(&[1, 2, 3]), Some(23));
    assert_eq!(view.get(&[0, 1, 2]), Some(6.0));
    assert_eq!(view.get(&[0, 3, 0]), None);
    assert_eq!(view.get(&[0, 1]), None);
  }

  #[test]
  fn test_transposed_addressing() {
    // [1, 6, 2]: 2 个预测，每个 4 个框值 + 2 个类别分数，通道优先
    let data = vec![
      10.0, 11.0, // x
      20.0, 21.0, // y
      30.0, 31.0, // w
      40.0, 41.0, // h
      0.1, 0.2, // class 0
      0.3, 0.4, // class 1
    ];
    let tensor = RawOutputTensor::new(vec![1, 6, 2], data).unwrap();
    let view = tensor.view();

    // 字段 f、预测 i 位于 [0, f, i]
    assert_eq!(view.get(&[0, 0, 1]), Some(11.0));
    assert_eq!(view.get(&[0, 3, 0]), Some(40.0));
    assert_eq!(view.get(&[0, 5, 1]), Some(0.4));
  }

  #[test]
  fn test_standard_addressing() {
    // [1, 2, 6]: 每个预测连续存放
    let data = vec![
      10.0, 20.0, 30.0, 40.0, 0.1, 0.3, //
      11.0, 21.0, 31.0, 41.0, 0.2, 0.4,
    ];
    let tensor = RawOutputTensor::new(vec![1, 2, 6], data).unwrap();
    let view = tensor.view();

    // 预测 i、字段 f 位于 [0, i, f]
    assert_eq!(view.get(&[0, 1, 0]), Some(11.0));
    assert_eq!(view.get(&[0, 0, 3]), Some(40.0));
    assert_eq!(view.get(&[0, 1, 5]), Some(0.4));
  }
}
