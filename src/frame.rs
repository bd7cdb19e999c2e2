// 该文件是 Fenjian （分拣） 项目的一部分。
// src/frame.rs - NCHW 浮点张量定义
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

pub const RGB_CHANNELS: usize = 3;

/// 信箱（letterbox）变换参数，用于把模型空间坐标还原到原图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  /// S / max(原图宽, 原图高)
  pub scale: f32,
  /// 画布左侧填充像素
  pub pad_x: f32,
  /// 画布顶部填充像素
  pub pad_y: f32,
}

impl Letterbox {
  pub fn from_scale(scale: f32) -> Self {
    Self {
      scale,
      pad_x: 0.0,
      pad_y: 0.0,
    }
  }

  /// 中心式框 (x, y, w, h) 从模型空间映射回原图空间
  pub fn to_original(&self, x: f32, y: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    (
      (x - self.pad_x) / self.scale,
      (y - self.pad_y) / self.scale,
      w / self.scale,
      h / self.scale,
    )
  }
}

/// 预处理后的 RGB 平面张量，布局为 [1, 3, S, S]，取值范围 [0, 1]
#[derive(Debug, Clone)]
pub struct RgbNchwTensor {
  data: Box<[f32]>,
  size: usize,
  original_width: u32,
  original_height: u32,
  letterbox: Letterbox,
}

impl RgbNchwTensor {
  /// 由交织的 HWC 字节数据构造，同时完成归一化与 HWC -> CHW 转换
  pub fn from_nhwc(
    pixels: &[u8],
    size: usize,
    original_width: u32,
    original_height: u32,
    letterbox: Letterbox,
  ) -> Self {
    debug_assert_eq!(pixels.len(), RGB_CHANNELS * size * size);

    let plane = size * size;
    let mut data = vec![0f32; RGB_CHANNELS * plane].into_boxed_slice();

    for h in 0..size {
      for w in 0..size {
        let src = h * size * RGB_CHANNELS + w * RGB_CHANNELS;
        for c in 0..RGB_CHANNELS {
          data[c * plane + h * size + w] = pixels[src + c] as f32 / 255.0;
        }
      }
    }

    Self {
      data,
      size,
      original_width,
      original_height,
      letterbox,
    }
  }

  pub fn height(&self) -> usize {
    self.size
  }

  pub fn width(&self) -> usize {
    self.size
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, self.size, self.size]
  }

  pub fn original_width(&self) -> u32 {
    self.original_width
  }

  pub fn original_height(&self) -> u32 {
    self.original_height
  }

  pub fn scale(&self) -> f32 {
    self.letterbox.scale
  }

  pub fn letterbox(&self) -> &Letterbox {
    &self.letterbox
  }

  /// 读取 (c, h, w) 位置的值
  pub fn get(&self, c: usize, h: usize, w: usize) -> Option<f32> {
    if c >= RGB_CHANNELS || h >= self.size || w >= self.size {
      return None;
    }
    Some(self.data[c * self.size * self.size + h * self.size + w])
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}

impl AsRef<[f32]> for RgbNchwTensor {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}
