// 该文件是 Fenjian （分拣） 项目的一部分。
// src/input/heic.rs - HEIC/HEIF 转码
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

use super::PreprocessError;

/// 转码输出的 JPEG 质量
#[cfg_attr(not(feature = "heic"), allow(dead_code))]
const HEIC_JPEG_QUALITY: u8 = 90;

#[cfg(feature = "heic")]
pub(super) fn transcode_to_jpeg(bytes: &[u8]) -> Result<Vec<u8>, PreprocessError> {
  use image::{RgbImage, codecs::jpeg::JpegEncoder};
  use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};
  use tracing::debug;

  let conversion = |e: libheif_rs::HeifError| PreprocessError::FormatConversion(e.to_string());

  let lib_heif = LibHeif::new();
  let context = HeifContext::read_from_bytes(bytes).map_err(conversion)?;
  let handle = context.primary_image_handle().map_err(conversion)?;
  let decoded = lib_heif
    .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
    .map_err(conversion)?;

  let planes = decoded.planes();
  let interleaved = planes
    .interleaved
    .ok_or_else(|| PreprocessError::FormatConversion("HEIC 解码结果缺少交织平面".to_string()))?;

  let (width, height) = (interleaved.width, interleaved.height);
  let row_bytes = width as usize * 3;
  let mut pixels = Vec::with_capacity(row_bytes * height as usize);
  // 每行可能带有对齐填充
  for row in interleaved.data.chunks(interleaved.stride).take(height as usize) {
    let row = row
      .get(..row_bytes)
      .ok_or_else(|| PreprocessError::FormatConversion("HEIC 行数据长度不足".to_string()))?;
    pixels.extend_from_slice(row);
  }

  let image = RgbImage::from_raw(width, height, pixels)
    .ok_or_else(|| PreprocessError::FormatConversion("HEIC 像素数据长度不匹配".to_string()))?;
  debug!("HEIC 解码完成: {}x{}", width, height);

  let mut jpeg = Vec::new();
  JpegEncoder::new_with_quality(&mut jpeg, HEIC_JPEG_QUALITY)
    .encode_image(&image)
    .map_err(|e| PreprocessError::FormatConversion(e.to_string()))?;

  Ok(jpeg)
}

#[cfg(not(feature = "heic"))]
pub(super) fn transcode_to_jpeg(_bytes: &[u8]) -> Result<Vec<u8>, PreprocessError> {
  Err(PreprocessError::FormatConversion(
    "HEIC 支持未启用，请使用 heic 特性重新编译".to_string(),
  ))
}
