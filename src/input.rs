// 该文件是 Fenjian （分拣） 项目的一部分。
// src/input.rs - 图像输入与预处理
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

use image::{Rgb, RgbImage, imageops};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::frame::{Letterbox, RgbNchwTensor};

mod heic;

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

/// YOLO 惯用的灰色填充
pub const LETTERBOX_FILL: [u8; 3] = [114, 114, 114];

/// ISO BMFF `ftyp` 盒子中的 HEIC/HEIF 品牌，位于字节 4..12
const HEIF_SIGNATURES: [&[u8; 8]; 4] = [b"ftypheic", b"ftypheix", b"ftyphevc", b"ftyphevx"];

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("failed to preprocess image: {0}")]
  ImageDecode(#[from] image::ImageError),
  #[error("failed to preprocess image: empty image ({width}x{height})")]
  EmptyImage { width: u32, height: u32 },
  #[error("failed to preprocess image: target size must be positive")]
  ZeroTargetSize,
  #[error("failed to convert HEIC image: {0}")]
  FormatConversion(String),
}

/// 图像编码类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
  /// JPEG、PNG 等常规光栅格式
  Raster,
  /// HEIC/HEIF 容器
  Heif,
}

impl ImageEncoding {
  pub fn detect(bytes: &[u8]) -> Self {
    if bytes.len() < 12 {
      return ImageEncoding::Raster;
    }
    let header = &bytes[4..12];
    if HEIF_SIGNATURES.iter().any(|sig| header == sig.as_slice()) {
      ImageEncoding::Heif
    } else {
      ImageEncoding::Raster
    }
  }
}

/// 未解码的原始图像字节
#[derive(Debug, Clone)]
pub struct RawImage {
  bytes: Box<[u8]>,
  encoding: ImageEncoding,
}

impl RawImage {
  pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
    let bytes = bytes.into();
    let encoding = ImageEncoding::detect(&bytes);
    Self { bytes, encoding }
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  pub fn encoding(&self) -> ImageEncoding {
    self.encoding
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }
}

impl From<Vec<u8>> for RawImage {
  fn from(bytes: Vec<u8>) -> Self {
    RawImage::new(bytes)
  }
}

/// 解码图像并转换为 S×S 的归一化 NCHW 张量
pub fn preprocess(raw: &RawImage, target_size: u32) -> Result<RgbNchwTensor, PreprocessError> {
  let decoded = match raw.encoding() {
    ImageEncoding::Heif => {
      info!("转换 HEIC 图像为 JPEG");
      let jpeg = heic::transcode_to_jpeg(raw.bytes()).inspect_err(|e| {
        error!("HEIC 转换错误: {}", e);
      })?;
      image::load_from_memory(&jpeg)
    }
    ImageEncoding::Raster => image::load_from_memory(raw.bytes()),
  }
  .inspect_err(|e| error!("图像解码错误: {}", e))?;

  letterbox(&decoded.to_rgb8(), target_size)
}

/// 保持宽高比缩放到 S×S 画布并居中，空白处用灰色填充
pub fn letterbox(image: &RgbImage, target_size: u32) -> Result<RgbNchwTensor, PreprocessError> {
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    return Err(PreprocessError::EmptyImage { width, height });
  }
  if target_size == 0 {
    return Err(PreprocessError::ZeroTargetSize);
  }

  let scale = target_size as f32 / width.max(height) as f32;
  let resized_w = ((width as f32 * scale).round() as u32).clamp(1, target_size);
  let resized_h = ((height as f32 * scale).round() as u32).clamp(1, target_size);
  let pad_x = (target_size - resized_w) / 2;
  let pad_y = (target_size - resized_h) / 2;

  debug!(
    "预处理: {}x{} -> {}x{}, 缩放 {:.4}, 填充 ({}, {})",
    width, height, resized_w, resized_h, scale, pad_x, pad_y
  );

  let mut canvas = RgbImage::from_pixel(target_size, target_size, Rgb(LETTERBOX_FILL));
  if (resized_w, resized_h) == (width, height) {
    imageops::replace(&mut canvas, image, pad_x as i64, pad_y as i64);
  } else {
    let resized = imageops::resize(image, resized_w, resized_h, imageops::FilterType::Triangle);
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);
  }

  Ok(RgbNchwTensor::from_nhwc(
    canvas.as_raw(),
    target_size as usize,
    width,
    height,
    Letterbox {
      scale,
      pad_x: pad_x as f32,
      pad_y: pad_y as f32,
    },
  ))
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::ImageFormat;
  use std::io::Cursor;

  fn encode_png(image: &RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
  }

  fn heif_header(brand: &[u8; 4]) -> Vec<u8> {
    let mut bytes = vec![0x00, 0x00, 0x00, 0x18];
    bytes.extend_from_slice(b"ftyp");
    bytes.extend_from_slice(brand);
    bytes.extend_from_slice(&[0u8; 16]);
    bytes
  }

  #[test]
  fn test_detect_heif_signatures() {
    for brand in [b"heic", b"heix", b"hevc", b"hevx"] {
      assert_eq!(ImageEncoding::detect(&heif_header(brand)), ImageEncoding::Heif);
    }
    assert_eq!(ImageEncoding::detect(&heif_header(b"avif")), ImageEncoding::Raster);
    assert_eq!(ImageEncoding::detect(b"ftypheic"), ImageEncoding::Raster);
    assert_eq!(ImageEncoding::detect(&[]), ImageEncoding::Raster);

    let png = encode_png(&RgbImage::new(2, 2));
    assert_eq!(RawImage::new(png).encoding(), ImageEncoding::Raster);
  }

  #[test]
  fn test_square_image_has_no_padding() {
    let image = RgbImage::from_pixel(384, 384, Rgb([255, 0, 0]));
    let raw = RawImage::new(encode_png(&image));
    let tensor = preprocess(&raw, 768).unwrap();

    assert_eq!(tensor.scale(), 2.0);
    assert_eq!(tensor.letterbox().pad_x, 0.0);
    assert_eq!(tensor.letterbox().pad_y, 0.0);
    assert_eq!(tensor.original_width(), 384);
    assert_eq!(tensor.original_height(), 384);
    assert_eq!(tensor.as_slice().len(), 3 * 768 * 768);

    // 四角都应是原图颜色而不是填充色
    for (h, w) in [(0, 0), (0, 767), (767, 0), (767, 767)] {
      assert!((tensor.get(0, h, w).unwrap() - 1.0).abs() < 1.0 / 255.0);
      assert!(tensor.get(1, h, w).unwrap() < 1.0 / 255.0);
    }
  }

  #[test]
  fn test_wide_image_is_padded_vertically() {
    let image = RgbImage::from_pixel(200, 100, Rgb([0, 255, 0]));
    let tensor = letterbox(&image, 768).unwrap();
    let fill = 114.0 / 255.0;

    assert!((tensor.scale() - 3.84).abs() < 1e-6);
    assert_eq!(tensor.letterbox().pad_x, 0.0);
    assert_eq!(tensor.letterbox().pad_y, 192.0);

    for c in 0..3 {
      assert_eq!(tensor.get(c, 0, 0), Some(fill));
      assert_eq!(tensor.get(c, 767, 400), Some(fill));
    }
    assert!((tensor.get(1, 384, 384).unwrap() - 1.0).abs() < 1.0 / 255.0);
    assert!(tensor.get(0, 384, 384).unwrap() < 1.0 / 255.0);
  }

  #[test]
  fn test_values_are_normalized() {
    let image = RgbImage::from_fn(37, 53, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 200]));
    let tensor = letterbox(&image, 64).unwrap();
    assert!(tensor.scale() > 0.0);
    assert!(tensor.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
  }

  #[test]
  fn test_corrupt_bytes_fail_to_decode() {
    let raw = RawImage::new(vec![0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
    let err = preprocess(&raw, 768).unwrap_err();
    assert!(matches!(err, PreprocessError::ImageDecode(_)));
    assert!(err.to_string().starts_with("failed to preprocess image"));
  }

  #[cfg(not(feature = "heic"))]
  #[test]
  fn test_heif_without_feature_is_conversion_error() {
    let raw = RawImage::new(heif_header(b"heic"));
    let err = preprocess(&raw, 768).unwrap_err();
    assert!(matches!(err, PreprocessError::FormatConversion(_)));
  }

  #[test]
  fn test_zero_target_size() {
    let image = RgbImage::new(4, 4);
    assert!(matches!(
      letterbox(&image, 0),
      Err(PreprocessError::ZeroTargetSize)
    ));
  }
}
