// 该文件是 Fenjian （分拣） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::RawImage};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI scheme mismatch: expected '{expected}', found '{found}'")]
  SchemaMismatch { expected: &'static str, found: String },
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

/// 读取磁盘上的图像文件，不做解码，交给预处理阶段
#[derive(Debug, Clone)]
pub struct ImageFileInput {
  path: String,
  image: RawImage,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch {
        expected: Self::SCHEME,
        found: url.scheme().to_string(),
      });
    }

    let path = url.path().to_string();
    let bytes = std::fs::read(&path)?;
    debug!("读取图像文件 {}: {} 字节", path, bytes.len());

    Ok(ImageFileInput {
      path,
      image: RawImage::new(bytes),
    })
  }
}

impl ImageFileInput {
  pub fn path(&self) -> &str {
    &self.path
  }

  pub fn image(&self) -> &RawImage {
    &self.image
  }

  pub fn into_image(self) -> RawImage {
    self.image
  }
}
