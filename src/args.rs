// 该文件是 Fenjian （分拣） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use clap::{Args as ClapArgs, Parser, Subcommand};
use url::Url;

/// Fenjian 垃圾分类命令行
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 对图像进行分类，每个输入输出一行 JSON 报告
  Classify(ClassifyArgs),
  /// 输出模型信息
  Info(ModelArgs),
}

#[derive(ClapArgs, Debug)]
pub struct ModelArgs {
  /// ONNX 模型路径，例如 onnx:///models/best.onnx?threads=4
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 置信度阈值 (0.0 - 1.0)，默认 0.25
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,

  /// NMS IOU 阈值 (0.0 - 1.0)，默认 0.45
  #[arg(long, value_name = "THRESHOLD")]
  pub nms_threshold: Option<f32>,

  /// 报告过滤阈值 (0.0 - 1.0)，默认 0.6
  #[arg(long, value_name = "THRESHOLD")]
  pub filter_threshold: Option<f32>,

  /// 模型输入边长，默认 768
  #[arg(long, value_name = "PIXELS")]
  pub input_size: Option<u32>,

  /// 类别名称，顺序必须与模型输出一致
  #[arg(long, value_name = "NAMES", value_delimiter = ',')]
  pub classes: Option<Vec<String>>,
}

#[derive(ClapArgs, Debug)]
pub struct ClassifyArgs {
  #[command(flatten)]
  pub model: ModelArgs,

  /// 住户标识，原样写入报告
  #[arg(long, value_name = "ID")]
  pub house_id: String,

  /// 并发工作线程数，默认为 CPU 核数
  #[arg(long, value_name = "COUNT")]
  pub workers: Option<usize>,

  /// 输入图像，例如 image:///data/bin.jpg
  #[arg(value_name = "SOURCE", required = true)]
  pub inputs: Vec<Url>,
}
