// 该文件是 Fenjian （分拣） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use url::Url;

use fenjian::{
  FromUrl, ModelConfig, WasteClassifier,
  input::ImageFileInput,
  model::{OnnxSession, OnnxSessionBuilder},
  output::{JsonLinesOutput, Render},
  task::{BatchTask, Task, TaskInput},
};

use args::{Args, ClassifyArgs, Command, ModelArgs};

fn model_config(args: &ModelArgs) -> Result<ModelConfig> {
  let mut config = ModelConfig::default()
    .with_url_query(&args.model)
    .context("无法解析模型参数")?;
  if let Some(t) = args.confidence {
    config = config.with_confidence_threshold(t);
  }
  if let Some(t) = args.nms_threshold {
    config = config.with_nms_threshold(t);
  }
  if let Some(t) = args.filter_threshold {
    config = config.with_filter_threshold(t);
  }
  if let Some(size) = args.input_size {
    config = config.with_input_size(size);
  }
  if let Some(classes) = &args.classes {
    config = config.with_class_names(classes.iter().cloned());
  }
  config.validate().context("模型配置无效")?;
  Ok(config)
}

/// 模型加载失败不会终止进程，之后的每个请求都会快速失败
fn load_classifier(args: &ModelArgs) -> Result<WasteClassifier<OnnxSession>> {
  let config = model_config(args)?;

  info!("模型文件路径: {}", args.model);
  info!("置信度阈值: {}", config.confidence_threshold);
  info!("NMS 阈值: {}", config.nms_threshold);
  info!("过滤阈值: {}", config.filter_threshold);

  let session = OnnxSessionBuilder::from_url(&args.model).and_then(OnnxSessionBuilder::build);
  Ok(match session {
    Ok(session) => WasteClassifier::new(session, config),
    Err(e) => {
      error!("模型加载失败: {}", e);
      WasteClassifier::unloaded(config)
    }
  })
}

/// house_id 只校验不修改，报告中原样输出
fn checked_house_id(raw: &str) -> Result<&str> {
  if raw.trim().is_empty() {
    anyhow::bail!("house_id 不能为空");
  }
  Ok(raw)
}

/// 读取所有输入，无法读取的输入记录日志后跳过，返回可用输入与失败数
fn read_inputs(urls: &[Url], house_id: &str) -> (Vec<TaskInput>, usize) {
  let mut inputs = Vec::with_capacity(urls.len());
  let mut failures = 0usize;
  for url in urls {
    match ImageFileInput::from_url(url) {
      Ok(input) => inputs.push((input.path().to_string(), input.into_image())),
      Err(e) => {
        error!(house_id, "无法读取输入 {}: {}", url, e);
        failures += 1;
      }
    }
  }
  (inputs, failures)
}

fn classify(args: ClassifyArgs) -> Result<()> {
  let house_id = checked_house_id(&args.house_id)?;

  let classifier = load_classifier(&args.model)?;
  let (inputs, unreadable) = read_inputs(&args.inputs, house_id);

  let mut task = BatchTask::new(house_id);
  if let Some(workers) = args.workers {
    task = task.with_workers(workers);
  }

  let output = JsonLinesOutput::stdout();
  let result = task.run_task(inputs, &classifier, &output);
  match (result, unreadable) {
    (result, 0) => result,
    (Ok(()), n) => anyhow::bail!("{} 个输入无法读取", n),
    (Err(e), n) => Err(e.context(format!("另有 {} 个输入无法读取", n))),
  }
}

fn info(args: ModelArgs) -> Result<()> {
  let classifier = load_classifier(&args)?;
  let output = JsonLinesOutput::stdout();
  output.render_result("model-info", &classifier.model_info())?;
  Ok(())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  match args.command {
    Command::Classify(args) => classify(args),
    Command::Info(args) => info(args),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_house_id_is_passed_through() {
    assert_eq!(checked_house_id("  H7 ").unwrap(), "  H7 ");
    assert_eq!(checked_house_id("H7").unwrap(), "H7");
    assert!(checked_house_id("").is_err());
    assert!(checked_house_id(" \t ").is_err());
  }

  #[test]
  fn test_unreadable_inputs_are_skipped() {
    let path = std::env::temp_dir().join(format!("fenjian-main-{}.png", std::process::id()));
    std::fs::write(&path, b"bytes").unwrap();
    let readable = Url::parse(&format!("image://{}", path.display())).unwrap();
    let missing = Url::parse("image:///nonexistent/fenjian/missing.png").unwrap();
    let wrong_scheme = Url::parse("video:///tmp/a.mp4").unwrap();

    let (inputs, failures) = read_inputs(&[missing, readable, wrong_scheme], "h");
    assert_eq!(failures, 2);
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].0, path.to_str().unwrap());
    assert_eq!(inputs[0].1.bytes(), b"bytes");

    std::fs::remove_file(&path).unwrap();
  }
}
