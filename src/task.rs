// 该文件是 Fenjian （分拣） 项目的一部分。
// src/task.rs - 分类任务
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

use std::thread;

use tracing::{error, info, warn};

use crate::{
  classifier::WasteClassifier, input::RawImage, model::InferenceEngine,
  output::{ClassificationReport, Render},
};

/// 一个待分类的输入：来源描述 + 原始字节
pub type TaskInput = (String, RawImage);

pub trait Task<I, E, O>: Sized {
  type Error;
  fn run_task(self, input: I, classifier: &WasteClassifier<E>, output: &O)
  -> Result<(), Self::Error>;
}

/// 只处理第一个输入
pub struct OneShotTask {
  house_id: String,
}

impl OneShotTask {
  pub fn new(house_id: impl Into<String>) -> Self {
    Self {
      house_id: house_id.into(),
    }
  }
}

impl<I, E, O> Task<I, E, O> for OneShotTask
where
  I: IntoIterator<Item = TaskInput>,
  E: InferenceEngine,
  O: Render<ClassificationReport>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    classifier: &WasteClassifier<E>,
    output: &O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (source, image) = input
      .into_iter()
      .next()
      .ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    let now = std::time::Instant::now();
    let report = classifier.classify(&image, &self.house_id)?;
    info!("{} 分类完成，耗时: {:.2?}", source, now.elapsed());
    output.render_result(&source, &report)?;
    Ok(())
  }
}

/// 并发处理全部输入，所有输入共享同一个分类器。
/// 单个输入失败不会中断其他输入，全部完成后再汇报失败数量。
#[derive(Debug)]
pub struct BatchTask {
  house_id: String,
  workers: usize,
}

impl BatchTask {
  pub fn new(house_id: impl Into<String>) -> Self {
    Self {
      house_id: house_id.into(),
      workers: thread::available_parallelism().map_or(1, |n| n.get()),
    }
  }

  pub fn with_workers(mut self, workers: usize) -> Self {
    self.workers = workers.max(1);
    self
  }
}

impl<I, E, O> Task<I, E, O> for BatchTask
where
  I: IntoIterator<Item = TaskInput>,
  E: InferenceEngine,
  O: Render<ClassificationReport> + Sync,
  O::Error: std::fmt::Display,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    classifier: &WasteClassifier<E>,
    output: &O,
  ) -> Result<(), Self::Error> {
    let inputs: Vec<TaskInput> = input.into_iter().collect();
    info!("开始批量任务: {} 个输入, {} 个工作线程", inputs.len(), self.workers);

    let now = std::time::Instant::now();
    let house_id = self.house_id.as_str();
    let mut failures = 0usize;

    for chunk in inputs.chunks(self.workers) {
      failures += thread::scope(|s| {
        let handles: Vec<_> = chunk
          .iter()
          .map(|(source, image)| {
            s.spawn(move || {
              let report = match classifier.classify(image, house_id) {
                Ok(report) => report,
                Err(e) => {
                  error!("{} 分类失败: {}", source, e);
                  return false;
                }
              };
              if let Err(e) = output.render_result(source, &report) {
                error!(house_id, "{} 输出失败: {}", source, e);
                return false;
              }
              true
            })
          })
          .collect();

        handles
          .into_iter()
          .map(|h| h.join().unwrap_or(false))
          .filter(|ok| !ok)
          .count()
      });
    }

    info!("批量任务完成，耗时: {:.2?}", now.elapsed());
    if failures > 0 {
      warn!("{} / {} 个输入处理失败", failures, inputs.len());
      anyhow::bail!("{} 个输入处理失败", failures);
    }
    Ok(())
  }
}
