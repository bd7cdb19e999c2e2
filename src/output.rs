// 该文件是 Fenjian （分拣） 项目的一部分。
// src/output.rs - 分类报告汇总与输出
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

use std::io::Write;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::debug;

use crate::model::Detection;

pub trait Render<Report>: Sized {
  type Error;
  fn render_result(&self, source: &str, report: &Report) -> Result<(), Self::Error>;
}

/// 分拣结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Segregation {
  #[serde(rename = "segregated")]
  Segregated,
  #[serde(rename = "Non-Segregated")]
  NonSegregated,
}

impl Segregation {
  /// 恰好只有一个类别时才算已分拣
  pub fn from_distinct_classes(count: usize) -> Self {
    if count == 1 {
      Segregation::Segregated
    } else {
      Segregation::NonSegregated
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Segregation::Segregated => "segregated",
      Segregation::NonSegregated => "Non-Segregated",
    }
  }
}

/// 各类别出现次数，按首次出现的顺序序列化为 JSON 对象
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassCounts(Vec<(String, usize)>);

impl ClassCounts {
  fn increment(&mut self, name: &str) {
    match self.0.iter_mut().find(|(n, _)| n == name) {
      Some((_, count)) => *count += 1,
      None => self.0.push((name.to_string(), 1)),
    }
  }

  pub fn get(&self, name: &str) -> Option<usize> {
    self.0.iter().find(|(n, _)| n == name).map(|(_, c)| *c)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
    self.0.iter().map(|(n, c)| (n.as_str(), *c))
  }
}

impl Serialize for ClassCounts {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(self.0.iter().map(|(n, c)| (n, c)))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
  pub class: String,
  pub confidence: f32,
}

/// 分类报告，字段顺序即 JSON 输出顺序
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
  pub counts: ClassCounts,
  pub detections: Vec<DetectionRecord>,
  pub house_id: String,
  pub inference: Segregation,
  pub timestamp: String,
}

impl ClassificationReport {
  /// 以当前时间汇总检测结果
  pub fn aggregate(
    detections: &[Detection],
    class_names: &[String],
    filter_threshold: f32,
    house_id: &str,
  ) -> Self {
    Self::aggregate_at(detections, class_names, filter_threshold, house_id, Utc::now())
  }

  /// 只统计置信度不低于 `filter_threshold` 的检测
  pub fn aggregate_at(
    detections: &[Detection],
    class_names: &[String],
    filter_threshold: f32,
    house_id: &str,
    now: DateTime<Utc>,
  ) -> Self {
    let mut counts = ClassCounts::default();
    let mut records = Vec::new();

    for det in detections.iter().filter(|d| d.confidence >= filter_threshold) {
      let class = class_names
        .get(det.class_index)
        .map(String::as_str)
        .unwrap_or("unknown");
      counts.increment(class);
      records.push(DetectionRecord {
        class: class.to_string(),
        confidence: det.confidence,
      });
    }

    debug!(
      "汇总: {} 个检测中 {} 个通过过滤阈值 {}",
      detections.len(),
      records.len(),
      filter_threshold
    );

    Self {
      inference: Segregation::from_distinct_classes(counts.len()),
      counts,
      detections: records,
      house_id: house_id.to_string(),
      timestamp: format_timestamp(&now),
    }
  }

  pub fn to_json(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(self)
  }
}

/// `2026-01-02T03:04:05.123456+00:00`，固定 6 位微秒
pub fn format_timestamp(now: &DateTime<Utc>) -> String {
  now.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

#[derive(Error, Debug)]
pub enum JsonLinesOutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("输出锁已失效")]
  LockPoisoned,
}

/// 每个结果一行 JSON，多线程共享同一个写入端
pub struct JsonLinesOutput<W> {
  writer: Mutex<W>,
}

impl<W: Write> JsonLinesOutput<W> {
  pub fn new(writer: W) -> Self {
    Self {
      writer: Mutex::new(writer),
    }
  }

  pub fn into_inner(self) -> Result<W, JsonLinesOutputError> {
    self
      .writer
      .into_inner()
      .map_err(|_| JsonLinesOutputError::LockPoisoned)
  }
}

impl JsonLinesOutput<std::io::Stdout> {
  pub fn stdout() -> Self {
    Self::new(std::io::stdout())
  }
}

impl<W: Write, T: Serialize> Render<T> for JsonLinesOutput<W> {
  type Error = JsonLinesOutputError;

  fn render_result(&self, source: &str, report: &T) -> Result<(), Self::Error> {
    let line = serde_json::to_string(report)?;
    let mut writer = self
      .writer
      .lock()
      .map_err(|_| JsonLinesOutputError::LockPoisoned)?;
    writeln!(writer, "{}", line)?;
    writer.flush()?;
    debug!("已输出 {} 的结果", source);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn names() -> Vec<String> {
    ["Bio-Medical", "Plastic", "Construction", "Horticulture"]
      .iter()
      .map(|s| s.to_string())
      .collect()
  }

  fn detection(class_index: usize, confidence: f32) -> Detection {
    Detection {
      x: 100.0,
      y: 100.0,
      width: 50.0,
      height: 50.0,
      confidence,
      class_index,
      bbox: [75.0, 75.0, 125.0, 125.0],
    }
  }

  fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap() + chrono::Duration::microseconds(89)
  }

  #[test]
  fn test_single_class_is_segregated() {
    let report = ClassificationReport::aggregate_at(
      &[detection(0, 0.9)],
      &names(),
      0.6,
      "house-42",
      fixed_time(),
    );

    assert_eq!(report.counts.get("Bio-Medical"), Some(1));
    assert_eq!(report.counts.len(), 1);
    assert_eq!(report.inference, Segregation::Segregated);
    assert_eq!(report.detections.len(), 1);
    assert_eq!(report.detections[0].class, "Bio-Medical");
    assert_eq!(report.house_id, "house-42");
    assert_eq!(report.timestamp, "2026-03-04T05:06:07.000089+00:00");
  }

  #[test]
  fn test_mixed_classes_are_not_segregated() {
    let report = ClassificationReport::aggregate(
      &[detection(0, 0.9), detection(1, 0.8), detection(0, 0.7)],
      &names(),
      0.6,
      "h",
    );
    assert_eq!(report.counts.get("Bio-Medical"), Some(2));
    assert_eq!(report.counts.get("Plastic"), Some(1));
    assert_eq!(report.inference, Segregation::NonSegregated);
  }

  #[test]
  fn test_filter_is_a_second_gate() {
    // 0.5 通过了解码阈值，但低于报告阈值
    let report = ClassificationReport::aggregate(
      &[detection(0, 0.9), detection(1, 0.5), detection(2, 0.6)],
      &names(),
      0.6,
      "h",
    );
    assert_eq!(report.detections.len(), 2);
    assert_eq!(report.counts.get("Plastic"), None);
    assert_eq!(report.counts.get("Construction"), Some(1));
    assert_eq!(report.inference, Segregation::NonSegregated);

    let report = ClassificationReport::aggregate(&[detection(1, 0.5)], &names(), 0.6, "h");
    assert!(report.counts.is_empty());
    assert!(report.detections.is_empty());
    assert_eq!(report.inference, Segregation::NonSegregated);
  }

  #[test]
  fn test_filter_threshold_monotonicity() {
    let detections = [
      detection(0, 0.95),
      detection(1, 0.62),
      detection(2, 0.7),
      detection(0, 0.6),
      detection(3, 0.81),
      detection(1, 0.99),
      detection(2, 0.3),
    ];

    let mut previous = ClassificationReport::aggregate(&detections, &names(), 0.0, "h");
    assert_eq!(previous.detections.len(), detections.len());
    for t in [0.3, 0.6, 0.61, 0.7, 0.8, 0.95, 0.99, 1.0] {
      let current = ClassificationReport::aggregate(&detections, &names(), t, "h");
      assert!(current.detections.len() <= previous.detections.len());
      for record in &current.detections {
        assert!(previous.detections.contains(record));
      }
      for (class, count) in current.counts.iter() {
        assert!(count <= previous.counts.get(class).unwrap_or(0));
      }
      previous = current;
    }
    assert!(previous.detections.is_empty());
    assert!(previous.counts.is_empty());
  }

  #[test]
  fn test_json_field_order() {
    let report = ClassificationReport::aggregate_at(
      &[detection(3, 0.75), detection(1, 0.7)],
      &names(),
      0.6,
      "A-17",
      fixed_time(),
    );
    assert_eq!(
      report.to_json().unwrap(),
      concat!(
        r#"{"counts":{"Horticulture":1,"Plastic":1},"#,
        r#""detections":[{"class":"Horticulture","confidence":0.75},{"class":"Plastic","confidence":0.7}],"#,
        r#""house_id":"A-17","inference":"Non-Segregated","#,
        r#""timestamp":"2026-03-04T05:06:07.000089+00:00"}"#
      )
    );
  }

  #[test]
  fn test_json_lines_output() {
    let output = JsonLinesOutput::new(Vec::new());
    let report =
      ClassificationReport::aggregate_at(&[detection(0, 0.9)], &names(), 0.6, "h", fixed_time());
    output.render_result("a.jpg", &report).unwrap();
    output.render_result("b.jpg", &report).unwrap();

    let text = String::from_utf8(output.into_inner().unwrap()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains(r#""inference":"segregated""#));
  }
}
