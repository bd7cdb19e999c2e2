// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model/nms.rs - 按类别的非极大值抑制
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

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;

use crate::model::{Candidate, Detection};

/// 防止并集为零时除零
pub const IOU_EPSILON: f32 = 1e-6;

/// 计算两个角点式边界框 [x_min, y_min, x_max, y_max] 的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  intersection / (union + IOU_EPSILON)
}

/// 置信度降序，相同时按类别与坐标排出全序，保证结果与输入顺序无关
fn by_confidence_desc(a: &Candidate, b: &Candidate) -> Ordering {
  b.confidence
    .total_cmp(&a.confidence)
    .then_with(|| a.class_index.cmp(&b.class_index))
    .then_with(|| {
      a.bbox
        .iter()
        .chain([a.x, a.y, a.width, a.height].iter())
        .zip(b.bbox.iter().chain([b.x, b.y, b.width, b.height].iter()))
        .map(|(p, q)| p.total_cmp(q))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
    })
}

/// 按类别分组的贪心 NMS。不同类别之间互不抑制，结果按置信度降序排列。
pub fn suppress(candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Detection> {
  let total = candidates.len();

  let mut by_class: BTreeMap<usize, Vec<Candidate>> = BTreeMap::new();
  for candidate in candidates {
    by_class
      .entry(candidate.class_index)
      .or_default()
      .push(candidate);
  }

  let mut keep = Vec::new();
  for (_, mut group) in by_class {
    group.sort_by(by_confidence_desc);

    let mut suppressed = vec![false; group.len()];
    for i in 0..group.len() {
      if suppressed[i] {
        continue;
      }
      keep.push(group[i]);
      for j in (i + 1)..group.len() {
        if !suppressed[j] && iou(&group[i].bbox, &group[j].bbox) > iou_threshold {
          suppressed[j] = true;
        }
      }
    }
  }

  keep.sort_by(by_confidence_desc);
  debug!("NMS: {} -> {}", total, keep.len());
  keep
}
