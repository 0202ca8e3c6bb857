// 该文件是 Qianli （千里眼） 项目的一部分。
// src/labels.rs - 类别标签表
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

use std::path::Path;

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum LabelsError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("标签文件为空: {0}")]
  Empty(String),
  #[error("标签数量不匹配: 模型输出 {model} 类, 标签表 {labels} 条")]
  ConfigMismatch { model: usize, labels: usize },
}

/// 有序类别标签表
///
/// 每行一个名称，行号（从 0 起）即类别索引。启动时加载一次，
/// 之后只读共享，无需任何同步。
#[derive(Clone, Debug)]
pub struct ClassLabels {
  names: Vec<String>,
}

impl ClassLabels {
  pub fn from_names(names: Vec<String>) -> Self {
    ClassLabels { names }
  }

  /// 从换行分隔的标签文件加载
  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LabelsError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;

    let mut names: Vec<String> = text.lines().map(|line| line.trim().to_string()).collect();
    // 文件末尾的空行不算标签
    while names.last().is_some_and(String::is_empty) {
      names.pop();
    }

    if names.is_empty() {
      return Err(LabelsError::Empty(path.display().to_string()));
    }

    info!("加载 {} 条类别标签: {}", names.len(), path.display());
    Ok(ClassLabels { names })
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn get(&self, class_id: usize) -> Option<&str> {
    self.names.get(class_id).map(String::as_str)
  }

  /// 越界索引退化为 "unknown"，由加载期校验保证不会发生
  pub fn name_or_unknown(&self, class_id: usize) -> &str {
    self.get(class_id).unwrap_or("unknown")
  }

  /// 校验标签数量与模型类别数一致
  ///
  /// 加载期失败，绝不推迟到逐帧检查。
  pub fn ensure_matches(&self, class_count: usize) -> Result<(), LabelsError> {
    if self.names.len() != class_count {
      return Err(LabelsError::ConfigMismatch {
        model: class_count,
        labels: self.names.len(),
      });
    }
    Ok(())
  }
}
