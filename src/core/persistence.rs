//! 断点持久化
//!
//! 把待手动重试的 Checkpoint 写入 JSON 文件，进程重启后仍可续跑（可选使用）。

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::dialogue::Checkpoint;

/// 单文件 JSON 断点存储：同一时刻最多一个待重试断点
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取断点；文件不存在时返回 None
    pub fn load(&self) -> anyhow::Result<Option<Checkpoint>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read checkpoint {}", self.path.display()))?;
        let checkpoint = serde_json::from_str(&data)
            .with_context(|| format!("invalid checkpoint file {}", self.path.display()))?;
        Ok(Some(checkpoint))
    }

    /// 写入断点；父目录不存在时自动创建
    pub fn save(&self, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(checkpoint)?;
        std::fs::write(&self.path, data)
            .with_context(|| format!("failed to write checkpoint {}", self.path.display()))?;
        Ok(())
    }

    /// 删除断点文件；不存在视为成功
    pub fn remove(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("failed to remove checkpoint {}", self.path.display())),
        }
    }
}
