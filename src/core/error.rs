//! 会话级错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：补全服务的错误先由 RecoveryEngine 决定 重试 / 致命 / 放弃，
//! 最终只有凭据错误、重试耗尽与用户取消会以 DialogueError 的形式打断流程。

use thiserror::Error;

use crate::dialogue::{Checkpoint, StepId};
use crate::persona::Speaker;

/// 对话流程中会中止前进的错误
#[derive(Error, Debug)]
pub enum DialogueError {
    /// 凭据缺失或无效：立即终止，不生成 Checkpoint
    #[error("{0}")]
    Credential(String),

    /// 自动重试耗尽：携带可手动重试的 Checkpoint
    #[error("[{speaker} - {step}] 在 {attempts} 次尝试后失败: {message} 可手动重试。")]
    Exhausted {
        speaker: Speaker,
        step: StepId,
        attempts: u32,
        message: String,
        checkpoint: Box<Checkpoint>,
    },

    /// 用户取消，不是模型错误
    #[error("用户取消操作")]
    Cancelled,

    #[error("没有待手动重试的失败步骤")]
    NoPendingRetry,

    #[error("会话正在运行")]
    Busy,

    #[error("问题不能为空")]
    EmptyQuery,

    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// 恢复引擎根据补全错误给出的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 等待后重试（线性退避）
    RetryAfter(std::time::Duration),
    /// 凭据问题，重试无意义
    Fatal,
    /// 自动重试次数已用完，生成 Checkpoint 等待手动重试
    GiveUp,
}
