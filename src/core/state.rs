//! 状态定义：对话阶段、会话状态与进度投影
//!
//! 外部（UI、遥测）只看轻量的 SessionProgress；完整的会话由 SessionController 持有，编排器在每次状态转换时更新投影。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::persona::Persona;

/// 编排状态机的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum DialoguePhase {
    Idle,
    InitialStatement,
    DiscussionTurn { turn: usize, speaker: Persona },
    Synthesizing,
    Done,
    Cancelled,
    AwaitingManualRetry,
    /// 凭据错误等致命问题
    Failed,
}

impl DialoguePhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Done | Self::Cancelled | Self::AwaitingManualRetry | Self::Failed
        )
    }

    pub fn is_discussion(self) -> bool {
        matches!(self, Self::DiscussionTurn { .. })
    }
}

/// 讨论模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum DiscussionMode {
    /// 固定轮数（每轮 = 创意方回应 + 逻辑方回应），至少 1
    FixedTurns { turns: usize },
    /// 由双方连续发出终止信号决定何时结束
    AiDriven,
}

impl Default for DiscussionMode {
    fn default() -> Self {
        Self::fixed(2)
    }
}

impl DiscussionMode {
    pub fn fixed(turns: usize) -> Self {
        Self::FixedTurns {
            turns: turns.max(1),
        }
    }
}

/// 会话完成状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Done,
    Cancelled,
    AwaitingManualRetry,
    Failed(String),
}

/// 供外部读取的进度投影
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    pub session_id: Option<Uuid>,
    pub phase: DialoguePhase,
    /// 0 起始的当前讨论轮次
    pub current_turn: usize,
    pub discussion_active: bool,
    pub last_session_duration_ms: Option<u64>,
    pub last_completed_turns: usize,
}

impl Default for SessionProgress {
    fn default() -> Self {
        Self {
            session_id: None,
            phase: DialoguePhase::Idle,
            current_turn: 0,
            discussion_active: false,
            last_session_duration_ms: None,
            last_completed_turns: 0,
        }
    }
}
