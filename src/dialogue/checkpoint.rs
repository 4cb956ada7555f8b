//! 失败断点：自动重试耗尽后保存的完整续跑快照
//!
//! Checkpoint 是固定结构、可序列化的值：手动重试时按其中的提示词原样重发失败步骤，
//! 成功后编排器依据 step / turn_index / partner_signaled_termination 重建状态继续前进。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::completion::ImagePayload;
use crate::core::DiscussionMode;
use crate::dialogue::{TurnPurpose, TurnRecord};
use crate::persona::{Persona, Speaker};

/// 步骤标识：哪个阶段、第几轮、谁在发言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepId {
    InitialStatement,
    CreativeReply { turn: usize },
    LogicalReply { turn: usize },
    Synthesis,
}

impl StepId {
    pub fn speaker(self) -> Speaker {
        match self {
            StepId::InitialStatement | StepId::LogicalReply { .. } => Speaker::Logical,
            StepId::CreativeReply { .. } => Speaker::Creative,
            StepId::Synthesis => Speaker::Synthesizer,
        }
    }

    pub fn persona(self) -> Persona {
        self.speaker().persona()
    }

    pub fn purpose(self) -> TurnPurpose {
        match self {
            StepId::InitialStatement => TurnPurpose::ToPartner,
            StepId::CreativeReply { .. } | StepId::LogicalReply { .. } => {
                TurnPurpose::ReplyToPartner
            }
            StepId::Synthesis => TurnPurpose::FinalAnswer,
        }
    }

    /// 讨论轮次；开场为 0，综合阶段无轮次
    pub fn turn(self) -> Option<usize> {
        match self {
            StepId::InitialStatement => Some(0),
            StepId::CreativeReply { turn } | StepId::LogicalReply { turn } => Some(turn),
            StepId::Synthesis => None,
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepId::InitialStatement => write!(f, "logical-initial-to-creative"),
            StepId::CreativeReply { turn } => write!(f, "creative-reply-to-logical-turn-{turn}"),
            StepId::LogicalReply { turn } => write!(f, "logical-reply-to-creative-turn-{turn}"),
            StepId::Synthesis => write!(f, "logical-final-answer"),
        }
    }
}

/// 自动重试耗尽时创建；下一次手动重试消费（无论成功与否都会被丢弃，失败则生成新的 Checkpoint）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: Uuid,
    pub step: StepId,
    /// 原样发送过的提示词
    pub prompt: String,
    pub model: String,
    pub system_instruction: Option<String>,
    pub image: Option<ImagePayload>,
    /// 用户原始问题，续跑后续步骤时重建提示词用
    pub query: String,
    /// 失败时的转录
    pub transcript: Vec<TurnRecord>,
    /// 失败会话的讨论模式，续跑时沿用
    #[serde(default)]
    pub mode: DiscussionMode,
    /// 续跑用的讨论轮次
    pub turn_index: usize,
    /// 本步骤之前对方最后一次是否发出了终止信号
    pub partner_signaled_termination: bool,
    /// 展示给用户的错误信息
    pub error_message: String,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn speaker(&self) -> Speaker {
        self.step.speaker()
    }
}
