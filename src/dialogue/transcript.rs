//! 对话转录：每条发言一个不可变的 TurnRecord

use serde::{Deserialize, Serialize};

use crate::persona::Speaker;

/// 发言用途
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TurnPurpose {
    /// 开场陈述（逻辑方对创意方）
    ToPartner,
    /// 讨论中回应对方
    ReplyToPartner,
    /// 综合后的最终答案
    FinalAnswer,
}

/// 一条归属明确的发言；创建后只追加、不修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub speaker: Speaker,
    pub purpose: TurnPurpose,
    /// 已去除标记的口头文本
    pub text: String,
    pub duration_ms: u64,
    /// 本条发言是否请求结束讨论
    pub signaled_termination: bool,
}

impl TurnRecord {
    /// 转录日志中的一行，如 `Cognito: ...`
    pub fn log_line(&self) -> String {
        format!("{}: {}", self.speaker, self.text)
    }
}

/// 把转录渲染为提示词中的讨论记录
pub fn render_log(transcript: &[TurnRecord]) -> String {
    transcript
        .iter()
        .map(TurnRecord::log_line)
        .collect::<Vec<_>>()
        .join("\n")
}
