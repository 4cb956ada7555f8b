//! 会话：一次用户提问的完整生命周期
//!
//! 由 SessionController 独占持有；下一次提交或显式清空时被替换。

use std::time::Instant;

use uuid::Uuid;

use crate::completion::ImagePayload;
use crate::core::{DiscussionMode, SessionStatus};
use crate::dialogue::{Checkpoint, TurnRecord};
use crate::notepad::NotepadDocument;

#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub query: String,
    pub image: Option<ImagePayload>,
    /// 会话开始时确定，中途不变
    pub mode: DiscussionMode,
    /// 只追加
    pub transcript: Vec<TurnRecord>,
    pub notepad: NotepadDocument,
    pub status: SessionStatus,
    pub pending_checkpoint: Option<Checkpoint>,
    /// 提示性消息（重试、记事本校验错误等），不会中止流程
    pub advisories: Vec<String>,
    pub started_at: Instant,
}

impl Session {
    pub fn new(
        query: impl Into<String>,
        image: Option<ImagePayload>,
        mode: DiscussionMode,
        notepad: NotepadDocument,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            image,
            mode,
            transcript: Vec::new(),
            notepad,
            status: SessionStatus::Running,
            pending_checkpoint: None,
            advisories: Vec::new(),
            started_at: Instant::now(),
        }
    }

    /// 最终答案（综合阶段的发言）
    pub fn final_answer(&self) -> Option<&TurnRecord> {
        self.transcript
            .iter()
            .rev()
            .find(|t| t.purpose == crate::dialogue::TurnPurpose::FinalAnswer)
    }

    /// 已完成的讨论轮数（创意方回应次数）
    pub fn completed_rounds(&self) -> usize {
        self.transcript
            .iter()
            .filter(|t| t.speaker == crate::persona::Speaker::Creative)
            .count()
    }
}
