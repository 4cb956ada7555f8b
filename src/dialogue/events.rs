//! 对话过程事件：用于流式展示发言、重试、记事本变化与提示性消息

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::DialoguePhase;
use crate::dialogue::TurnRecord;
use crate::persona::Speaker;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogueEvent {
    /// 状态机进入新阶段
    Phase { phase: DialoguePhase },
    /// 某一步开始调用模型
    StepStarted {
        step: String,
        speaker: Speaker,
        model: String,
    },
    /// 自动重试（每次都会通知）
    Retry {
        step: String,
        speaker: Speaker,
        attempt: u32,
        max_retries: u32,
        message: String,
    },
    /// 一条新的发言
    Turn { record: TurnRecord },
    /// 记事本被修改
    NotepadUpdated { content: String, by: Speaker },
    /// 非致命的提示：记事本解析/校验错误、终止信号等
    Advisory { text: String },
    /// 自动重试耗尽，等待手动重试
    StepFailed { step: String, text: String },
    /// 致命错误（凭据）
    Error { text: String },
    Cancelled,
    /// 会话完成
    Finished {
        duration_ms: u64,
        completed_turns: usize,
    },
}

pub fn send_event(tx: Option<&UnboundedSender<DialogueEvent>>, ev: DialogueEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_tag() {
        let ev = DialogueEvent::Retry {
            step: "logical-final-answer".into(),
            speaker: Speaker::Synthesizer,
            attempt: 1,
            max_retries: 2,
            message: "503".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "retry");
        assert_eq!(json["speaker"], "synthesizer");
    }

    #[test]
    fn test_send_event_without_channel_is_noop() {
        send_event(None, DialogueEvent::Cancelled);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        send_event(Some(&tx), DialogueEvent::Cancelled);
        assert_eq!(rx.try_recv().ok(), Some(DialogueEvent::Cancelled));
    }
}
