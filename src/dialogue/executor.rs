//! 单步执行器：调用补全服务、自动重试、生成断点、应用记事本修改
//!
//! 取消在每次尝试前和服务调用返回后各检查一次；退避等待期间也可被取消打断。
//! 取消后的结果直接丢弃，不写转录也不改记事本。

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::completion::{CompletionRequest, CompletionService};
use crate::core::{DialogueError, DiscussionMode, RecoveryAction, RecoveryEngine};
use crate::dialogue::events::{send_event, DialogueEvent};
use crate::dialogue::{Checkpoint, StepId, TurnRecord};
use crate::notepad::{parse_output, NotepadDocument};

/// 一步要发送的内容，以及失败时写入断点的续跑上下文
#[derive(Debug, Clone)]
pub struct StepCall<'a> {
    pub session_id: Uuid,
    pub step: StepId,
    pub request: CompletionRequest,
    pub query: &'a str,
    pub transcript: &'a [TurnRecord],
    pub mode: DiscussionMode,
    pub turn_index: usize,
    pub partner_signaled_termination: bool,
}

impl<'a> StepCall<'a> {
    /// 按断点原样重建失败的那一步
    pub fn from_checkpoint(checkpoint: &'a Checkpoint) -> Self {
        Self {
            session_id: checkpoint.session_id,
            step: checkpoint.step,
            request: CompletionRequest {
                prompt: checkpoint.prompt.clone(),
                model: checkpoint.model.clone(),
                system_instruction: checkpoint.system_instruction.clone(),
                image: checkpoint.image.clone(),
            },
            query: &checkpoint.query,
            transcript: &checkpoint.transcript,
            mode: checkpoint.mode,
            turn_index: checkpoint.turn_index,
            partner_signaled_termination: checkpoint.partner_signaled_termination,
        }
    }
}

/// 成功的一步
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub spoken_text: String,
    pub termination_signal: bool,
    pub duration_ms: u64,
    /// 实际成功尝试前失败的次数
    pub retries: u32,
    /// 记事本解析与校验错误（非致命）
    pub advisories: Vec<String>,
    pub notepad_changed: bool,
}

pub struct StepExecutor {
    service: Arc<dyn CompletionService>,
    recovery: RecoveryEngine,
}

impl StepExecutor {
    pub fn new(service: Arc<dyn CompletionService>, recovery: RecoveryEngine) -> Self {
        Self { service, recovery }
    }

    pub fn recovery(&self) -> &RecoveryEngine {
        &self.recovery
    }

    pub async fn execute(
        &self,
        call: &StepCall<'_>,
        notepad: &mut NotepadDocument,
        cancel: &CancellationToken,
        events: Option<&UnboundedSender<DialogueEvent>>,
    ) -> Result<StepOutcome, DialogueError> {
        let speaker = call.step.speaker();
        let step_name = call.step.to_string();
        send_event(
            events,
            DialogueEvent::StepStarted {
                step: step_name.clone(),
                speaker,
                model: call.request.model.clone(),
            },
        );
        tracing::debug!(step = %step_name, model = %call.request.model, prompt = %call.request.prompt, "sending prompt");

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(DialogueError::Cancelled);
            }

            let result = self.service.generate(&call.request).await;
            if cancel.is_cancelled() {
                tracing::info!(step = %step_name, "result discarded after cancellation");
                return Err(DialogueError::Cancelled);
            }

            let err = match result {
                Ok(completion) => {
                    let parsed = parse_output(&completion.text);
                    let before_content = notepad.content().to_string();
                    let mut advisories = parsed.parse_errors;
                    if !parsed.actions.is_empty() {
                        advisories.extend(
                            notepad
                                .apply(&parsed.actions, Some(speaker))
                                .into_iter()
                                .map(|e| e.to_string()),
                        );
                    }
                    let notepad_changed = notepad.content() != before_content;
                    for text in &advisories {
                        tracing::warn!(step = %step_name, %speaker, "{}", text);
                    }
                    tracing::info!(step = %step_name, attempt, duration_ms = completion.duration_ms, "step completed");
                    return Ok(StepOutcome {
                        spoken_text: parsed.spoken_text,
                        termination_signal: parsed.termination_signal,
                        duration_ms: completion.duration_ms,
                        retries: attempt - 1,
                        advisories,
                        notepad_changed,
                    });
                }
                Err(e) => e,
            };

            match self.recovery.handle(&err, attempt) {
                RecoveryAction::Fatal => {
                    tracing::error!(step = %step_name, "credential error: {}", err);
                    return Err(DialogueError::Credential(err.message));
                }
                RecoveryAction::RetryAfter(delay) => {
                    let max_retries = self.recovery.policy().max_auto_retries;
                    tracing::warn!(step = %step_name, %speaker, attempt, ?delay, "call failed, retrying: {}", err);
                    send_event(
                        events,
                        DialogueEvent::Retry {
                            step: step_name.clone(),
                            speaker,
                            attempt,
                            max_retries,
                            message: err.message.clone(),
                        },
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(DialogueError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RecoveryAction::GiveUp => {
                    let error = exhausted(call, attempt, err.message);
                    tracing::error!(step = %step_name, attempts = attempt, "{}", error);
                    send_event(
                        events,
                        DialogueEvent::StepFailed {
                            step: step_name,
                            text: error.to_string(),
                        },
                    );
                    return Err(error);
                }
            }
        }
    }
}

fn exhausted(call: &StepCall<'_>, attempts: u32, message: String) -> DialogueError {
    let speaker = call.step.speaker();
    let shown = format!(
        "[{} - {}] 在 {} 次尝试后失败: {} 可手动重试。",
        speaker, call.step, attempts, message
    );
    let checkpoint = Checkpoint {
        session_id: call.session_id,
        step: call.step,
        prompt: call.request.prompt.clone(),
        model: call.request.model.clone(),
        system_instruction: call.request.system_instruction.clone(),
        image: call.request.image.clone(),
        query: call.query.to_string(),
        transcript: call.transcript.to_vec(),
        mode: call.mode,
        turn_index: call.turn_index,
        partner_signaled_termination: call.partner_signaled_termination,
        error_message: shown,
        attempts,
        created_at: Utc::now(),
    };
    DialogueError::Exhausted {
        speaker,
        step: call.step,
        attempts,
        message,
        checkpoint: Box::new(checkpoint),
    }
}
