//! 回合编排器：开场 → 交替讨论 → 综合 → 完成
//!
//! 步骤严格串行，每一步的提示词依赖此前全部转录与实时记事本。
//! 任一步自动重试耗尽时挂起在 AwaitingManualRetry，手动重试成功后按断点重建状态，
//! 像该步刚刚成功一样继续走同一套转换规则。

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::completion::{CompletionRequest, ModelProfile};
use crate::core::{
    DialogueError, DialoguePhase, DiscussionMode, Session, SessionProgress, SessionStatus,
};
use crate::dialogue::events::{send_event, DialogueEvent};
use crate::dialogue::prompts::{initial_prompt, reply_prompt, synthesis_prompt};
use crate::dialogue::{
    Checkpoint, PromptContext, PromptSet, StepExecutor, StepId, StepOutcome, StepCall, TurnRecord,
};
use crate::persona::Persona;

/// 两个人格使用的模型与系统提示
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueSettings {
    pub logical_model: ModelProfile,
    pub creative_model: ModelProfile,
    pub prompts: PromptSet,
}

impl DialogueSettings {
    pub fn model_for(&self, persona: Persona) -> &ModelProfile {
        match persona {
            Persona::Logical => &self.logical_model,
            Persona::Creative => &self.creative_model,
        }
    }
}

/// 过程事件与进度投影的接收端（均可选）
#[derive(Debug, Clone, Copy, Default)]
pub struct Observers<'a> {
    pub events: Option<&'a UnboundedSender<DialogueEvent>>,
    pub progress: Option<&'a watch::Sender<SessionProgress>>,
}

impl Observers<'_> {
    fn enter(&self, session_id: Uuid, phase: DialoguePhase) {
        tracing::info!(session = %session_id, ?phase, "phase transition");
        if let Some(progress) = self.progress {
            progress.send_modify(|p| {
                p.session_id = Some(session_id);
                p.phase = phase;
                match phase {
                    DialoguePhase::InitialStatement => p.current_turn = 0,
                    DialoguePhase::DiscussionTurn { turn, .. } => p.current_turn = turn,
                    _ => {}
                }
                p.discussion_active = phase.is_discussion();
            });
        }
        send_event(self.events, DialogueEvent::Phase { phase });
    }

    fn advise(&self, session: &mut Session, text: String) {
        send_event(self.events, DialogueEvent::Advisory { text: text.clone() });
        session.advisories.push(text);
    }
}

/// 纯转换函数：刚完成 step（本步是否发出终止信号、对方上一步是否发出）后进入的阶段
///
/// FixedTurns(N)：创意方回应后总是轮到逻辑方；逻辑方完成第 n 轮且 n >= N-1 时进入综合，共 N 轮。
/// AiDriven：相邻两步都发出终止信号才进入综合，单方信号只提示对方。
pub fn next_phase(
    mode: DiscussionMode,
    completed: StepId,
    signaled: bool,
    partner_signaled: bool,
) -> DialoguePhase {
    let agreed = matches!(mode, DiscussionMode::AiDriven) && signaled && partner_signaled;
    match completed {
        StepId::InitialStatement => DialoguePhase::DiscussionTurn {
            turn: 0,
            speaker: Persona::Creative,
        },
        StepId::CreativeReply { turn } => {
            if agreed {
                DialoguePhase::Synthesizing
            } else {
                DialoguePhase::DiscussionTurn {
                    turn,
                    speaker: Persona::Logical,
                }
            }
        }
        StepId::LogicalReply { turn } => {
            let finished = match mode {
                DiscussionMode::FixedTurns { turns } => turn + 1 >= turns.max(1),
                DiscussionMode::AiDriven => agreed,
            };
            if finished {
                DialoguePhase::Synthesizing
            } else {
                DialoguePhase::DiscussionTurn {
                    turn: turn + 1,
                    speaker: Persona::Creative,
                }
            }
        }
        StepId::Synthesis => DialoguePhase::Done,
    }
}

/// 断点所在的阶段
fn phase_of(checkpoint: &Checkpoint) -> DialoguePhase {
    match checkpoint.step {
        StepId::InitialStatement => DialoguePhase::InitialStatement,
        StepId::CreativeReply { .. } => DialoguePhase::DiscussionTurn {
            turn: checkpoint.turn_index,
            speaker: Persona::Creative,
        },
        StepId::LogicalReply { .. } => DialoguePhase::DiscussionTurn {
            turn: checkpoint.turn_index,
            speaker: Persona::Logical,
        },
        StepId::Synthesis => DialoguePhase::Synthesizing,
    }
}

pub struct TurnOrchestrator {
    executor: StepExecutor,
    settings: DialogueSettings,
}

impl TurnOrchestrator {
    pub fn new(executor: StepExecutor, settings: DialogueSettings) -> Self {
        Self { executor, settings }
    }

    pub fn settings(&self) -> &DialogueSettings {
        &self.settings
    }

    /// 从开场开始跑完整个会话
    pub async fn run(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
        obs: Observers<'_>,
    ) -> Result<(), DialogueError> {
        session.status = SessionStatus::Running;
        tracing::info!(session = %session.id, mode = ?session.mode, "session started");
        let result = self
            .drive(session, DialoguePhase::InitialStatement, false, cancel, obs)
            .await;
        settle(session, result, obs)
    }

    /// 手动重试挂起的失败步骤；断点无论成败都被消费
    pub async fn resume(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
        obs: Observers<'_>,
    ) -> Result<(), DialogueError> {
        let checkpoint = session
            .pending_checkpoint
            .take()
            .ok_or(DialogueError::NoPendingRetry)?;
        session.status = SessionStatus::Running;
        session.transcript = checkpoint.transcript.clone();
        let label = format!("[{} - {}]", checkpoint.speaker(), checkpoint.step);
        obs.advise(session, format!("{label} 正在手动重试..."));

        let result = self.resume_from(session, &checkpoint, &label, cancel, obs).await;
        settle(session, result, obs)
    }

    async fn resume_from(
        &self,
        session: &mut Session,
        checkpoint: &Checkpoint,
        label: &str,
        cancel: &CancellationToken,
        obs: Observers<'_>,
    ) -> Result<(), DialogueError> {
        obs.enter(session.id, phase_of(checkpoint));
        let call = StepCall::from_checkpoint(checkpoint);
        let outcome = self
            .executor
            .execute(&call, &mut session.notepad, cancel, obs.events)
            .await?;
        obs.advise(session, format!("{label} 手动重试成功。后续流程将继续。"));

        let signal = outcome.termination_signal;
        let next = record(
            session,
            checkpoint.step,
            outcome,
            checkpoint.partner_signaled_termination,
            obs,
        );
        self.drive(session, next, signal, cancel, obs).await
    }

    async fn drive(
        &self,
        session: &mut Session,
        mut phase: DialoguePhase,
        mut partner_signal: bool,
        cancel: &CancellationToken,
        obs: Observers<'_>,
    ) -> Result<(), DialogueError> {
        loop {
            let step = match phase {
                DialoguePhase::InitialStatement => StepId::InitialStatement,
                DialoguePhase::DiscussionTurn {
                    turn,
                    speaker: Persona::Creative,
                } => StepId::CreativeReply { turn },
                DialoguePhase::DiscussionTurn {
                    turn,
                    speaker: Persona::Logical,
                } => StepId::LogicalReply { turn },
                DialoguePhase::Synthesizing => StepId::Synthesis,
                _ => return Ok(()),
            };
            obs.enter(session.id, phase);

            let request = self.request_for(session, step, partner_signal);
            let call = StepCall {
                session_id: session.id,
                step,
                request,
                query: &session.query,
                transcript: &session.transcript,
                mode: session.mode,
                turn_index: step
                    .turn()
                    .unwrap_or_else(|| session.completed_rounds().saturating_sub(1)),
                partner_signaled_termination: partner_signal,
            };
            let outcome = self
                .executor
                .execute(&call, &mut session.notepad, cancel, obs.events)
                .await?;

            let signal = outcome.termination_signal;
            phase = record(session, step, outcome, partner_signal, obs);
            partner_signal = signal;
        }
    }

    fn request_for(&self, session: &Session, step: StepId, partner_signal: bool) -> CompletionRequest {
        let ctx = PromptContext {
            query: &session.query,
            has_image: session.image.is_some(),
            ai_driven: matches!(session.mode, DiscussionMode::AiDriven),
            notepad: &session.notepad,
        };
        let prompt = match step {
            StepId::InitialStatement => initial_prompt(&ctx),
            StepId::CreativeReply { .. } => {
                reply_prompt(&ctx, Persona::Creative, &session.transcript, partner_signal)
            }
            StepId::LogicalReply { .. } => {
                reply_prompt(&ctx, Persona::Logical, &session.transcript, partner_signal)
            }
            StepId::Synthesis => synthesis_prompt(&ctx, &session.transcript),
        };
        let persona = step.persona();
        let model = self.settings.model_for(persona);
        CompletionRequest {
            prompt,
            model: model.name.clone(),
            system_instruction: model.system_instruction(self.settings.prompts.system_for(persona)),
            image: session.image.clone(),
        }
    }
}

/// 记录成功的一步并返回下一阶段
fn record(
    session: &mut Session,
    step: StepId,
    outcome: StepOutcome,
    partner_signal: bool,
    obs: Observers<'_>,
) -> DialoguePhase {
    let speaker = step.speaker();
    let signal = outcome.termination_signal;
    let turn = TurnRecord {
        speaker,
        purpose: step.purpose(),
        text: outcome.spoken_text,
        duration_ms: outcome.duration_ms,
        signaled_termination: signal,
    };
    session.transcript.push(turn.clone());
    send_event(obs.events, DialogueEvent::Turn { record: turn });

    if outcome.notepad_changed {
        send_event(
            obs.events,
            DialogueEvent::NotepadUpdated {
                content: session.notepad.content().to_string(),
                by: speaker,
            },
        );
    }
    for text in outcome.advisories {
        obs.advise(session, text);
    }

    let next = next_phase(session.mode, step, signal, partner_signal);
    if matches!(session.mode, DiscussionMode::AiDriven) && step != StepId::Synthesis && signal {
        let persona = step.persona();
        let partner = persona.partner();
        let text = if next == DialoguePhase::Synthesizing {
            format!("双方AI ({partner} 和 {persona}) 已同意结束讨论。")
        } else {
            format!("{persona} 已建议结束讨论。等待 {partner} 的回应。")
        };
        obs.advise(session, text);
    }
    next
}

/// 把运行结果落到会话状态与进度投影上
fn settle(
    session: &mut Session,
    result: Result<(), DialogueError>,
    obs: Observers<'_>,
) -> Result<(), DialogueError> {
    let duration_ms = session.started_at.elapsed().as_millis() as u64;
    let (phase, completed_turns) = match &result {
        Ok(()) => {
            session.status = SessionStatus::Done;
            let completed = session.completed_rounds();
            tracing::info!(session = %session.id, duration_ms, completed, "session done");
            send_event(
                obs.events,
                DialogueEvent::Finished {
                    duration_ms,
                    completed_turns: completed,
                },
            );
            (DialoguePhase::Done, Some(completed))
        }
        Err(DialogueError::Exhausted { checkpoint, .. }) => {
            session.status = SessionStatus::AwaitingManualRetry;
            session.pending_checkpoint = Some((**checkpoint).clone());
            (DialoguePhase::AwaitingManualRetry, None)
        }
        Err(DialogueError::Cancelled) => {
            session.status = SessionStatus::Cancelled;
            tracing::info!(session = %session.id, "session cancelled");
            send_event(obs.events, DialogueEvent::Cancelled);
            (DialoguePhase::Cancelled, Some(0))
        }
        Err(e) => {
            session.status = SessionStatus::Failed(e.to_string());
            send_event(obs.events, DialogueEvent::Error { text: e.to_string() });
            (DialoguePhase::Failed, None)
        }
    };

    if let Some(progress) = obs.progress {
        progress.send_modify(|p| {
            p.session_id = Some(session.id);
            p.phase = phase;
            p.discussion_active = false;
            if let Some(completed) = completed_turns {
                p.last_session_duration_ms = Some(duration_ms);
                p.last_completed_turns = completed;
            }
        });
    }
    send_event(obs.events, DialogueEvent::Phase { phase });
    result
}
