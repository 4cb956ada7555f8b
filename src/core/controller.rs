//! 会话控制器：启动会话、取消、手动重试、记事本撤销/重做，并对外投影进度
//!
//! spawn_controller 在后台任务中消费 Command；会话运行期间仍会接收命令，
//! Cancel / Quit 通过 CancelHandle 取消当前会话，其它命令返回 Busy 提示。

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::completion::{CompletionService, ImagePayload};
use crate::config::AppConfig;
use crate::core::{
    CancelHandle, CheckpointStore, DialogueError, DialoguePhase, DiscussionMode, RecoveryEngine,
    Session, SessionProgress, SessionStatus, SessionSupervisor,
};
use crate::dialogue::{send_event, DialogueEvent, Observers, StepExecutor, TurnOrchestrator};
use crate::notepad::{NotepadDocument, NotepadError};

/// 从外部（CLI / UI）发往控制器的命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 提交问题，开始新会话
    Submit {
        query: String,
        image: Option<ImagePayload>,
    },
    /// 手动重试挂起的失败步骤
    Retry,
    /// 取消当前会话（Stop generating）
    Cancel,
    /// 清空会话与记事本
    Clear,
    UndoNotepad,
    RedoNotepad,
    Quit,
}

pub struct SessionController {
    orchestrator: TurnOrchestrator,
    mode: DiscussionMode,
    notepad_template: NotepadDocument,
    supervisor: SessionSupervisor,
    session: Option<Session>,
    store: Option<CheckpointStore>,
    progress_tx: watch::Sender<SessionProgress>,
    events: Option<mpsc::UnboundedSender<DialogueEvent>>,
}

impl SessionController {
    pub fn new(
        orchestrator: TurnOrchestrator,
        mode: DiscussionMode,
        notepad_template: NotepadDocument,
    ) -> Self {
        let (progress_tx, _) = watch::channel(SessionProgress::default());
        Self {
            orchestrator,
            mode,
            notepad_template,
            supervisor: SessionSupervisor::new(),
            session: None,
            store: None,
            progress_tx,
            events: None,
        }
    }

    /// 按配置组装执行器、编排器与断点存储
    pub fn from_config(cfg: &AppConfig, service: Arc<dyn CompletionService>) -> Self {
        let executor = StepExecutor::new(service, RecoveryEngine::new(cfg.retry.policy()));
        let orchestrator = TurnOrchestrator::new(executor, cfg.dialogue_settings());
        let controller = Self::new(orchestrator, cfg.discussion.mode(), cfg.notepad.document());
        match &cfg.storage.checkpoint_path {
            Some(path) => controller.with_store(CheckpointStore::new(path)),
            None => controller,
        }
    }

    pub fn with_store(mut self, store: CheckpointStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<DialogueEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// 之后开始的会话使用新模式；进行中的会话不受影响
    pub fn set_mode(&mut self, mode: DiscussionMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> DiscussionMode {
        self.mode
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn progress(&self) -> SessionProgress {
        self.progress_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionProgress> {
        self.progress_tx.subscribe()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.supervisor.cancel_handle()
    }

    /// 开始新会话并运行到 Done / Cancelled / AwaitingManualRetry / Failed
    pub async fn start_session(
        &mut self,
        query: impl Into<String>,
        image: Option<ImagePayload>,
    ) -> Result<(), DialogueError> {
        let token = self.supervisor.renew();
        self.run_session(query.into(), image, token).await
    }

    /// token 由调用方先行 renew
    async fn run_session(
        &mut self,
        query: String,
        image: Option<ImagePayload>,
        token: CancellationToken,
    ) -> Result<(), DialogueError> {
        if query.trim().is_empty() && image.is_none() {
            return Err(DialogueError::EmptyQuery);
        }

        let session = self.session.insert(Session::new(
            query.trim(),
            image,
            self.mode,
            self.notepad_template.clone(),
        ));
        let obs = Observers {
            events: self.events.as_ref(),
            progress: Some(&self.progress_tx),
        };
        let result = self.orchestrator.run(session, &token, obs).await;
        self.persist_pending();
        result
    }

    /// 手动重试；内存中没有挂起断点时尝试从断点文件恢复
    pub async fn retry_failed_step(&mut self) -> Result<(), DialogueError> {
        let token = self.supervisor.renew();
        self.run_retry(token).await
    }

    async fn run_retry(&mut self, token: CancellationToken) -> Result<(), DialogueError> {
        let has_pending = self
            .session
            .as_ref()
            .is_some_and(|s| s.pending_checkpoint.is_some());
        if !has_pending {
            let restored = match &self.store {
                Some(store) => store
                    .load()
                    .map_err(|e| DialogueError::Persistence(format!("{e:#}")))?,
                None => None,
            };
            let checkpoint = restored.ok_or(DialogueError::NoPendingRetry)?;
            tracing::info!(session = %checkpoint.session_id, step = %checkpoint.step, "restoring checkpoint from disk");
            let mut session = Session::new(
                checkpoint.query.clone(),
                checkpoint.image.clone(),
                checkpoint.mode,
                self.notepad_template.clone(),
            );
            session.id = checkpoint.session_id;
            session.status = SessionStatus::AwaitingManualRetry;
            session.pending_checkpoint = Some(checkpoint);
            self.session = Some(session);
        }

        let Some(session) = self.session.as_mut() else {
            return Err(DialogueError::NoPendingRetry);
        };
        let obs = Observers {
            events: self.events.as_ref(),
            progress: Some(&self.progress_tx),
        };
        let result = self.orchestrator.resume(session, &token, obs).await;
        self.persist_pending();
        result
    }

    /// 取消：运行中则触发取消令牌；等待手动重试时直接丢弃断点
    pub fn cancel_session(&mut self) {
        self.supervisor.cancel();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.status == SessionStatus::AwaitingManualRetry {
            session.pending_checkpoint = None;
            session.status = SessionStatus::Cancelled;
            let id = session.id;
            self.progress_tx.send_modify(|p| {
                p.session_id = Some(id);
                p.phase = DialoguePhase::Cancelled;
                p.discussion_active = false;
                p.last_completed_turns = 0;
            });
            send_event(self.events.as_ref(), DialogueEvent::Cancelled);
            tracing::info!(session = %id, "pending checkpoint discarded");
        }
        self.persist_pending();
    }

    /// 清空会话、断点与进度
    pub fn clear(&mut self) {
        self.supervisor.cancel();
        self.session = None;
        self.persist_pending();
        self.progress_tx.send_replace(SessionProgress::default());
    }

    /// 记事本恢复初始模板（可撤销），转录保留
    pub fn clear_notepad(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.notepad.clear();
        }
    }

    pub fn undo_notepad(&mut self) -> Result<String, NotepadError> {
        match self.session.as_mut() {
            Some(session) => session.notepad.undo().map(str::to_string),
            None => Err(NotepadError::CannotUndo),
        }
    }

    pub fn redo_notepad(&mut self) -> Result<String, NotepadError> {
        match self.session.as_mut() {
            Some(session) => session.notepad.redo().map(str::to_string),
            None => Err(NotepadError::CannotRedo),
        }
    }

    /// 断点文件与内存中的挂起断点保持一致
    fn persist_pending(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let pending = self
            .session
            .as_ref()
            .and_then(|s| s.pending_checkpoint.as_ref());
        let result = match pending {
            Some(checkpoint) => store.save(checkpoint),
            None => store.remove(),
        };
        if let Err(e) = result {
            tracing::warn!(path = %store.path().display(), "checkpoint persistence failed: {e:#}");
        }
    }
}

/// 在后台任务中运行控制器：返回命令发送端、进度接收端与任务句柄
pub fn spawn_controller(
    mut controller: SessionController,
) -> (
    mpsc::UnboundedSender<Command>,
    watch::Receiver<SessionProgress>,
    JoinHandle<()>,
) {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let progress_rx = controller.subscribe();

    let handle = tokio::spawn(async move {
        let cancel = controller.cancel_handle();
        let events = controller.events.clone();
        while let Some(cmd) = cmd_rx.recv().await {
            let quit = match cmd {
                Command::Submit { query, image } => {
                    let token = controller.supervisor.renew();
                    let fut = controller.run_session(query, image, token);
                    run_interruptible(fut, &mut cmd_rx, &cancel, events.as_ref()).await
                }
                Command::Retry => {
                    let token = controller.supervisor.renew();
                    let fut = controller.run_retry(token);
                    run_interruptible(fut, &mut cmd_rx, &cancel, events.as_ref()).await
                }
                Command::Cancel => {
                    controller.cancel_session();
                    false
                }
                Command::Clear => {
                    controller.clear();
                    false
                }
                Command::UndoNotepad => {
                    report_notepad(controller.undo_notepad(), events.as_ref());
                    false
                }
                Command::RedoNotepad => {
                    report_notepad(controller.redo_notepad(), events.as_ref());
                    false
                }
                Command::Quit => true,
            };
            if quit {
                break;
            }
        }
        tracing::info!("controller loop stopped");
    });

    (cmd_tx, progress_rx, handle)
}

/// 运行会话的同时继续接收命令；返回是否收到 Quit
async fn run_interruptible<F>(
    fut: F,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    cancel: &CancelHandle,
    events: Option<&mpsc::UnboundedSender<DialogueEvent>>,
) -> bool
where
    F: Future<Output = Result<(), DialogueError>>,
{
    tokio::pin!(fut);
    let mut quit = false;
    loop {
        tokio::select! {
            result = &mut fut => {
                if let Err(e) = result {
                    tracing::debug!("session ended: {}", e);
                    if matches!(e, DialogueError::EmptyQuery | DialogueError::NoPendingRetry | DialogueError::Persistence(_)) {
                        send_event(events, DialogueEvent::Advisory { text: e.to_string() });
                    }
                }
                return quit;
            }
            Some(cmd) = cmd_rx.recv() => {
                match cmd {
                    Command::Cancel => cancel.cancel(),
                    Command::Quit => {
                        quit = true;
                        cancel.cancel();
                    }
                    other => {
                        tracing::warn!(?other, "command ignored while a session is running");
                        send_event(events, DialogueEvent::Advisory { text: DialogueError::Busy.to_string() });
                    }
                }
            }
        }
    }
}

fn report_notepad(
    result: Result<String, NotepadError>,
    events: Option<&mpsc::UnboundedSender<DialogueEvent>>,
) {
    if let Err(e) = result {
        send_event(events, DialogueEvent::Advisory { text: e.to_string() });
    }
}
