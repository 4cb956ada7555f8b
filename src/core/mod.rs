//! 核心层：错误与恢复、状态投影、会话、会话监管、断点持久化、会话控制器

pub mod controller;
pub mod error;
pub mod persistence;
pub mod recovery;
pub mod session;
pub mod session_supervisor;
pub mod state;

pub use controller::{spawn_controller, Command, SessionController};
pub use error::{DialogueError, RecoveryAction};
pub use persistence::CheckpointStore;
pub use recovery::{RecoveryEngine, RetryPolicy, MAX_AUTO_RETRIES, RETRY_DELAY_BASE_MS};
pub use session::Session;
pub use session_supervisor::{CancelHandle, SessionSupervisor};
pub use state::{DialoguePhase, DiscussionMode, SessionProgress, SessionStatus};
