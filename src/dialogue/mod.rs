//! 对话层：转录、断点、提示词、过程事件、单步执行器与回合编排器

pub mod checkpoint;
pub mod events;
pub mod executor;
pub mod orchestrator;
pub mod prompts;
pub mod transcript;

pub use checkpoint::{Checkpoint, StepId};
pub use events::{send_event, DialogueEvent};
pub use executor::{StepExecutor, StepOutcome, StepCall};
pub use orchestrator::{next_phase, DialogueSettings, Observers, TurnOrchestrator};
pub use prompts::{PromptContext, PromptSet};
pub use transcript::{render_log, TurnPurpose, TurnRecord};
