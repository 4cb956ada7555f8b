//! 补全服务层：外部模型服务的抽象与测试/离线实现
//!
//! 具体的网络客户端不在本 crate 内；调用方实现 CompletionService 接入任意后端。

pub mod mock;
pub mod traits;

pub use mock::{MockCompletionService, ScriptedCompletionService};
pub use traits::{
    Completion, CompletionError, CompletionErrorKind, CompletionRequest, CompletionService,
    ImagePayload, ModelProfile,
};
