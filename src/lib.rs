//! Duet - 双 AI 对话编排
//!
//! 逻辑型（Cognito）与创意型（Muse）两个人格围绕用户问题多轮讨论，同时通过回复中嵌入的标签编辑共享记事本，
//! 最后由逻辑方综合出最终答案写入记事本。
//!
//! 模块划分：
//! - **persona**: 人格与发言者
//! - **notepad**: 记事本标记解析、按行编辑、撤销/重做
//! - **completion**: 补全服务抽象与 Mock 实现
//! - **dialogue**: 转录、断点、提示词、过程事件、单步执行器、回合编排器
//! - **core**: 错误与恢复、状态投影、会话监管、断点持久化、会话控制器
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **observability**: 日志初始化

pub mod completion;
pub mod config;
pub mod core;
pub mod dialogue;
pub mod notepad;
pub mod observability;
pub mod persona;

pub use crate::core::{Command, SessionController};
pub use crate::dialogue::DialogueEvent;
