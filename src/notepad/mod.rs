//! 共享记事本：标记语言解析、按行编辑、线性撤销/重做
//!
//! 模型在回复中嵌入 `<np-*>` 标签修改记事本；parser 负责把标签与口头文本分离，document 负责校验并应用。

pub mod action;
pub mod document;
pub mod parser;

pub use action::NotepadAction;
pub use document::{NotepadDocument, NotepadError, DEFAULT_INITIAL_CONTENT, DEFAULT_MAX_HISTORY};
pub use parser::{parse_output, ParsedOutput, TERMINATION_SENTINEL};
