//! 记事本操作（由标签解析得到的有类型指令）

use serde::{Deserialize, Serialize};

/// 单个记事本修改操作；行号均为 1 起始，针对当前内容按 `\n` 切分后的行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NotepadAction {
    ReplaceAll { content: String },
    Append { content: String },
    Prepend { content: String },
    /// 在第 line 行之后插入；line = 0 表示插到最前
    InsertAfterLine { line: i64, content: String },
    ReplaceLine { line: i64, content: String },
    DeleteLine { line: i64 },
    /// find 按字面子串匹配，不是正则
    SearchReplace { find: String, with: String, all: bool },
}

impl NotepadAction {
    /// 操作名（用于错误信息）
    pub fn name(&self) -> &'static str {
        match self {
            NotepadAction::ReplaceAll { .. } => "replace_all",
            NotepadAction::Append { .. } => "append",
            NotepadAction::Prepend { .. } => "prepend",
            NotepadAction::InsertAfterLine { .. } => "insert",
            NotepadAction::ReplaceLine { .. } => "replace",
            NotepadAction::DeleteLine { .. } => "delete_line",
            NotepadAction::SearchReplace { .. } => "search_and_replace",
        }
    }
}
