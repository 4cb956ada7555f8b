//! 记事本文档：当前内容 + 线性历史（撤销/重做）
//!
//! 不变量：cursor 始终指向 history 中的有效下标，当前内容即 history[cursor]。
//! 在非末尾位置应用新修改时先截断 cursor 之后的历史再追加（分支即剪枝）。

use serde::Serialize;
use thiserror::Error;

use crate::notepad::NotepadAction;
use crate::persona::Speaker;

/// 新会话记事本的初始模板
pub const DEFAULT_INITIAL_CONTENT: &str =
    "这是共享记事本。\nCognito 和 Muse 可以在讨论过程中共同编辑和使用它。";

/// 历史快照默认上限
pub const DEFAULT_MAX_HISTORY: usize = 200;

/// 记事本操作错误：单个操作校验失败（非致命）或撤销/重做越界
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotepadError {
    #[error("操作 {index} (\"{action}\") 失败: 行号 {line} 超出范围 (总行数: {line_count})。")]
    LineOutOfRange {
        index: usize,
        action: &'static str,
        line: i64,
        line_count: usize,
    },

    #[error("操作 {index} (\"search_and_replace\") 失败: 查找内容为空。")]
    EmptySearch { index: usize },

    #[error("没有可撤销的记事本修改")]
    CannotUndo,

    #[error("没有可重做的记事本修改")]
    CannotRedo,
}

/// 共享记事本
#[derive(Debug, Clone, Serialize)]
pub struct NotepadDocument {
    history: Vec<String>,
    cursor: usize,
    last_updated_by: Option<Speaker>,
    max_history: usize,
    initial_content: String,
}

impl NotepadDocument {
    pub fn new(initial_content: impl Into<String>) -> Self {
        Self::with_max_history(initial_content, DEFAULT_MAX_HISTORY)
    }

    /// max_history 至少为 1
    pub fn with_max_history(initial_content: impl Into<String>, max_history: usize) -> Self {
        let initial_content = initial_content.into();
        Self {
            history: vec![initial_content.clone()],
            cursor: 0,
            last_updated_by: None,
            max_history: max_history.max(1),
            initial_content,
        }
    }

    pub fn content(&self) -> &str {
        &self.history[self.cursor]
    }

    pub fn last_updated_by(&self) -> Option<Speaker> {
        self.last_updated_by
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.history.len()
    }

    /// 按顺序把 actions 应用到当前内容的副本上。
    ///
    /// 单个操作校验失败只记录错误并跳过；只有内容确实发生变化时才提交新的历史条目。
    /// 返回本次产生的校验错误。
    pub fn apply(&mut self, actions: &[NotepadAction], actor: Option<Speaker>) -> Vec<NotepadError> {
        let mut working = self.content().to_string();
        let mut errors = Vec::new();

        for (i, action) in actions.iter().enumerate() {
            match apply_one(&working, action, i + 1) {
                Ok(next) => working = next,
                Err(e) => errors.push(e),
            }
        }

        if working != self.content() {
            self.commit(working, actor);
        }
        errors
    }

    /// 恢复初始模板；作为新的历史条目提交，可撤销
    pub fn clear(&mut self) {
        if self.content() != self.initial_content {
            let initial = self.initial_content.clone();
            self.commit(initial, None);
        }
    }

    pub fn undo(&mut self) -> Result<&str, NotepadError> {
        if !self.can_undo() {
            return Err(NotepadError::CannotUndo);
        }
        self.cursor -= 1;
        self.last_updated_by = None;
        Ok(self.content())
    }

    pub fn redo(&mut self) -> Result<&str, NotepadError> {
        if !self.can_redo() {
            return Err(NotepadError::CannotRedo);
        }
        self.cursor += 1;
        self.last_updated_by = None;
        Ok(self.content())
    }

    /// 带行号的内容视图（供提示词使用，模型据此按行号修改）；空白文档返回空串
    pub fn numbered_view(&self) -> String {
        let content = self.content();
        if content.trim().is_empty() {
            return String::new();
        }
        content
            .split('\n')
            .enumerate()
            .map(|(i, line)| format!("{}: {}", i + 1, line))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn commit(&mut self, content: String, actor: Option<Speaker>) {
        self.history.truncate(self.cursor + 1);
        self.history.push(content);
        if self.history.len() > self.max_history {
            let excess = self.history.len() - self.max_history;
            self.history.drain(..excess);
        }
        self.cursor = self.history.len() - 1;
        self.last_updated_by = actor;
    }
}

impl Default for NotepadDocument {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_CONTENT)
    }
}

fn line_index(
    line: i64,
    line_count: usize,
    index: usize,
    action: &'static str,
) -> Result<usize, NotepadError> {
    if line >= 1 && (line as u64) <= line_count as u64 {
        Ok(line as usize - 1)
    } else {
        Err(NotepadError::LineOutOfRange {
            index,
            action,
            line,
            line_count,
        })
    }
}

fn join_block(head: &str, tail: &str) -> String {
    if head.is_empty() || tail.is_empty() || head.ends_with('\n') || tail.starts_with('\n') {
        format!("{head}{tail}")
    } else {
        format!("{head}\n{tail}")
    }
}

fn apply_one(current: &str, action: &NotepadAction, index: usize) -> Result<String, NotepadError> {
    let mut lines: Vec<&str> = current.split('\n').collect();
    let line_count = lines.len();

    let next = match action {
        NotepadAction::ReplaceAll { content } => content.clone(),
        NotepadAction::Append { content } => join_block(current, content),
        NotepadAction::Prepend { content } => join_block(content, current),
        NotepadAction::InsertAfterLine { line, content } => {
            let at = if *line == 0 {
                0
            } else {
                line_index(*line, line_count, index, action.name())? + 1
            };
            lines.insert(at, content.as_str());
            lines.join("\n")
        }
        NotepadAction::ReplaceLine { line, content } => {
            let at = line_index(*line, line_count, index, action.name())?;
            lines[at] = content.as_str();
            lines.join("\n")
        }
        NotepadAction::DeleteLine { line } => {
            let at = line_index(*line, line_count, index, action.name())?;
            lines.remove(at);
            lines.join("\n")
        }
        NotepadAction::SearchReplace { find, with, all } => {
            if find.is_empty() {
                return Err(NotepadError::EmptySearch { index });
            }
            if *all {
                current.replace(find.as_str(), with)
            } else {
                current.replacen(find.as_str(), with, 1)
            }
        }
    };
    Ok(next)
}
