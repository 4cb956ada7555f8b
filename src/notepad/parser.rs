//! 记事本标记解析
//!
//! 逐个扫描 `<` 开头的片段：只认识固定的 `np-*` 标签（标签名不区分大小写，属性值必须用双引号）。
//! 合法标签从口头文本中移除并转为 NotepadAction；属性不合法的标签记录解析错误、原样保留在文本中，
//! 不会中断整段解析。口头文本末尾的终止标记单独识别。

use std::collections::HashMap;

use crate::notepad::NotepadAction;

/// 发言者认为讨论可以结束时，放在消息最末尾的标记
pub const TERMINATION_SENTINEL: &str = "<DISCUSSION_COMPLETE>";

/// 一次模型输出的解析结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOutput {
    /// 去掉标签与终止标记后的口头文本（不会为空，必要时用占位文本）
    pub spoken_text: String,
    pub actions: Vec<NotepadAction>,
    pub termination_signal: bool,
    pub parse_errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagShape {
    /// `<tag ...>content</tag>`
    Body,
    /// `<tag ... />` 或 `<tag ...></tag>`
    Empty,
}

#[derive(Debug, Clone, Copy)]
enum TagKind {
    ReplaceAll,
    Append,
    Prepend,
    Insert,
    Replace,
    Delete,
    SearchReplace,
}

impl TagKind {
    fn lookup(name: &str) -> Option<TagKind> {
        match name {
            "np-replace-all" => Some(TagKind::ReplaceAll),
            "np-append" => Some(TagKind::Append),
            "np-prepend" => Some(TagKind::Prepend),
            "np-insert" => Some(TagKind::Insert),
            "np-replace" => Some(TagKind::Replace),
            "np-delete" => Some(TagKind::Delete),
            "np-search-replace" => Some(TagKind::SearchReplace),
            _ => None,
        }
    }

    fn shape(self) -> TagShape {
        match self {
            TagKind::Delete | TagKind::SearchReplace => TagShape::Empty,
            _ => TagShape::Body,
        }
    }
}

enum TagScan {
    NotATag,
    Malformed { error: String, resume_at: usize },
    Parsed { action: NotepadAction, end: usize },
}

/// 解析一段模型原始输出
pub fn parse_output(raw: &str) -> ParsedOutput {
    let lower = raw.to_ascii_lowercase();
    let mut spoken = String::with_capacity(raw.len());
    let mut actions = Vec::new();
    let mut parse_errors = Vec::new();

    // copied: 已拷入 spoken 的位置；search_from: 下一次查找 '<' 的位置
    let mut copied = 0;
    let mut search_from = 0;
    while let Some(rel) = raw[search_from..].find('<') {
        let start = search_from + rel;
        match scan_tag(raw, &lower, start) {
            TagScan::NotATag => search_from = start + 1,
            TagScan::Malformed { error, resume_at } => {
                parse_errors.push(error);
                search_from = resume_at;
            }
            TagScan::Parsed { action, end } => {
                spoken.push_str(&raw[copied..start]);
                actions.push(action);
                copied = end;
                search_from = end;
            }
        }
    }
    spoken.push_str(&raw[copied..]);

    let mut spoken_text = spoken.trim().to_string();
    let mut termination_signal = false;
    if let Some(stripped) = spoken_text.strip_suffix(TERMINATION_SENTINEL) {
        spoken_text = stripped.trim_end().to_string();
        termination_signal = true;
    }

    if spoken_text.is_empty() {
        spoken_text = placeholder_text(actions.len(), termination_signal, !parse_errors.is_empty());
    }

    ParsedOutput {
        spoken_text,
        actions,
        termination_signal,
        parse_errors,
    }
}

fn placeholder_text(action_count: usize, termination_signal: bool, had_errors: bool) -> String {
    let notepad_part = (action_count > 0).then(|| format!("修改了记事本 ({action_count} 项操作)"));
    let end_part = termination_signal.then_some("建议结束讨论");
    match (notepad_part, end_part) {
        (Some(n), Some(e)) => format!("(AI {n}并{e})"),
        (Some(n), None) => format!("(AI {n})"),
        (None, Some(e)) => format!("(AI {e})"),
        (None, None) if had_errors => "(AI 尝试修改记事本但标签无效)".to_string(),
        (None, None) => "(AI 未提供额外文本回复)".to_string(),
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn scan_tag(raw: &str, lower: &str, start: usize) -> TagScan {
    let name_start = start + 1;
    let name_len = raw[name_start..]
        .find(|c: char| !is_name_char(c))
        .unwrap_or(raw.len() - name_start);
    if name_len == 0 {
        return TagScan::NotATag;
    }
    let name_end = name_start + name_len;
    let name = &lower[name_start..name_end];
    let Some(kind) = TagKind::lookup(name) else {
        return TagScan::NotATag;
    };
    match raw[name_end..].chars().next() {
        Some(c) if c.is_whitespace() || c == '>' || c == '/' => {}
        _ => return TagScan::NotATag,
    }

    let Some(open_rel) = raw[name_end..].find('>') else {
        return TagScan::Malformed {
            error: format!("标签 <{name}> 缺少 '>'，已忽略."),
            resume_at: name_end,
        };
    };
    let open_end = name_end + open_rel;
    let mut attr_src = raw[name_end..open_end].trim_end();
    let self_closing = attr_src.ends_with('/');
    if self_closing {
        attr_src = &attr_src[..attr_src.len() - 1];
    }

    let (body, end) = if self_closing {
        (None, open_end + 1)
    } else {
        match find_closing(lower, open_end + 1, name) {
            Some((body_end, close_end)) => (Some(&raw[open_end + 1..body_end]), close_end),
            None => {
                return TagScan::Malformed {
                    error: format!("标签 <{name}> 缺少闭合标签 </{name}>，已忽略."),
                    resume_at: open_end + 1,
                }
            }
        }
    };

    if kind.shape() == TagShape::Body && body.is_none() {
        return TagScan::Malformed {
            error: format!("标签 <{name}> 需要内容与闭合标签，不能自闭合."),
            resume_at: end,
        };
    }

    let attrs = parse_attributes(attr_src);
    match build_action(kind, name, &attrs, body.unwrap_or_default()) {
        Ok(action) => TagScan::Parsed { action, end },
        Err(error) => TagScan::Malformed {
            error,
            resume_at: end,
        },
    }
}

/// 在 lower 中从 from 开始查找 `</name\s*>`，返回 (内容结束位置, 闭合标签结束位置)
fn find_closing(lower: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let needle = format!("</{name}");
    let mut pos = from;
    while let Some(rel) = lower[pos..].find(&needle) {
        let at = pos + rel;
        let after = at + needle.len();
        let rest = &lower[after..];
        let ws = rest.len() - rest.trim_start().len();
        if rest[ws..].starts_with('>') {
            return Some((at, after + ws + 1));
        }
        pos = after;
    }
    None
}

/// 解析 `name="value"` 形式的属性；不符合该形式的片段忽略
fn parse_attributes(src: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut rest = src;
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let name_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if name_len == 0 {
            // 跳过一个无法识别的字符
            let skip = rest.chars().next().map(char::len_utf8).unwrap_or(1);
            rest = &rest[skip..];
            continue;
        }
        let name = &rest[..name_len];
        let after_name = rest[name_len..].trim_start();
        let Some(after_eq) = after_name.strip_prefix('=') else {
            rest = after_name;
            continue;
        };
        let after_eq = after_eq.trim_start();
        let Some(quoted) = after_eq.strip_prefix('"') else {
            rest = after_eq;
            continue;
        };
        match quoted.find('"') {
            Some(close) => {
                attrs.insert(name.to_string(), quoted[..close].to_string());
                rest = &quoted[close + 1..];
            }
            None => break,
        }
    }
    attrs
}

fn required<'a>(
    attrs: &'a HashMap<String, String>,
    tag: &str,
    attr: &str,
) -> Result<&'a str, String> {
    attrs
        .get(attr)
        .map(String::as_str)
        .ok_or_else(|| format!("标签 <{tag}> 缺少必需属性 \"{attr}\"."))
}

fn line_attr(attrs: &HashMap<String, String>, tag: &str) -> Result<i64, String> {
    let value = required(attrs, tag, "line")?;
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("标签 <{tag}> 属性 \"line\" 的值 \"{value}\" 不是有效数字."))
}

fn bool_attr(attrs: &HashMap<String, String>, tag: &str, attr: &str) -> Result<bool, String> {
    match attrs.get(attr) {
        None => Ok(false),
        Some(v) if v.trim().eq_ignore_ascii_case("true") => Ok(true),
        Some(v) if v.trim().eq_ignore_ascii_case("false") => Ok(false),
        Some(v) => Err(format!(
            "标签 <{tag}> 属性 \"{attr}\" 的值 \"{v}\" 不是有效布尔值 (true/false)."
        )),
    }
}

fn build_action(
    kind: TagKind,
    tag: &str,
    attrs: &HashMap<String, String>,
    body: &str,
) -> Result<NotepadAction, String> {
    let content = body.trim().to_string();
    let action = match kind {
        TagKind::ReplaceAll => NotepadAction::ReplaceAll { content },
        TagKind::Append => NotepadAction::Append { content },
        TagKind::Prepend => NotepadAction::Prepend { content },
        TagKind::Insert => NotepadAction::InsertAfterLine {
            line: line_attr(attrs, tag)?,
            content,
        },
        TagKind::Replace => NotepadAction::ReplaceLine {
            line: line_attr(attrs, tag)?,
            content,
        },
        TagKind::Delete => NotepadAction::DeleteLine {
            line: line_attr(attrs, tag)?,
        },
        TagKind::SearchReplace => NotepadAction::SearchReplace {
            find: required(attrs, tag, "find")?.to_string(),
            with: required(attrs, tag, "with")?.to_string(),
            all: bool_attr(attrs, tag, "all")?,
        },
    };
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        let parsed = parse_output("  Just talking, 1 < 2.  ");
        assert_eq!(parsed.spoken_text, "Just talking, 1 < 2.");
        assert!(parsed.actions.is_empty());
        assert!(!parsed.termination_signal);
        assert!(parsed.parse_errors.is_empty());
    }

    #[test]
    fn test_tags_removed_in_order() {
        let raw = "I updated it.\n<np-delete line=\"1\" />\n<NP-Append>\n- done\n</np-append>\nPlease review.";
        let parsed = parse_output(raw);
        assert_eq!(
            parsed.actions,
            vec![
                NotepadAction::DeleteLine { line: 1 },
                NotepadAction::Append {
                    content: "- done".to_string()
                },
            ]
        );
        assert_eq!(parsed.spoken_text, "I updated it.\n\n\nPlease review.");
    }

    #[test]
    fn test_multiline_content_kept_literally() {
        let raw = "<np-replace-all>\n# Title\nline with \\n escape\n</np-replace-all>";
        let parsed = parse_output(raw);
        assert_eq!(
            parsed.actions,
            vec![NotepadAction::ReplaceAll {
                content: "# Title\nline with \\n escape".to_string()
            }]
        );
    }

    #[test]
    fn test_replace_is_not_confused_with_replace_all() {
        let raw = "<np-replace line=\"2\">new</np-replace><np-replace-all>x</np-replace-all>";
        let parsed = parse_output(raw);
        assert_eq!(
            parsed.actions,
            vec![
                NotepadAction::ReplaceLine {
                    line: 2,
                    content: "new".to_string()
                },
                NotepadAction::ReplaceAll {
                    content: "x".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_search_replace_attributes() {
        let parsed =
            parse_output(r#"<np-search-replace find="a.b" with="c" all="TRUE"></np-search-replace>"#);
        assert_eq!(
            parsed.actions,
            vec![NotepadAction::SearchReplace {
                find: "a.b".to_string(),
                with: "c".to_string(),
                all: true
            }]
        );

        let parsed = parse_output(r#"<np-search-replace find="a" with="" />"#);
        assert_eq!(
            parsed.actions,
            vec![NotepadAction::SearchReplace {
                find: "a".to_string(),
                with: String::new(),
                all: false
            }]
        );
    }

    #[test]
    fn test_invalid_attributes_are_reported_not_fatal() {
        let raw = "Hi <np-delete line=\"abc\" /> <np-insert>x</np-insert> <np-append>ok</np-append>";
        let parsed = parse_output(raw);
        assert_eq!(parsed.parse_errors.len(), 2);
        assert!(parsed.parse_errors[0].contains("不是有效数字"));
        assert!(parsed.parse_errors[1].contains("缺少必需属性"));
        assert_eq!(
            parsed.actions,
            vec![NotepadAction::Append {
                content: "ok".to_string()
            }]
        );
        // 非法标签保留在文本中
        assert!(parsed.spoken_text.contains("np-delete"));
    }

    #[test]
    fn test_invalid_boolean_rejected() {
        let parsed = parse_output(r#"<np-search-replace find="a" with="b" all="yes" />"#);
        assert!(parsed.actions.is_empty());
        assert_eq!(parsed.parse_errors.len(), 1);
    }

    #[test]
    fn test_unclosed_body_tag_is_reported() {
        let parsed = parse_output("Text <np-append>never closed");
        assert!(parsed.actions.is_empty());
        assert_eq!(parsed.parse_errors.len(), 1);
        assert_eq!(parsed.spoken_text, "Text <np-append>never closed");
    }

    #[test]
    fn test_termination_sentinel_after_tags() {
        let raw = format!("Agreed.\n<np-append>x</np-append>\n{TERMINATION_SENTINEL}");
        let parsed = parse_output(&raw);
        assert!(parsed.termination_signal);
        assert_eq!(parsed.spoken_text, "Agreed.");
        assert_eq!(parsed.actions.len(), 1);
    }

    #[test]
    fn test_sentinel_not_at_end_is_ignored() {
        let raw = format!("{TERMINATION_SENTINEL} but let's continue");
        let parsed = parse_output(&raw);
        assert!(!parsed.termination_signal);
    }

    #[test]
    fn test_placeholders() {
        let parsed = parse_output("<np-append>x</np-append>");
        assert_eq!(parsed.spoken_text, "(AI 修改了记事本 (1 项操作))");

        let parsed = parse_output(&format!("<np-append>x</np-append>{TERMINATION_SENTINEL}"));
        assert_eq!(parsed.spoken_text, "(AI 修改了记事本 (1 项操作)并建议结束讨论)");

        let parsed = parse_output(TERMINATION_SENTINEL);
        assert_eq!(parsed.spoken_text, "(AI 建议结束讨论)");

        let parsed = parse_output("   ");
        assert_eq!(parsed.spoken_text, "(AI 未提供额外文本回复)");
    }

    #[test]
    fn test_unknown_tags_are_text() {
        let parsed = parse_output("<b>bold</b> <np-appendix>x</np-appendix>");
        assert!(parsed.actions.is_empty());
        assert!(parsed.parse_errors.is_empty());
        assert_eq!(parsed.spoken_text, "<b>bold</b> <np-appendix>x</np-appendix>");
    }

    #[test]
    fn test_non_ascii_content() {
        let parsed = parse_output("记事本更新：<np-append>\n- 结论：成立\n</np-append>完成");
        assert_eq!(parsed.spoken_text, "记事本更新：完成");
        assert_eq!(
            parsed.actions,
            vec![NotepadAction::Append {
                content: "- 结论：成立".to_string()
            }]
        );
    }
}
