//! 提示词组装
//!
//! 每一步的提示词 = 步骤正文 + 记事本说明（附带带行号的当前内容）+ 讨论模式说明。
//! 系统提示可通过配置覆盖。

use serde::{Deserialize, Serialize};

use crate::dialogue::{render_log, TurnRecord};
use crate::notepad::{NotepadDocument, TERMINATION_SENTINEL};
use crate::persona::Persona;

pub const DEFAULT_LOGICAL_SYSTEM_PROMPT: &str = "You are Cognito, a logical and analytical AI. \
Your job is to keep the discussion accurate, coherent and focused on the user's query. \
Your partner Muse is deliberately skeptical and will challenge your points; answer those challenges \
with clear, well-supported arguments and steer the debate back to concrete solutions when it drifts. \
For trivial queries (a greeting, a question about who you are) keep your first message short and, \
if nothing more is needed, end it with the discussion-complete tag.";

pub const DEFAULT_CREATIVE_SYSTEM_PROMPT: &str = "You are Muse, a creative, skeptical and demanding AI. \
Push your logical partner Cognito toward the best possible answer for the user. \
Question whether each point is sufficient, look for what is missing and propose bolder alternatives, \
but keep every challenge concrete and relevant to the user's query. Do not agree easily. \
Only for genuinely trivial queries, where Cognito already gave a complete answer ending with the \
discussion-complete tag, may you answer with that tag as well.";

const NOTEPAD_INSTRUCTIONS: &str = r#"
You share a notepad with your partner.
Current notepad content (line numbers are for reference only):
---
{notepad}
---
To change the notepad, embed tags in your reply. Text outside the tags is your spoken reply.
Leave the tags out entirely if you do not want to change anything.
Tag content may span several lines; write real newlines, never escaped ones.
Tag names are case-insensitive; attribute values must be double-quoted.

<np-replace-all>new full content</np-replace-all>
<np-append>text added at the end</np-append>
<np-prepend>text added at the start</np-prepend>
<np-insert line="5">text inserted after line 5 (line 0 inserts at the top)</np-insert>
<np-replace line="8">new content for line 8</np-replace>
<np-delete line="3" />
<np-search-replace find="old text" with="new text" all="true" />

Line numbers are 1-based. `find` is matched literally; `all` defaults to false.
Keep tags well-formed: closed, with quoted attributes.
"#;

const IMAGE_INSTRUCTION: &str =
    "The user also attached an image. Consider it together with the text of the query.";

/// 两个人格的系统提示
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSet {
    pub logical_system: String,
    pub creative_system: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            logical_system: DEFAULT_LOGICAL_SYSTEM_PROMPT.to_string(),
            creative_system: DEFAULT_CREATIVE_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl PromptSet {
    pub fn system_for(&self, persona: Persona) -> &str {
        match persona {
            Persona::Logical => &self.logical_system,
            Persona::Creative => &self.creative_system,
        }
    }
}

/// 构建提示词所需的上下文
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub query: &'a str,
    pub has_image: bool,
    pub ai_driven: bool,
    pub notepad: &'a NotepadDocument,
}

impl PromptContext<'_> {
    fn header(&self) -> String {
        let mut header = format!("The user's query is: \"{}\".", self.query);
        if self.has_image {
            header.push(' ');
            header.push_str(IMAGE_INSTRUCTION);
        }
        header
    }

    /// 所有步骤共用的尾部说明
    fn common_instructions(&self) -> String {
        let mut out = NOTEPAD_INSTRUCTIONS.replace("{notepad}", &self.notepad.numbered_view());
        if self.ai_driven {
            out.push_str(&ai_driven_instruction());
        }
        out
    }
}

fn ai_driven_instruction() -> String {
    format!(
        "\nIf you believe the topic has been explored well enough for Cognito to write the final answer, \
end your message with the exact tag {TERMINATION_SENTINEL} (after any notepad tags). \
Leave it out if you want to keep discussing.\n"
    )
}

/// 开场：逻辑方给出初步分析
pub fn initial_prompt(ctx: &PromptContext<'_>) -> String {
    format!(
        "{} Give your initial thoughts on this query so that {} ({}) can respond and start the discussion with you.\n{}",
        ctx.header(),
        Persona::Creative,
        Persona::Creative.role_hint(),
        ctx.common_instructions()
    )
}

/// 讨论回合：speaker 回应对方最近一次发言
pub fn reply_prompt(
    ctx: &PromptContext<'_>,
    speaker: Persona,
    transcript: &[TurnRecord],
    partner_signaled_termination: bool,
) -> String {
    let partner = speaker.partner();
    let last = transcript
        .iter()
        .rev()
        .find(|t| t.speaker.persona() == partner)
        .map(|t| t.text.as_str())
        .unwrap_or_default();
    let mut prompt = format!(
        "{} Discussion so far:\n{}\n{} ({}) just said: \"{}\". Reply to {} and continue the discussion. Keep it concise.\n{}",
        ctx.header(),
        render_log(transcript),
        partner,
        partner.role_hint(),
        last,
        partner,
        ctx.common_instructions()
    );
    if ctx.ai_driven && partner_signaled_termination {
        prompt.push_str(&format!(
            "\n{partner} ended its message with {TERMINATION_SENTINEL} to suggest ending the discussion. \
If you agree, include {TERMINATION_SENTINEL} in your reply as well; otherwise keep discussing."
        ));
    }
    prompt
}

/// 综合：逻辑方写出最终答案并整体替换记事本
pub fn synthesis_prompt(ctx: &PromptContext<'_>, transcript: &[TurnRecord]) -> String {
    format!(
        "{} You ({}) and {} had the following discussion:\n{}\n\n\
Your final task is to write the answer for the user and put it in the notepad.\n\
1. Combine every point of the discussion and the current notepad into one complete, well-structured answer in Markdown.\n\
2. Put the whole answer into the notepad with a single <np-replace-all> tag. This is what the user reads.\n\
3. Keep your spoken reply very short: just tell the user the final answer is ready in the notepad.\n{}",
        ctx.header(),
        Persona::Logical,
        Persona::Creative,
        render_log(transcript),
        ctx.common_instructions()
    )
}
