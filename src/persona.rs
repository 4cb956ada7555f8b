//! 角色定义：两个 AI 人格（逻辑 / 创意）与发言者
//!
//! Persona 决定使用哪个模型与系统提示；Speaker 标注转录中每条发言的归属（综合阶段由逻辑人格以 Synthesizer 身份发言）。

use std::fmt;

use serde::{Deserialize, Serialize};

/// AI 人格：逻辑型（Cognito）与创意/对抗型（Muse）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    Logical,
    Creative,
}

impl Persona {
    pub fn display_name(self) -> &'static str {
        match self {
            Persona::Logical => "Cognito",
            Persona::Creative => "Muse",
        }
    }

    /// 对话中的另一方
    pub fn partner(self) -> Persona {
        match self {
            Persona::Logical => Persona::Creative,
            Persona::Creative => Persona::Logical,
        }
    }

    /// 用于提示词中的角色说明
    pub fn role_hint(self) -> &'static str {
        match self {
            Persona::Logical => "logical AI",
            Persona::Creative => "creative AI",
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// 转录中的发言者
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Logical,
    Creative,
    Synthesizer,
}

impl Speaker {
    /// 发言者背后的人格；Synthesizer 由逻辑人格担任
    pub fn persona(self) -> Persona {
        match self {
            Speaker::Logical | Speaker::Synthesizer => Persona::Logical,
            Speaker::Creative => Persona::Creative,
        }
    }
}

impl From<Persona> for Speaker {
    fn from(p: Persona) -> Self {
        match p {
            Persona::Logical => Speaker::Logical,
            Persona::Creative => Speaker::Creative,
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.persona().display_name())
    }
}
