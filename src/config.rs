//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `DUET__*` 覆盖（双下划线表示嵌套，如 `DUET__DISCUSSION__MODE=ai-driven`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::completion::ModelProfile;
use crate::core::{DiscussionMode, RetryPolicy, MAX_AUTO_RETRIES, RETRY_DELAY_BASE_MS};
use crate::dialogue::{DialogueSettings, PromptSet};
use crate::notepad::{NotepadDocument, DEFAULT_INITIAL_CONTENT, DEFAULT_MAX_HISTORY};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub discussion: DiscussionSection,
    pub models: ModelsSection,
    pub prompts: PromptsSection,
    pub retry: RetrySection,
    pub notepad: NotepadSection,
    pub storage: StorageSection,
}

impl AppConfig {
    pub fn dialogue_settings(&self) -> DialogueSettings {
        let defaults = PromptSet::default();
        DialogueSettings {
            logical_model: self.models.logical.clone(),
            creative_model: self.models.creative.clone(),
            prompts: PromptSet {
                logical_system: self
                    .prompts
                    .logical_system
                    .clone()
                    .unwrap_or(defaults.logical_system),
                creative_system: self
                    .prompts
                    .creative_system
                    .clone()
                    .unwrap_or(defaults.creative_system),
            },
        }
    }
}

/// [discussion] 段：讨论模式与固定轮数
#[derive(Debug, Clone, Deserialize)]
pub struct DiscussionSection {
    #[serde(default)]
    pub mode: ModeName,
    #[serde(default = "default_fixed_turns")]
    pub fixed_turns: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ModeName {
    #[default]
    Fixed,
    AiDriven,
}

fn default_fixed_turns() -> usize {
    2
}

impl Default for DiscussionSection {
    fn default() -> Self {
        Self {
            mode: ModeName::default(),
            fixed_turns: default_fixed_turns(),
        }
    }
}

impl DiscussionSection {
    /// 固定轮数至少为 1
    pub fn mode(&self) -> DiscussionMode {
        match self.mode {
            ModeName::Fixed => DiscussionMode::fixed(self.fixed_turns),
            ModeName::AiDriven => DiscussionMode::AiDriven,
        }
    }
}

/// [models] 段：逻辑方与创意方各自的模型
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsSection {
    #[serde(default = "default_logical_model")]
    pub logical: ModelProfile,
    #[serde(default = "default_creative_model")]
    pub creative: ModelProfile,
}

fn default_logical_model() -> ModelProfile {
    ModelProfile::new("gemini-2.5-flash")
}

fn default_creative_model() -> ModelProfile {
    ModelProfile::new("gemini-2.5-flash")
}

impl Default for ModelsSection {
    fn default() -> Self {
        Self {
            logical: default_logical_model(),
            creative: default_creative_model(),
        }
    }
}

/// [prompts] 段：可选的系统提示覆盖
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PromptsSection {
    pub logical_system: Option<String>,
    pub creative_system: Option<String>,
}

/// [retry] 段：自动重试次数与线性退避基数
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_auto_retries")]
    pub max_auto_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_auto_retries() -> u32 {
    MAX_AUTO_RETRIES
}

fn default_base_delay_ms() -> u64 {
    RETRY_DELAY_BASE_MS
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_auto_retries: default_max_auto_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_auto_retries,
            Duration::from_millis(self.base_delay_ms),
        )
    }
}

/// [notepad] 段：初始模板与历史上限
#[derive(Debug, Clone, Deserialize)]
pub struct NotepadSection {
    #[serde(default = "default_initial_content")]
    pub initial_content: String,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_initial_content() -> String {
    DEFAULT_INITIAL_CONTENT.to_string()
}

fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

impl Default for NotepadSection {
    fn default() -> Self {
        Self {
            initial_content: default_initial_content(),
            max_history: default_max_history(),
        }
    }
}

impl NotepadSection {
    /// 新会话使用的记事本
    pub fn document(&self) -> NotepadDocument {
        NotepadDocument::with_max_history(self.initial_content.clone(), self.max_history)
    }
}

/// [storage] 段：待重试断点的持久化路径（不设置则只保存在内存）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageSection {
    pub checkpoint_path: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 DUET__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 DUET__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("DUET")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
