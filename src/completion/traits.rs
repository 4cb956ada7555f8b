//! 补全服务抽象
//!
//! 所有后端实现 CompletionService::generate：输入提示词、模型名、可选系统指令与图片，返回文本与耗时；
//! 失败时按 CompletionErrorKind 区分凭据问题（不重试）与其它错误（可重试）。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 随提示词一起发送的图片（base64 编码）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub mime_type: String,
    pub base64_data: String,
}

/// 单次补全请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub system_instruction: Option<String>,
    pub image: Option<ImagePayload>,
}

/// 目标模型：名称与是否支持系统指令（不支持时系统指令不发送）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub name: String,
    #[serde(default = "default_true")]
    pub supports_system_instruction: bool,
}

fn default_true() -> bool {
    true
}

impl ModelProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supports_system_instruction: true,
        }
    }

    pub fn without_system_instruction(mut self) -> Self {
        self.supports_system_instruction = false;
        self
    }

    /// 按模型能力过滤系统指令
    pub fn system_instruction(&self, instruction: &str) -> Option<String> {
        self.supports_system_instruction
            .then(|| instruction.to_string())
    }
}

/// 补全结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionErrorKind {
    CredentialMissing,
    CredentialInvalid,
    Other,
}

/// 补全服务返回的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CompletionError {
    pub kind: CompletionErrorKind,
    pub message: String,
}

impl CompletionError {
    pub fn new(kind: CompletionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Other, message)
    }

    /// 凭据缺失或被拒绝，重试无意义
    pub fn is_credential(&self) -> bool {
        matches!(
            self.kind,
            CompletionErrorKind::CredentialMissing | CompletionErrorKind::CredentialInvalid
        )
    }
}

/// 补全服务 trait：一次请求一次完整回复（无流式）
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn generate(&self, request: &CompletionRequest) -> Result<Completion, CompletionError>;
}
