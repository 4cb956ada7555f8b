//! 错误恢复引擎
//!
//! 根据补全错误类型与已尝试次数返回 RecoveryAction，供 StepExecutor 决定是退避重试、直接终止还是生成断点。

use std::time::Duration;

use crate::completion::CompletionError;
use crate::core::RecoveryAction;

/// 默认自动重试次数（总尝试次数 = 1 + 该值）
pub const MAX_AUTO_RETRIES: u32 = 2;
/// 线性退避基数：第 n 次失败后等待 base * n
pub const RETRY_DELAY_BASE_MS: u64 = 1000;

/// 自动重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_auto_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_auto_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_auto_retries,
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_auto_retries + 1
    }

    /// 第 attempt 次（1 起始）失败后的等待时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_AUTO_RETRIES, Duration::from_millis(RETRY_DELAY_BASE_MS))
    }
}

/// 将补全错误映射为可执行动作（退避重试 / 致命 / 放弃）
#[derive(Debug, Default)]
pub struct RecoveryEngine {
    policy: RetryPolicy,
}

impl RecoveryEngine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// attempt 为刚刚失败的那次尝试（1 起始）
    pub fn handle(&self, err: &CompletionError, attempt: u32) -> RecoveryAction {
        if err.is_credential() {
            return RecoveryAction::Fatal;
        }
        if attempt >= self.policy.max_attempts() {
            return RecoveryAction::GiveUp;
        }
        RecoveryAction::RetryAfter(self.policy.delay_for(attempt))
    }
}
