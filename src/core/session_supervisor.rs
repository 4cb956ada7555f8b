//! 会话监管：取消令牌的生命周期
//!
//! 每个会话（或一次手动重试）开始时换一个新的 CancellationToken；CancelHandle 可克隆到其它任务，
//! 随时取消当前正在运行的那一个。

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// 可跨任务共享的取消句柄
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    current: Arc<Mutex<CancellationToken>>,
}

impl CancelHandle {
    /// 取消当前会话（用户点击停止）
    pub fn cancel(&self) {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_cancelled()
    }
}

/// 会话级生命周期管理
#[derive(Debug, Default)]
pub struct SessionSupervisor {
    handle: CancelHandle,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    /// 为新的一次运行换上全新的令牌并返回其克隆
    pub fn renew(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self
            .handle
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = token.clone();
        token
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }
}
