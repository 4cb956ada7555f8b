//! Mock 补全服务（用于测试与离线演示，无需 API）
//!
//! - MockCompletionService：回显提示词首行，并追加一行记事本与终止标记，便于本地跑通整个对话流程。
//! - ScriptedCompletionService：按预设脚本依次返回回复或错误，并记录收到的每个请求。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::completion::{Completion, CompletionError, CompletionRequest, CompletionService};
use crate::notepad::TERMINATION_SENTINEL;

/// 回显首行的 Mock 服务
#[derive(Debug, Default)]
pub struct MockCompletionService;

#[async_trait]
impl CompletionService for MockCompletionService {
    async fn generate(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
        let start = Instant::now();
        let first_line: String = request
            .prompt
            .lines()
            .next()
            .unwrap_or("(no input)")
            .chars()
            .take(120)
            .collect();
        let text = format!(
            "Echo from Mock ({model}): {first_line}\n<np-append>\n- {model} 已阅读\n</np-append>\n{TERMINATION_SENTINEL}",
            model = request.model,
        );
        Ok(Completion {
            text,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

type CallHook = Box<dyn Fn() + Send + Sync>;

/// 脚本化服务：每次调用弹出一条预设结果；脚本耗尽时返回 Other 错误
#[derive(Default)]
pub struct ScriptedCompletionService {
    script: Mutex<VecDeque<Result<String, CompletionError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    hooks: Mutex<Vec<(usize, CallHook)>>,
    latency: Option<Duration>,
}

impl ScriptedCompletionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    pub fn fail(self, error: CompletionError) -> Self {
        self.push(Err(error));
        self
    }

    pub fn push(&self, item: Result<String, CompletionError>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(item);
    }

    /// 在第 call_index 次调用（0 起始）进行期间触发取消，模拟「请求在途时用户取消」
    pub fn cancel_during_call(self, call_index: usize, token: CancellationToken) -> Self {
        self.on_call(call_index, move || token.cancel())
    }

    /// 在第 call_index 次调用进行期间执行 hook
    pub fn on_call(self, call_index: usize, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((call_index, Box::new(hook)));
        self
    }

    /// 每次调用先异步等待 latency 再返回
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// 已收到的请求（按调用顺序）
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletionService {
    async fn generate(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
        let call_index = {
            let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
            requests.push(request.clone());
            requests.len() - 1
        };

        for (at, hook) in self
            .hooks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
        {
            if *at == call_index {
                hook();
            }
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(Ok(text)) => Ok(Completion {
                text,
                duration_ms: 1,
            }),
            Some(Err(e)) => Err(e),
            None => Err(CompletionError::other("script exhausted")),
        }
    }
}
