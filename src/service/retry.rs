// 网关调用重试策略
//
// 每个调用类别一套策略（读取 / 广播），不再按调用点各写一份常量。
// 只有传输层错误（超时、连接失败、非 2xx）会重试；带错误码的拒绝直接返回。

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};

use crate::error::TronError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 总尝试次数（含第一次）
    pub max_attempts: u32,
    /// 两次尝试之间的基础等待
    pub delay_ms: u64,
    /// true 时第 n 次失败后等待 n * delay
    pub linear_backoff: bool,
    /// 单次尝试超时
    pub timeout_ms: u64,
}

impl RetryPolicy {
    /// 无等待策略，测试用
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay_ms: 0,
            linear_backoff: false,
            timeout_ms: 5_000,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 第 `attempt` 次（从 1 开始）失败后的等待时间
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = if self.linear_backoff {
            attempt.max(1) as u64
        } else {
            1
        };
        Duration::from_millis(self.delay_ms.saturating_mul(factor))
    }
}

/// 按策略执行 `op`，闭包参数为当前尝试序号（从 1 开始）
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op_name: &str, mut op: F) -> Result<T, TronError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TronError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        let outcome = match timeout(policy.timeout(), op(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(TronError::GatewayTransport(format!(
                "{} timed out after {}ms",
                op_name, policy.timeout_ms
            ))),
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(op = op_name, attempt, "gateway call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() => {
                if attempt < max_attempts {
                    let wait = policy.delay_after(attempt);
                    tracing::warn!(
                        op = op_name,
                        attempt,
                        max_attempts,
                        error = %e,
                        next_retry_in_ms = wait.as_millis() as u64,
                        "gateway call failed, will retry"
                    );
                    sleep(wait).await;
                } else {
                    tracing::error!(op = op_name, attempts = max_attempts, error = %e, "gateway call exhausted retries");
                }
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error
        .unwrap_or_else(|| TronError::GatewayTransport(format!("{} failed", op_name))))
}
