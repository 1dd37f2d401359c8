// 失败重试策略
//
// 传输类错误（断线、超时、握手失败）按指数退避重试；
// 远端明确拒绝（路径不存在、权限不足）与主机密钥被拒绝不重试。

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::error::SshError;
use crate::models::ClientSettings;

/// 重试策略：最多 max_attempts 次，第 n 次失败后等待 base^n 秒
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            crate::constants::DEFAULT_MAX_ATTEMPTS,
            crate::constants::DEFAULT_BACKOFF_BASE_SECS,
        )
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_secs: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_secs,
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(settings.max_attempts, settings.backoff_base_secs)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 第 attempt 次（从 1 开始）失败后的等待时间
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.base_secs.saturating_pow(attempt))
    }

    /// 执行操作，传输类错误时退避重试
    ///
    /// 闭包参数为当前尝试次数（从 1 开始）。重试次数耗尽后返回
    /// ExhaustedRetries，其中携带最后一次的错误。
    pub async fn run<T, F, Fut>(&self, op: &'static str, path: &str, mut f: F) -> Result<T, SshError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SshError>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match f(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("[Retry] {} '{}' succeeded on attempt {}", op, path, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt < self.max_attempts {
                        let delay = self.delay_after(attempt);
                        warn!(
                            "[Retry] {} '{}' failed (attempt {}/{}), retrying in {}s: {}",
                            op,
                            path,
                            attempt,
                            self.max_attempts,
                            delay.as_secs(),
                            e
                        );
                        last_error = Some(e);
                        tokio::time::sleep(delay).await;
                    } else {
                        last_error = Some(e);
                    }
                }
            }
        }

        let source = last_error
            .unwrap_or_else(|| SshError::Config("retry policy ran zero attempts".to_string()));
        error!(
            "[Retry] {} '{}' failed after {} attempts: {}",
            op, path, self.max_attempts, source
        );
        Err(SshError::ExhaustedRetries {
            op,
            path: path.to_string(),
            attempts: self.max_attempts,
            source: Box::new(source),
        })
    }
}
