//! 远端写操作的有界重试
//!
//! 冲突、限流与传输错误按固定间隔重试，其余错误立即返回。

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::remote::RemoteError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 首次失败后最多再试几次
    pub max_retries: usize,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_secs(4),
        }
    }
}

#[derive(Debug)]
pub enum RetryError {
    /// 重试耗尽，attempts 为总尝试次数
    Exhausted { attempts: usize, last: RemoteError },
    /// 不可重试的错误
    Fatal(RemoteError),
    Cancelled,
}

/// 冲突通常是同名资源仍在删除中，限流与传输错误是暂时性的
pub fn is_retryable(error: &RemoteError) -> bool {
    error.is_conflict() || error.is_transient()
}

pub async fn retry_remote<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!("Operation succeeded after {} attempts", attempt);
                }
                return Ok(result);
            }
            Err(error) => {
                if !is_retryable(&error) {
                    tracing::debug!("Non-retryable error: {}", error);
                    return Err(RetryError::Fatal(error));
                }
                if attempt > policy.max_retries {
                    tracing::warn!(
                        "Max retries ({}) exceeded. Last error: {}",
                        policy.max_retries,
                        error
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }
                tracing::warn!(
                    "Attempt {} failed: {}. Retrying in {:?}...",
                    attempt,
                    error,
                    policy.backoff
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(policy.backoff) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_conflict_then_success() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result = retry_remote(&RetryPolicy::default(), &CancellationToken::new(), move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RemoteError::Conflict("busy".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_max_retries() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<(), _> =
            retry_remote(&RetryPolicy::default(), &CancellationToken::new(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::Throttled("slow down".into()))
            })
            .await;
        match result {
            Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("Expected Exhausted, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_not_retried() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<(), _> =
            retry_remote(&RetryPolicy::default(), &CancellationToken::new(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::Rejected {
                    status: 400,
                    body: "bad spec".into(),
                })
            })
            .await;
        assert!(matches!(result, Err(RetryError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_during_backoff() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<(), _> = retry_remote(&RetryPolicy::default(), &token, || async {
            Err(RemoteError::Transport("reset".into()))
        })
        .await;
        assert!(matches!(result, Err(RetryError::Cancelled)));
    }
}
