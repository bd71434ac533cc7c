//! 过渡态轮询：固定间隔探测，直到落定、超时或被取消

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::HiveError;
use crate::remote::RemoteError;
use crate::resource::{RemoteStatus, ResourceKey};

/// 轮询期间可容忍的连续暂时性错误次数
const MAX_TRANSIENT_POLL_ERRORS: usize = 3;

#[derive(Debug, Clone)]
pub struct Poller {
    pub interval: Duration,
    /// 必须的截止时间，超过即 ProvisioningTimeout
    pub deadline: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            deadline: Duration::from_secs(600),
        }
    }
}

impl Poller {
    /// 探测直到状态不再是过渡态；NotFound 视为已删除
    pub async fn until_settled<F, Fut>(
        &self,
        key: &ResourceKey,
        cancel: &CancellationToken,
        mut fetch_status: F,
    ) -> Result<RemoteStatus, HiveError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<RemoteStatus, RemoteError>>,
    {
        let started = Instant::now();
        let mut transient_errors = 0;

        loop {
            let status = match fetch_status().await {
                Ok(status) => {
                    transient_errors = 0;
                    status
                }
                Err(RemoteError::NotFound(_)) => return Ok(RemoteStatus::deleted()),
                Err(e) if e.is_transient() && transient_errors < MAX_TRANSIENT_POLL_ERRORS => {
                    transient_errors += 1;
                    tracing::warn!("Polling {} failed ({}), will retry", key, e);
                    RemoteStatus::new("POLLING")
                }
                Err(e) => return Err(HiveError::Remote(e)),
            };

            if !status.is_transitional() {
                tracing::debug!("{} settled in {}", key, status);
                return Ok(status);
            }

            let waited = started.elapsed();
            if waited >= self.deadline {
                tracing::warn!("{} still {} after {:?}", key, status, waited);
                return Err(HiveError::ProvisioningTimeout {
                    kind: key.kind,
                    name: key.name.clone(),
                    status: status.to_string(),
                    waited,
                });
            }

            tracing::debug!("{} is {}, waiting {:?}", key, status, self.interval);
            tokio::select! {
                _ = cancel.cancelled() => return Err(HiveError::Cancelled),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
