//! 优雅关闭
//!
//! Ctrl+C / SIGTERM 取消根 token，所有作用域 token 随之取消：
//! - 生命周期轮询与重试退避立即返回 Cancelled
//! - 正在消费的调用流以 StreamInterrupted 返回已累积的部分结果

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// 关闭原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
}

/// 关闭信号管理器
#[derive(Clone, Default)]
pub struct ShutdownManager {
    root: CancellationToken,
    reason: Arc<Mutex<Option<ShutdownReason>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 根 token，传给 LifecycleManager / StreamConsumer
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// 某一阶段（建拓扑、单次调用）的子 token；阶段自身可提前取消而不影响其他阶段
    pub fn scope(&self, stage: &str) -> CancellationToken {
        tracing::debug!("Opening cancellation scope: {}", stage);
        self.root.child_token()
    }

    /// 只记录第一次的原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        {
            let mut slot = self.reason.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.root.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.root.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.reason.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, cancelling provisioning and open streams");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = self.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                        tracing::info!("Received SIGTERM, cancelling provisioning and open streams");
                        manager.shutdown(ShutdownReason::Signal);
                    }
                    Err(e) => tracing::warn!("Failed to install SIGTERM handler: {}", e),
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_cancels_scopes() {
        let manager = ShutdownManager::new();
        let provisioning = manager.scope("provisioning");
        let invocation = manager.scope("invocation");
        assert!(!manager.is_shutdown());

        manager.shutdown(ShutdownReason::UserInitiated);
        assert!(provisioning.is_cancelled());
        assert!(invocation.is_cancelled());
        assert!(manager.token().is_cancelled());
    }

    #[test]
    fn test_scope_cancel_does_not_propagate_up() {
        let manager = ShutdownManager::new();
        let scope = manager.scope("invocation");
        scope.cancel();
        assert!(!manager.is_shutdown());
        assert_eq!(manager.reason(), None);
    }

    #[test]
    fn test_first_reason_kept() {
        let manager = ShutdownManager::new();
        manager.shutdown(ShutdownReason::Signal);
        manager.shutdown(ShutdownReason::UserInitiated);
        assert_eq!(manager.reason(), Some(ShutdownReason::Signal));
    }
}
