//! 进程内按 (kind, name) 串行化 ensure / teardown

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use crate::resource::ResourceKey;

#[derive(Default)]
pub struct NameLocks {
    locks: Mutex<HashMap<ResourceKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取该名称的锁，持有期间同名操作排队
    pub async fn acquire(&self, key: &ResourceKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_name_serialized() {
        let locks = Arc::new(NameLocks::new());
        let key = ResourceKey::new(ResourceKind::Agent, "news_agent");

        let guard = locks.acquire(&key).await;
        let contender = {
            let locks = locks.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&key).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_names_independent() {
        let locks = NameLocks::new();
        let _a = locks.acquire(&ResourceKey::new(ResourceKind::Agent, "a")).await;
        let _b = locks.acquire(&ResourceKey::new(ResourceKind::Agent, "b")).await;
        let _alias = locks.acquire(&ResourceKey::new(ResourceKind::Alias, "a")).await;
    }
}
