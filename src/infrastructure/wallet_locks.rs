//! 按钱包串行化的进程内锁
//! 同一钱包的扣款准入（读余额 -> 比较 -> 写入）必须串行执行

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// 锁守卫，超出作用域自动释放
pub type WalletLockGuard = OwnedMutexGuard<()>;

#[derive(Default, Clone)]
pub struct WalletLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取钱包锁（等待直到拿到）
    pub async fn acquire(&self, wallet_id: Uuid) -> WalletLockGuard {
        let lock = {
            let mut map = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            // 清理无人持有的条目，避免无限增长
            if map.len() > 1024 {
                map.retain(|_, l| Arc::strong_count(l) > 1);
            }
            map.entry(wallet_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_wallet_is_serialized() {
        let locks = WalletLocks::new();
        let id = Uuid::new_v4();

        let guard = locks.acquire(id).await;
        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = locks2.acquire(id).await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_wallets_do_not_block() {
        let locks = WalletLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        tokio::time::timeout(Duration::from_millis(100), locks.acquire(Uuid::new_v4()))
            .await
            .unwrap();
    }
}
