//! 报价缓存
//! 外部报价（汇率）带 TTL 缓存，时钟可注入以便测试

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

/// 时钟抽象
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动推进的时钟
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Decimal,
    stored_at: DateTime<Utc>,
}

pub struct QuoteCache {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl QuoteCache {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_system_clock(ttl: Duration) -> Self {
        Self::new(Arc::new(SystemClock), ttl)
    }

    /// 未过期时返回缓存值
    pub fn get(&self, key: &str) -> Option<Decimal> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        let entry = entries.get(key)?;
        (self.clock.now() - entry.stored_at < self.ttl).then_some(entry.value)
    }

    pub fn set(&self, key: impl Into<String>, value: Decimal) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        let now = self.clock.now();
        entries.retain(|_, e| now - e.stored_at < self.ttl);
        entries.insert(
            key.into(),
            Entry {
                value,
                stored_at: now,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expires_after_ttl() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = QuoteCache::new(clock.clone(), Duration::minutes(10));

        cache.set("USDT/CNY", Decimal::new(725, 2));
        assert_eq!(cache.get("USDT/CNY"), Some(Decimal::new(725, 2)));

        clock.advance(Duration::minutes(9));
        assert!(cache.get("USDT/CNY").is_some());

        clock.advance(Duration::minutes(1));
        assert_eq!(cache.get("USDT/CNY"), None);
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_set_refreshes_timestamp() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = QuoteCache::new(clock.clone(), Duration::seconds(60));
        cache.set("k", Decimal::ONE);
        clock.advance(Duration::seconds(50));
        cache.set("k", Decimal::TWO);
        clock.advance(Duration::seconds(50));
        assert_eq!(cache.get("k"), Some(Decimal::TWO));
    }
}
