use parking_lot::Mutex;

use crate::types::{AssetClass, ExchangeGroup, TradingSession};

/// Single-entry "last query" cache keyed on `(date, exchange_group,
/// asset_class)`, per spec §4.1. A real LRU would be overkill: in practice
/// the coordinator re-queries the same (date, group, class) triple
/// repeatedly within a session before rolling to the next date.
#[derive(Default)]
pub struct SessionCache {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    entry: Option<(CacheKey, TradingSession)>,
    hits: u64,
    misses: u64,
}

type CacheKey = (chrono::NaiveDate, ExchangeGroup, AssetClass);

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(
        &self,
        date: chrono::NaiveDate,
        exchange_group: &str,
        asset_class: &str,
        compute: impl FnOnce() -> TradingSession,
    ) -> TradingSession {
        let key: CacheKey = (date, exchange_group.to_string(), asset_class.to_string());
        let mut inner = self.inner.lock();
        if let Some((cached_key, session)) = &inner.entry {
            if *cached_key == key {
                inner.hits += 1;
                return session.clone();
            }
        }
        inner.misses += 1;
        let session = compute();
        inner.entry = Some((key, session.clone()));
        session
    }

    pub fn invalidate(&self) {
        let mut inner = self.inner.lock();
        inner.entry = None;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}
