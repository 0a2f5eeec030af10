use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::Clock;
use crate::errors::CoreError;
use crate::models::price::QuoteRecord;

/// Cache key for a quote lookup: `SYMBOL:CURRENCY`.
pub fn quote_key(symbol: &str, currency: &str) -> String {
    format!("{}:{}", symbol.to_uppercase(), currency.to_uppercase())
}

struct CachedQuote {
    record: QuoteRecord,
    stored_at: DateTime<Utc>,
}

/// Short-TTL in-memory cache that deduplicates rapid repeated calls to a
/// slow, quota-limited quote source.
///
/// Never persisted: on restart the cache starts cold, which is intentional —
/// quotes are cheap to refetch and tolerate minutes of staleness, not hours.
///
/// Concurrent misses for the same key are coalesced through a per-key
/// in-flight guard, so a thundering herd against a rate-limited upstream
/// collapses into a single call.
pub struct QuoteCache {
    entries: Mutex<HashMap<String, CachedQuote>>,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    clock: Clock,
}

impl QuoteCache {
    pub fn new(clock: Clock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Return the cached record for `key` if it is younger than `ttl`.
    pub async fn get(&self, key: &str, ttl: Duration) -> Option<QuoteRecord> {
        let entries = self.entries.lock().await;
        let cached = entries.get(key)?;
        if self.clock.now() - cached.stored_at < ttl {
            Some(cached.record.clone())
        } else {
            None
        }
    }

    /// Serve from cache when fresh, otherwise invoke `fetch` and store the
    /// result. Fetch failures propagate to the caller uncached — a failed
    /// fetch must never poison the cache with a placeholder.
    ///
    /// When several callers miss on the same key at once, exactly one runs
    /// `fetch`; the rest wait on the per-key guard and are served the stored
    /// result. If the winning fetch fails, the next waiter retries upstream
    /// rather than inheriting the error.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<QuoteRecord, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<QuoteRecord, CoreError>>,
    {
        if let Some(record) = self.get(key, ttl).await {
            debug!(key, "quote cache hit");
            return Ok(record);
        }

        // Per-key gate. Entries are bounded by the symbol universe, so they
        // are left in place rather than reaped after each flight.
        let gate = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(
                inflight
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let _flight = gate.lock().await;

        // Re-check: a coalesced caller finds the winner's result here.
        if let Some(record) = self.get(key, ttl).await {
            debug!(key, "quote cache hit after coalesced fetch");
            return Ok(record);
        }

        debug!(key, "quote cache miss, fetching upstream");
        let record = fetch().await?;

        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            CachedQuote {
                record: record.clone(),
                stored_at: self.clock.now(),
            },
        );
        Ok(record)
    }

    /// Drop a single cached quote.
    pub async fn invalidate(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    /// Drop every cached quote. Returns the number of entries removed.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        count
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
