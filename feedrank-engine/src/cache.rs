use crate::assembler::FeedResult;
use crate::validator::{FeedRequest, SortMode};
use feedrank_core::{CacheConfig, UserId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedCacheKey {
    pub user_id: UserId,
    pub sort_mode: SortMode,
    pub limit: usize,
    pub include_nsfw: bool,
}

impl FeedCacheKey {
    pub fn for_request(request: &FeedRequest) -> Self {
        Self {
            user_id: request.user_id(),
            sort_mode: request.sort_mode(),
            limit: request.limit(),
            include_nsfw: request.include_nsfw(),
        }
    }
}

impl fmt::Display for FeedCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "feed:{}:{}:{}:{}",
            self.user_id, self.sort_mode, self.limit, self.include_nsfw
        )
    }
}

#[derive(Clone)]
struct CachedFeed {
    result: FeedResult,
    created_at: Instant,
}

/// TTL-bounded feed cache. Entries are never re-validated; staleness is
/// bounded only by the TTL.
pub struct FeedCache {
    ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<FeedCacheKey, CachedFeed>>,
    inflight: Mutex<HashMap<FeedCacheKey, Arc<Mutex<()>>>>,
}

impl FeedCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_ttl(config.ttl(), config.max_entries)
    }

    pub fn with_ttl(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &FeedCacheKey) -> Option<FeedResult> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.created_at.elapsed() <= self.ttl)
            .map(|entry| entry.result.clone())
    }

    pub async fn insert(&self, key: FeedCacheKey, result: FeedResult) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, v| v.created_at.elapsed() <= self.ttl);
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            if let Some(victim) = entries
                .iter()
                .min_by_key(|(_, v)| v.created_at)
                .map(|(k, _)| k.clone())
            {
                debug!(key = %victim, "Evicting oldest cached feed");
                entries.remove(&victim);
            }
        }
        entries.insert(
            key,
            CachedFeed {
                result,
                created_at: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Per-key lock so concurrent misses on one key compute once.
    pub async fn lock_key(&self, key: &FeedCacheKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inflight = self.inflight.lock().await;
            // Locks nobody holds or waits on are only referenced by the map.
            inflight.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                inflight
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}
