use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Point-in-time copy of the feed counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedMetrics {
    pub feeds_generated: u64,
    pub posts_served: u64,
    pub suggestions_served: u64,
    pub feed_errors: u64,
    pub fallbacks_served: u64,
    pub empty_results_served: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub average_processing_time_ms: u64,
    /// Milliseconds since the Unix epoch of the last generated feed.
    pub last_generated_at_ms: Option<u64>,
}

impl FeedMetrics {
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

/// Lock-free counters. Every `record_*` call is a handful of relaxed
/// atomic adds, so callers never wait on it.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    feeds_generated: AtomicU64,
    posts_served: AtomicU64,
    suggestions_served: AtomicU64,
    feed_errors: AtomicU64,
    fallbacks_served: AtomicU64,
    empty_results_served: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    total_processing_ms: AtomicU64,
    last_generated_at_ms: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_feed_generated(&self, post_count: usize, suggestion_count: usize) {
        self.feeds_generated.fetch_add(1, Ordering::Relaxed);
        self.posts_served
            .fetch_add(post_count as u64, Ordering::Relaxed);
        self.suggestions_served
            .fetch_add(suggestion_count as u64, Ordering::Relaxed);
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.last_generated_at_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn record_processing_time(&self, elapsed: Duration) {
        self.total_processing_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_feed_error(&self) {
        self.feed_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_result(&self) {
        self.empty_results_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self) -> FeedMetrics {
        let feeds_generated = self.feeds_generated.load(Ordering::Relaxed);
        let total_processing_ms = self.total_processing_ms.load(Ordering::Relaxed);
        let last_generated_at_ms = match self.last_generated_at_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        };

        FeedMetrics {
            feeds_generated,
            posts_served: self.posts_served.load(Ordering::Relaxed),
            suggestions_served: self.suggestions_served.load(Ordering::Relaxed),
            feed_errors: self.feed_errors.load(Ordering::Relaxed),
            fallbacks_served: self.fallbacks_served.load(Ordering::Relaxed),
            empty_results_served: self.empty_results_served.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            average_processing_time_ms: total_processing_ms
                .checked_div(feeds_generated)
                .unwrap_or(0),
            last_generated_at_ms,
        }
    }

    pub fn reset_metrics(&self) {
        for counter in [
            &self.feeds_generated,
            &self.posts_served,
            &self.suggestions_served,
            &self.feed_errors,
            &self.fallbacks_served,
            &self.empty_results_served,
            &self.cache_hits,
            &self.cache_misses,
            &self.total_processing_ms,
            &self.last_generated_at_ms,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn export_metrics(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.get_metrics())
    }
}
