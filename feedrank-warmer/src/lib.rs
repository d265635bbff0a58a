//! Background worker that keeps the feed cache warm for a fixed set of users.

use feedrank_core::{UserId, WarmerConfig};
use feedrank_engine::{FeedService, RawFeedRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct CacheWarmer {
    service: Arc<FeedService>,
    interval: Duration,
    user_ids: Vec<UserId>,
    limit: i64,
}

impl CacheWarmer {
    pub fn new(service: Arc<FeedService>, config: &WarmerConfig) -> Self {
        Self {
            service,
            interval: config.interval(),
            user_ids: config.user_ids.clone(),
            limit: i64::from(config.limit),
        }
    }

    /// Recomputes every configured user's default feed once.
    ///
    /// Returns how many feeds were stored as personalized results. Failures
    /// and degraded results are logged and skipped.
    pub async fn run_once(&self) -> usize {
        let mut warmed = 0;
        for &user_id in &self.user_ids {
            let request = RawFeedRequest {
                limit: Some(self.limit),
                ..RawFeedRequest::for_user(user_id)
            };
            match self.service.refresh(&request).await {
                Ok(result) if result.is_fallback() => {
                    debug!(user_id, "Warm-up served a fallback feed, not cached");
                }
                Ok(result) => {
                    debug!(user_id, posts = result.ranked_posts.len(), "Feed warmed");
                    warmed += 1;
                }
                Err(e) => {
                    warn!(user_id, "Failed to warm feed: {e}");
                }
            }
        }
        warmed
    }

    /// Warms immediately, then on every tick until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        if self.user_ids.is_empty() {
            info!("No users configured for cache warming");
            return;
        }

        info!(
            interval_secs = self.interval.as_secs(),
            users = self.user_ids.len(),
            "Starting cache warmer"
        );

        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let warmed = self.run_once().await;
                    info!(warmed, users = self.user_ids.len(), "Cache warm-up pass finished");
                }
                _ = shutdown.cancelled() => {
                    info!("Cache warmer shutting down");
                    break;
                }
            }
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
