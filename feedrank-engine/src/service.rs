//! The public entry point: read-through cache, retry, circuit breaker and
//! the degraded fallback around the ranking pipeline.

use crate::aggregator::InteractionAggregator;
use crate::assembler::{self, FeedResult};
use crate::cache::{FeedCache, FeedCacheKey};
use crate::metrics::MetricsCollector;
use crate::retry::{lock, CircuitBreaker, CircuitBreakerState, RetryExecutor};
use crate::scoring::ScoringEngine;
use crate::selector::CandidateSelector;
use crate::suggestions::AccountRanker;
use crate::validator::{validate, FeedRequest, RawFeedRequest};
use chrono::Utc;
use feedrank_core::{
    ErrorExt, ErrorRecovery, ErrorReporter, FeedConfig, FeedError, FeedStore, PageSpec, RecoveryResult,
    RecoveryStrategy,
};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub struct FeedService {
    store: Arc<dyn FeedStore>,
    config: FeedConfig,
    aggregator: InteractionAggregator,
    selector: CandidateSelector,
    scoring: ScoringEngine,
    accounts: AccountRanker,
    cache: FeedCache,
    retry: RetryExecutor,
    breaker: Mutex<CircuitBreaker>,
    metrics: Arc<MetricsCollector>,
    reporter: ErrorReporter,
}

impl FeedService {
    /// Fails with `FeedError::Config` when `config` does not validate.
    pub fn new(store: Arc<dyn FeedStore>, config: FeedConfig) -> Result<Self, FeedError> {
        Self::with_scoring(store, config, ScoringEngine::default())
    }

    pub fn with_scoring(
        store: Arc<dyn FeedStore>,
        config: FeedConfig,
        scoring: ScoringEngine,
    ) -> Result<Self, FeedError> {
        config.validate()?;
        Ok(Self {
            aggregator: InteractionAggregator::new(Arc::clone(&store), &config.aggregation),
            selector: CandidateSelector::new(Arc::clone(&store), &config.candidates),
            accounts: AccountRanker::new(Arc::clone(&store), config.suggestions.clone()),
            cache: FeedCache::new(&config.cache),
            retry: RetryExecutor::new(config.retry.clone()),
            breaker: Mutex::new(CircuitBreaker::new(config.circuit_breaker.clone())),
            metrics: Arc::new(MetricsCollector::new()),
            reporter: ErrorReporter::new(),
            scoring,
            store,
            config,
        })
    }

    /// Returns a ranked feed for the requesting user.
    ///
    /// Only caller mistakes (`InvalidArgument`, `NotFound`) come back as
    /// errors. Backend failures degrade to the popular-posts fallback, and
    /// a failing fallback degrades to an empty result.
    pub async fn get_personalized_feed(&self, raw: &RawFeedRequest) -> Result<FeedResult, FeedError> {
        let request = validate(raw)?;
        let key = FeedCacheKey::for_request(&request);

        if let Some(hit) = self.cached(&key).await {
            return Ok(hit);
        }

        if self.config.cache.coalesce_misses {
            let _guard = self.cache.lock_key(&key).await;
            if let Some(hit) = self.cache.get(&key).await.filter(|r| !r.is_empty()) {
                debug!(key = %key, "Feed computed by a concurrent request");
                return Ok(hit);
            }
            return self.resolve(&request, key).await.into_result();
        }

        self.resolve(&request, key).await.into_result()
    }

    /// Recomputes a feed and stores it, skipping the cache read.
    pub async fn refresh(&self, raw: &RawFeedRequest) -> Result<FeedResult, FeedError> {
        let request = validate(raw)?;
        let key = FeedCacheKey::for_request(&request);
        self.resolve(&request, key).await.into_result()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    pub fn cache(&self) -> &FeedCache {
        &self.cache
    }

    pub fn circuit_state(&self) -> CircuitBreakerState {
        lock(&self.breaker).get_state()
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    async fn cached(&self, key: &FeedCacheKey) -> Option<FeedResult> {
        match self.cache.get(key).await.filter(|result| !result.is_empty()) {
            Some(hit) => {
                self.metrics.record_cache_hit();
                debug!(key = %key, "Feed cache hit");
                Some(hit)
            }
            None => {
                self.metrics.record_cache_miss();
                debug!(key = %key, "Feed cache miss");
                None
            }
        }
    }

    async fn resolve(&self, request: &FeedRequest, key: FeedCacheKey) -> RecoveryResult<FeedResult> {
        let started = Instant::now();

        let admitted = lock(&self.breaker).allow_request();
        if !admitted {
            info!(user_id = request.user_id(), "Circuit open, serving fallback feed");
            return RecoveryResult::Degraded(self.fallback(request, started, &FeedError::CircuitOpen).await);
        }

        let outcome = self
            .retry
            .execute("personalized_feed", || self.generate(request, started))
            .await;

        match outcome {
            Ok(result) => {
                lock(&self.breaker).record_success();
                self.cache.insert(key, result.clone()).await;
                RecoveryResult::Recovered(result)
            }
            Err(error) => match ErrorRecovery::after_retries(&error) {
                RecoveryStrategy::Fail => {
                    debug!(user_id = request.user_id(), "Feed request rejected: {}", error);
                    lock(&self.breaker).record_client_error();
                    RecoveryResult::Failed(error)
                }
                _ => {
                    lock(&self.breaker).record_failure();
                    self.metrics.record_feed_error();
                    self.reporter.report_error(&error);
                    RecoveryResult::Degraded(self.fallback(request, started, &error).await)
                }
            },
        }
    }

    async fn generate(&self, request: &FeedRequest, started: Instant) -> Result<FeedResult, FeedError> {
        let now = Utc::now();
        let snapshot = self.aggregator.aggregate(request.user_id()).await?;

        let deadline = self.config.aggregation.deadline();
        let reads = async {
            tokio::try_join!(
                self.selector.select_candidates(&snapshot, request),
                self.accounts.suggest_accounts(&snapshot, request.user_id()),
            )
        };
        let (candidates, suggestions) = match timeout(deadline, reads).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    user_id = request.user_id(),
                    deadline_ms = deadline.as_millis() as u64,
                    "Candidate selection timed out"
                );
                return Err(FeedError::Timeout {
                    operation: "select candidates and suggestions".to_string(),
                    millis: deadline.as_millis() as u64,
                });
            }
        };

        let ranked = self.scoring.rank(candidates, &snapshot, request, now);
        Ok(assembler::assemble(
            ranked,
            suggestions,
            request,
            started,
            &self.metrics,
        ))
    }

    /// Popular posts with a fixed score. Never fails; if the popular posts
    /// cannot be read either, the result is empty.
    async fn fallback(&self, request: &FeedRequest, started: Instant, cause: &FeedError) -> FeedResult {
        warn!(
            user_id = request.user_id(),
            cause = %cause.error_code(),
            "Serving fallback feed"
        );

        // One extra post tells the assembler whether there is more.
        let page = PageSpec::first(request.limit() + 1);
        let popular = timeout(
            self.config.aggregation.deadline(),
            self.store.get_popular_posts(page, request.include_nsfw()),
        )
        .await;

        let error = match popular {
            Ok(Ok(posts)) => {
                self.metrics.record_fallback();
                return assembler::assemble_fallback(
                    posts,
                    request,
                    self.config.fallback.score,
                    started,
                );
            }
            Ok(Err(e)) => FeedError::Fallback {
                message: e.to_string(),
            },
            Err(_) => FeedError::Fallback {
                message: "popular posts timed out".to_string(),
            },
        };

        self.reporter.report_error(&error);
        self.metrics.record_empty_result();
        FeedResult::empty(request.time_decay_factor(), started)
    }
}
