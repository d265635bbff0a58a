pub mod aggregator;
pub mod assembler;
pub mod cache;
pub mod metrics;
pub mod retry;
pub mod scoring;
pub mod selector;
pub mod service;
pub mod suggestions;
pub mod validator;


pub use aggregator::{InteractionAggregator, InteractionSnapshot};
pub use assembler::{AlgorithmInfo, AlgorithmMode, FeedResult, RankedPost};
pub use cache::{FeedCache, FeedCacheKey};
pub use metrics::{FeedMetrics, MetricsCollector};
pub use retry::{CircuitBreaker, CircuitBreakerState, RetryExecutor, RetryMetrics};
pub use scoring::{ScoredCandidate, ScoringEngine, ScoringWeights};
pub use selector::CandidateSelector;
pub use service::FeedService;
pub use suggestions::{AccountRanker, SuggestedAccount};
pub use validator::{validate, FeedRequest, RawFeedRequest, SortMode};
