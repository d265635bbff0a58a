//! Packages ranked posts and suggestions into the response shape.

use crate::metrics::MetricsCollector;
use crate::scoring::{RankedCandidates, ScoredCandidate, REASON_POPULAR};
use crate::suggestions::SuggestedAccount;
use crate::validator::{FeedRequest, SortMode};
use feedrank_core::Post;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

pub const FACTORS_CONSIDERED: [&str; 5] = [
    "popularity",
    "freshness",
    "community_affinity",
    "content_type_preference",
    "author_reputation",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmMode {
    Algorithm,
    Hot,
    New,
    Top,
    Discover,
    Fallback,
}

impl AlgorithmMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmMode::Algorithm => "algorithm",
            AlgorithmMode::Hot => "hot",
            AlgorithmMode::New => "new",
            AlgorithmMode::Top => "top",
            AlgorithmMode::Discover => "discover",
            AlgorithmMode::Fallback => "fallback",
        }
    }
}

impl From<SortMode> for AlgorithmMode {
    fn from(mode: SortMode) -> Self {
        match mode {
            SortMode::Algorithm => AlgorithmMode::Algorithm,
            SortMode::Hot => AlgorithmMode::Hot,
            SortMode::New => AlgorithmMode::New,
            SortMode::Top => AlgorithmMode::Top,
            SortMode::Discover => AlgorithmMode::Discover,
        }
    }
}

impl fmt::Display for AlgorithmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmInfo {
    pub mode: AlgorithmMode,
    pub decay_factor: f64,
    pub factors_considered: Vec<String>,
    pub processing_time_ms: u64,
}

impl AlgorithmInfo {
    fn new(mode: AlgorithmMode, decay_factor: f64, started: Instant) -> Self {
        Self {
            mode,
            decay_factor,
            factors_considered: FACTORS_CONSIDERED.iter().map(|f| f.to_string()).collect(),
            processing_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// A post as it appears in the response, with its 1-based position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedPost {
    pub rank: usize,
    pub post: Post,
    pub score: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResult {
    pub ranked_posts: Vec<RankedPost>,
    pub suggested_accounts: Vec<SuggestedAccount>,
    pub algorithm_info: AlgorithmInfo,
    pub total_candidates: usize,
    pub has_more: bool,
}

impl FeedResult {
    /// The result served when even the fallback could not be built.
    pub fn empty(decay_factor: f64, started: Instant) -> Self {
        Self {
            ranked_posts: Vec::new(),
            suggested_accounts: Vec::new(),
            algorithm_info: AlgorithmInfo::new(AlgorithmMode::Fallback, decay_factor, started),
            total_candidates: 0,
            has_more: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ranked_posts.is_empty() && self.suggested_accounts.is_empty()
    }

    pub fn is_fallback(&self) -> bool {
        self.algorithm_info.mode == AlgorithmMode::Fallback
    }
}

fn presented(candidates: Vec<ScoredCandidate>) -> Vec<RankedPost> {
    candidates
        .into_iter()
        .enumerate()
        .map(|(i, c)| RankedPost {
            rank: i + 1,
            post: c.post,
            score: c.score,
            reasons: c.reasons,
        })
        .collect()
}

pub fn assemble(
    ranked: RankedCandidates,
    suggestions: Vec<SuggestedAccount>,
    request: &FeedRequest,
    started: Instant,
    metrics: &MetricsCollector,
) -> FeedResult {
    metrics.record_feed_generated(ranked.posts.len(), suggestions.len());
    metrics.record_processing_time(started.elapsed());

    FeedResult {
        ranked_posts: presented(ranked.posts),
        suggested_accounts: suggestions,
        algorithm_info: AlgorithmInfo::new(
            request.sort_mode().into(),
            request.time_decay_factor(),
            started,
        ),
        total_candidates: ranked.total_candidates,
        has_more: ranked.has_more,
    }
}

/// Non-personalized result from the globally popular posts. `popular` may
/// hold one post beyond the limit, which only sets `has_more`.
pub fn assemble_fallback(
    popular: Vec<Post>,
    request: &FeedRequest,
    score: f64,
    started: Instant,
) -> FeedResult {
    let has_more = popular.len() > request.limit();
    let candidates = popular
        .into_iter()
        .take(request.limit())
        .map(|post| ScoredCandidate {
            post,
            score,
            reasons: vec![REASON_POPULAR.to_string()],
        })
        .collect::<Vec<_>>();

    FeedResult {
        total_candidates: candidates.len(),
        ranked_posts: presented(candidates),
        suggested_accounts: Vec::new(),
        algorithm_info: AlgorithmInfo::new(
            AlgorithmMode::Fallback,
            request.time_decay_factor(),
            started,
        ),
        has_more,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{validate, RawFeedRequest};
    use chrono::Utc;
    use feedrank_core::{AuthorSummary, PostType};

    fn post(id: i64) -> Post {
        Post {
            id,
            title: format!("post {}", id),
            subreddit_id: 1,
            subreddit_name: "general".to_string(),
            author: AuthorSummary {
                id: 2,
                username: "author".to_string(),
                karma: 0,
                verified: false,
            },
            post_type: PostType::Link,
            upvotes: 0,
            downvotes: 0,
            comment_count: 0,
            view_count: 0,
            nsfw: false,
            created_at: Utc::now(),
        }
    }

    fn request(limit: i64, mode: &str) -> FeedRequest {
        validate(&RawFeedRequest {
            limit: Some(limit),
            sort_mode: Some(mode.to_string()),
            time_decay_factor: Some(2.0),
            ..RawFeedRequest::for_user(1)
        })
        .unwrap()
    }

    #[test]
    fn test_assemble_records_metrics_and_ranks() {
        let metrics = MetricsCollector::new();
        let ranked = RankedCandidates {
            posts: vec![
                ScoredCandidate {
                    post: post(1),
                    score: 9.0,
                    reasons: vec![],
                },
                ScoredCandidate {
                    post: post(2),
                    score: 4.0,
                    reasons: vec![],
                },
            ],
            total_candidates: 7,
            has_more: true,
        };

        let result = assemble(ranked, Vec::new(), &request(2, "hot"), Instant::now(), &metrics);

        assert_eq!(result.ranked_posts[0].rank, 1);
        assert_eq!(result.ranked_posts[1].rank, 2);
        assert_eq!(result.total_candidates, 7);
        assert!(result.has_more);
        assert_eq!(result.algorithm_info.mode, AlgorithmMode::Hot);
        assert_eq!(result.algorithm_info.decay_factor, 2.0);
        assert_eq!(result.algorithm_info.factors_considered.len(), 5);
        assert!(!result.is_fallback());

        let snapshot = metrics.get_metrics();
        assert_eq!(snapshot.feeds_generated, 1);
        assert_eq!(snapshot.posts_served, 2);
    }

    #[test]
    fn test_fallback_uses_fixed_score_and_reason() {
        let popular: Vec<Post> = (1..=4).map(post).collect();
        let result = assemble_fallback(popular, &request(3, "new"), 1.0, Instant::now());

        assert!(result.is_fallback());
        assert_eq!(result.ranked_posts.len(), 3);
        assert!(result.has_more);
        assert!(result.suggested_accounts.is_empty());
        for ranked in &result.ranked_posts {
            assert_eq!(ranked.score, 1.0);
            assert_eq!(ranked.reasons, vec!["Popular post".to_string()]);
        }
    }

    #[test]
    fn test_empty_result_serializes_as_fallback() {
        let result = FeedResult::empty(1.0, Instant::now());
        assert!(result.is_empty());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["algorithmInfo"]["mode"], "fallback");
        assert_eq!(json["rankedPosts"].as_array().unwrap().len(), 0);
        assert_eq!(json["hasMore"], false);
    }
}
