//! Rule-based relevance scoring.
//!
//! Each candidate gets five sub-scores normalized to roughly `[0, 100]`,
//! combined as a weighted sum and then scaled down if the user has
//! already voted on the post. Reasons are derived separately and never
//! feed back into the number.

use crate::aggregator::InteractionSnapshot;
use crate::validator::FeedRequest;
use chrono::{DateTime, Utc};
use feedrank_core::{AuthorSummary, Post};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const BASE_DECAY_RATE: f64 = 0.05;
pub const UPVOTED_MULTIPLIER: f64 = 0.3;
pub const DOWNVOTED_MULTIPLIER: f64 = 0.1;

const MAX_SUB_SCORE: f64 = 100.0;
const SUBSCRIBED_AFFINITY: f64 = 100.0;
const ACTIVITY_POINTS: f64 = 10.0;
const BASE_AFFINITY: f64 = 30.0;
const NEUTRAL_TYPE_SCORE: f64 = 50.0;
const MATCHED_TYPE_FLOOR: f64 = 80.0;
const MATCHED_TYPE_SPAN: f64 = 19.0;
const UNMATCHED_TYPE_SCORE: f64 = 40.0;
const KARMA_PER_POINT: f64 = 100.0;
const VERIFIED_BONUS: f64 = 20.0;

const POPULAR_UPVOTES: i64 = 100;
const TRENDING_COMMENTS: i64 = 50;
const FRESH_HOURS: f64 = 6.0;

pub const REASON_SUBSCRIBED: &str = "From a subscribed community";
pub const REASON_ACTIVE: &str = "Active in this community";
pub const REASON_POPULAR: &str = "Popular post";
pub const REASON_TRENDING: &str = "Trending discussion";
pub const REASON_FRESH: &str = "Fresh content";
pub const REASON_PREFERENCE: &str = "Matches your preferences";
pub const REASON_VERIFIED: &str = "From a verified author";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub popularity: f64,
    pub freshness: f64,
    pub community_affinity: f64,
    pub content_type: f64,
    pub author_reputation: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            popularity: 0.25,
            freshness: 0.20,
            community_affinity: 0.25,
            content_type: 0.15,
            author_reputation: 0.10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorScores {
    pub popularity: f64,
    pub freshness: f64,
    pub community_affinity: f64,
    pub content_type: f64,
    pub author_reputation: f64,
}

impl FactorScores {
    pub fn weighted(&self, weights: &ScoringWeights) -> f64 {
        self.popularity * weights.popularity
            + self.freshness * weights.freshness
            + self.community_affinity * weights.community_affinity
            + self.content_type * weights.content_type
            + self.author_reputation * weights.author_reputation
    }
}

pub fn popularity_score(post: &Post) -> f64 {
    let engagement = post.comment_count as f64 + post.view_count as f64 / 100.0;
    let raw = 2.0 * post.net_votes() as f64 + 0.5 * engagement;
    raw.clamp(0.0, MAX_SUB_SCORE)
}

/// `100 * e^(-0.05 * decay_factor * hours)`, half-life of roughly 14 hours
/// at the default factor.
pub fn freshness_score(hours_old: f64, decay_factor: f64) -> f64 {
    let lambda = BASE_DECAY_RATE * decay_factor;
    MAX_SUB_SCORE * (-lambda * hours_old.max(0.0)).exp()
}

pub fn community_affinity_score(post: &Post, snapshot: &InteractionSnapshot) -> f64 {
    if snapshot.is_subscribed(post.subreddit_id) {
        return SUBSCRIBED_AFFINITY;
    }
    match snapshot.activity_in(post.subreddit_id) {
        0 => BASE_AFFINITY,
        count => (ACTIVITY_POINTS * f64::from(count)).min(MAX_SUB_SCORE),
    }
}

pub fn content_type_score(post: &Post, snapshot: &InteractionSnapshot) -> f64 {
    if snapshot.preferred_post_types.is_empty() {
        NEUTRAL_TYPE_SCORE
    } else if snapshot.preferred_post_types.contains(&post.post_type) {
        MATCHED_TYPE_FLOOR + MATCHED_TYPE_SPAN * snapshot.type_share(post.post_type)
    } else {
        UNMATCHED_TYPE_SCORE
    }
}

pub fn author_reputation_score(author: &AuthorSummary) -> f64 {
    let karma = (author.karma as f64 / KARMA_PER_POINT).clamp(0.0, MAX_SUB_SCORE);
    let bonus = if author.verified { VERIFIED_BONUS } else { 0.0 };
    (karma + bonus).min(MAX_SUB_SCORE)
}

/// A candidate after scoring. The post is owned here so the result can be
/// cached and serialized without borrowing from the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub post: Post,
    pub score: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidates {
    pub posts: Vec<ScoredCandidate>,
    /// Candidates that survived the positivity filter, before truncation.
    pub total_candidates: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    weights: ScoringWeights,
}

impl ScoringEngine {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn factors(
        &self,
        post: &Post,
        snapshot: &InteractionSnapshot,
        decay_factor: f64,
        now: DateTime<Utc>,
    ) -> FactorScores {
        FactorScores {
            popularity: popularity_score(post),
            freshness: freshness_score(post.hours_old(now), decay_factor),
            community_affinity: community_affinity_score(post, snapshot),
            content_type: content_type_score(post, snapshot),
            author_reputation: author_reputation_score(&post.author),
        }
    }

    pub fn score(
        &self,
        post: &Post,
        snapshot: &InteractionSnapshot,
        request: &FeedRequest,
        now: DateTime<Utc>,
    ) -> (f64, Vec<String>) {
        let weighted = self
            .factors(post, snapshot, request.time_decay_factor(), now)
            .weighted(&self.weights);

        let score = if snapshot.upvoted_post_ids.contains(&post.id) {
            weighted * UPVOTED_MULTIPLIER
        } else if snapshot.downvoted_post_ids.contains(&post.id) {
            weighted * DOWNVOTED_MULTIPLIER
        } else {
            weighted
        };

        (score, explain(post, snapshot, now))
    }

    /// Scores every candidate, drops the non-positive ones and keeps the
    /// best `limit`. Equal scores keep their retrieval order.
    pub fn rank(
        &self,
        candidates: Vec<Post>,
        snapshot: &InteractionSnapshot,
        request: &FeedRequest,
        now: DateTime<Utc>,
    ) -> RankedCandidates {
        let pool_size = candidates.len();
        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .filter_map(|post| {
                let (score, reasons) = self.score(&post, snapshot, request, now);
                (score > 0.0).then_some(ScoredCandidate {
                    post,
                    score,
                    reasons,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        let total_candidates = scored.len();
        let has_more = total_candidates > request.limit();
        scored.truncate(request.limit());

        debug!(
            user_id = request.user_id(),
            pool_size,
            survivors = total_candidates,
            returned = scored.len(),
            "Ranked candidates"
        );

        RankedCandidates {
            posts: scored,
            total_candidates,
            has_more,
        }
    }
}

/// Human-readable reasons for showing `post`. Advisory only.
pub fn explain(post: &Post, snapshot: &InteractionSnapshot, now: DateTime<Utc>) -> Vec<String> {
    let mut reasons = Vec::new();

    if snapshot.is_subscribed(post.subreddit_id) {
        reasons.push(REASON_SUBSCRIBED);
    } else if snapshot.activity_in(post.subreddit_id) > 0 {
        reasons.push(REASON_ACTIVE);
    }
    if post.upvotes > POPULAR_UPVOTES {
        reasons.push(REASON_POPULAR);
    }
    if post.comment_count > TRENDING_COMMENTS {
        reasons.push(REASON_TRENDING);
    }
    if post.hours_old(now) < FRESH_HOURS {
        reasons.push(REASON_FRESH);
    }
    if snapshot.preferred_post_types.contains(&post.post_type) {
        reasons.push(REASON_PREFERENCE);
    }
    if post.author.verified {
        reasons.push(REASON_VERIFIED);
    }

    reasons.into_iter().map(str::to_string).collect()
}
