//! Builds the per-request interaction snapshot from three concurrent reads.

use feedrank_core::{
    AggregationConfig, DataAccessError, FeedError, FeedStore, Post, PostId, PostType, Subreddit,
    SubredditId, UserId, Vote, VoteDirection,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Read-only view of a user's history, built once per request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionSnapshot {
    pub upvoted_post_ids: HashSet<PostId>,
    pub downvoted_post_ids: HashSet<PostId>,
    pub subscribed_subreddit_ids: HashSet<SubredditId>,
    pub subscribed_subreddits: Vec<Subreddit>,
    pub preferred_post_types: HashSet<PostType>,
    pub post_type_counts: HashMap<PostType, u32>,
    /// One point per recent post the user wrote in the community.
    pub subreddit_activity_score: HashMap<SubredditId, u32>,
    pub recent_user_posts: Vec<Post>,
}

impl InteractionSnapshot {
    pub fn from_parts(votes: Vec<Vote>, subscriptions: Vec<Subreddit>, history: Vec<Post>) -> Self {
        let mut snapshot = InteractionSnapshot::default();

        for vote in votes {
            match vote.direction {
                VoteDirection::Up => snapshot.upvoted_post_ids.insert(vote.post_id),
                VoteDirection::Down => snapshot.downvoted_post_ids.insert(vote.post_id),
            };
        }

        snapshot.subscribed_subreddit_ids = subscriptions.iter().map(|s| s.id).collect();
        snapshot.subscribed_subreddits = subscriptions;

        for post in &history {
            *snapshot
                .subreddit_activity_score
                .entry(post.subreddit_id)
                .or_insert(0) += 1;
            *snapshot.post_type_counts.entry(post.post_type).or_insert(0) += 1;
            snapshot.preferred_post_types.insert(post.post_type);
        }
        snapshot.recent_user_posts = history;

        snapshot
    }

    pub fn activity_in(&self, subreddit_id: SubredditId) -> u32 {
        self.subreddit_activity_score
            .get(&subreddit_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn is_subscribed(&self, subreddit_id: SubredditId) -> bool {
        self.subscribed_subreddit_ids.contains(&subreddit_id)
    }

    /// Fraction of the user's recent posts that have `post_type`.
    pub fn type_share(&self, post_type: PostType) -> f64 {
        let total: u32 = self.post_type_counts.values().sum();
        if total == 0 {
            return 0.0;
        }
        f64::from(self.post_type_counts.get(&post_type).copied().unwrap_or(0)) / f64::from(total)
    }
}

enum Fragment {
    Votes(Vec<Vote>),
    Subscriptions(Vec<Subreddit>),
    History(Vec<Post>),
}

pub struct InteractionAggregator {
    store: Arc<dyn FeedStore>,
    deadline: Duration,
    history_limit: usize,
}

impl InteractionAggregator {
    pub fn new(store: Arc<dyn FeedStore>, config: &AggregationConfig) -> Self {
        Self {
            store,
            deadline: config.deadline(),
            history_limit: config.history_limit,
        }
    }

    /// Fails with `NotFound` for unknown users and `Timeout` when the shared
    /// deadline passes; there is never a partial snapshot.
    pub async fn aggregate(&self, user_id: UserId) -> Result<InteractionSnapshot, FeedError> {
        match timeout(self.deadline, self.gather(user_id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    user_id,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "Interaction aggregation exceeded its deadline"
                );
                Err(FeedError::Timeout {
                    operation: "aggregate interactions".to_string(),
                    millis: self.deadline.as_millis() as u64,
                })
            }
        }
    }

    async fn gather(&self, user_id: UserId) -> Result<InteractionSnapshot, FeedError> {
        if self.store.get_user_by_id(user_id).await?.is_none() {
            return Err(FeedError::not_found(format!("user {}", user_id)));
        }

        // Dropping the set on an early return aborts the reads still in flight.
        let mut tasks = JoinSet::new();

        let store = Arc::clone(&self.store);
        tasks.spawn(async move { store.get_votes_by_user(user_id).await.map(Fragment::Votes) });

        let store = Arc::clone(&self.store);
        tasks.spawn(async move {
            store
                .get_subscribed_subreddits(user_id)
                .await
                .map(Fragment::Subscriptions)
        });

        let store = Arc::clone(&self.store);
        let history_limit = self.history_limit;
        tasks.spawn(async move {
            store
                .get_recent_posts_by_author(user_id, history_limit)
                .await
                .map(Fragment::History)
        });

        let mut votes = Vec::new();
        let mut subscriptions = Vec::new();
        let mut history = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let fragment = match joined {
                Ok(Ok(fragment)) => fragment,
                Ok(Err(error)) => {
                    tasks.abort_all();
                    debug!(user_id, "Interaction read failed: {}", error);
                    return Err(error.into());
                }
                Err(join_error) => {
                    tasks.abort_all();
                    return Err(DataAccessError::TaskFailed {
                        reason: join_error.to_string(),
                    }
                    .into());
                }
            };
            match fragment {
                Fragment::Votes(v) => votes = v,
                Fragment::Subscriptions(s) => subscriptions = s,
                Fragment::History(h) => history = h,
            }
        }

        let snapshot = InteractionSnapshot::from_parts(votes, subscriptions, history);
        debug!(
            user_id,
            upvoted = snapshot.upvoted_post_ids.len(),
            downvoted = snapshot.downvoted_post_ids.len(),
            subscriptions = snapshot.subscribed_subreddit_ids.len(),
            recent_posts = snapshot.recent_user_posts.len(),
            "Interaction snapshot built"
        );
        Ok(snapshot)
    }
}
