//! Read-only query interface the ranking engine consumes.
//!
//! Implementations return fully materialized values; nothing here loads
//! relations lazily.

use crate::{DataAccessError, Post, PostType, Subreddit, SubredditId, User, UserId, Vote};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpec {
    pub offset: usize,
    pub limit: usize,
}

impl PageSpec {
    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }
}

/// Candidate pool query, newest posts first.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateQuery {
    pub page: PageSpec,
    /// Restrict to these communities when set.
    pub subreddit_ids: Option<HashSet<SubredditId>>,
    pub include_nsfw: bool,
    /// Restrict to these post types when set.
    pub post_types: Option<BTreeSet<PostType>>,
}

impl CandidateQuery {
    pub fn matches(&self, post: &Post) -> bool {
        if !self.include_nsfw && post.nsfw {
            return false;
        }
        if let Some(ids) = &self.subreddit_ids {
            if !ids.contains(&post.subreddit_id) {
                return false;
            }
        }
        if let Some(types) = &self.post_types {
            if !types.contains(&post.post_type) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn get_user_by_id(&self, user_id: UserId) -> Result<Option<User>, DataAccessError>;

    async fn get_votes_by_user(&self, user_id: UserId) -> Result<Vec<Vote>, DataAccessError>;

    async fn get_subscribed_subreddit_ids(
        &self,
        user_id: UserId,
    ) -> Result<HashSet<SubredditId>, DataAccessError>;

    async fn get_subscribed_subreddits(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Subreddit>, DataAccessError>;

    /// Most recent posts written by `user_id`, newest first.
    async fn get_recent_posts_by_author(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<Post>, DataAccessError>;

    async fn get_candidate_posts(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<Post>, DataAccessError>;

    /// Highest net-vote posts platform-wide.
    async fn get_popular_posts(
        &self,
        page: PageSpec,
        include_nsfw: bool,
    ) -> Result<Vec<Post>, DataAccessError>;

    /// Posts in one community, newest first.
    async fn get_posts_by_subreddit(
        &self,
        subreddit_id: SubredditId,
        page: PageSpec,
    ) -> Result<Vec<Post>, DataAccessError>;
}
