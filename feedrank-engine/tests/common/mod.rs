#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use feedrank_core::{
    CandidateQuery, DataAccessError, FeedConfig, FeedStore, PageSpec, Post, PostType, Subreddit,
    SubredditId, User, UserId, Vote, VoteDirection,
};
use feedrank_store::MemoryStore;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

pub const ALWAYS: u32 = u32::MAX;

pub fn user(id: UserId, karma: i64, verified: bool) -> User {
    User {
        id,
        username: format!("user{}", id),
        karma,
        verified,
        created_at: Utc::now() - Duration::days(90),
    }
}

pub fn community(id: SubredditId, name: &str) -> Subreddit {
    Subreddit {
        id,
        name: name.to_string(),
        nsfw: false,
    }
}

pub fn post(id: i64, author: &User, community: &Subreddit, minutes_ago: i64) -> Post {
    Post {
        id,
        title: format!("post {}", id),
        subreddit_id: community.id,
        subreddit_name: community.name.clone(),
        author: author.summary(),
        post_type: PostType::Text,
        upvotes: 10,
        downvotes: 0,
        comment_count: 4,
        view_count: 200,
        nsfw: community.nsfw,
        created_at: Utc::now() - Duration::minutes(minutes_ago),
    }
}

pub fn upvote(user_id: UserId, post_id: i64) -> Vote {
    Vote {
        user_id,
        post_id,
        direction: VoteDirection::Up,
    }
}

/// Default configuration with millisecond backoff so retries stay fast.
pub fn fast_config() -> FeedConfig {
    let mut config = FeedConfig::default();
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config
}

/// Reader 1 with no history, plus 60 fresh posts from 60 brand-new authors.
pub async fn fresh_platform() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_user(user(1, 0, false)).await;
    let general = community(10, "general");
    store.insert_subreddit(general.clone()).await;
    for i in 0..60 {
        let author = user(100 + i, 0, false);
        store.insert_user(author.clone()).await;
        let mut p = post(1_000 + i, &author, &general, i);
        p.upvotes = 5 + (i * 7) % 40;
        store.insert_post(p).await;
    }
    store
}

/// Counts down `counter` and reports whether this call should fail.
fn should_fail(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| match remaining {
            0 => None,
            ALWAYS => Some(ALWAYS),
            n => Some(n - 1),
        })
        .is_ok()
}

fn unavailable(source_name: &str) -> DataAccessError {
    DataAccessError::Unavailable {
        source_name: source_name.to_string(),
    }
}

#[derive(Default)]
pub struct Faults {
    pub vote_failures: AtomicU32,
    pub candidate_failures: AtomicU32,
    pub popular_failures: AtomicU32,
    pub vote_delay_ms: AtomicU64,
    pub candidate_delay_ms: AtomicU64,
    pub community_delay_ms: AtomicU64,
    pub vote_reads: AtomicU32,
    pub candidate_reads: AtomicU32,
    pub community_reads: AtomicU32,
    pub author_reads: AtomicU32,
}

impl Faults {
    pub fn clear(&self) {
        self.vote_failures.store(0, Ordering::SeqCst);
        self.candidate_failures.store(0, Ordering::SeqCst);
        self.popular_failures.store(0, Ordering::SeqCst);
        self.vote_delay_ms.store(0, Ordering::SeqCst);
        self.candidate_delay_ms.store(0, Ordering::SeqCst);
        self.community_delay_ms.store(0, Ordering::SeqCst);
    }
}

/// `FeedStore` that delegates to a `MemoryStore` and injects failures and
/// latency on demand.
pub struct FlakyStore {
    inner: MemoryStore,
    pub faults: Faults,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            faults: Faults::default(),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

async fn pause(delay_ms: &AtomicU64) {
    let ms = delay_ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl FeedStore for FlakyStore {
    async fn get_user_by_id(&self, user_id: UserId) -> Result<Option<User>, DataAccessError> {
        self.inner.get_user_by_id(user_id).await
    }

    async fn get_votes_by_user(&self, user_id: UserId) -> Result<Vec<Vote>, DataAccessError> {
        self.faults.vote_reads.fetch_add(1, Ordering::SeqCst);
        pause(&self.faults.vote_delay_ms).await;
        if should_fail(&self.faults.vote_failures) {
            return Err(unavailable("votes"));
        }
        self.inner.get_votes_by_user(user_id).await
    }

    async fn get_subscribed_subreddit_ids(
        &self,
        user_id: UserId,
    ) -> Result<HashSet<SubredditId>, DataAccessError> {
        self.faults.author_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_subscribed_subreddit_ids(user_id).await
    }

    async fn get_subscribed_subreddits(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Subreddit>, DataAccessError> {
        self.inner.get_subscribed_subreddits(user_id).await
    }

    async fn get_recent_posts_by_author(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<Post>, DataAccessError> {
        self.inner.get_recent_posts_by_author(user_id, limit).await
    }

    async fn get_candidate_posts(&self, query: &CandidateQuery) -> Result<Vec<Post>, DataAccessError> {
        self.faults.candidate_reads.fetch_add(1, Ordering::SeqCst);
        pause(&self.faults.candidate_delay_ms).await;
        if should_fail(&self.faults.candidate_failures) {
            return Err(unavailable("candidates"));
        }
        self.inner.get_candidate_posts(query).await
    }

    async fn get_popular_posts(
        &self,
        page: PageSpec,
        include_nsfw: bool,
    ) -> Result<Vec<Post>, DataAccessError> {
        if should_fail(&self.faults.popular_failures) {
            return Err(unavailable("popular"));
        }
        self.inner.get_popular_posts(page, include_nsfw).await
    }

    async fn get_posts_by_subreddit(
        &self,
        subreddit_id: SubredditId,
        page: PageSpec,
    ) -> Result<Vec<Post>, DataAccessError> {
        self.faults.community_reads.fetch_add(1, Ordering::SeqCst);
        pause(&self.faults.community_delay_ms).await;
        self.inner.get_posts_by_subreddit(subreddit_id, page).await
    }
}
