use async_trait::async_trait;
use feedrank_core::{
    CandidateQuery, DataAccessError, FeedStore, PageSpec, Post, PostId, Subreddit, SubredditId,
    User, UserId, Vote,
};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    subreddits: HashMap<SubredditId, Subreddit>,
    subscriptions: HashMap<UserId, BTreeSet<SubredditId>>,
    posts: HashMap<PostId, Post>,
    votes: HashMap<(UserId, PostId), Vote>,
}

fn newest_first<'a>(posts: impl Iterator<Item = &'a Post>) -> Vec<Post> {
    let mut posts: Vec<Post> = posts.cloned().collect();
    posts.sort_by_key(|post| (Reverse(post.created_at), Reverse(post.id)));
    posts
}

fn page_of(posts: Vec<Post>, page: PageSpec) -> Vec<Post> {
    posts.into_iter().skip(page.offset).take(page.limit).collect()
}

/// Process-local store used by tests and the demo binary.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.tables.write().await.users.insert(user.id, user);
    }

    pub async fn insert_subreddit(&self, subreddit: Subreddit) {
        self.tables
            .write()
            .await
            .subreddits
            .insert(subreddit.id, subreddit);
    }

    pub async fn subscribe(&self, user_id: UserId, subreddit_id: SubredditId) {
        self.tables
            .write()
            .await
            .subscriptions
            .entry(user_id)
            .or_default()
            .insert(subreddit_id);
    }

    pub async fn insert_post(&self, post: Post) {
        self.tables.write().await.posts.insert(post.id, post);
    }

    /// Records a vote, replacing any earlier vote by the same user on the same post.
    pub async fn cast_vote(&self, vote: Vote) {
        self.tables
            .write()
            .await
            .votes
            .insert((vote.user_id, vote.post_id), vote);
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn get_user_by_id(&self, user_id: UserId) -> Result<Option<User>, DataAccessError> {
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }

    async fn get_votes_by_user(&self, user_id: UserId) -> Result<Vec<Vote>, DataAccessError> {
        let tables = self.tables.read().await;
        let mut votes: Vec<Vote> = tables
            .votes
            .values()
            .filter(|vote| vote.user_id == user_id)
            .copied()
            .collect();
        votes.sort_by_key(|vote| vote.post_id);
        Ok(votes)
    }

    async fn get_subscribed_subreddit_ids(
        &self,
        user_id: UserId,
    ) -> Result<HashSet<SubredditId>, DataAccessError> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .get(&user_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn get_subscribed_subreddits(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Subreddit>, DataAccessError> {
        let tables = self.tables.read().await;
        let Some(ids) = tables.subscriptions.get(&user_id) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| tables.subreddits.get(id).cloned())
            .collect())
    }

    async fn get_recent_posts_by_author(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<Post>, DataAccessError> {
        let tables = self.tables.read().await;
        let posts = newest_first(
            tables
                .posts
                .values()
                .filter(|post| post.author.id == user_id),
        );
        Ok(page_of(posts, PageSpec::first(limit)))
    }

    async fn get_candidate_posts(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<Post>, DataAccessError> {
        let tables = self.tables.read().await;
        let posts = newest_first(tables.posts.values().filter(|post| query.matches(post)));
        Ok(page_of(posts, query.page))
    }

    async fn get_popular_posts(
        &self,
        page: PageSpec,
        include_nsfw: bool,
    ) -> Result<Vec<Post>, DataAccessError> {
        let tables = self.tables.read().await;
        let mut posts = newest_first(
            tables
                .posts
                .values()
                .filter(|post| include_nsfw || !post.nsfw),
        );
        // Stable sort keeps newest first among equal net votes.
        posts.sort_by_key(|post| Reverse(post.net_votes()));
        Ok(page_of(posts, page))
    }

    async fn get_posts_by_subreddit(
        &self,
        subreddit_id: SubredditId,
        page: PageSpec,
    ) -> Result<Vec<Post>, DataAccessError> {
        let tables = self.tables.read().await;
        let posts = newest_first(
            tables
                .posts
                .values()
                .filter(|post| post.subreddit_id == subreddit_id),
        );
        Ok(page_of(posts, page))
    }
}
