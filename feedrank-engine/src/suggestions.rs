use crate::aggregator::InteractionSnapshot;
use feedrank_core::{
    AuthorSummary, DataAccessError, FeedError, FeedStore, PageSpec, SubredditId, SuggestionConfig,
    UserId,
};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

const MUTUAL_COMMUNITY_POINTS: f64 = 20.0;
const HIGH_KARMA: i64 = 1_000;
const HIGH_KARMA_POINTS: f64 = 30.0;
const VERIFIED_POINTS: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedAccount {
    pub account: AuthorSummary,
    pub relevance_score: f64,
    pub mutual_community_count: usize,
    pub common_interests: Vec<String>,
    pub reasons: Vec<String>,
}

/// An author discovered through the user's communities, with their own
/// subscriptions loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountCandidate {
    pub account: AuthorSummary,
    pub subscribed_subreddit_ids: HashSet<SubredditId>,
}

pub struct AccountRanker {
    store: Arc<dyn FeedStore>,
    config: SuggestionConfig,
}

impl AccountRanker {
    pub fn new(store: Arc<dyn FeedStore>, config: SuggestionConfig) -> Self {
        Self { store, config }
    }

    pub async fn suggest_accounts(
        &self,
        snapshot: &InteractionSnapshot,
        user_id: UserId,
    ) -> Result<Vec<SuggestedAccount>, FeedError> {
        let candidates = self.discover(snapshot, user_id).await?;
        let suggestions = rank_accounts(candidates, snapshot, &self.config);
        debug!(user_id, suggested = suggestions.len(), "Ranked suggested accounts");
        Ok(suggestions)
    }

    /// Authors of recent posts in the communities the user is active in,
    /// most active community first, capped at `max_candidates` authors.
    pub async fn discover(
        &self,
        snapshot: &InteractionSnapshot,
        user_id: UserId,
    ) -> Result<Vec<AccountCandidate>, FeedError> {
        let mut communities: Vec<(SubredditId, u32)> = snapshot
            .subreddit_activity_score
            .iter()
            .map(|(&id, &count)| (id, count))
            .collect();
        communities.sort_by_key(|&(id, count)| (Reverse(count), id));

        let cap = self.config.max_candidates;
        let mut seen = HashSet::from([user_id]);
        let mut author_ids = Vec::new();
        for (subreddit_id, _) in communities {
            if author_ids.len() >= cap {
                break;
            }
            let posts = self
                .store
                .get_posts_by_subreddit(subreddit_id, PageSpec::first(self.config.posts_per_community))
                .await?;
            for post in posts {
                if author_ids.len() >= cap {
                    break;
                }
                if seen.insert(post.author.id) {
                    author_ids.push(post.author.id);
                }
            }
        }

        self.load_candidates(author_ids).await
    }

    /// Loads every author and their subscriptions concurrently, keeping
    /// discovery order.
    async fn load_candidates(&self, author_ids: Vec<UserId>) -> Result<Vec<AccountCandidate>, FeedError> {
        // Dropping the set on an early return aborts the reads still in flight.
        let mut tasks = JoinSet::new();
        for (index, author_id) in author_ids.into_iter().enumerate() {
            let store = Arc::clone(&self.store);
            tasks.spawn(async move {
                let (user, subscribed_subreddit_ids) = tokio::try_join!(
                    store.get_user_by_id(author_id),
                    store.get_subscribed_subreddit_ids(author_id),
                )?;
                // Accounts deleted since they posted are skipped.
                let candidate = user.map(|user| AccountCandidate {
                    account: user.summary(),
                    subscribed_subreddit_ids,
                });
                Ok::<_, DataAccessError>((index, candidate))
            });
        }

        let mut loaded = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((index, Some(candidate)))) => loaded.push((index, candidate)),
                Ok(Ok((_, None))) => {}
                Ok(Err(error)) => {
                    tasks.abort_all();
                    debug!("Author lookup failed: {}", error);
                    return Err(error.into());
                }
                Err(join_error) => {
                    tasks.abort_all();
                    return Err(DataAccessError::TaskFailed {
                        reason: join_error.to_string(),
                    }
                    .into());
                }
            }
        }

        loaded.sort_by_key(|&(index, _)| index);
        Ok(loaded.into_iter().map(|(_, candidate)| candidate).collect())
    }
}

pub fn rank_accounts(
    candidates: Vec<AccountCandidate>,
    snapshot: &InteractionSnapshot,
    config: &SuggestionConfig,
) -> Vec<SuggestedAccount> {
    let mut suggestions: Vec<SuggestedAccount> = candidates
        .into_iter()
        .map(|candidate| suggest(candidate, snapshot, config.max_common_interests))
        .collect();
    suggestions.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    suggestions.truncate(config.max_suggestions);
    suggestions
}

fn suggest(
    candidate: AccountCandidate,
    snapshot: &InteractionSnapshot,
    max_common_interests: usize,
) -> SuggestedAccount {
    let mut common: Vec<&str> = snapshot
        .subscribed_subreddits
        .iter()
        .filter(|s| candidate.subscribed_subreddit_ids.contains(&s.id))
        .map(|s| s.name.as_str())
        .collect();
    common.sort_unstable();
    let mutual_community_count = common.len();

    let account = candidate.account;
    let mut relevance_score = MUTUAL_COMMUNITY_POINTS * mutual_community_count as f64;
    let mut reasons = Vec::new();

    match mutual_community_count {
        0 => {}
        1 => reasons.push("1 mutual community".to_string()),
        n => reasons.push(format!("{} mutual communities", n)),
    }
    if account.karma > HIGH_KARMA {
        relevance_score += HIGH_KARMA_POINTS;
        reasons.push("Highly rated contributor".to_string());
    }
    if account.verified {
        relevance_score += VERIFIED_POINTS;
        reasons.push("Verified account".to_string());
    }

    SuggestedAccount {
        account,
        relevance_score,
        mutual_community_count,
        common_interests: common
            .into_iter()
            .take(max_common_interests)
            .map(str::to_string)
            .collect(),
        reasons,
    }
}
