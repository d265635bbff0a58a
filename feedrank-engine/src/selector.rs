use crate::aggregator::InteractionSnapshot;
use crate::validator::FeedRequest;
use feedrank_core::{CandidateConfig, CandidateQuery, FeedError, FeedStore, PageSpec, Post};
use std::sync::Arc;
use tracing::debug;

/// Pulls the candidate pool the scorer ranks from.
pub struct CandidateSelector {
    store: Arc<dyn FeedStore>,
    overfetch_factor: usize,
}

impl CandidateSelector {
    pub fn new(store: Arc<dyn FeedStore>, config: &CandidateConfig) -> Self {
        Self {
            store,
            overfetch_factor: config.overfetch_factor.max(1),
        }
    }

    /// Following-only requests stay unrestricted when the user has no
    /// subscriptions, so a new user still sees something.
    pub fn candidate_query(&self, snapshot: &InteractionSnapshot, request: &FeedRequest) -> CandidateQuery {
        let restrict = request.following_only() && !snapshot.subscribed_subreddit_ids.is_empty();
        CandidateQuery {
            page: PageSpec::first(request.limit() * self.overfetch_factor),
            subreddit_ids: restrict.then(|| snapshot.subscribed_subreddit_ids.clone()),
            include_nsfw: request.include_nsfw(),
            post_types: request.post_type_filter().cloned(),
        }
    }

    pub async fn select_candidates(
        &self,
        snapshot: &InteractionSnapshot,
        request: &FeedRequest,
    ) -> Result<Vec<Post>, FeedError> {
        let query = self.candidate_query(snapshot, request);
        let candidates = self.store.get_candidate_posts(&query).await?;
        debug!(
            user_id = request.user_id(),
            pool_size = query.page.limit,
            restricted = query.subreddit_ids.is_some(),
            selected = candidates.len(),
            "Selected candidate posts"
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{validate, RawFeedRequest};
    use feedrank_core::{PostType, Subreddit};
    use feedrank_store::MemoryStore;

    fn selector() -> CandidateSelector {
        CandidateSelector::new(Arc::new(MemoryStore::new()), &CandidateConfig::default())
    }

    fn subscribed_snapshot() -> InteractionSnapshot {
        InteractionSnapshot::from_parts(
            Vec::new(),
            vec![Subreddit {
                id: 4,
                name: "rust".to_string(),
                nsfw: false,
            }],
            Vec::new(),
        )
    }

    #[test]
    fn test_pool_is_overfetched() {
        let request = validate(&RawFeedRequest {
            limit: Some(20),
            ..RawFeedRequest::for_user(1)
        })
        .unwrap();
        let query = selector().candidate_query(&InteractionSnapshot::default(), &request);
        assert_eq!(query.page, PageSpec::first(60));
        assert!(query.subreddit_ids.is_none());
        assert!(!query.include_nsfw);
    }

    #[test]
    fn test_following_only_restricts_to_subscriptions() {
        let request = validate(&RawFeedRequest {
            following_only: Some(true),
            include_nsfw: Some(true),
            post_type_filter: Some(vec!["poll".to_string()]),
            ..RawFeedRequest::for_user(1)
        })
        .unwrap();
        let query = selector().candidate_query(&subscribed_snapshot(), &request);
        assert_eq!(query.subreddit_ids.unwrap().into_iter().collect::<Vec<_>>(), vec![4]);
        assert!(query.include_nsfw);
        assert!(query.post_types.unwrap().contains(&PostType::Poll));
    }

    #[test]
    fn test_following_only_without_subscriptions_is_unrestricted() {
        let request = validate(&RawFeedRequest {
            following_only: Some(true),
            ..RawFeedRequest::for_user(1)
        })
        .unwrap();
        let query = selector().candidate_query(&InteractionSnapshot::default(), &request);
        assert!(query.subreddit_ids.is_none());
    }

    #[test]
    fn test_subscriptions_ignored_without_following_only() {
        let request = validate(&RawFeedRequest::for_user(1)).unwrap();
        let query = selector().candidate_query(&subscribed_snapshot(), &request);
        assert!(query.subreddit_ids.is_none());
    }
}
