//! Feed request normalization.

use feedrank_core::{FeedError, PostType, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const DEFAULT_LIMIT: u32 = 20;
pub const MIN_LIMIT: i64 = 1;
pub const MAX_LIMIT: i64 = 100;
pub const DEFAULT_DECAY_FACTOR: f64 = 1.0;
pub const MIN_DECAY_FACTOR: f64 = 0.1;
pub const MAX_DECAY_FACTOR: f64 = 5.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Algorithm,
    Hot,
    New,
    Top,
    Discover,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Algorithm => "algorithm",
            SortMode::Hot => "hot",
            SortMode::New => "new",
            SortMode::Top => "top",
            SortMode::Discover => "discover",
        }
    }

    /// Unrecognized modes fall back to the default ranking.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("hot") => SortMode::Hot,
            Some("new") => SortMode::New,
            Some("top") => SortMode::Top,
            Some("discover") => SortMode::Discover,
            _ => SortMode::Algorithm,
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated feed request as received from the request-handling layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawFeedRequest {
    pub user_id: Option<UserId>,
    pub limit: Option<i64>,
    pub sort_mode: Option<String>,
    pub post_type_filter: Option<Vec<String>>,
    pub include_nsfw: Option<bool>,
    pub following_only: Option<bool>,
    pub time_decay_factor: Option<f64>,
}

impl RawFeedRequest {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }
}

/// A normalized feed request. Only `validate` constructs one, so `limit` and
/// `time_decay_factor` are always inside their documented ranges.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRequest {
    user_id: UserId,
    limit: u32,
    sort_mode: SortMode,
    post_type_filter: Option<BTreeSet<PostType>>,
    include_nsfw: bool,
    following_only: bool,
    time_decay_factor: f64,
}

impl FeedRequest {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn limit(&self) -> usize {
        self.limit as usize
    }

    pub fn sort_mode(&self) -> SortMode {
        self.sort_mode
    }

    pub fn post_type_filter(&self) -> Option<&BTreeSet<PostType>> {
        self.post_type_filter.as_ref()
    }

    pub fn include_nsfw(&self) -> bool {
        self.include_nsfw
    }

    pub fn following_only(&self) -> bool {
        self.following_only
    }

    pub fn time_decay_factor(&self) -> f64 {
        self.time_decay_factor
    }
}

impl From<&FeedRequest> for RawFeedRequest {
    fn from(request: &FeedRequest) -> Self {
        RawFeedRequest {
            user_id: Some(request.user_id),
            limit: Some(i64::from(request.limit)),
            sort_mode: Some(request.sort_mode.as_str().to_string()),
            post_type_filter: request
                .post_type_filter
                .as_ref()
                .map(|types| types.iter().map(|t| t.as_str().to_string()).collect()),
            include_nsfw: Some(request.include_nsfw),
            following_only: Some(request.following_only),
            time_decay_factor: Some(request.time_decay_factor),
        }
    }
}

pub fn validate(raw: &RawFeedRequest) -> Result<FeedRequest, FeedError> {
    let user_id = raw
        .user_id
        .ok_or_else(|| FeedError::invalid_argument("userId", "is required"))?;

    let limit = match raw.limit {
        None => DEFAULT_LIMIT,
        Some(limit) if (MIN_LIMIT..=MAX_LIMIT).contains(&limit) => limit as u32,
        Some(limit) => {
            return Err(FeedError::invalid_argument(
                "limit",
                format!(
                    "{} is outside [{}, {}]",
                    limit, MIN_LIMIT, MAX_LIMIT
                ),
            ))
        }
    };

    let time_decay_factor = match raw.time_decay_factor {
        None => DEFAULT_DECAY_FACTOR,
        // NaN fails the range check too.
        Some(factor) if (MIN_DECAY_FACTOR..=MAX_DECAY_FACTOR).contains(&factor) => factor,
        Some(factor) => {
            return Err(FeedError::invalid_argument(
                "timeDecayFactor",
                format!(
                    "{} is outside [{}, {}]",
                    factor, MIN_DECAY_FACTOR, MAX_DECAY_FACTOR
                ),
            ))
        }
    };

    let post_type_filter = match &raw.post_type_filter {
        Some(names) if !names.is_empty() => {
            let types = names
                .iter()
                .map(|name| {
                    name.parse::<PostType>()
                        .map_err(|message| FeedError::invalid_argument("postTypeFilter", message))
                })
                .collect::<Result<BTreeSet<_>, _>>()?;
            Some(types)
        }
        _ => None,
    };

    Ok(FeedRequest {
        user_id,
        limit,
        sort_mode: SortMode::parse_lenient(raw.sort_mode.as_deref()),
        post_type_filter,
        include_nsfw: raw.include_nsfw.unwrap_or(false),
        following_only: raw.following_only.unwrap_or(false),
        time_decay_factor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invalid(raw: RawFeedRequest, expected_field: &str) {
        match validate(&raw) {
            Err(FeedError::InvalidArgument { field, .. }) => assert_eq!(field, expected_field),
            other => panic!("expected InvalidArgument for {}, got {:?}", expected_field, other),
        }
    }

    #[test]
    fn test_defaults_applied() {
        let request = validate(&RawFeedRequest::for_user(7)).unwrap();
        assert_eq!(request.user_id(), 7);
        assert_eq!(request.limit(), 20);
        assert_eq!(request.sort_mode(), SortMode::Algorithm);
        assert_eq!(request.time_decay_factor(), 1.0);
        assert!(!request.include_nsfw());
        assert!(!request.following_only());
        assert!(request.post_type_filter().is_none());
    }

    #[test]
    fn test_missing_user_rejected() {
        assert_invalid(RawFeedRequest::default(), "userId");
    }

    #[test]
    fn test_limit_bounds() {
        for limit in [0, -5, 101, 1_000] {
            assert_invalid(
                RawFeedRequest {
                    limit: Some(limit),
                    ..RawFeedRequest::for_user(1)
                },
                "limit",
            );
        }
        for limit in [1, 55, 100] {
            let request = validate(&RawFeedRequest {
                limit: Some(limit),
                ..RawFeedRequest::for_user(1)
            })
            .unwrap();
            assert_eq!(request.limit() as i64, limit);
        }
    }

    #[test]
    fn test_decay_factor_bounds() {
        for factor in [0.0, 0.09, 5.01, -1.0, f64::NAN, f64::INFINITY] {
            assert_invalid(
                RawFeedRequest {
                    time_decay_factor: Some(factor),
                    ..RawFeedRequest::for_user(1)
                },
                "timeDecayFactor",
            );
        }
        let request = validate(&RawFeedRequest {
            time_decay_factor: Some(0.1),
            ..RawFeedRequest::for_user(1)
        })
        .unwrap();
        assert_eq!(request.time_decay_factor(), 0.1);
    }

    #[test]
    fn test_sort_mode_is_lenient() {
        let cases = [
            (None, SortMode::Algorithm),
            (Some("NEW"), SortMode::New),
            (Some("hot"), SortMode::Hot),
            (Some("discover"), SortMode::Discover),
            (Some("sideways"), SortMode::Algorithm),
        ];
        for (input, expected) in cases {
            let request = validate(&RawFeedRequest {
                sort_mode: input.map(str::to_string),
                ..RawFeedRequest::for_user(1)
            })
            .unwrap();
            assert_eq!(request.sort_mode(), expected);
        }
    }

    #[test]
    fn test_post_type_filter() {
        let request = validate(&RawFeedRequest {
            post_type_filter: Some(vec!["video".into(), "Image".into(), "video".into()]),
            ..RawFeedRequest::for_user(1)
        })
        .unwrap();
        let types = request.post_type_filter().unwrap();
        assert_eq!(types.len(), 2);
        assert!(types.contains(&PostType::Video));

        let request = validate(&RawFeedRequest {
            post_type_filter: Some(Vec::new()),
            ..RawFeedRequest::for_user(1)
        })
        .unwrap();
        assert!(request.post_type_filter().is_none());

        assert_invalid(
            RawFeedRequest {
                post_type_filter: Some(vec!["hologram".into()]),
                ..RawFeedRequest::for_user(1)
            },
            "postTypeFilter",
        );
    }

    #[test]
    fn test_revalidation_is_a_no_op() {
        let raw = RawFeedRequest {
            user_id: Some(3),
            limit: Some(42),
            sort_mode: Some("Top".to_string()),
            post_type_filter: Some(vec!["link".into()]),
            include_nsfw: Some(true),
            following_only: Some(true),
            time_decay_factor: Some(2.5),
        };
        let first = validate(&raw).unwrap();
        let second = validate(&RawFeedRequest::from(&first)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_raw_request_deserializes_camel_case() {
        let raw: RawFeedRequest = serde_json::from_str(
            r#"{"userId": 9, "limit": 5, "sortMode": "hot", "followingOnly": true}"#,
        )
        .unwrap();
        let request = validate(&raw).unwrap();
        assert_eq!(request.user_id(), 9);
        assert_eq!(request.limit(), 5);
        assert!(request.following_only());
    }
}
