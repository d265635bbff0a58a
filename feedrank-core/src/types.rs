use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type UserId = i64;
pub type PostId = i64;
pub type SubredditId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Text,
    Link,
    Image,
    Video,
    Poll,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Text => "text",
            PostType::Link => "link",
            PostType::Image => "image",
            PostType::Video => "video",
            PostType::Poll => "poll",
        }
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(PostType::Text),
            "link" => Ok(PostType::Link),
            "image" => Ok(PostType::Image),
            "video" => Ok(PostType::Video),
            "poll" => Ok(PostType::Poll),
            other => Err(format!("unknown post type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

/// Author fields a post carries so ranking never has to load the full account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: UserId,
    pub username: String,
    pub karma: i64,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub karma: i64,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn summary(&self) -> AuthorSummary {
        AuthorSummary {
            id: self.id,
            username: self.username.clone(),
            karma: self.karma,
            verified: self.verified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subreddit {
    pub id: SubredditId,
    pub name: String,
    pub nsfw: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub user_id: UserId,
    pub post_id: PostId,
    pub direction: VoteDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub subreddit_id: SubredditId,
    pub subreddit_name: String,
    pub author: AuthorSummary,
    pub post_type: PostType,
    pub upvotes: i64,
    pub downvotes: i64,
    pub comment_count: i64,
    pub view_count: i64,
    pub nsfw: bool,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn net_votes(&self) -> i64 {
        self.upvotes - self.downvotes
    }

    /// Fractional hours between creation and `now`, never negative.
    pub fn hours_old(&self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.created_at).num_milliseconds().max(0);
        millis as f64 / 3_600_000.0
    }
}
