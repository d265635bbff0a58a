use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use feedrank_core::{
    AuthorSummary, CandidateQuery, DataAccessError, FeedStore, PageSpec, Post, Subreddit,
    SubredditId, User, UserId, Vote, VoteDirection,
};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::collections::HashSet;
use tracing::{debug, info};

const POST_SELECT: &str = "SELECT p.id, p.title, p.subreddit_id, s.name AS subreddit_name, \
     p.author_id, u.username AS author_username, u.karma AS author_karma, \
     u.verified AS author_verified, p.post_type, p.upvotes, p.downvotes, \
     p.comment_count, p.view_count, p.nsfw, p.created_at \
     FROM posts p \
     JOIN subreddits s ON s.id = p.subreddit_id \
     JOIN users u ON u.id = p.author_id";

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    karma: i64,
    verified: bool,
    created_at: i64,
}

#[derive(Debug, FromRow)]
struct PostRow {
    id: i64,
    title: String,
    subreddit_id: i64,
    subreddit_name: String,
    author_id: i64,
    author_username: String,
    author_karma: i64,
    author_verified: bool,
    post_type: String,
    upvotes: i64,
    downvotes: i64,
    comment_count: i64,
    view_count: i64,
    nsfw: bool,
    created_at: i64,
}

fn timestamp(table: &str, millis: i64) -> Result<DateTime<Utc>, DataAccessError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| DataAccessError::InvalidRow {
            table: table.to_string(),
            details: format!("timestamp {} out of range", millis),
        })
}

impl TryFrom<UserRow> for User {
    type Error = DataAccessError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            username: row.username,
            karma: row.karma,
            verified: row.verified,
            created_at: timestamp("users", row.created_at)?,
        })
    }
}

impl TryFrom<PostRow> for Post {
    type Error = DataAccessError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        let post_type = row
            .post_type
            .parse()
            .map_err(|details| DataAccessError::InvalidRow {
                table: "posts".to_string(),
                details,
            })?;
        Ok(Post {
            id: row.id,
            title: row.title,
            subreddit_id: row.subreddit_id,
            subreddit_name: row.subreddit_name,
            author: AuthorSummary {
                id: row.author_id,
                username: row.author_username,
                karma: row.author_karma,
                verified: row.author_verified,
            },
            post_type,
            upvotes: row.upvotes,
            downvotes: row.downvotes,
            comment_count: row.comment_count,
            view_count: row.view_count,
            nsfw: row.nsfw,
            created_at: timestamp("posts", row.created_at)?,
        })
    }
}

fn into_posts(rows: Vec<PostRow>) -> Result<Vec<Post>, DataAccessError> {
    rows.into_iter().map(Post::try_from).collect()
}

fn direction_code(direction: VoteDirection) -> i64 {
    match direction {
        VoteDirection::Up => 1,
        VoteDirection::Down => -1,
    }
}

/// `FeedStore` backed by a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, DataAccessError> {
        let options = if database_url.contains(":memory:") {
            // Every pooled connection would otherwise open its own empty database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options.connect(database_url).await.map_err(|e| {
            DataAccessError::ConnectionFailed {
                reason: e.to_string(),
            }
        })?;
        info!("Connected to feed store at {}", database_url);
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), DataAccessError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("Feed store migrations applied");
        Ok(())
    }

    pub async fn save_user(&self, user: &User) -> Result<(), DataAccessError> {
        sqlx::query(
            "INSERT INTO users (id, username, karma, verified, created_at) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET username = excluded.username, karma = excluded.karma, \
             verified = excluded.verified",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(user.karma)
        .bind(user.verified)
        .bind(user.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_subreddit(&self, subreddit: &Subreddit) -> Result<(), DataAccessError> {
        sqlx::query(
            "INSERT INTO subreddits (id, name, nsfw) VALUES (?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, nsfw = excluded.nsfw",
        )
        .bind(subreddit.id)
        .bind(&subreddit.name)
        .bind(subreddit.nsfw)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_subscription(
        &self,
        user_id: UserId,
        subreddit_id: SubredditId,
    ) -> Result<(), DataAccessError> {
        sqlx::query("INSERT OR IGNORE INTO subscriptions (user_id, subreddit_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(subreddit_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn save_post(&self, post: &Post) -> Result<(), DataAccessError> {
        sqlx::query(
            "INSERT INTO posts (id, title, subreddit_id, author_id, post_type, upvotes, downvotes, \
             comment_count, view_count, nsfw, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET title = excluded.title, upvotes = excluded.upvotes, \
             downvotes = excluded.downvotes, comment_count = excluded.comment_count, \
             view_count = excluded.view_count, nsfw = excluded.nsfw",
        )
        .bind(post.id)
        .bind(&post.title)
        .bind(post.subreddit_id)
        .bind(post.author.id)
        .bind(post.post_type.as_str())
        .bind(post.upvotes)
        .bind(post.downvotes)
        .bind(post.comment_count)
        .bind(post.view_count)
        .bind(post.nsfw)
        .bind(post.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_vote(&self, vote: &Vote) -> Result<(), DataAccessError> {
        sqlx::query(
            "INSERT INTO votes (user_id, post_id, direction) VALUES (?, ?, ?) \
             ON CONFLICT(user_id, post_id) DO UPDATE SET direction = excluded.direction",
        )
        .bind(vote.user_id)
        .bind(vote.post_id)
        .bind(direction_code(vote.direction))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl FeedStore for SqliteStore {
    async fn get_user_by_id(&self, user_id: UserId) -> Result<Option<User>, DataAccessError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, karma, verified, created_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn get_votes_by_user(&self, user_id: UserId) -> Result<Vec<Vote>, DataAccessError> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT post_id, direction FROM votes WHERE user_id = ? ORDER BY post_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(post_id, direction)| {
                let direction = match direction {
                    1 => VoteDirection::Up,
                    -1 => VoteDirection::Down,
                    other => {
                        return Err(DataAccessError::InvalidRow {
                            table: "votes".to_string(),
                            details: format!("unknown vote direction {}", other),
                        })
                    }
                };
                Ok(Vote {
                    user_id,
                    post_id,
                    direction,
                })
            })
            .collect()
    }

    async fn get_subscribed_subreddit_ids(
        &self,
        user_id: UserId,
    ) -> Result<HashSet<SubredditId>, DataAccessError> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT subreddit_id FROM subscriptions WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().collect())
    }

    async fn get_subscribed_subreddits(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Subreddit>, DataAccessError> {
        let rows: Vec<(i64, String, bool)> = sqlx::query_as(
            "SELECT s.id, s.name, s.nsfw FROM subreddits s \
             JOIN subscriptions sub ON sub.subreddit_id = s.id \
             WHERE sub.user_id = ? ORDER BY s.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, nsfw)| Subreddit { id, name, nsfw })
            .collect())
    }

    async fn get_recent_posts_by_author(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<Post>, DataAccessError> {
        let sql = format!(
            "{} WHERE p.author_id = ? ORDER BY p.created_at DESC, p.id DESC LIMIT ?",
            POST_SELECT
        );
        let rows: Vec<PostRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        into_posts(rows)
    }

    async fn get_candidate_posts(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<Post>, DataAccessError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(POST_SELECT);
        builder.push(" WHERE 1 = 1");
        if !query.include_nsfw {
            builder.push(" AND p.nsfw = 0");
        }
        if let Some(ids) = &query.subreddit_ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            builder.push(" AND p.subreddit_id IN (");
            let mut separated = builder.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
        }
        if let Some(types) = &query.post_types {
            if types.is_empty() {
                return Ok(Vec::new());
            }
            builder.push(" AND p.post_type IN (");
            let mut separated = builder.separated(", ");
            for post_type in types {
                separated.push_bind(post_type.as_str());
            }
            separated.push_unseparated(")");
        }
        builder.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ");
        builder.push_bind(query.page.limit as i64);
        builder.push(" OFFSET ");
        builder.push_bind(query.page.offset as i64);

        let rows: Vec<PostRow> = builder
            .build_query_as::<PostRow>()
            .fetch_all(&self.pool)
            .await?;
        into_posts(rows)
    }

    async fn get_popular_posts(
        &self,
        page: PageSpec,
        include_nsfw: bool,
    ) -> Result<Vec<Post>, DataAccessError> {
        let sql = format!(
            "{} WHERE (? OR p.nsfw = 0) \
             ORDER BY (p.upvotes - p.downvotes) DESC, p.created_at DESC, p.id DESC \
             LIMIT ? OFFSET ?",
            POST_SELECT
        );
        let rows: Vec<PostRow> = sqlx::query_as(&sql)
            .bind(include_nsfw)
            .bind(page.limit as i64)
            .bind(page.offset as i64)
            .fetch_all(&self.pool)
            .await?;
        into_posts(rows)
    }

    async fn get_posts_by_subreddit(
        &self,
        subreddit_id: SubredditId,
        page: PageSpec,
    ) -> Result<Vec<Post>, DataAccessError> {
        let sql = format!(
            "{} WHERE p.subreddit_id = ? ORDER BY p.created_at DESC, p.id DESC LIMIT ? OFFSET ?",
            POST_SELECT
        );
        let rows: Vec<PostRow> = sqlx::query_as(&sql)
            .bind(subreddit_id)
            .bind(page.limit as i64)
            .bind(page.offset as i64)
            .fetch_all(&self.pool)
            .await?;
        into_posts(rows)
    }
}
