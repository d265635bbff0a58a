//! Small in-memory platform for running the binary without a database.

use chrono::{Duration, Utc};
use feedrank_core::{AuthorSummary, Post, PostType, Subreddit, User, Vote, VoteDirection};
use feedrank_store::MemoryStore;

const COMMUNITIES: [(i64, &str, bool); 4] = [
    (1, "rust", false),
    (2, "photography", false),
    (3, "gamedev", false),
    (4, "afterdark", true),
];

const POST_TYPES: [PostType; 5] = [
    PostType::Text,
    PostType::Link,
    PostType::Image,
    PostType::Video,
    PostType::Poll,
];

pub async fn seed() -> MemoryStore {
    let store = MemoryStore::new();
    let now = Utc::now();

    let users: Vec<User> = (1..=8)
        .map(|id| User {
            id,
            username: format!("demo_user_{}", id),
            karma: id * id * 40,
            verified: id % 3 == 0,
            created_at: now - Duration::days(30 * id),
        })
        .collect();
    for user in &users {
        store.insert_user(user.clone()).await;
    }

    for (id, name, nsfw) in COMMUNITIES {
        store
            .insert_subreddit(Subreddit {
                id,
                name: name.to_string(),
                nsfw,
            })
            .await;
    }

    // Everyone follows one or two communities.
    for user in &users {
        store.subscribe(user.id, 1 + user.id % 3).await;
        if user.id % 2 == 0 {
            store.subscribe(user.id, 1).await;
        }
    }

    for id in 1..=60_i64 {
        let author = &users[(id as usize * 5) % users.len()];
        let (subreddit_id, name, nsfw) = COMMUNITIES[(id as usize) % COMMUNITIES.len()];
        store
            .insert_post(Post {
                id,
                title: format!("{} discussion #{}", name, id),
                subreddit_id,
                subreddit_name: name.to_string(),
                author: AuthorSummary {
                    id: author.id,
                    username: author.username.clone(),
                    karma: author.karma,
                    verified: author.verified,
                },
                post_type: POST_TYPES[(id as usize) % POST_TYPES.len()],
                upvotes: (id * 37) % 250,
                downvotes: (id * 11) % 30,
                comment_count: (id * 13) % 90,
                view_count: (id * 997) % 20_000,
                nsfw,
                created_at: now - Duration::minutes(id * 47),
            })
            .await;
    }

    for (user_id, post_id, direction) in [
        (1, 3, VoteDirection::Up),
        (1, 8, VoteDirection::Down),
        (1, 12, VoteDirection::Up),
        (2, 3, VoteDirection::Up),
    ] {
        store
            .cast_vote(Vote {
                user_id,
                post_id,
                direction,
            })
            .await;
    }

    store
}
