mod demo;

use anyhow::{bail, Context, Result};
use feedrank_core::{FeedConfig, FeedStore, UserId};
use feedrank_engine::{FeedService, RawFeedRequest};
use feedrank_store::SqliteStore;
use feedrank_warmer::CacheWarmer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: feedrank [feed [USER_ID] | warm]";

enum Command {
    Feed(UserId),
    Warm,
}

fn parse_command(mut args: impl Iterator<Item = String>) -> Result<Command> {
    match args.next().as_deref() {
        None | Some("feed") => {
            let user_id = match args.next() {
                Some(raw) => raw
                    .parse()
                    .with_context(|| format!("USER_ID must be an integer, got {raw:?}"))?,
                None => 1,
            };
            Ok(Command::Feed(user_id))
        }
        Some("warm") => Ok(Command::Warm),
        Some(other) => bail!("unknown command {other:?}\n{USAGE}"),
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("feedrank=info,feedrank_engine=debug")),
        )
        .init();

    let command = parse_command(std::env::args().skip(1))?;

    let config = match std::env::var("FEEDRANK_CONFIG") {
        Ok(path) => FeedConfig::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {path}"))?,
        Err(_) => FeedConfig::default(),
    };

    let store = open_store().await?;
    let service = Arc::new(FeedService::new(store, config).context("Invalid feed configuration")?);

    match command {
        Command::Feed(user_id) => print_feed(&service, user_id).await,
        Command::Warm => warm_until_interrupted(service).await,
    }
}

async fn open_store() -> Result<Arc<dyn FeedStore>> {
    match std::env::var("FEEDRANK_DATABASE_URL") {
        Ok(url) => {
            info!(url = %url, "Opening SQLite store");
            let store = SqliteStore::connect(&url)
                .await
                .context("Failed to connect to database")?;
            store
                .run_migrations()
                .await
                .context("Failed to run migrations")?;
            Ok(Arc::new(store))
        }
        Err(_) => {
            info!("FEEDRANK_DATABASE_URL not set, using the demo platform");
            Ok(Arc::new(demo::seed().await))
        }
    }
}

async fn print_feed(service: &FeedService, user_id: UserId) -> Result<()> {
    let result = service
        .get_personalized_feed(&RawFeedRequest::for_user(user_id))
        .await
        .with_context(|| format!("Failed to build feed for user {user_id}"))?;

    info!(
        user_id,
        mode = %result.algorithm_info.mode,
        posts = result.ranked_posts.len(),
        "Feed ready"
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    println!("{}", service.metrics().export_metrics()?);
    Ok(())
}

async fn warm_until_interrupted(service: Arc<FeedService>) -> Result<()> {
    let warmer = CacheWarmer::new(Arc::clone(&service), &service.config().warmer);
    let shutdown = CancellationToken::new();
    let handle = warmer.spawn(shutdown.clone());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("Interrupt received");
    shutdown.cancel();
    handle.await.context("Cache warmer task failed")?;

    println!("{}", service.metrics().export_metrics()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> impl Iterator<Item = String> {
        items
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_parse_command() {
        assert!(matches!(parse_command(args(&[])).unwrap(), Command::Feed(1)));
        assert!(matches!(
            parse_command(args(&["feed", "7"])).unwrap(),
            Command::Feed(7)
        ));
        assert!(matches!(parse_command(args(&["warm"])).unwrap(), Command::Warm));
        assert!(parse_command(args(&["feed", "seven"])).is_err());
        assert!(parse_command(args(&["serve"])).is_err());
    }

    #[tokio::test]
    async fn test_demo_platform_produces_a_feed() {
        let service = FeedService::new(Arc::new(demo::seed().await), FeedConfig::default()).unwrap();
        let result = service
            .get_personalized_feed(&RawFeedRequest::for_user(1))
            .await
            .unwrap();
        assert!(!result.is_fallback());
        assert_eq!(result.ranked_posts.len(), 20);
        assert!(result.ranked_posts.iter().all(|p| !p.post.nsfw));
    }
}
