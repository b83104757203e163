use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use newswire::config::Config;
use newswire::feed::{FeedClient, FeedStore, FetchState};
use newswire::AssetCache;

#[derive(Parser, Debug)]
#[command(name = "newswire")]
#[command(about = "Fetch and cache a news feed")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/newswire/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Discard the cached snapshot and re-fetch
  #[arg(long)]
  refresh: bool,

  /// Warm the image cache for every fetched article
  #[arg(long)]
  prefetch_images: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let api_key = Config::get_api_key()?;

  let store = FeedStore::new(
    FeedClient::new(&config.feed, &api_key)?,
    config.feed.ttl(),
  );
  let mut events = store.subscribe();

  if args.refresh {
    store.refresh()?;
  } else {
    store.load_if_needed()?;
  }

  // Wait for the load to resolve; a swallowed failure still lands on Ready
  // with an empty snapshot.
  let snapshot = loop {
    let event = events.recv().await?;
    match event.state {
      FetchState::Loading => info!("loading feed"),
      FetchState::Idle | FetchState::Ready => break event.snapshot,
    }
  };

  for article in &snapshot.articles {
    println!("{}  {}", article.published_display(), article.title);
    println!("    {}", article.details);
  }
  info!(
    articles = snapshot.articles.len(),
    expires_at = %snapshot.expires_at,
    "feed ready"
  );

  if args.prefetch_images {
    let cache = AssetCache::new(config.cache.image_dir()?, config.feed.timeout())?;
    let urls: Vec<&str> = snapshot
      .articles
      .iter()
      .map(|a| a.image_url.as_str())
      .filter(|u| !u.is_empty())
      .collect();

    info!(count = urls.len(), "prefetching article images");
    cache.prefetch(&urls).await;
  }

  Ok(())
}
