//! TTL-bounded store for the remote article list.

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::client::FeedClient;
use super::types::{Article, Snapshot};

/// Lifecycle of the store's remote fetch.
///
/// `Idle` only before the first fetch has ever completed; `Loading` always
/// resolves to `Ready`, success or swallowed failure alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
  Idle,
  Loading,
  Ready,
}

/// One state/snapshot transition, delivered to every subscriber.
#[derive(Debug, Clone)]
pub struct FeedEvent {
  pub state: FetchState,
  pub snapshot: Arc<Snapshot>,
}

/// Mutable state, guarded by one mutex so fetch completions cannot race
/// with new fetch requests or reads.
struct Inner {
  snapshot: Arc<Snapshot>,
  state: FetchState,
  /// Bumped on every fetch start. A completion whose token no longer
  /// matches is stale and must not touch the snapshot.
  generation: u64,
  in_flight: Option<JoinHandle<()>>,
}

struct Shared {
  client: FeedClient,
  ttl: Duration,
  inner: Mutex<Inner>,
  events: broadcast::Sender<FeedEvent>,
}

/// Store for the remote article list with a bounded validity window.
///
/// Owns exactly one live [`Snapshot`] and one [`FetchState`]. Consumers
/// subscribe for transition events and read the snapshot synchronously at
/// any time. At most one fetch is in flight; starting a new one aborts and
/// supersedes the old one.
///
/// Failures are recovered locally: a transport or decode error produces an
/// empty but fresh snapshot and a `Ready` state, never an error event.
#[derive(Clone)]
pub struct FeedStore {
  shared: Arc<Shared>,
}

/// Transition events buffered per subscriber before the oldest is dropped.
const EVENT_CAPACITY: usize = 64;

impl FeedStore {
  pub fn new(client: FeedClient, ttl: Duration) -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);

    Self {
      shared: Arc::new(Shared {
        client,
        ttl,
        inner: Mutex::new(Inner {
          snapshot: Arc::new(Snapshot::empty()),
          state: FetchState::Idle,
          generation: 0,
          in_flight: None,
        }),
        events,
      }),
    }
  }

  /// Subscribe to state transitions.
  ///
  /// Events arrive in the order the transitions occurred. Dropping the
  /// receiver unsubscribes.
  pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
    self.shared.events.subscribe()
  }

  /// Current snapshot.
  pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
    let inner = self.lock_inner()?;
    Ok(Arc::clone(&inner.snapshot))
  }

  /// Current fetch state.
  pub fn state(&self) -> Result<FetchState> {
    let inner = self.lock_inner()?;
    Ok(inner.state)
  }

  /// Fetch the article list unless the current snapshot is still valid.
  ///
  /// With a valid snapshot this notifies subscribers of the current state
  /// and returns without network activity. Otherwise it aborts any fetch
  /// already in flight, transitions to `Loading` (notifying subscribers so
  /// they can show an indicator), and starts one asynchronous fetch.
  pub fn load_if_needed(&self) -> Result<()> {
    let mut inner = self.lock_inner()?;

    if !inner.snapshot.is_expired() {
      let _ = self.shared.events.send(FeedEvent {
        state: inner.state,
        snapshot: Arc::clone(&inner.snapshot),
      });
      return Ok(());
    }

    if let Some(task) = inner.in_flight.take() {
      debug!("superseding in-flight feed fetch");
      task.abort();
    }

    inner.generation += 1;
    let generation = inner.generation;
    inner.state = FetchState::Loading;
    let _ = self.shared.events.send(FeedEvent {
      state: FetchState::Loading,
      snapshot: Arc::clone(&inner.snapshot),
    });

    let store = self.clone();
    inner.in_flight = Some(tokio::spawn(async move {
      let articles = match store.shared.client.fetch_articles().await {
        Ok(articles) => articles,
        Err(e) => {
          // Recover locally: an empty but fresh snapshot, not an error.
          warn!("feed fetch failed, serving empty snapshot: {}", e);
          Vec::new()
        }
      };
      store.complete_fetch(generation, articles);
    }));

    Ok(())
  }

  /// Replace the snapshot with the empty, already-expired one.
  ///
  /// Does not touch the fetch state or an in-flight fetch; the next
  /// `load_if_needed()` call will re-fetch.
  pub fn invalidate(&self) -> Result<()> {
    let mut inner = self.lock_inner()?;
    inner.snapshot = Arc::new(Snapshot::empty());
    Ok(())
  }

  /// Force a re-fetch regardless of expiry: invalidate, then load.
  pub fn refresh(&self) -> Result<()> {
    self.invalidate()?;
    self.load_if_needed()
  }

  /// Publish the result of a fetch, unless it has been superseded.
  fn complete_fetch(&self, generation: u64, articles: Vec<Article>) {
    let mut inner = match self.lock_inner() {
      Ok(inner) => inner,
      Err(e) => {
        warn!("discarding fetch result: {}", e);
        return;
      }
    };

    if generation != inner.generation {
      debug!("discarding superseded fetch result");
      return;
    }

    let snapshot = Arc::new(Snapshot {
      articles,
      expires_at: Utc::now() + self.shared.ttl,
    });

    inner.snapshot = Arc::clone(&snapshot);
    inner.state = FetchState::Ready;
    inner.in_flight = None;

    let _ = self.shared.events.send(FeedEvent {
      state: FetchState::Ready,
      snapshot,
    });
  }

  fn lock_inner(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
    self
      .shared
      .inner
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::FeedConfig;
  use chrono::TimeZone;
  use httpmock::prelude::*;
  use serde_json::json;

  fn store_for(server: &MockServer, ttl: Duration) -> FeedStore {
    let config = FeedConfig {
      base_url: server.base_url(),
      ..FeedConfig::default()
    };
    FeedStore::new(FeedClient::new(&config, "test-key").unwrap(), ttl)
  }

  fn article(title: &str, day: u32) -> Article {
    Article {
      title: title.to_string(),
      details: "d".to_string(),
      image_url: String::new(),
      published_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
    }
  }

  fn feed_body(titles: &[(&str, &str)]) -> serde_json::Value {
    json!({
      "articles": titles
        .iter()
        .map(|(title, published)| json!({
          "title": title,
          "description": "d",
          "publishedAt": published,
        }))
        .collect::<Vec<_>>()
    })
  }

  async fn wait_for_ready(events: &mut broadcast::Receiver<FeedEvent>) -> FeedEvent {
    loop {
      let event = events.recv().await.unwrap();
      if event.state == FetchState::Ready {
        return event;
      }
    }
  }

  #[tokio::test]
  async fn load_transitions_idle_loading_ready_in_order() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(GET).path("/articles");
        then
          .status(200)
          .json_body(feed_body(&[("A", "2024-01-02T10:00:00Z")]));
      })
      .await;

    let store = store_for(&server, Duration::seconds(30_000));
    assert_eq!(store.state().unwrap(), FetchState::Idle);

    let mut events = store.subscribe();
    store.load_if_needed().unwrap();

    let first = events.recv().await.unwrap();
    assert_eq!(first.state, FetchState::Loading);
    assert!(first.snapshot.articles.is_empty());

    let second = events.recv().await.unwrap();
    assert_eq!(second.state, FetchState::Ready);
    assert_eq!(second.snapshot.articles.len(), 1);

    assert_eq!(store.state().unwrap(), FetchState::Ready);
  }

  #[tokio::test]
  async fn fresh_snapshot_skips_network_and_renotifies() {
    let server = MockServer::start_async().await;
    let mock = server
      .mock_async(|when, then| {
        when.method(GET).path("/articles");
        then
          .status(200)
          .json_body(feed_body(&[("A", "2024-01-02T10:00:00Z")]));
      })
      .await;

    let store = store_for(&server, Duration::seconds(30_000));
    let mut events = store.subscribe();

    store.load_if_needed().unwrap();
    wait_for_ready(&mut events).await;

    // Snapshot is fresh: no second request, but subscribers still hear
    // the current state.
    store.load_if_needed().unwrap();
    let event = events.recv().await.unwrap();
    assert_eq!(event.state, FetchState::Ready);
    assert_eq!(event.snapshot.articles.len(), 1);

    assert_eq!(mock.hits_async().await, 1);
  }

  #[tokio::test]
  async fn ready_snapshot_expires_at_completion_plus_ttl() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(GET).path("/articles");
        then.status(200).json_body(feed_body(&[]));
      })
      .await;

    let ttl = Duration::seconds(30_000);
    let store = store_for(&server, ttl);
    let mut events = store.subscribe();

    store.load_if_needed().unwrap();
    let event = wait_for_ready(&mut events).await;

    let expected = Utc::now() + ttl;
    let skew = (event.snapshot.expires_at - expected).num_seconds().abs();
    assert!(skew <= 5, "expiry off by {}s", skew);
  }

  #[tokio::test]
  async fn invalidate_forces_refetch() {
    let server = MockServer::start_async().await;
    let mock = server
      .mock_async(|when, then| {
        when.method(GET).path("/articles");
        then
          .status(200)
          .json_body(feed_body(&[("A", "2024-01-02T10:00:00Z")]));
      })
      .await;

    let store = store_for(&server, Duration::seconds(30_000));
    let mut events = store.subscribe();

    store.load_if_needed().unwrap();
    wait_for_ready(&mut events).await;

    store.invalidate().unwrap();
    assert!(store.snapshot().unwrap().articles.is_empty());
    // Invalidation does not touch the fetch state.
    assert_eq!(store.state().unwrap(), FetchState::Ready);

    store.load_if_needed().unwrap();
    wait_for_ready(&mut events).await;

    assert_eq!(mock.hits_async().await, 2);
  }

  #[tokio::test]
  async fn refresh_always_refetches() {
    let server = MockServer::start_async().await;
    let mock = server
      .mock_async(|when, then| {
        when.method(GET).path("/articles");
        then.status(200).json_body(feed_body(&[]));
      })
      .await;

    let store = store_for(&server, Duration::seconds(30_000));
    let mut events = store.subscribe();

    store.load_if_needed().unwrap();
    wait_for_ready(&mut events).await;
    store.refresh().unwrap();
    wait_for_ready(&mut events).await;

    assert_eq!(mock.hits_async().await, 2);
  }

  #[tokio::test]
  async fn transport_failure_yields_empty_but_fresh_ready_snapshot() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(GET).path("/articles");
        then.status(500);
      })
      .await;

    let store = store_for(&server, Duration::seconds(30_000));
    let mut events = store.subscribe();

    store.load_if_needed().unwrap();
    let event = wait_for_ready(&mut events).await;

    assert!(event.snapshot.articles.is_empty());
    assert!(!event.snapshot.is_expired());
    assert_eq!(store.state().unwrap(), FetchState::Ready);
  }

  #[tokio::test]
  async fn superseded_completion_cannot_clobber_newer_snapshot() {
    // No live fetches: drive the generation guard directly. Fetch A holds
    // token 1, fetch B superseded it with token 2 and completes first.
    let config = FeedConfig {
      base_url: "http://127.0.0.1:9".to_string(),
      ..FeedConfig::default()
    };
    let store = FeedStore::new(
      FeedClient::new(&config, "test-key").unwrap(),
      Duration::seconds(30_000),
    );

    {
      let mut inner = store.shared.inner.lock().unwrap();
      inner.generation = 2;
      inner.state = FetchState::Loading;
    }

    let mut events = store.subscribe();

    store.complete_fetch(2, vec![article("fresh", 2)]);
    assert_eq!(store.snapshot().unwrap().articles[0].title, "fresh");

    // A's late completion must be a no-op.
    store.complete_fetch(1, vec![article("stale", 1)]);

    let after = store.snapshot().unwrap();
    assert_eq!(after.articles[0].title, "fresh");
    assert_eq!(store.state().unwrap(), FetchState::Ready);

    // Exactly one Ready event was delivered: B's.
    let first = events.try_recv().unwrap();
    assert_eq!(first.snapshot.articles[0].title, "fresh");
    assert!(events.try_recv().is_err(), "stale fetch delivered a notification");
  }

  #[tokio::test]
  async fn new_load_aborts_in_flight_fetch() {
    let server = MockServer::start_async().await;
    let slow = server
      .mock_async(|when, then| {
        when.method(GET).path("/articles");
        then
          .status(200)
          .delay(std::time::Duration::from_millis(500))
          .json_body(feed_body(&[("slow", "2024-01-01T00:00:00Z")]));
      })
      .await;

    let store = store_for(&server, Duration::seconds(30_000));
    let mut events = store.subscribe();

    store.load_if_needed().unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // Swap the endpoint behaviour, then supersede the slow fetch.
    slow.delete_async().await;
    server
      .mock_async(|when, then| {
        when.method(GET).path("/articles");
        then
          .status(200)
          .json_body(feed_body(&[("fast", "2024-01-02T00:00:00Z")]));
      })
      .await;

    store.load_if_needed().unwrap();
    let event = wait_for_ready(&mut events).await;
    assert_eq!(event.snapshot.articles[0].title, "fast");

    // Give the aborted fetch time to have landed if the guard were broken.
    tokio::time::sleep(std::time::Duration::from_millis(600)).await;
    assert_eq!(store.snapshot().unwrap().articles[0].title, "fast");
  }
}
