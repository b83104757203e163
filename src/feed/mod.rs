//! The news feed: wire decoding, HTTP client, and the TTL-bounded store.
//!
//! `FeedStore` owns the canonical article snapshot. Consumers call
//! `load_if_needed()` and watch state transitions through the broadcast
//! channel returned by `subscribe()`; the store guarantees at most one
//! fetch is in flight and that a superseded fetch can never clobber a
//! newer snapshot.

mod api_types;
mod client;
mod store;
mod types;

pub use api_types::{ApiArticle, ApiFeedResponse};
pub use client::FeedClient;
pub use store::{FeedEvent, FeedStore, FetchState};
pub use types::{Article, Snapshot};
