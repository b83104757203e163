//! newswire: a cached news feed client.
//!
//! Two independent components:
//!
//! - [`feed::FeedStore`]: fetches a remote list of timestamped articles,
//!   caches the snapshot for a bounded time window, and broadcasts
//!   idle/loading/ready transitions to subscribers.
//! - [`assets::AssetCache`]: two-tier (memory + disk) cache of binary
//!   assets referenced by those articles, keyed by a hash of the source
//!   URL, resolved from the network on a double miss.

pub mod assets;
pub mod config;
pub mod feed;

pub use assets::AssetCache;
pub use config::Config;
pub use feed::{Article, FeedClient, FeedEvent, FeedStore, FetchState, Snapshot};
