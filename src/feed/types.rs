use chrono::{DateTime, Utc};

/// A single news article from the remote feed.
///
/// Immutable once constructed; articles are only ever built by decoding
/// one well-formed remote record (see [`super::ApiArticle::into_article`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
  pub title: String,
  pub details: String,
  /// Empty string when the record carried no image URL
  pub image_url: String,
  pub published_at: DateTime<Utc>,
}

impl Article {
  /// Publish date formatted for display, e.g. "02 January 2024 10:00".
  pub fn published_display(&self) -> String {
    self.published_at.format("%d %B %Y %H:%M").to_string()
  }
}

/// An immutable view of the fetched article collection plus its expiry.
///
/// `articles` is always sorted ascending by `published_at`. The snapshot is
/// published whole behind an `Arc`; it is never mutated in place.
#[derive(Debug, Clone)]
pub struct Snapshot {
  pub articles: Vec<Article>,
  pub expires_at: DateTime<Utc>,
}

impl Snapshot {
  /// The initial snapshot: no articles, already expired.
  pub fn empty() -> Self {
    Self {
      articles: Vec::new(),
      expires_at: Utc::now(),
    }
  }

  /// A snapshot is expired iff the current time is not strictly before
  /// its expiry.
  pub fn is_expired(&self) -> bool {
    Utc::now() >= self.expires_at
  }
}
