//! Serde-deserializable types matching the news API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs. Every field is
//! optional at the wire level; validation happens in `into_article`.

use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;

use super::types::Article;

/// Format the API uses for publish dates, e.g. "2024-01-02T10:00:00Z".
const PUBLISHED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Deserialize)]
pub struct ApiFeedResponse {
  #[serde(default)]
  pub articles: Vec<ApiArticle>,
}

#[derive(Debug, Deserialize)]
pub struct ApiArticle {
  pub title: Option<String>,
  pub description: Option<String>,
  #[serde(rename = "publishedAt")]
  pub published_at: Option<String>,
  #[serde(rename = "urlToImage")]
  pub url_to_image: Option<String>,
}

impl ApiArticle {
  /// Validate one remote record into an [`Article`].
  ///
  /// Returns `None` when `title`, `description`, or `publishedAt` is absent,
  /// or when the publish date does not parse. An absent `urlToImage` yields
  /// an empty image URL. Records with unparsable dates are rejected rather
  /// than defaulted to the current time, so a snapshot's ordering never
  /// depends on when it was decoded.
  pub fn into_article(self) -> Option<Article> {
    let title = self.title?;
    let details = self.description?;
    let raw_published = self.published_at?;

    let published_at = NaiveDateTime::parse_from_str(&raw_published, PUBLISHED_AT_FORMAT)
      .ok()?
      .and_utc();

    Some(Article {
      title,
      details,
      image_url: self.url_to_image.unwrap_or_default(),
      published_at,
    })
  }
}
