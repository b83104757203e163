use color_eyre::{eyre::eyre, Result};
use url::Url;

use crate::config::FeedConfig;

use super::api_types::{ApiArticle, ApiFeedResponse};
use super::types::Article;

/// HTTP client for the article list endpoint.
#[derive(Clone)]
pub struct FeedClient {
  http: reqwest::Client,
  endpoint: Url,
}

impl FeedClient {
  pub fn new(config: &FeedConfig, api_key: &str) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(config.timeout())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let endpoint = config.articles_url(api_key)?;

    Ok(Self { http, endpoint })
  }

  /// Fetch and decode the article list.
  ///
  /// Records that fail validation are dropped silently; the surviving
  /// articles come back sorted ascending by publish date. Transport errors
  /// and a malformed top-level document are returned as errors; the store
  /// decides how to recover (see [`super::FeedStore`]).
  pub async fn fetch_articles(&self) -> Result<Vec<Article>> {
    let response = self
      .http
      .get(self.endpoint.clone())
      .send()
      .await
      .map_err(|e| eyre!("Feed request failed: {}", e))?
      .error_for_status()
      .map_err(|e| eyre!("Feed request failed: {}", e))?;

    let body: ApiFeedResponse = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to decode feed response: {}", e))?;

    let mut articles: Vec<Article> = body
      .articles
      .into_iter()
      .filter_map(ApiArticle::into_article)
      .collect();

    articles.sort_by_key(|a| a.published_at);

    Ok(articles)
  }
}
