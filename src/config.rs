use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub feed: FeedConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
  /// Base URL of the news API
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// News source identifier passed as the `source` query parameter
  #[serde(default = "default_source")]
  pub source: String,
  /// How long a fetched snapshot stays valid, in seconds
  #[serde(default = "default_ttl_secs")]
  pub ttl_secs: i64,
  /// HTTP request timeout, in seconds
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// Directory for the on-disk image cache.
  /// Defaults to `<platform cache dir>/newswire/images`.
  pub dir: Option<PathBuf>,
}

fn default_base_url() -> String {
  "https://newsapi.org/v1".to_string()
}

fn default_source() -> String {
  "google-news".to_string()
}

fn default_ttl_secs() -> i64 {
  30_000
}

fn default_timeout_secs() -> u64 {
  30
}

impl Default for FeedConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      source: default_source(),
      ttl_secs: default_ttl_secs(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

impl FeedConfig {
  /// Full URL of the article list endpoint, including the API key.
  pub fn articles_url(&self, api_key: &str) -> Result<Url> {
    let base = self
      .base_url
      .strip_suffix('/')
      .unwrap_or(&self.base_url);

    let mut url = Url::parse(&format!("{}/articles", base))
      .map_err(|e| eyre!("Invalid feed base URL {}: {}", self.base_url, e))?;

    url
      .query_pairs_mut()
      .append_pair("source", &self.source)
      .append_pair("apiKey", api_key);

    Ok(url)
  }

  /// Snapshot time-to-live.
  pub fn ttl(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.ttl_secs)
  }

  /// HTTP request timeout.
  pub fn timeout(&self) -> std::time::Duration {
    std::time::Duration::from_secs(self.timeout_secs)
  }
}

impl CacheConfig {
  /// Resolve the image cache directory.
  pub fn image_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.dir {
      return Ok(dir.clone());
    }

    let cache_root = dirs::cache_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".cache")))
      .ok_or_else(|| eyre!("Could not determine cache directory"))?;

    Ok(cache_root.join("newswire").join("images"))
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./newswire.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/newswire/config.yaml
  ///
  /// All settings have defaults, so a missing config file (when no explicit
  /// path was given) yields the default configuration.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // A newswire.yaml in the working directory wins over the XDG path.
    let local = PathBuf::from("newswire.yaml");
    if local.exists() {
      return Some(local);
    }

    dirs::config_dir()
      .map(|dir| dir.join("newswire").join("config.yaml"))
      .filter(|path| path.exists())
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  /// Get the news API key from environment variables.
  ///
  /// Checks NEWSWIRE_API_KEY first, then NEWS_API_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("NEWSWIRE_API_KEY")
      .or_else(|_| std::env::var("NEWS_API_KEY"))
      .map_err(|_| {
        eyre!("News API key not found. Set NEWSWIRE_API_KEY or NEWS_API_KEY environment variable.")
      })
  }
}
