//! Two-tier cache for binary assets (article images).
//!
//! Reads resolve memory first, then disk, then network; both faster tiers
//! are populated as a result of a miss. Entries are keyed by a SHA-256 hash
//! of the source URL and are never evicted; they live until process exit
//! (memory tier) or an explicit [`AssetCache::clear_all`] (both tiers).
//! Unbounded retention is a known limitation of this design, not an
//! accident.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use color_eyre::{eyre::eyre, Result};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Stable cache key for an asset URL: hex-encoded SHA-256 of the full URL
/// string. Doubles as the on-disk filename.
pub fn asset_key(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}

struct Shared {
  http: reqwest::Client,
  dir: PathBuf,
  memory: Mutex<HashMap<String, Arc<Vec<u8>>>>,
}

/// Two-tier asset cache: in-memory map backed by a flat directory of files.
///
/// Explicitly constructed and injected; there is no global instance. All
/// failures below the API surface (filesystem, transport) degrade to cache
/// misses or `None`; the caller never sees an error from [`fetch`].
///
/// [`fetch`]: AssetCache::fetch
#[derive(Clone)]
pub struct AssetCache {
  shared: Arc<Shared>,
}

/// Concurrent downloads during a [`AssetCache::prefetch`] pass.
const PREFETCH_CONCURRENCY: usize = 4;

/// Distinguishes temp files when the same key is written concurrently.
static WRITE_SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

impl AssetCache {
  /// Create a cache over the given directory.
  ///
  /// The directory is created lazily on first write, not here.
  pub fn new(dir: impl Into<PathBuf>, timeout: std::time::Duration) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      shared: Arc::new(Shared {
        http,
        dir: dir.into(),
        memory: Mutex::new(HashMap::new()),
      }),
    })
  }

  /// Resolve the asset at `url`: memory, then disk, then network.
  ///
  /// A disk hit populates the memory tier; a network hit populates both.
  /// Returns `None` on network failure: nothing is cached and the caller
  /// gets no placeholder.
  pub async fn fetch(&self, url: &str) -> Option<Arc<Vec<u8>>> {
    let key = asset_key(url);

    if let Some(data) = self.memory_get(&key) {
      debug!(url, "asset memory hit");
      return Some(data);
    }

    if let Ok(bytes) = tokio::fs::read(self.shared.dir.join(&key)).await {
      debug!(url, "asset disk hit");
      let data = Arc::new(bytes);
      self.memory_put(key, Arc::clone(&data));
      return Some(data);
    }

    match self.download(url).await {
      Ok(bytes) => {
        debug!(url, bytes = bytes.len(), "asset fetched from network");
        let data = Arc::new(bytes);
        self.persist(&key, &data).await;
        self.memory_put(key, Arc::clone(&data));
        Some(data)
      }
      Err(e) => {
        warn!(url, "asset fetch failed: {}", e);
        None
      }
    }
  }

  /// Warm the cache for a set of URLs, a few downloads at a time.
  pub async fn prefetch<I, S>(&self, urls: I)
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    futures::stream::iter(urls)
      .for_each_concurrent(PREFETCH_CONCURRENCY, |url| async move {
        let _ = self.fetch(url.as_ref()).await;
      })
      .await;
  }

  /// Empty the memory tier and remove the entire disk cache directory.
  ///
  /// Idempotent: a missing directory is not an error.
  pub async fn clear_all(&self) -> Result<()> {
    if let Ok(mut memory) = self.shared.memory.lock() {
      memory.clear();
    }

    match tokio::fs::remove_dir_all(&self.shared.dir).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(eyre!(
        "Failed to remove cache directory {}: {}",
        self.shared.dir.display(),
        e
      )),
    }
  }

  async fn download(&self, url: &str) -> Result<Vec<u8>> {
    let response = self
      .shared
      .http
      .get(url)
      .send()
      .await
      .map_err(|e| eyre!("Asset request failed: {}", e))?
      .error_for_status()
      .map_err(|e| eyre!("Asset request failed: {}", e))?;

    let bytes = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read asset body: {}", e))?;

    Ok(bytes.to_vec())
  }

  /// Write-through to the disk tier. Filesystem failures degrade to a miss
  /// on the next read and are only logged.
  ///
  /// The write is atomic: bytes go to a temp file in the same directory,
  /// renamed into place once complete. A crash mid-write must never leave
  /// a truncated file at the key's path, since presence of that file is
  /// the disk tier's only existence check.
  async fn persist(&self, key: &str, data: &[u8]) {
    if let Err(e) = tokio::fs::create_dir_all(&self.shared.dir).await {
      warn!("failed to create asset cache directory: {}", e);
      return;
    }

    let tmp = self.shared.dir.join(format!(
      "{}.{}.tmp",
      key,
      WRITE_SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    ));

    if let Err(e) = tokio::fs::write(&tmp, data).await {
      warn!("failed to persist asset {}: {}", key, e);
      let _ = tokio::fs::remove_file(&tmp).await;
      return;
    }
    if let Err(e) = tokio::fs::rename(&tmp, self.shared.dir.join(key)).await {
      warn!("failed to persist asset {}: {}", key, e);
      let _ = tokio::fs::remove_file(&tmp).await;
    }
  }

  fn memory_get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
    match self.shared.memory.lock() {
      Ok(memory) => memory.get(key).cloned(),
      Err(_) => None,
    }
  }

  fn memory_put(&self, key: String, data: Arc<Vec<u8>>) {
    if let Ok(mut memory) = self.shared.memory.lock() {
      memory.insert(key, data);
    }
  }

  #[cfg(test)]
  fn dir(&self) -> &std::path::Path {
    &self.shared.dir
  }
}
