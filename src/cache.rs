//! Incremental paper cache.
//!
//! Papers already seen on a previous run are restored from this cache
//! instead of being fetched and translated again. The cache is a bounded
//! map from paper URL to [`CacheEntry`], paired with a last-touched map used
//! only for pruning.
//!
//! # File Format
//!
//! ```text
//! {
//!   "version": 1,
//!   "papers": { "<url>": "<RFC 3339 last-touched>" },
//!   "paper_cache": { "<url>": { ...CacheEntry... } },
//!   "last_updated": "<RFC 3339>"
//! }
//! ```
//!
//! A file whose `version` differs from the expected one is discarded as a
//! whole. The file is rewritten in full on every [`CacheStore::persist`].

use crate::errors::CacheError;
use crate::models::{CacheEntry, Paper};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Serialize)]
struct CacheFile {
    version: u32,
    #[serde(default)]
    papers: HashMap<String, DateTime<Utc>>,
    #[serde(default)]
    paper_cache: HashMap<String, CacheEntry>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

/// Read side of [`CacheFile`]. Entries and stamps stay untyped so one bad
/// entry is dropped on its own instead of failing the whole file.
#[derive(Debug, Deserialize)]
struct StoredCacheFile {
    #[serde(default)]
    papers: HashMap<String, Value>,
    #[serde(default)]
    paper_cache: HashMap<String, Value>,
    #[serde(default)]
    last_updated: Option<Value>,
}

/// Only the version tag, so a mismatched file is rejected before its body
/// is interpreted.
#[derive(Debug, Deserialize)]
struct VersionProbe {
    #[serde(default = "first_version")]
    version: u32,
}

fn first_version() -> u32 {
    1
}

/// Versioned, capacity-bounded store of processed papers.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
    version: u32,
    capacity: usize,
    touched: HashMap<String, DateTime<Utc>>,
    entries: HashMap<String, CacheEntry>,
}

impl CacheStore {
    /// An empty cache that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>, version: u32, capacity: usize) -> Self {
        Self {
            path: path.into(),
            version,
            capacity,
            touched: HashMap::new(),
            entries: HashMap::new(),
        }
    }

    /// Load the cache at `path`.
    ///
    /// A missing, unreadable, corrupt or version-mismatched file yields an
    /// empty cache. Last-touched keys without an entry are dropped; entries
    /// without a last-touched stamp fall back to their first-seen time.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display(), version = version, capacity = capacity))]
    pub async fn load(path: impl AsRef<Path>, version: u32, capacity: usize) -> Self {
        let path = path.as_ref();
        let mut store = Self::empty(path, version, capacity);

        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No cache file yet; starting empty");
                return store;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read cache; starting empty");
                return store;
            }
        };

        match serde_json::from_str::<VersionProbe>(&raw) {
            Ok(probe) if probe.version == version => {}
            Ok(probe) => {
                warn!(
                    expected = version,
                    found = probe.version,
                    "Cache version mismatch; ignoring old cache"
                );
                return store;
            }
            Err(e) => {
                warn!(error = %e, "Cache file is not valid JSON; starting empty");
                return store;
            }
        }

        let file: StoredCacheFile = match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, "Failed to parse cache; starting empty");
                return store;
            }
        };

        let mut entries = HashMap::with_capacity(file.paper_cache.len());
        let mut dropped = 0usize;
        for (url, value) in file.paper_cache {
            match serde_json::from_value::<CacheEntry>(value) {
                Ok(entry) => {
                    entries.insert(url, entry);
                }
                Err(e) => {
                    dropped += 1;
                    warn!(%url, error = %e, "Dropping unreadable cache entry");
                }
            }
        }

        let mut touched: HashMap<String, DateTime<Utc>> = file
            .papers
            .into_iter()
            .filter(|(url, _)| entries.contains_key(url))
            .filter_map(|(url, stamp)| {
                serde_json::from_value::<DateTime<Utc>>(stamp)
                    .ok()
                    .map(|ts| (url, ts))
            })
            .collect();
        for (url, entry) in &entries {
            touched.entry(url.clone()).or_insert(entry.pub_date);
        }
        store.touched = touched;
        store.entries = entries;

        info!(
            entries = store.entries.len(),
            dropped,
            last_updated = ?file.last_updated,
            "Loaded paper cache"
        );
        store
    }

    pub fn lookup(&self, url: &str) -> Option<&CacheEntry> {
        self.entries.get(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn last_touched(&self, url: &str) -> Option<DateTime<Utc>> {
        self.touched.get(url).copied()
    }

    /// Merge a run's papers into the cache.
    ///
    /// Unknown URLs get a new entry whose first-seen time is the paper's own
    /// `pub_date`. Known URLs keep their entry untouched. Every merged URL is
    /// stamped with `now` as its last-touched time, so it outranks everything
    /// not seen in this run when [`CacheStore::prune`] runs.
    ///
    /// # Arguments
    ///
    /// * `papers` - The full result set of a run, failed papers included
    /// * `now` - Last-touched stamp for every merged URL
    ///
    /// # Returns
    ///
    /// The number of new entries.
    pub fn merge(&mut self, papers: &[Paper], now: DateTime<Utc>) -> usize {
        let mut added = 0;
        for paper in papers {
            if !self.entries.contains_key(&paper.url) {
                self.entries.insert(paper.url.clone(), CacheEntry::from(paper));
                added += 1;
            }
            self.touched.insert(paper.url.clone(), now);
        }
        info!(added, merged = papers.len(), "Merged papers into cache");
        added
    }

    /// Drop the least recently touched entries until the capacity holds.
    /// Returns the number of entries removed.
    pub fn prune(&mut self) -> usize {
        if self.entries.len() <= self.capacity && self.touched.len() <= self.capacity {
            return 0;
        }
        let before = self.entries.len();

        let mut ranked: Vec<(&String, &DateTime<Utc>)> = self.touched.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let keep: std::collections::HashSet<String> = ranked
            .into_iter()
            .take(self.capacity)
            .map(|(url, _)| url.clone())
            .collect();

        self.touched.retain(|url, _| keep.contains(url));
        self.entries.retain(|url, _| keep.contains(url));

        let removed = before.saturating_sub(self.entries.len());
        info!(removed, kept = self.entries.len(), "Pruned paper cache");
        removed
    }

    /// Rewrite the cache file in full.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn persist(&self) -> Result<(), CacheError> {
        let file = CacheFile {
            version: self.version,
            papers: self.touched.clone(),
            paper_cache: self.entries.clone(),
            last_updated: Some(Utc::now()),
        };
        let json = serde_json::to_string_pretty(&file)?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        fs::write(&self.path, &json).await?;
        debug!(bytes = json.len(), "Cache written");
        info!(
            entries = self.entries.len(),
            version = self.version,
            "Saved paper cache"
        );
        Ok(())
    }
}
