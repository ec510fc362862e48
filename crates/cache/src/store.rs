//! Cache storage: blob layout, index persistence, per-identifier locking.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use opack_core::hash::sha256_hex;
use opack_core::{Error, Result};

/// Filename of the persisted cache index.
const INDEX_NAME: &str = "tools.json";

/// Verification state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    /// Content hash matched the stored bytes at last read.
    Verified,
    /// Entry exists but has not been checked against its bytes.
    Unverified,
    /// Content failed verification.
    Failed,
}

/// A verified tool held by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Tool identifier.
    pub identifier: String,
    /// Path of the blob on disk.
    pub path: PathBuf,
    /// Verified SHA-256 content hash.
    pub hash: String,
    /// Byte size of the blob.
    pub size: u64,
    /// When the content was fetched.
    pub fetched_at: DateTime<Utc>,
    /// Verification state.
    pub status: VerificationStatus,
}

/// Persisted index row, keyed by tool identifier in `tools.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexRecord {
    url: String,
    hash: String,
    size: u64,
    downloaded: DateTime<Utc>,
    verified: bool,
}

/// Default cache directory: `<platform cache dir>/opack/tools`.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("opack")
        .join("tools")
}

/// Content-addressable local store of fetched, verified tool binaries.
///
/// The cache is shared across concurrent fetches of different identifiers;
/// writes for a given identifier are mutually exclusive through a
/// per-identifier lock, and the index file is guarded separately.
#[derive(Debug)]
pub struct ToolCache {
    root: PathBuf,
    index_lock: Mutex<()>,
    entry_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ToolCache {
    /// Create a cache rooted at `root`. Directories are created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index_lock: Mutex::new(()),
            entry_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Blob path for a content hash: `{root}/blobs/{h[0:2]}/{h[2:4]}/{h}`.
    fn blob_path(&self, hash: &str) -> PathBuf {
        self.root
            .join("blobs")
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join(hash)
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_NAME)
    }

    fn lock_for(&self, identifier: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .entry_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks
            .entry(identifier.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn read_index(&self) -> Result<BTreeMap<String, IndexRecord>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_index(&self, index: &BTreeMap<String, IndexRecord>) -> Result<()> {
        let path = self.index_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(index)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn update_index(
        &self,
        identifier: &str,
        update: impl FnOnce(&mut BTreeMap<String, IndexRecord>),
    ) -> Result<()> {
        let _guard = self
            .index_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut index = self.read_index()?;
        update(&mut index);
        self.write_index(&index)?;
        trace!(identifier, "Updated cache index");
        Ok(())
    }

    /// Look up a tool by identifier against the hash the caller currently
    /// expects.
    ///
    /// Returns `None` when the identifier is absent, when the recorded hash
    /// differs from `expected_hash` (a stale entry from an updated
    /// definition; the caller refetches), or when the stored bytes no
    /// longer hash to the recorded value (the corrupt blob and its record
    /// are dropped). A returned entry is always freshly re-verified.
    pub fn lookup(&self, identifier: &str, expected_hash: &str) -> Result<Option<CacheEntry>> {
        let record = {
            let _guard = self
                .index_lock
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            self.read_index()?.remove(identifier)
        };
        let Some(record) = record else {
            trace!(identifier, "Cache miss");
            return Ok(None);
        };

        if record.hash != expected_hash {
            debug!(
                identifier,
                cached = %record.hash,
                expected = %expected_hash,
                "Cached hash no longer matches expectation, treating as miss"
            );
            return Ok(None);
        }

        let path = self.blob_path(&record.hash);
        if !path.exists() {
            debug!(identifier, "Index record without blob, treating as miss");
            return Ok(None);
        }

        // Never trust the recorded state: re-hash the bytes on every read.
        let bytes = std::fs::read(&path)?;
        let actual = sha256_hex(&bytes);
        if actual != record.hash {
            warn!(
                identifier,
                expected = %record.hash,
                actual = %actual,
                "Cached blob failed re-verification, evicting"
            );
            std::fs::remove_file(&path).ok();
            self.update_index(identifier, |index| {
                index.remove(identifier);
            })?;
            return Ok(None);
        }

        trace!(identifier, hash = %record.hash, "Cache hit");
        Ok(Some(CacheEntry {
            identifier: identifier.to_string(),
            path,
            hash: record.hash,
            size: record.size,
            fetched_at: record.downloaded,
            status: VerificationStatus::Verified,
        }))
    }

    /// Store downloaded bytes for a tool after verifying them.
    ///
    /// The content hash is computed and compared against `expected_hash`
    /// before anything is persisted; on mismatch nothing is written and a
    /// [`Error::HashMismatch`] is returned. The blob is written atomically
    /// (temp file + rename) and the index row is replaced.
    pub fn store(
        &self,
        identifier: &str,
        url: &str,
        bytes: &[u8],
        expected_hash: &str,
    ) -> Result<CacheEntry> {
        let actual = sha256_hex(bytes);
        if actual != expected_hash {
            return Err(Error::hash_mismatch(identifier, url, expected_hash, actual));
        }

        let entry_lock = self.lock_for(identifier);
        let _guard = entry_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let path = self.blob_path(&actual);
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let tmp = path.with_extension("tmp");
            std::fs::write(&tmp, bytes)?;
            std::fs::rename(&tmp, &path)?;
        }

        let fetched_at = Utc::now();
        let size = bytes.len() as u64;
        self.update_index(identifier, |index| {
            index.insert(
                identifier.to_string(),
                IndexRecord {
                    url: url.to_string(),
                    hash: actual.clone(),
                    size,
                    downloaded: fetched_at,
                    verified: true,
                },
            );
        })?;

        debug!(identifier, hash = %actual, size, "Stored tool in cache");
        Ok(CacheEntry {
            identifier: identifier.to_string(),
            path,
            hash: actual,
            size,
            fetched_at,
            status: VerificationStatus::Verified,
        })
    }

    /// All index entries as (identifier, hash, size) rows, identifier-sorted.
    pub fn entries(&self) -> Result<Vec<(String, String, u64)>> {
        let _guard = self
            .index_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(self
            .read_index()?
            .into_iter()
            .map(|(id, r)| (id, r.hash, r.size))
            .collect())
    }

    /// Total byte size of all indexed blobs.
    pub fn total_size(&self) -> Result<u64> {
        Ok(self.entries()?.iter().map(|(_, _, size)| size).sum())
    }

    /// Remove every blob and the index.
    pub fn clear(&self) -> Result<()> {
        let _guard = self
            .index_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let blobs = self.root.join("blobs");
        if blobs.exists() {
            std::fs::remove_dir_all(&blobs)?;
        }
        let index = self.index_path();
        if index.exists() {
            std::fs::remove_file(&index)?;
        }
        debug!(root = %self.root.display(), "Cleared tool cache");
        Ok(())
    }
}
