//! Content-addressable tool cache.
//!
//! Verified tool binaries are stored by their SHA-256 hash in a two-level
//! directory structure, with a JSON index mapping tool identifiers to their
//! cached content:
//!
//! ```text
//! ~/.cache/opack/tools/
//!   tools.json
//!   blobs/
//!     ab/
//!       cd/
//!         abcdef123456... (binary content)
//! ```
//!
//! The cache never serves content it has not re-verified: every lookup
//! re-hashes the stored bytes against the hash the caller currently expects,
//! so a stale or corrupted blob is treated as a miss rather than returned.

mod store;

pub use store::{CacheEntry, ToolCache, VerificationStatus, default_cache_dir};
