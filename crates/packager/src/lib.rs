//! Package assembly: turning a resolution and its fetched tools into a
//! deterministic, self-contained package directory.
//!
//! ```text
//! <output>/
//!   artifacts/<name>.yaml   # definitions, written in name order
//!   tools/<identifier>      # verified binaries copied from the cache
//!   manifest.json           # canonical integrity manifest
//! ```
//!
//! Two builds of the same artifact set with the same resolved tool hashes
//! produce byte-identical manifests apart from the creation timestamp, which
//! never participates in the fingerprint.

mod builder;
mod verify;

pub use builder::{ARTIFACTS_DIR, Package, PackageBuilder, TOOLS_DIR, prune_incomplete};
pub use verify::verify_package;
