use anyhow::Result;
use async_trait::async_trait;

use super::models::{ResourceIdentity, ResourceRecord};

/// Pluggable state backend trait.
/// Implemented by SQLite (local dev) and a plain JSON-file layout.
///
/// The engine guarantees at most one in-flight apply per identity per run,
/// so implementations only need atomic single-record writes; writes to
/// different identities may race freely.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Initialize the backend (create tables or directories).
    async fn initialize(&self) -> Result<()>;

    /// Load the record for an identity, if one exists.
    async fn get(&self, identity: &ResourceIdentity) -> Result<Option<ResourceRecord>>;

    /// Insert or replace the record for its identity, atomically.
    async fn set(&self, record: &ResourceRecord) -> Result<()>;

    /// Remove the record for an identity. Removing a missing record is not
    /// an error.
    async fn delete(&self, identity: &ResourceIdentity) -> Result<()>;

    /// All records whose scope chain starts with the given prefix, matched
    /// on whole segments (`["app"]` matches `app/...` but never `app2/...`).
    /// An empty prefix lists everything.
    async fn list(&self, scope_prefix: &[String]) -> Result<Vec<ResourceRecord>>;
}

/// Whether a record's scope chain falls under a prefix, segment-wise.
pub(crate) fn chain_matches(chain: &[String], prefix: &[String]) -> bool {
    chain.len() >= prefix.len() && chain[..prefix.len()] == *prefix
}
