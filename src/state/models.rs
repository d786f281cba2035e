use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

// ─── Identity ───────────────────────────────────────────────────────────────

/// Stable address of one resource across runs.
///
/// Derived deterministically from the chain of enclosing scope names plus the
/// local id given at the call site, so re-running the same program
/// re-discovers the same records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub scope_chain: Vec<String>,
    pub local_id: String,
    pub kind: String,
}

impl ResourceIdentity {
    pub fn new(
        scope_chain: Vec<String>,
        local_id: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            scope_chain,
            local_id: local_id.into(),
            kind: kind.into(),
        }
    }

    /// The joined address used as the primary key in every state backend,
    /// e.g. `my-app/prod/db-1`.
    pub fn address(&self) -> String {
        let mut parts = self.scope_chain.clone();
        parts.push(self.local_id.clone());
        parts.join("/")
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address())
    }
}

/// Scope names and local ids become path segments of the address, so they
/// must be non-empty and slash-free.
pub(crate) fn validate_segment(name: &str) -> Result<(), EngineError> {
    if name.is_empty() {
        return Err(EngineError::InvalidName {
            name: name.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if name.contains('/') {
        return Err(EngineError::InvalidName {
            name: name.to_string(),
            reason: "must not contain '/'".to_string(),
        });
    }
    Ok(())
}

// ─── Resource Records ───────────────────────────────────────────────────────

/// Lifecycle status of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// Reserved for callers that stage records ahead of an apply.
    Pending,
    /// The last apply for this identity succeeded.
    Applied,
    /// The last apply failed; snapshots still reflect the last success.
    Failed,
    /// The resource was deleted. Records in this state are removed from the
    /// store rather than persisted.
    Deleted,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceStatus::Pending => "pending",
            ResourceStatus::Applied => "applied",
            ResourceStatus::Failed => "failed",
            ResourceStatus::Deleted => "deleted",
        };
        write!(f, "{}", s)
    }
}

/// A resource's last-applied input and output, as persisted between runs.
///
/// The snapshots are the diff baseline for the next run and the source of
/// the prior output handed to update handlers. Values wrapped in
/// [`crate::Secret`] arrive here already redacted by serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub identity: ResourceIdentity,
    pub status: ResourceStatus,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    /// A freshly applied record with both timestamps set to now.
    pub fn applied(
        identity: ResourceIdentity,
        input: serde_json::Value,
        output: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            identity,
            status: ResourceStatus::Applied,
            input,
            output: Some(output),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn address(&self) -> String {
        self.identity.address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_joins_chain_and_local_id() {
        let id = ResourceIdentity::new(
            vec!["app".to_string(), "prod".to_string()],
            "db-1",
            "database",
        );
        assert_eq!(id.address(), "app/prod/db-1");
        assert_eq!(id.to_string(), "app/prod/db-1");
    }

    #[test]
    fn segment_validation_rejects_bad_names() {
        assert!(validate_segment("db-1").is_ok());
        assert!(validate_segment("").is_err());
        assert!(validate_segment("a/b").is_err());
    }

    #[test]
    fn identity_is_deterministic() {
        let a = ResourceIdentity::new(vec!["app".into()], "db", "database");
        let b = ResourceIdentity::new(vec!["app".into()], "db", "database");
        assert_eq!(a, b);
        assert_eq!(a.address(), b.address());
    }
}
