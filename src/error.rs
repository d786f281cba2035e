use thiserror::Error;

use crate::engine::LifecycleEvent;

/// Errors surfaced by the resource engine.
///
/// Handler implementations fail with `anyhow::Error`; the engine wraps those
/// in [`EngineError::Apply`] or [`EngineError::Delete`] with the resource
/// address and event attached. A handler may also return an `EngineError`
/// directly (most commonly [`EngineError::ImmutableFieldChanged`]) and the
/// engine surfaces it as-is.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input rejected before the handler ran. State is untouched.
    #[error("validation failed for {address}: {reason}")]
    Validation { address: String, reason: String },

    /// An update attempted to change an identity-defining field. The stored
    /// record keeps the prior successful snapshot, not the rejected input.
    #[error("immutable field '{field}' changed on {address}: {reason}")]
    ImmutableFieldChanged {
        address: String,
        field: String,
        reason: String,
    },

    /// Handler failed during create or update. The record is marked failed
    /// with the prior successful snapshots retained, so a retry run has full
    /// context.
    #[error("{event} failed for {address}")]
    Apply {
        address: String,
        event: LifecycleEvent,
        #[source]
        source: anyhow::Error,
    },

    /// Handler failed during delete. The record is kept so the engine does
    /// not lose track of a resource that still exists externally.
    #[error("delete failed for {address}")]
    Delete {
        address: String,
        #[source]
        source: anyhow::Error,
    },

    /// The persistence medium is unavailable or corrupt. Fatal for the run:
    /// no lifecycle decisions are made on unreadable state.
    #[error("state store failure")]
    StateStore(#[source] anyhow::Error),

    /// A second apply of the same identity was started while one is still
    /// in flight. The engine rejects it rather than queueing.
    #[error("resource {address} already has an apply in flight")]
    AlreadyInFlight { address: String },

    /// Destroy found a stored record whose kind has no handler registered
    /// with this engine.
    #[error("no handler registered for kind '{kind}' ({address})")]
    UnknownKind { kind: String, address: String },

    /// A stored snapshot could not be encoded or decoded.
    #[error("snapshot for {address} could not be converted")]
    Snapshot {
        address: String,
        #[source]
        source: serde_json::Error,
    },

    /// `reveal()` was called on a secret restored from state, where only a
    /// redaction marker is kept.
    #[error("secret value is redacted; it cannot be recovered from state")]
    SecretRedacted,

    /// A scope or resource name that would corrupt addressing.
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// An ambient apply was attempted with no open scope on the stack.
    #[error("no open scope; enter one with Scope::enter or pass a scope explicitly")]
    NoCurrentScope,
}

impl EngineError {
    /// Shorthand for handlers rejecting an in-place update of an
    /// identity-defining field.
    pub fn immutable_field(
        address: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ImmutableFieldChanged {
            address: address.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
