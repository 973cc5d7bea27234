//! Protocol error taxonomy.
//!
//! Hard failures only: foreign handles, revoked-handle reads, invocation
//! of non-callables, runaway override reentry, and non-object owners.
//! Rejected mutations are not errors — the dispatcher reports them as
//! `Ok(false)` — and inadmissible query results degrade to absent.

use serde::{Deserialize, Serialize};

use crate::registry::HandleId;

/// Hard protocol failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ProtocolError {
    /// The handle was not minted by this synthesizer.
    #[error("handle {handle} is not an instance of this synthesizer")]
    NotAnInstance { handle: HandleId },

    /// Read-style operation on a revoked handle.
    #[error("handle {handle} has been revoked")]
    Revoked { handle: HandleId },

    /// Invocation on a synthesizer that does not produce callable handles,
    /// or an override that refuses the call.
    #[error("not callable")]
    NotCallable,

    /// Construction on a synthesizer that does not produce constructible
    /// handles, or an override that refuses.
    #[error("not constructible")]
    NotConstructible,

    /// Override reentry ran past the configured depth limit.
    #[error("override reentry depth {depth} exceeds limit {limit}")]
    OverrideDepthExceeded { depth: u32, limit: u32 },

    /// A handle-shaped owner was required.
    #[error("{type_name} is not an object")]
    NotAnObject { type_name: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
