//! Per-handle lifecycle state machine.
//!
//! Every synthetic handle is in exactly one phase:
//!
//! - **Active**: all structural operations permitted
//! - **Locked**: mutating operations rejected, reads unaffected
//! - **Revoked**: terminal; reads fail, mutations reject
//!
//! Transitions: `Active → Locked` via lock and `Locked → Active` via
//! unlock; both may move to `Revoked`; nothing leaves `Revoked`.
//! Re-applying the current phase is a no-op rather than an error, and the
//! first revocation clears the property store so a revoked handle cannot
//! leak prior contents.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::store::PropertyStore;

// ---------------------------------------------------------------------------
// HandlePhase
// ---------------------------------------------------------------------------

/// Lifecycle phase of a synthetic handle.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum HandlePhase {
    /// Fully operational.
    #[default]
    Active,
    /// Mutations rejected; reads still answered.
    Locked,
    /// Terminal. Reads fail, mutations reject, store contents are gone.
    Revoked,
}

impl HandlePhase {
    /// True before any lock or revocation.
    pub fn is_active(self) -> bool {
        self == Self::Active
    }

    /// True while mutations are being rejected but reads still work.
    pub fn is_locked(self) -> bool {
        self == Self::Locked
    }

    /// True once the handle has been revoked.
    pub fn is_revoked(self) -> bool {
        self == Self::Revoked
    }

    /// Whether mutating protocol operations may proceed in this phase.
    pub fn allows_mutation(self) -> bool {
        self == Self::Active
    }
}

impl fmt::Display for HandlePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Locked => "locked",
            Self::Revoked => "revoked",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// InstanceState
// ---------------------------------------------------------------------------

/// Mutable per-handle state: lifecycle phase plus the owning property store.
///
/// Owned exclusively by one registry entry; the dispatcher borrows it for
/// the duration of a single pre-check or store operation, never across an
/// override invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceState {
    phase: HandlePhase,
    store: PropertyStore,
}

impl InstanceState {
    /// Fresh active state with an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> HandlePhase {
        self.phase
    }

    /// The handle's property store.
    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    /// Mutable access to the property store. Store access is ungated;
    /// lifecycle enforcement is the dispatcher's job.
    pub fn store_mut(&mut self) -> &mut PropertyStore {
        &mut self.store
    }

    /// Lock the handle. Returns whether a transition happened; locking a
    /// locked handle is a no-op, and a revoked handle stays revoked.
    pub fn lock(&mut self) -> bool {
        match self.phase {
            HandlePhase::Active => {
                self.phase = HandlePhase::Locked;
                true
            }
            HandlePhase::Locked | HandlePhase::Revoked => false,
        }
    }

    /// Unlock the handle. Returns whether a transition happened; unlocking
    /// an active handle is a no-op, and a revoked handle stays revoked.
    pub fn unlock(&mut self) -> bool {
        match self.phase {
            HandlePhase::Locked => {
                self.phase = HandlePhase::Active;
                true
            }
            HandlePhase::Active | HandlePhase::Revoked => false,
        }
    }

    /// Revoke the handle. The first revocation clears the store and returns
    /// true; later calls are no-ops.
    pub fn revoke(&mut self) -> bool {
        match self.phase {
            HandlePhase::Revoked => false,
            HandlePhase::Active | HandlePhase::Locked => {
                self.phase = HandlePhase::Revoked;
                self.store.clear();
                true
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
