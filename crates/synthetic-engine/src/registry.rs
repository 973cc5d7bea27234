//! Handle identity and the per-synthesizer registry.
//!
//! Identity is reference-based, never structural:
//!
//! - **`Handle`**: a shared pointer to an immutable core (id + diagnostic
//!   label); equality and hashing mean "the same instantiation"
//! - **`HandleId`**: minted from a process-wide monotone counter, never
//!   reused, so handles from different synthesizers can never collide
//! - **`HandleRegistry`**: id → (weak identity, [`InstanceState`]); holding
//!   an entry never keeps a handle alive
//!
//! Membership ("is-instance-of") is registry containment: the id resolves
//! to an entry whose weak identity upgrades to the very same allocation.
//! Revocation never removes membership; only handle death does, via the
//! opportunistic sweep.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::InstanceState;

/// Dead registry entries are pruned after this many registrations.
pub const SWEEP_INTERVAL: usize = 64;

// ---------------------------------------------------------------------------
// HandleId
// ---------------------------------------------------------------------------

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique handle identifier. Monotone, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HandleId(pub u64);

impl HandleId {
    pub(crate) fn mint() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Handle / WeakHandle
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct HandleCore {
    id: HandleId,
    /// Diagnostic label only; correctness never depends on its uniqueness.
    label: Uuid,
}

/// An opaque synthetic handle.
///
/// Cheap to clone; all clones are the same handle. Two handles are equal
/// exactly when they came from the same `instantiate()` call.
#[derive(Clone)]
pub struct Handle {
    core: Rc<HandleCore>,
}

impl Handle {
    /// The handle's process-wide unique id.
    pub fn id(&self) -> HandleId {
        self.core.id
    }

    /// Diagnostic label attached at instantiation.
    pub fn label(&self) -> Uuid {
        self.core.label
    }

    /// Downgrade to a non-owning reference.
    pub fn downgrade(&self) -> WeakHandle {
        WeakHandle {
            id: self.core.id,
            core: Rc::downgrade(&self.core),
        }
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl Eq for Handle {}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.id.hash(state);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.core.id)
            .field("label", &self.core.label)
            .finish()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "synthetic#{}", self.core.id)
    }
}

/// Non-owning reference to a handle, for weak associations.
#[derive(Debug, Clone)]
pub struct WeakHandle {
    id: HandleId,
    core: Weak<HandleCore>,
}

impl WeakHandle {
    /// The id of the referenced handle (valid even after it dies).
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Recover the handle if any strong clone is still alive.
    pub fn upgrade(&self) -> Option<Handle> {
        self.core.upgrade().map(|core| Handle { core })
    }
}

// ---------------------------------------------------------------------------
// HandleRegistry
// ---------------------------------------------------------------------------

struct RegistryEntry {
    identity: Weak<HandleCore>,
    state: InstanceState,
}

/// Id-keyed registry of every handle a synthesizer has instantiated.
///
/// Entries hold weak identities: the registry never keeps a handle alive,
/// and entries for dropped handles are pruned every [`SWEEP_INTERVAL`]
/// registrations (or via an explicit [`HandleRegistry::sweep`]).
#[derive(Default)]
pub struct HandleRegistry {
    entries: BTreeMap<HandleId, RegistryEntry>,
    since_sweep: usize,
}

impl HandleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh handle and create its entry atomically. The entry is
    /// never re-created and the id is never reused.
    pub fn register(&mut self) -> Handle {
        self.since_sweep += 1;
        if self.since_sweep >= SWEEP_INTERVAL {
            self.sweep();
        }
        let core = Rc::new(HandleCore {
            id: HandleId::mint(),
            label: Uuid::new_v4(),
        });
        let handle = Handle { core };
        self.entries.insert(
            handle.id(),
            RegistryEntry {
                identity: Rc::downgrade(&handle.core),
                state: InstanceState::new(),
            },
        );
        handle
    }

    /// Membership check: the id resolves here and the stored identity is
    /// this very allocation.
    pub fn contains(&self, handle: &Handle) -> bool {
        self.state(handle).is_some()
    }

    /// Borrow the state for a member handle.
    pub fn state(&self, handle: &Handle) -> Option<&InstanceState> {
        let entry = self.entries.get(&handle.id())?;
        let core = entry.identity.upgrade()?;
        if Rc::ptr_eq(&core, &handle.core) {
            Some(&entry.state)
        } else {
            None
        }
    }

    /// Mutably borrow the state for a member handle.
    pub fn state_mut(&mut self, handle: &Handle) -> Option<&mut InstanceState> {
        let entry = self.entries.get_mut(&handle.id())?;
        let core = entry.identity.upgrade()?;
        if Rc::ptr_eq(&core, &handle.core) {
            Some(&mut entry.state)
        } else {
            None
        }
    }

    /// Prune entries whose handle has no strong clone left. Returns the
    /// number pruned.
    pub fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.identity.strong_count() > 0);
        self.since_sweep = 0;
        before - self.entries.len()
    }

    /// Number of entries, dead ones included until the next sweep.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries exist.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("entries", &self.entries.len())
            .field("since_sweep", &self.since_sweep)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
