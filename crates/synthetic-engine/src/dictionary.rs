//! Hidden-introspection dictionaries and per-owner state.
//!
//! A dictionary handle stores values normally but introspects as empty:
//! existence checks answer false, enumeration answers empty, descriptor
//! queries answer absent, the prototype is fixed at none, and freezing is
//! refused. Reads and writes are the only verbs that see anything.
//!
//! [`StateStore`] hands out one dictionary handle per owner handle. The
//! owner association is weak — the store never keeps an owner alive, and
//! associations for dropped owners are pruned on access.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::error::ProtocolError;
use crate::protocol::ProtocolDispatcher;
use crate::registry::{Handle, HandleId, WeakHandle};
use crate::synthesizer::{SynthesisBehavior, Synthesizer};
use crate::value::{PropertyKey, Value};

// ---------------------------------------------------------------------------
// DictionaryBehavior
// ---------------------------------------------------------------------------

/// Hides every key from introspection while leaving reads and writes
/// store-backed.
///
/// Absent descriptors, no prototype, refused definitions, and refused
/// freezes are already the engine defaults, so those need no override.
#[derive(Debug, Clone, Copy, Default)]
pub struct DictionaryBehavior;

impl SynthesisBehavior for DictionaryBehavior {
    fn has_key(
        &self,
        _synth: &Synthesizer,
        _handle: &Handle,
        _key: &PropertyKey,
    ) -> Result<bool, ProtocolError> {
        Ok(false)
    }

    fn enumerate_keys(
        &self,
        _synth: &Synthesizer,
        _handle: &Handle,
    ) -> Result<Vec<PropertyKey>, ProtocolError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Dictionary
// ---------------------------------------------------------------------------

/// Factory for hidden-introspection dictionary handles.
#[derive(Debug)]
pub struct Dictionary {
    synthesizer: Synthesizer,
}

impl Dictionary {
    /// Create a dictionary factory.
    pub fn new() -> Self {
        Self {
            synthesizer: Synthesizer::new(DictionaryBehavior),
        }
    }

    /// Mint a fresh dictionary handle.
    pub fn create(&self) -> Handle {
        self.synthesizer.instantiate()
    }

    /// True exactly for handles minted by this factory.
    pub fn is_dictionary(&self, value: &Value) -> bool {
        self.synthesizer.is_instance(value)
    }

    /// The structural-operation surface for dictionary handles.
    pub fn protocol(&self) -> ProtocolDispatcher<'_> {
        self.synthesizer.protocol()
    }

    /// The underlying synthesizer; lifecycle verbs live there.
    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synthesizer
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// Associates one dictionary handle per owner handle.
///
/// The same owner always resolves to the same dictionary. Owners must be
/// handle-shaped; anything else fails with `NotAnObject`.
#[derive(Debug)]
pub struct StateStore {
    dictionaries: Dictionary,
    by_owner: RefCell<BTreeMap<HandleId, OwnerSlot>>,
}

#[derive(Debug)]
struct OwnerSlot {
    owner: WeakHandle,
    state: Handle,
}

impl StateStore {
    /// Create an empty state store.
    pub fn new() -> Self {
        Self {
            dictionaries: Dictionary::new(),
            by_owner: RefCell::new(BTreeMap::new()),
        }
    }

    /// Resolve (or create) the dictionary handle for `owner`.
    pub fn state_for(&self, owner: &Value) -> Result<Handle, ProtocolError> {
        let Some(owner) = owner.as_handle() else {
            return Err(ProtocolError::NotAnObject {
                type_name: owner.type_name().to_string(),
            });
        };
        let mut by_owner = self.by_owner.borrow_mut();
        by_owner.retain(|_, slot| slot.owner.upgrade().is_some());
        if let Some(slot) = by_owner.get(&owner.id()) {
            return Ok(slot.state.clone());
        }
        let state = self.dictionaries.create();
        tracing::debug!(owner = %owner, state = %state, "state dictionary created");
        by_owner.insert(
            owner.id(),
            OwnerSlot {
                owner: owner.downgrade(),
                state: state.clone(),
            },
        );
        Ok(state)
    }

    /// The dictionary factory backing this store.
    pub fn dictionaries(&self) -> &Dictionary {
        &self.dictionaries
    }

    /// Number of live owner associations (dead ones are pruned first).
    pub fn tracked_owners(&self) -> usize {
        let mut by_owner = self.by_owner.borrow_mut();
        by_owner.retain(|_, slot| slot.owner.upgrade().is_some());
        by_owner.len()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
