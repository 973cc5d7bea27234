//! Synthesizer: behavior table, handle factory, and lifecycle authority.
//!
//! A [`Synthesizer`] owns a handle registry and a boxed
//! [`SynthesisBehavior`]. The behavior trait has one method per override
//! point with store-backed defaults, so a concrete behavior replaces any
//! subset and inherits the rest.
//!
//! Every public operation takes `&self`; interior mutability keeps the
//! engine reentrant, so an override may perform structural operations on
//! the same synthesizer mid-dispatch. No registry borrow is ever held
//! across an override invocation — the only cross-override state is the
//! reentry depth counter.
//!
//! Lifecycle verbs (`lock`, `unlock`, `revoke`), membership checks, and
//! the raw store boundary live here; per-operation pre-checks and result
//! sanitization live in [`crate::protocol::ProtocolDispatcher`].

use std::cell::{Cell, RefCell};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::descriptor::PropertyDescriptor;
use crate::error::ProtocolError;
use crate::lifecycle::{HandlePhase, InstanceState};
use crate::protocol::ProtocolDispatcher;
use crate::registry::{Handle, HandleId, HandleRegistry};
use crate::value::{PropertyKey, Value};

/// Default cap on override reentry depth.
pub const DEFAULT_MAX_OVERRIDE_DEPTH: u32 = 64;

// ---------------------------------------------------------------------------
// SynthesizerConfig
// ---------------------------------------------------------------------------

/// Construction options for a [`Synthesizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizerConfig {
    /// Whether handles behave as invocable and constructible.
    pub callable: bool,
    /// Cap on override reentry depth before the dispatcher fails the
    /// operation instead of overflowing the stack.
    pub max_override_depth: u32,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            callable: false,
            max_override_depth: DEFAULT_MAX_OVERRIDE_DEPTH,
        }
    }
}

// ---------------------------------------------------------------------------
// SynthesisBehavior
// ---------------------------------------------------------------------------

/// Per-kind override points for the structural protocol.
///
/// Every method has a default backed by the handle's property store, or a
/// refusal for the operations a plain store cannot answer. Overrides
/// receive the owning synthesizer and may reenter it through
/// [`Synthesizer::protocol`]; the dispatcher re-checks lifecycle per
/// operation and counts reentry depth, so overrides never need to.
pub trait SynthesisBehavior {
    /// Read a key. Default: store lookup; absent keys read as the sentinel.
    fn read_key(
        &self,
        synth: &Synthesizer,
        handle: &Handle,
        key: &PropertyKey,
    ) -> Result<Value, ProtocolError> {
        Ok(synth.store_read(handle, key)?.unwrap_or(Value::Undefined))
    }

    /// Write a key. Default: store write (the sentinel deletes), always
    /// accepted.
    fn write_key(
        &self,
        synth: &Synthesizer,
        handle: &Handle,
        key: PropertyKey,
        value: Value,
    ) -> Result<bool, ProtocolError> {
        synth.store_write(handle, key, value)?;
        Ok(true)
    }

    /// Delete a key. Default: store removal, reported as accepted whether
    /// or not the key was present — synthetic properties are always
    /// removable.
    fn delete_key(
        &self,
        synth: &Synthesizer,
        handle: &Handle,
        key: &PropertyKey,
    ) -> Result<bool, ProtocolError> {
        let _ = synth.store_delete(handle, key)?;
        Ok(true)
    }

    /// Existence check for a key. Default: store membership of that key.
    fn has_key(
        &self,
        synth: &Synthesizer,
        handle: &Handle,
        key: &PropertyKey,
    ) -> Result<bool, ProtocolError> {
        synth.store_has(handle, key)
    }

    /// Own-key listing. Default: store keys in insertion order.
    fn enumerate_keys(
        &self,
        synth: &Synthesizer,
        handle: &Handle,
    ) -> Result<Vec<PropertyKey>, ProtocolError> {
        synth.store_keys(handle)
    }

    /// Accessor-kind definition. Default: refused — a plain store has no
    /// accessor slots. Data-kind definitions never reach this override;
    /// the dispatcher routes them to [`SynthesisBehavior::write_key`].
    fn define_key(
        &self,
        _synth: &Synthesizer,
        _handle: &Handle,
        _key: PropertyKey,
        _descriptor: PropertyDescriptor,
    ) -> Result<bool, ProtocolError> {
        Ok(false)
    }

    /// Descriptor query. Default: absent.
    fn describe_key(
        &self,
        _synth: &Synthesizer,
        _handle: &Handle,
        _key: &PropertyKey,
    ) -> Result<Option<PropertyDescriptor>, ProtocolError> {
        Ok(None)
    }

    /// Prototype query. Default: no prototype.
    fn get_prototype_of(
        &self,
        _synth: &Synthesizer,
        _handle: &Handle,
    ) -> Result<Option<Handle>, ProtocolError> {
        Ok(None)
    }

    /// Prototype replacement (`None` = no prototype). Default: refused.
    fn set_prototype_of(
        &self,
        _synth: &Synthesizer,
        _handle: &Handle,
        _prototype: Option<Handle>,
    ) -> Result<bool, ProtocolError> {
        Ok(false)
    }

    /// Call the handle. Default: refused.
    fn invoke(
        &self,
        _synth: &Synthesizer,
        _handle: &Handle,
        _this: Value,
        _arguments: Vec<Value>,
    ) -> Result<Value, ProtocolError> {
        Err(ProtocolError::NotCallable)
    }

    /// Construct with the handle as the recipe. Default: refused.
    fn construct(
        &self,
        _synth: &Synthesizer,
        _handle: &Handle,
        _arguments: Vec<Value>,
        _new_target: Option<Handle>,
    ) -> Result<Value, ProtocolError> {
        Err(ProtocolError::NotConstructible)
    }
}

/// The all-defaults behavior: every operation answered by the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreBehavior;

impl SynthesisBehavior for StoreBehavior {}

// ---------------------------------------------------------------------------
// Synthesizer
// ---------------------------------------------------------------------------

/// Factory and lifecycle authority for one family of synthetic handles.
pub struct Synthesizer {
    behavior: Box<dyn SynthesisBehavior>,
    config: SynthesizerConfig,
    registry: RefCell<HandleRegistry>,
    depth: Cell<u32>,
}

impl Synthesizer {
    /// Non-callable synthesizer with default config.
    pub fn new(behavior: impl SynthesisBehavior + 'static) -> Self {
        Self::with_config(behavior, SynthesizerConfig::default())
    }

    /// Synthesizer whose handles are invocable and constructible.
    pub fn callable(behavior: impl SynthesisBehavior + 'static) -> Self {
        Self::with_config(
            behavior,
            SynthesizerConfig {
                callable: true,
                ..SynthesizerConfig::default()
            },
        )
    }

    /// Full-control constructor.
    pub fn with_config(
        behavior: impl SynthesisBehavior + 'static,
        config: SynthesizerConfig,
    ) -> Self {
        Self {
            behavior: Box::new(behavior),
            config,
            registry: RefCell::new(HandleRegistry::new()),
            depth: Cell::new(0),
        }
    }

    /// Construction-time options.
    pub fn config(&self) -> &SynthesizerConfig {
        &self.config
    }

    /// Whether handles behave as invocable and constructible.
    pub fn is_callable(&self) -> bool {
        self.config.callable
    }

    // -- factory & membership ----------------------------------------------

    /// Mint a fresh active handle. Never fails.
    pub fn instantiate(&self) -> Handle {
        let handle = self.registry.borrow_mut().register();
        tracing::debug!(handle = %handle, "instantiated synthetic handle");
        handle
    }

    /// Membership test over arbitrary values. Never fails; non-handle
    /// values are simply not instances.
    pub fn is_instance(&self, value: &Value) -> bool {
        value.as_handle().is_some_and(|handle| self.owns(handle))
    }

    /// Membership test for a handle.
    pub fn owns(&self, handle: &Handle) -> bool {
        self.registry.borrow().contains(handle)
    }

    // -- lifecycle ----------------------------------------------------------

    /// Current phase. Fails with `NotAnInstance` for foreign handles.
    pub fn phase(&self, handle: &Handle) -> Result<HandlePhase, ProtocolError> {
        self.with_state(handle, |state| state.phase())
    }

    /// Reject mutating operations on the handle until [`Synthesizer::unlock`].
    /// No-op if already locked; revoked handles stay revoked.
    pub fn lock(&self, handle: &Handle) -> Result<(), ProtocolError> {
        self.with_state_mut(handle, |state| {
            if state.lock() {
                tracing::debug!(handle = %handle, "handle locked");
            }
        })
    }

    /// Lift a lock. No-op if not locked; revoked handles stay revoked.
    pub fn unlock(&self, handle: &Handle) -> Result<(), ProtocolError> {
        self.with_state_mut(handle, |state| {
            if state.unlock() {
                tracing::debug!(handle = %handle, "handle unlocked");
            }
        })
    }

    /// Permanently revoke the handle. Idempotent; the first revocation
    /// clears the property store.
    pub fn revoke(&self, handle: &Handle) -> Result<(), ProtocolError> {
        self.with_state_mut(handle, |state| {
            if state.revoke() {
                tracing::debug!(handle = %handle, "handle revoked");
            }
        })
    }

    /// Whether the handle has been revoked. Fails with `NotAnInstance` for
    /// foreign handles.
    pub fn is_revoked(&self, handle: &Handle) -> Result<bool, ProtocolError> {
        Ok(self.phase(handle)?.is_revoked())
    }

    /// Snapshot the handle's state for diagnostics. Fails with
    /// `NotAnInstance` for foreign handles.
    pub fn state(&self, handle: &Handle) -> Result<InstanceSnapshot, ProtocolError> {
        self.with_state(handle, |state| InstanceSnapshot {
            handle: handle.id(),
            label: handle.label().to_string(),
            phase: state.phase(),
            key_count: state.store().len(),
        })
    }

    // -- registry maintenance ----------------------------------------------

    /// Count of registry entries whose handle is still alive.
    pub fn live_instances(&self) -> usize {
        let mut registry = self.registry.borrow_mut();
        registry.sweep();
        registry.len()
    }

    /// Prune registry entries for dropped handles. Returns the number
    /// pruned.
    pub fn sweep(&self) -> usize {
        self.registry.borrow_mut().sweep()
    }

    // -- store boundary ------------------------------------------------------

    /// Read straight from the handle's store. Store access is a pure data
    /// operation with no lifecycle gating; the dispatcher gates.
    pub fn store_read(
        &self,
        handle: &Handle,
        key: &PropertyKey,
    ) -> Result<Option<Value>, ProtocolError> {
        self.with_state(handle, |state| state.store().read(key).cloned())
    }

    /// Write straight to the handle's store (the sentinel deletes).
    pub fn store_write(
        &self,
        handle: &Handle,
        key: PropertyKey,
        value: Value,
    ) -> Result<(), ProtocolError> {
        self.with_state_mut(handle, |state| state.store_mut().write(key, value))
    }

    /// Delete straight from the handle's store; true iff the key existed.
    pub fn store_delete(
        &self,
        handle: &Handle,
        key: &PropertyKey,
    ) -> Result<bool, ProtocolError> {
        self.with_state_mut(handle, |state| state.store_mut().delete(key))
    }

    /// Store membership for a key.
    pub fn store_has(&self, handle: &Handle, key: &PropertyKey) -> Result<bool, ProtocolError> {
        self.with_state(handle, |state| state.store().has(key))
    }

    /// Store keys in insertion order.
    pub fn store_keys(&self, handle: &Handle) -> Result<Vec<PropertyKey>, ProtocolError> {
        self.with_state(handle, |state| state.store().keys().cloned().collect())
    }

    // -- protocol internals --------------------------------------------------

    /// The structural-operation surface for this synthesizer's handles.
    pub fn protocol(&self) -> ProtocolDispatcher<'_> {
        ProtocolDispatcher::new(self)
    }

    /// Current override nesting depth (nonzero only mid-dispatch).
    pub fn override_depth(&self) -> u32 {
        self.depth.get()
    }

    pub(crate) fn behavior(&self) -> &dyn SynthesisBehavior {
        self.behavior.as_ref()
    }

    pub(crate) fn ensure_instance(&self, handle: &Handle) -> Result<(), ProtocolError> {
        if self.owns(handle) {
            Ok(())
        } else {
            Err(ProtocolError::NotAnInstance {
                handle: handle.id(),
            })
        }
    }

    /// RAII reentry accounting around one override invocation.
    pub(crate) fn enter_override(&self) -> Result<OverrideGuard<'_>, ProtocolError> {
        let depth = self.depth.get() + 1;
        let limit = self.config.max_override_depth;
        if depth > limit {
            tracing::warn!(depth, limit, "override reentry limit hit");
            return Err(ProtocolError::OverrideDepthExceeded { depth, limit });
        }
        self.depth.set(depth);
        Ok(OverrideGuard { synthesizer: self })
    }

    fn with_state<R>(
        &self,
        handle: &Handle,
        f: impl FnOnce(&InstanceState) -> R,
    ) -> Result<R, ProtocolError> {
        let registry = self.registry.borrow();
        match registry.state(handle) {
            Some(state) => Ok(f(state)),
            None => Err(ProtocolError::NotAnInstance {
                handle: handle.id(),
            }),
        }
    }

    fn with_state_mut<R>(
        &self,
        handle: &Handle,
        f: impl FnOnce(&mut InstanceState) -> R,
    ) -> Result<R, ProtocolError> {
        let mut registry = self.registry.borrow_mut();
        match registry.state_mut(handle) {
            Some(state) => Ok(f(state)),
            None => Err(ProtocolError::NotAnInstance {
                handle: handle.id(),
            }),
        }
    }
}

impl Default for Synthesizer {
    /// Store-backed and non-callable.
    fn default() -> Self {
        Self::new(StoreBehavior)
    }
}

impl fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instances = self.registry.try_borrow().map_or(0, |r| r.len());
        f.debug_struct("Synthesizer")
            .field("config", &self.config)
            .field("instances", &instances)
            .field("depth", &self.depth.get())
            .finish_non_exhaustive()
    }
}

/// Decrements the reentry depth when an override invocation unwinds.
pub(crate) struct OverrideGuard<'a> {
    synthesizer: &'a Synthesizer,
}

impl Drop for OverrideGuard<'_> {
    fn drop(&mut self) {
        let depth = self.synthesizer.depth.get();
        self.synthesizer.depth.set(depth.saturating_sub(1));
    }
}

// ---------------------------------------------------------------------------
// InstanceSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time diagnostic view of one handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub handle: HandleId,
    /// Instantiation-time diagnostic label.
    pub label: String,
    pub phase: HandlePhase,
    /// Number of keys currently stored.
    pub key_count: usize,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
