//! The structural-operation dispatcher.
//!
//! Thirteen operations front every handle. Each one resolves the handle
//! first (foreign handles fail with `NotAnInstance`), applies the
//! lifecycle pre-check, then either refuses without running any override
//! or invokes the behavior inside the reentry guard and sanitizes the
//! result:
//!
//! - reads (`has`, `get`, `is_extensible`) fail on revoked handles
//! - mutations (`set`, `delete`, `define_key`, `set_prototype_of`) report
//!   `false` on locked or revoked handles, override never consulted
//! - queries (`describe_key`, `enumerate_keys`, `get_prototype_of`)
//!   degrade to absent/empty on revoked handles
//! - `prevent_extensions` reports `false` in every phase
//! - `invoke`/`construct` refuse on non-callable synthesizers before the
//!   lifecycle check
//!
//! Sanitization is what overrides cannot opt out of: descriptor
//! admissibility, duplicate-key suppression, and prototype shape
//! filtering. The reentry guard is the only state alive across an
//! override invocation, so overrides may freely reenter the protocol.

use std::collections::BTreeSet;

use crate::descriptor::PropertyDescriptor;
use crate::error::ProtocolError;
use crate::registry::Handle;
use crate::synthesizer::Synthesizer;
use crate::value::{PropertyKey, Value};

/// Operation surface for one synthesizer's handles.
///
/// Borrowed from [`Synthesizer::protocol`]; cheap to create per call site.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolDispatcher<'a> {
    synthesizer: &'a Synthesizer,
}

impl<'a> ProtocolDispatcher<'a> {
    pub(crate) fn new(synthesizer: &'a Synthesizer) -> Self {
        Self { synthesizer }
    }

    /// The synthesizer this dispatcher fronts.
    pub fn synthesizer(&self) -> &'a Synthesizer {
        self.synthesizer
    }

    // -- reads ---------------------------------------------------------------

    /// Existence check. Fails on revoked handles.
    pub fn has(&self, handle: &Handle, key: &PropertyKey) -> Result<bool, ProtocolError> {
        self.ensure_live(handle)?;
        let synth = self.synthesizer;
        let _guard = synth.enter_override()?;
        synth.behavior().has_key(synth, handle, key)
    }

    /// Read a key; absent keys read as the sentinel. Fails on revoked
    /// handles.
    pub fn get(&self, handle: &Handle, key: &PropertyKey) -> Result<Value, ProtocolError> {
        self.ensure_live(handle)?;
        let synth = self.synthesizer;
        let _guard = synth.enter_override()?;
        synth.behavior().read_key(synth, handle, key)
    }

    /// Extensibility query: handles always present as extensible. Fails on
    /// revoked handles.
    pub fn is_extensible(&self, handle: &Handle) -> Result<bool, ProtocolError> {
        self.ensure_live(handle)?;
        Ok(true)
    }

    // -- mutations -----------------------------------------------------------

    /// Write a key. Locked and revoked handles reject without consulting
    /// the override.
    pub fn set(
        &self,
        handle: &Handle,
        key: PropertyKey,
        value: Value,
    ) -> Result<bool, ProtocolError> {
        if !self.mutation_admitted(handle, "set")? {
            return Ok(false);
        }
        let synth = self.synthesizer;
        let _guard = synth.enter_override()?;
        synth.behavior().write_key(synth, handle, key, value)
    }

    /// Delete a key. Locked and revoked handles reject without consulting
    /// the override.
    pub fn delete(&self, handle: &Handle, key: &PropertyKey) -> Result<bool, ProtocolError> {
        if !self.mutation_admitted(handle, "delete")? {
            return Ok(false);
        }
        let synth = self.synthesizer;
        let _guard = synth.enter_override()?;
        synth.behavior().delete_key(synth, handle, key)
    }

    /// Define a property from a descriptor. Pinned descriptors reject;
    /// data descriptors route to the write override with their value,
    /// accessor descriptors reach the define override intact.
    pub fn define_key(
        &self,
        handle: &Handle,
        key: PropertyKey,
        descriptor: PropertyDescriptor,
    ) -> Result<bool, ProtocolError> {
        if !self.mutation_admitted(handle, "define_key")? {
            return Ok(false);
        }
        if let Err(violation) = descriptor.validate() {
            tracing::debug!(handle = %handle, key = %key, %violation, "definition rejected");
            return Ok(false);
        }
        let synth = self.synthesizer;
        let _guard = synth.enter_override()?;
        match descriptor {
            PropertyDescriptor::Data { value, .. } => {
                synth.behavior().write_key(synth, handle, key, value)
            }
            accessor @ PropertyDescriptor::Accessor { .. } => {
                synth.behavior().define_key(synth, handle, key, accessor)
            }
        }
    }

    /// Replace the prototype. Only null (no prototype) and handle shapes
    /// are forwarded; any other shape rejects. Locked and revoked handles
    /// reject.
    pub fn set_prototype_of(
        &self,
        handle: &Handle,
        prototype: Value,
    ) -> Result<bool, ProtocolError> {
        if !self.mutation_admitted(handle, "set_prototype_of")? {
            return Ok(false);
        }
        let prototype = match prototype {
            Value::Null => None,
            Value::Handle(proto) => Some(proto),
            other => {
                tracing::debug!(
                    handle = %handle,
                    shape = other.type_name(),
                    "prototype shape rejected"
                );
                return Ok(false);
            }
        };
        let synth = self.synthesizer;
        let _guard = synth.enter_override()?;
        synth.behavior().set_prototype_of(synth, handle, prototype)
    }

    /// Freeze refusal: extensibility can never be prevented through this
    /// protocol, in any phase.
    pub fn prevent_extensions(&self, handle: &Handle) -> Result<bool, ProtocolError> {
        self.synthesizer.ensure_instance(handle)?;
        Ok(false)
    }

    // -- degraded-on-revoked queries -----------------------------------------

    /// Query a key's descriptor. Revoked handles answer absent; results
    /// failing admissibility degrade to absent.
    pub fn describe_key(
        &self,
        handle: &Handle,
        key: &PropertyKey,
    ) -> Result<Option<PropertyDescriptor>, ProtocolError> {
        if self.synthesizer.phase(handle)?.is_revoked() {
            return Ok(None);
        }
        let synth = self.synthesizer;
        let described = {
            let _guard = synth.enter_override()?;
            synth.behavior().describe_key(synth, handle, key)?
        };
        match described {
            None => Ok(None),
            Some(descriptor) => match descriptor.validate() {
                Ok(()) => Ok(Some(descriptor)),
                Err(violation) => {
                    tracing::debug!(
                        handle = %handle,
                        key = %key,
                        %violation,
                        "descriptor discarded"
                    );
                    Ok(None)
                }
            },
        }
    }

    /// List own keys. Revoked handles answer empty; duplicate keys are
    /// dropped, first occurrence wins.
    pub fn enumerate_keys(&self, handle: &Handle) -> Result<Vec<PropertyKey>, ProtocolError> {
        if self.synthesizer.phase(handle)?.is_revoked() {
            return Ok(Vec::new());
        }
        let synth = self.synthesizer;
        let raw = {
            let _guard = synth.enter_override()?;
            synth.behavior().enumerate_keys(synth, handle)?
        };
        let mut seen = BTreeSet::new();
        let mut keys = Vec::with_capacity(raw.len());
        let mut dropped = 0usize;
        for key in raw {
            if seen.insert(key.clone()) {
                keys.push(key);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::debug!(handle = %handle, dropped, "duplicate keys dropped from enumeration");
        }
        Ok(keys)
    }

    /// Prototype query. Revoked handles answer no-prototype.
    pub fn get_prototype_of(&self, handle: &Handle) -> Result<Option<Handle>, ProtocolError> {
        if self.synthesizer.phase(handle)?.is_revoked() {
            return Ok(None);
        }
        let synth = self.synthesizer;
        let _guard = synth.enter_override()?;
        synth.behavior().get_prototype_of(synth, handle)
    }

    // -- invocation ----------------------------------------------------------

    /// Call the handle. Non-callable synthesizers refuse before the
    /// lifecycle check; revoked handles fail.
    pub fn invoke(
        &self,
        handle: &Handle,
        this: Value,
        arguments: Vec<Value>,
    ) -> Result<Value, ProtocolError> {
        self.synthesizer.ensure_instance(handle)?;
        if !self.synthesizer.is_callable() {
            return Err(ProtocolError::NotCallable);
        }
        self.ensure_live(handle)?;
        let synth = self.synthesizer;
        let _guard = synth.enter_override()?;
        synth.behavior().invoke(synth, handle, this, arguments)
    }

    /// Construct with the handle as the recipe. Non-callable synthesizers
    /// refuse before the lifecycle check; revoked handles fail.
    pub fn construct(
        &self,
        handle: &Handle,
        arguments: Vec<Value>,
        new_target: Option<Handle>,
    ) -> Result<Value, ProtocolError> {
        self.synthesizer.ensure_instance(handle)?;
        if !self.synthesizer.is_callable() {
            return Err(ProtocolError::NotConstructible);
        }
        self.ensure_live(handle)?;
        let synth = self.synthesizer;
        let _guard = synth.enter_override()?;
        synth.behavior().construct(synth, handle, arguments, new_target)
    }

    // -- pre-checks ----------------------------------------------------------

    fn ensure_live(&self, handle: &Handle) -> Result<(), ProtocolError> {
        if self.synthesizer.phase(handle)?.is_revoked() {
            Err(ProtocolError::Revoked {
                handle: handle.id(),
            })
        } else {
            Ok(())
        }
    }

    fn mutation_admitted(&self, handle: &Handle, op: &'static str) -> Result<bool, ProtocolError> {
        let phase = self.synthesizer.phase(handle)?;
        if phase.allows_mutation() {
            Ok(true)
        } else {
            tracing::debug!(handle = %handle, phase = %phase, op, "mutation rejected");
            Ok(false)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesizer::{StoreBehavior, SynthesisBehavior};

    fn str_key(s: &str) -> PropertyKey {
        PropertyKey::String(s.to_string())
    }

    fn int_val(n: i64) -> Value {
        Value::Int(n)
    }

    // -- behaviors used by the tests ------------------------------------

    /// Answers `describe_key` with a data descriptor whose removability
    /// depends on the key name.
    struct PinningDescriber;

    impl SynthesisBehavior for PinningDescriber {
        fn describe_key(
            &self,
            _synth: &Synthesizer,
            _handle: &Handle,
            key: &PropertyKey,
        ) -> Result<Option<PropertyDescriptor>, ProtocolError> {
            let descriptor = match key {
                PropertyKey::String(name) if name == "pinned" => {
                    PropertyDescriptor::data_pinned(int_val(1))
                }
                PropertyKey::String(name) if name == "plain" => {
                    PropertyDescriptor::data(int_val(2))
                }
                _ => return Ok(None),
            };
            Ok(Some(descriptor))
        }
    }

    /// Enumerates the same key several times.
    struct Stutterer;

    impl SynthesisBehavior for Stutterer {
        fn enumerate_keys(
            &self,
            _synth: &Synthesizer,
            _handle: &Handle,
        ) -> Result<Vec<PropertyKey>, ProtocolError> {
            Ok(vec![
                str_key("a"),
                str_key("b"),
                str_key("a"),
                str_key("c"),
                str_key("b"),
            ])
        }
    }

    /// Accepts any forwarded prototype.
    struct ProtoAccepter;

    impl SynthesisBehavior for ProtoAccepter {
        fn set_prototype_of(
            &self,
            _synth: &Synthesizer,
            _handle: &Handle,
            _prototype: Option<Handle>,
        ) -> Result<bool, ProtocolError> {
            Ok(true)
        }
    }

    /// Reads the same key through the protocol, forever.
    struct SelfReader;

    impl SynthesisBehavior for SelfReader {
        fn read_key(
            &self,
            synth: &Synthesizer,
            handle: &Handle,
            key: &PropertyKey,
        ) -> Result<Value, ProtocolError> {
            synth.protocol().get(handle, key)
        }
    }

    // -----------------------------------------------------------------------
    // 1. Default round-trips
    // -----------------------------------------------------------------------

    #[test]
    fn set_get_round_trip() {
        let synth = Synthesizer::default();
        let handle = synth.instantiate();
        let protocol = synth.protocol();
        assert!(protocol.set(&handle, str_key("x"), int_val(42)).unwrap());
        assert_eq!(protocol.get(&handle, &str_key("x")).unwrap(), int_val(42));
        assert!(protocol.has(&handle, &str_key("x")).unwrap());
    }

    #[test]
    fn absent_keys_read_as_the_sentinel() {
        let synth = Synthesizer::default();
        let handle = synth.instantiate();
        assert_eq!(
            synth.protocol().get(&handle, &str_key("ghost")).unwrap(),
            Value::Undefined
        );
    }

    #[test]
    fn setting_the_sentinel_deletes() {
        let synth = Synthesizer::default();
        let handle = synth.instantiate();
        let protocol = synth.protocol();
        protocol.set(&handle, str_key("x"), int_val(1)).unwrap();
        assert!(protocol.set(&handle, str_key("x"), Value::Undefined).unwrap());
        assert!(!protocol.has(&handle, &str_key("x")).unwrap());
    }

    #[test]
    fn delete_accepts_even_absent_keys() {
        let synth = Synthesizer::default();
        let handle = synth.instantiate();
        assert!(synth.protocol().delete(&handle, &str_key("ghost")).unwrap());
    }

    #[test]
    fn enumerate_lists_keys_in_insertion_order() {
        let synth = Synthesizer::default();
        let handle = synth.instantiate();
        let protocol = synth.protocol();
        protocol.set(&handle, str_key("z"), int_val(1)).unwrap();
        protocol.set(&handle, str_key("a"), int_val(2)).unwrap();
        assert_eq!(
            protocol.enumerate_keys(&handle).unwrap(),
            vec![str_key("z"), str_key("a")]
        );
    }

    // -----------------------------------------------------------------------
    // 2. Foreign handles
    // -----------------------------------------------------------------------

    // Callable home synthesizer, so a callability refusal can never mask
    // the instance check.
    #[test]
    fn every_operation_fails_on_foreign_handles() {
        let home = Synthesizer::callable(StoreBehavior);
        let foreign = Synthesizer::default().instantiate();
        let protocol = home.protocol();
        let expected = ProtocolError::NotAnInstance {
            handle: foreign.id(),
        };
        assert_eq!(protocol.has(&foreign, &str_key("k")), Err(expected.clone()));
        assert_eq!(protocol.get(&foreign, &str_key("k")), Err(expected.clone()));
        assert_eq!(
            protocol.set(&foreign, str_key("k"), int_val(1)),
            Err(expected.clone())
        );
        assert_eq!(protocol.delete(&foreign, &str_key("k")), Err(expected.clone()));
        assert_eq!(
            protocol.define_key(&foreign, str_key("k"), PropertyDescriptor::data(int_val(1))),
            Err(expected.clone())
        );
        assert_eq!(
            protocol.describe_key(&foreign, &str_key("k")),
            Err(expected.clone())
        );
        assert_eq!(protocol.enumerate_keys(&foreign), Err(expected.clone()));
        assert_eq!(protocol.get_prototype_of(&foreign), Err(expected.clone()));
        assert_eq!(
            protocol.set_prototype_of(&foreign, Value::Null),
            Err(expected.clone())
        );
        assert_eq!(protocol.is_extensible(&foreign), Err(expected.clone()));
        assert_eq!(protocol.prevent_extensions(&foreign), Err(expected.clone()));
        assert_eq!(
            protocol.invoke(&foreign, Value::Undefined, Vec::new()),
            Err(expected.clone())
        );
        assert_eq!(protocol.construct(&foreign, Vec::new(), None), Err(expected));
    }

    // -----------------------------------------------------------------------
    // 3. Lock enforcement
    // -----------------------------------------------------------------------

    #[test]
    fn locked_handles_reject_mutations_and_answer_reads() {
        let synth = Synthesizer::default();
        let handle = synth.instantiate();
        let protocol = synth.protocol();
        protocol.set(&handle, str_key("x"), int_val(1)).unwrap();
        synth.lock(&handle).unwrap();

        assert!(!protocol.set(&handle, str_key("x"), int_val(2)).unwrap());
        assert!(!protocol.delete(&handle, &str_key("x")).unwrap());
        assert!(!protocol
            .define_key(&handle, str_key("y"), PropertyDescriptor::data(int_val(3)))
            .unwrap());
        assert!(!protocol.set_prototype_of(&handle, Value::Null).unwrap());

        assert_eq!(protocol.get(&handle, &str_key("x")).unwrap(), int_val(1));
        assert!(protocol.has(&handle, &str_key("x")).unwrap());
        assert_eq!(protocol.enumerate_keys(&handle).unwrap(), vec![str_key("x")]);
        assert!(protocol.is_extensible(&handle).unwrap());
    }

    // -----------------------------------------------------------------------
    // 4. Revocation
    // -----------------------------------------------------------------------

    #[test]
    fn revoked_handles_degrade_every_operation() {
        let synth = Synthesizer::default();
        let handle = synth.instantiate();
        let protocol = synth.protocol();
        protocol.set(&handle, str_key("x"), int_val(1)).unwrap();
        synth.revoke(&handle).unwrap();

        let revoked = ProtocolError::Revoked {
            handle: handle.id(),
        };
        assert_eq!(protocol.get(&handle, &str_key("x")), Err(revoked.clone()));
        assert_eq!(protocol.has(&handle, &str_key("x")), Err(revoked.clone()));
        assert_eq!(protocol.is_extensible(&handle), Err(revoked));

        assert!(!protocol.set(&handle, str_key("x"), int_val(2)).unwrap());
        assert!(!protocol.delete(&handle, &str_key("x")).unwrap());
        assert_eq!(protocol.describe_key(&handle, &str_key("x")).unwrap(), None);
        assert_eq!(protocol.enumerate_keys(&handle).unwrap(), Vec::new());
        assert_eq!(protocol.get_prototype_of(&handle).unwrap(), None);
        assert!(!protocol.prevent_extensions(&handle).unwrap());
    }

    // -----------------------------------------------------------------------
    // 5. Descriptor handling
    // -----------------------------------------------------------------------

    #[test]
    fn data_definition_routes_to_the_write_override() {
        let synth = Synthesizer::default();
        let handle = synth.instantiate();
        let protocol = synth.protocol();
        assert!(protocol
            .define_key(&handle, str_key("x"), PropertyDescriptor::data(int_val(7)))
            .unwrap());
        assert_eq!(protocol.get(&handle, &str_key("x")).unwrap(), int_val(7));
    }

    #[test]
    fn pinned_definitions_reject_without_mutating() {
        let synth = Synthesizer::default();
        let handle = synth.instantiate();
        let protocol = synth.protocol();
        assert!(!protocol
            .define_key(&handle, str_key("x"), PropertyDescriptor::data_pinned(int_val(7)))
            .unwrap());
        assert!(!protocol.has(&handle, &str_key("x")).unwrap());
    }

    #[test]
    fn accessor_definitions_hit_the_define_override() {
        let synth = Synthesizer::default();
        let handle = synth.instantiate();
        assert!(!synth
            .protocol()
            .define_key(&handle, str_key("x"), PropertyDescriptor::accessor(None, None))
            .unwrap());
    }

    #[test]
    fn described_pinned_descriptors_degrade_to_absent() {
        let synth = Synthesizer::new(PinningDescriber);
        let handle = synth.instantiate();
        let protocol = synth.protocol();
        assert_eq!(protocol.describe_key(&handle, &str_key("pinned")).unwrap(), None);
        assert_eq!(
            protocol.describe_key(&handle, &str_key("plain")).unwrap(),
            Some(PropertyDescriptor::data(int_val(2)))
        );
        assert_eq!(protocol.describe_key(&handle, &str_key("other")).unwrap(), None);
    }

    // -----------------------------------------------------------------------
    // 6. Enumeration sanitization
    // -----------------------------------------------------------------------

    #[test]
    fn duplicate_keys_are_dropped_first_occurrence_wins() {
        let synth = Synthesizer::new(Stutterer);
        let handle = synth.instantiate();
        assert_eq!(
            synth.protocol().enumerate_keys(&handle).unwrap(),
            vec![str_key("a"), str_key("b"), str_key("c")]
        );
    }

    // -----------------------------------------------------------------------
    // 7. Prototype shapes
    // -----------------------------------------------------------------------

    #[test]
    fn prototype_shapes_are_filtered_before_the_override() {
        let synth = Synthesizer::new(ProtoAccepter);
        let handle = synth.instantiate();
        let other = synth.instantiate();
        let protocol = synth.protocol();
        assert!(protocol.set_prototype_of(&handle, Value::Null).unwrap());
        assert!(protocol
            .set_prototype_of(&handle, Value::Handle(other))
            .unwrap());
        assert!(!protocol.set_prototype_of(&handle, Value::Int(3)).unwrap());
        assert!(!protocol.set_prototype_of(&handle, Value::Undefined).unwrap());
        assert!(!protocol
            .set_prototype_of(&handle, Value::Str("p".to_string()))
            .unwrap());
    }

    // -----------------------------------------------------------------------
    // 8. Invocation gates
    // -----------------------------------------------------------------------

    #[test]
    fn non_callable_synthesizers_refuse_invocation() {
        let synth = Synthesizer::default();
        let handle = synth.instantiate();
        let protocol = synth.protocol();
        assert_eq!(
            protocol.invoke(&handle, Value::Undefined, Vec::new()),
            Err(ProtocolError::NotCallable)
        );
        assert_eq!(
            protocol.construct(&handle, Vec::new(), None),
            Err(ProtocolError::NotConstructible)
        );
    }

    #[test]
    fn callable_default_behavior_still_refuses() {
        let synth = Synthesizer::callable(StoreBehavior);
        let handle = synth.instantiate();
        assert_eq!(
            synth.protocol().invoke(&handle, Value::Undefined, Vec::new()),
            Err(ProtocolError::NotCallable)
        );
    }

    // -----------------------------------------------------------------------
    // 9. Reentry guard
    // -----------------------------------------------------------------------

    #[test]
    fn runaway_reentry_fails_instead_of_overflowing() {
        let synth = Synthesizer::new(SelfReader);
        let handle = synth.instantiate();
        let result = synth.protocol().get(&handle, &str_key("loop"));
        assert!(matches!(
            result,
            Err(ProtocolError::OverrideDepthExceeded { .. })
        ));
        assert_eq!(synth.override_depth(), 0);
    }
}
