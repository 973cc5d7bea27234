#![forbid(unsafe_code)]

//! Virtual-object protocol engine.
//!
//! A [`Synthesizer`] defines the complete externally observable behavior
//! of a family of opaque [`Handle`]s: every structural operation
//! (existence check, read, write, delete, enumeration, prototype get/set,
//! extensibility, descriptor define/query, invocation, construction) is
//! relayed through a [`ProtocolDispatcher`] to overridable per-kind logic,
//! while the dispatcher enforces what overrides cannot opt out of:
//! descriptor admissibility, duplicate-key suppression, prototype shape
//! filtering, lock enforcement, and one-way revocation.
//!
//! ```
//! use synthetic_engine::{PropertyKey, Synthesizer, Value};
//!
//! # fn main() -> Result<(), synthetic_engine::ProtocolError> {
//! let synth = Synthesizer::default();
//! let handle = synth.instantiate();
//! let protocol = synth.protocol();
//!
//! protocol.set(&handle, PropertyKey::from("x"), Value::Int(42))?;
//! assert_eq!(protocol.get(&handle, &PropertyKey::from("x"))?, Value::Int(42));
//!
//! synth.lock(&handle)?;
//! assert!(!protocol.set(&handle, PropertyKey::from("x"), Value::Int(7))?);
//!
//! synth.revoke(&handle)?;
//! assert!(protocol.get(&handle, &PropertyKey::from("x")).is_err());
//! # Ok(())
//! # }
//! ```

pub mod descriptor;
pub mod dictionary;
pub mod error;
pub mod lifecycle;
pub mod protocol;
pub mod registry;
pub mod store;
pub mod synthesizer;
pub mod value;

pub use descriptor::{DescriptorViolation, PropertyDescriptor};
pub use dictionary::{Dictionary, DictionaryBehavior, StateStore};
pub use error::ProtocolError;
pub use lifecycle::{HandlePhase, InstanceState};
pub use protocol::ProtocolDispatcher;
pub use registry::{Handle, HandleId, HandleRegistry, WeakHandle};
pub use store::PropertyStore;
pub use synthesizer::{
    DEFAULT_MAX_OVERRIDE_DEPTH, InstanceSnapshot, StoreBehavior, SynthesisBehavior, Synthesizer,
    SynthesizerConfig,
};
pub use value::{PropertyKey, SymbolId, SymbolTable, Value};
