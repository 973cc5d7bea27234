//! Runtime values, property keys, and symbol minting.
//!
//! The value universe is deliberately closed:
//!
//! - **`Value`**: absent sentinel, null, bool, 64-bit int, string, symbol,
//!   or an opaque synthesizer-minted handle
//! - **`PropertyKey`**: string or symbol, the only admissible key shapes
//! - **`SymbolTable`**: fresh symbol minting plus a stable intern pool
//!
//! Key-type sanitation lives here as [`PropertyKey::from_value`]: values
//! that are not atomic identifiers are filtered out, never coerced.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::registry::Handle;

// ---------------------------------------------------------------------------
// SymbolId / PropertyKey
// ---------------------------------------------------------------------------

/// Unique symbol identifier minted by a [`SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

/// A property key: either a string or a symbol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PropertyKey {
    /// String key.
    String(String),
    /// Symbol key (references a [`SymbolTable`]).
    Symbol(SymbolId),
}

impl PropertyKey {
    /// Key-type sanitation: admit only atomic identifiers.
    ///
    /// Strings and symbols convert; every other value shape yields `None`.
    /// There is no implicit number-to-string coercion — callers that want
    /// numeric keys convert explicitly.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(Self::String(s.clone())),
            Value::Symbol(id) => Some(Self::Symbol(*id)),
            _ => None,
        }
    }

    /// True for string keys.
    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// True for symbol keys.
    pub fn is_symbol(&self) -> bool {
        matches!(self, Self::Symbol(_))
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Symbol(id) => write!(f, "Symbol({})", id.0),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<SymbolId> for PropertyKey {
    fn from(id: SymbolId) -> Self {
        Self::Symbol(id)
    }
}

// ---------------------------------------------------------------------------
// Value — the closed runtime value universe
// ---------------------------------------------------------------------------

/// A runtime value.
///
/// `Undefined` doubles as the absent sentinel: reading a missing key yields
/// it, and writing it to a key removes the key instead of storing it.
/// Handles compare by reference identity, so equality of two `Handle`
/// values means "the same instantiation".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// The absent sentinel.
    Undefined,
    /// Explicit null (distinct from absent).
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Symbol(SymbolId),
    /// An opaque synthesizer-minted handle; the only "object/callable-shaped"
    /// value in the universe.
    Handle(Handle),
}

impl Value {
    /// True for the absent sentinel.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// True for handle values.
    pub fn is_handle(&self) -> bool {
        matches!(self, Self::Handle(_))
    }

    /// Borrow the handle if this value is one.
    pub fn as_handle(&self) -> Option<&Handle> {
        match self {
            Self::Handle(h) => Some(h),
            _ => None,
        }
    }

    /// Shape name for diagnostics and shape-mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Handle(_) => "handle",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Symbol(id) => write!(f, "Symbol({})", id.0),
            Self::Handle(h) => write!(f, "[{h}]"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Handle> for Value {
    fn from(h: Handle) -> Self {
        Self::Handle(h)
    }
}

// ---------------------------------------------------------------------------
// SymbolTable — minting and interning
// ---------------------------------------------------------------------------

/// Mints fresh symbols and interns well-known names.
///
/// `mint` never returns the same id twice for one table; `intern` returns
/// the same id for the same name. Descriptions exist for diagnostics only,
/// never for identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolTable {
    next: u32,
    /// Name → id mapping for interned symbols.
    by_name: BTreeMap<String, SymbolId>,
    /// Id → description mapping for diagnostics.
    descriptions: BTreeMap<SymbolId, String>,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh symbol with the given description.
    pub fn mint(&mut self, description: impl Into<String>) -> SymbolId {
        let id = SymbolId(self.next);
        self.next += 1;
        self.descriptions.insert(id, description.into());
        id
    }

    /// Intern a named symbol: the same name always yields the same id.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.mint(name);
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Description recorded when the symbol was minted.
    pub fn description(&self, id: SymbolId) -> Option<&str> {
        self.descriptions.get(&id).map(String::as_str)
    }

    /// Number of symbols minted so far.
    pub fn minted(&self) -> usize {
        self.descriptions.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
