//! Abstract property descriptors.
//!
//! A descriptor is either data-shaped (a value) or accessor-shaped (getter
//! and/or setter handles), plus a `removable` flag. The protocol only
//! admits removable descriptors, in both directions: definitions carrying a
//! pinned descriptor are rejected, and descriptor query results that come
//! back pinned are degraded to absent.
//!
//! [`PropertyDescriptor::validate`] is the pure self-consistency predicate
//! standing in for "apply it to a disposable blank object and see if that
//! throws": the typed shape rules out malformed hybrids statically, so the
//! only inadmissibility left to check is non-removability.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::registry::Handle;
use crate::value::Value;

// ---------------------------------------------------------------------------
// PropertyDescriptor
// ---------------------------------------------------------------------------

/// Property descriptor: data or accessor kind.
///
/// Descriptors hold handles, so they are deliberately not serializable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyDescriptor {
    /// Data descriptor: a plain stored value.
    Data {
        value: Value,
        /// Whether the property may later be deleted or redefined.
        removable: bool,
    },
    /// Accessor descriptor: getter and/or setter handles.
    Accessor {
        getter: Option<Handle>,
        setter: Option<Handle>,
        /// Whether the property may later be deleted or redefined.
        removable: bool,
    },
}

impl PropertyDescriptor {
    /// Removable data descriptor for `value`.
    pub fn data(value: Value) -> Self {
        Self::Data {
            value,
            removable: true,
        }
    }

    /// Pinned (non-removable) data descriptor for `value`.
    pub fn data_pinned(value: Value) -> Self {
        Self::Data {
            value,
            removable: false,
        }
    }

    /// Removable accessor descriptor.
    pub fn accessor(getter: Option<Handle>, setter: Option<Handle>) -> Self {
        Self::Accessor {
            getter,
            setter,
            removable: true,
        }
    }

    /// Pinned (non-removable) accessor descriptor.
    pub fn accessor_pinned(getter: Option<Handle>, setter: Option<Handle>) -> Self {
        Self::Accessor {
            getter,
            setter,
            removable: false,
        }
    }

    /// True for data descriptors.
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }

    /// True for accessor descriptors.
    pub fn is_accessor(&self) -> bool {
        matches!(self, Self::Accessor { .. })
    }

    /// Whether the described property may later be deleted or redefined.
    pub fn is_removable(&self) -> bool {
        match self {
            Self::Data { removable, .. } | Self::Accessor { removable, .. } => *removable,
        }
    }

    /// The stored value, for data descriptors.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Data { value, .. } => Some(value),
            Self::Accessor { .. } => None,
        }
    }

    /// The getter handle, for accessor descriptors.
    pub fn getter(&self) -> Option<&Handle> {
        match self {
            Self::Accessor { getter, .. } => getter.as_ref(),
            Self::Data { .. } => None,
        }
    }

    /// The setter handle, for accessor descriptors.
    pub fn setter(&self) -> Option<&Handle> {
        match self {
            Self::Accessor { setter, .. } => setter.as_ref(),
            Self::Data { .. } => None,
        }
    }

    /// Protocol admissibility check.
    ///
    /// The kind split is enforced by the type, so the single remaining rule
    /// is that synthetic properties must always present as removable.
    pub fn validate(&self) -> Result<(), DescriptorViolation> {
        if self.is_removable() {
            Ok(())
        } else {
            Err(DescriptorViolation::NotRemovable)
        }
    }
}

// ---------------------------------------------------------------------------
// DescriptorViolation
// ---------------------------------------------------------------------------

/// Why a descriptor failed [`PropertyDescriptor::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DescriptorViolation {
    /// The descriptor is pinned; the protocol only admits removable ones.
    NotRemovable,
}

impl fmt::Display for DescriptorViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRemovable => write!(f, "descriptor is not removable"),
        }
    }
}

impl std::error::Error for DescriptorViolation {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
