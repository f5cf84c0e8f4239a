//! Structured identifiers for every addressable entity.
//!
//! A [`Name`] pairs a [`TypeId`] (which group an entity belongs to) with an
//! [`InstanceId`] (which member of the group it is) and an ordered attribute
//! map. The reserved [`InstanceId::EXEMPLAR`] marks a name that refers to the
//! group's exemplar rather than to an instance.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier of a type group (request type or worker type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(u32);

impl TypeId {
    /// Creates a `TypeId` from its raw value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TypeId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Identifier of one instance within a type group.
///
/// Often a content hash (see [`Name::hashed`]) or a pool allocation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Sentinel marking a name that refers to the group's exemplar.
    pub const EXEMPLAR: Self = Self(0);

    /// Creates an `InstanceId` from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is the exemplar sentinel.
    #[must_use]
    pub const fn is_exemplar(self) -> bool {
        self.0 == Self::EXEMPLAR.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exemplar() {
            write!(f, "exemplar")
        } else {
            write!(f, "{:#x}", self.0)
        }
    }
}

/// Typed value of a key attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Integer attribute (e.g. a contract size).
    Integer(i64),
    /// Calendar date (e.g. a valuation date).
    Date(NaiveDate),
    /// Free text (e.g. an underlying symbol).
    Text(String),
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<NaiveDate> for AttrValue {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Structured identity: `(type_id, instance_id, attributes)`.
///
/// Within a process, `(type_id, instance_id)` is unique for non-exemplar
/// names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name {
    /// Type group the entity belongs to.
    pub type_id: TypeId,
    /// Instance within the group, or [`InstanceId::EXEMPLAR`].
    pub instance_id: InstanceId,
    /// Ordered key attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Name {
    /// Creates a name with no attributes.
    #[must_use]
    pub fn new(type_id: TypeId, instance_id: InstanceId) -> Self {
        Self {
            type_id,
            instance_id,
            attributes: BTreeMap::new(),
        }
    }

    /// Creates the name of a group's exemplar.
    #[must_use]
    pub fn exemplar(type_id: TypeId) -> Self {
        Self::new(type_id, InstanceId::EXEMPLAR)
    }

    /// Creates a name whose instance id is a content hash of its attributes.
    ///
    /// Equal attribute maps always produce the same instance id. A hash that
    /// collides with the exemplar sentinel is nudged to `1`.
    #[must_use]
    pub fn hashed(type_id: TypeId, attributes: BTreeMap<String, AttrValue>) -> Self {
        let mut hasher = DefaultHasher::new();
        type_id.hash(&mut hasher);
        attributes.hash(&mut hasher);
        let raw = hasher.finish();
        let instance_id = if raw == InstanceId::EXEMPLAR.get() {
            InstanceId::new(1)
        } else {
            InstanceId::new(raw)
        };
        Self {
            type_id,
            instance_id,
            attributes,
        }
    }

    /// Adds an attribute, returning the updated name.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns `true` if this name refers to the group's exemplar.
    #[must_use]
    pub const fn is_exemplar(&self) -> bool {
        self.instance_id.is_exemplar()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_id, self.instance_id)
    }
}
