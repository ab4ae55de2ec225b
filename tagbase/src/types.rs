//! Core types for the tag database
//!
//! This module defines the fundamental vocabulary shared by every layer of the
//! store: primitive kinds, data types, tag values, identifiers and the error
//! taxonomy surfaced to sessions.

use crate::registry::CompoundType;
use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Timestamp type used for notifications
pub type Timestamp = DateTime<Utc>;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, TagError>;

/// Errors reported by the tag database
///
/// Every variant is surfaced synchronously to the caller. The core never
/// retries an operation on its own.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TagError {
    #[error("Type conflict: {0}")]
    TypeConflict(String),

    #[error("Cyclic type definition: {0}")]
    CyclicType(String),

    #[error("Member '{member}' references unknown type '{type_name}'")]
    UnknownMemberType { member: String, type_name: String },

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Duplicate tag: {0}")]
    DuplicateTag(String),

    #[error("Unknown tag: {0}")]
    UnknownTag(String),

    #[error("Unknown member '{member}' in {path}")]
    UnknownMember { path: String, member: String },

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed address: {0}")]
    AddressSyntax(String),
}

/// Coarse classification of [`TagError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Type and tag definition failures
    Definition,
    /// A named tag or member does not exist
    Lookup,
    /// Index, width or kind does not fit the addressed data
    Addressing,
    /// Malformed identifiers, counts or parameters
    Argument,
}

impl TagError {
    /// Classify this error for external reporting
    pub fn kind(&self) -> ErrorKind {
        match self {
            TagError::TypeConflict(_)
            | TagError::CyclicType(_)
            | TagError::UnknownMemberType { .. }
            | TagError::UnknownType(_)
            | TagError::DuplicateTag(_) => ErrorKind::Definition,
            TagError::UnknownTag(_) | TagError::UnknownMember { .. } => ErrorKind::Lookup,
            TagError::OutOfRange(_) | TagError::TypeMismatch(_) => ErrorKind::Addressing,
            TagError::InvalidName(_)
            | TagError::InvalidArgument(_)
            | TagError::AddressSyntax(_) => ErrorKind::Argument,
        }
    }
}

/// Primitive data kinds with fixed widths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Primitive {
    Bool,
    Byte,
    Sint,
    Word,
    Int,
    Uint,
    Dword,
    Dint,
    Udint,
    Time,
    Real,
    Lword,
    Lint,
    Ulint,
    Lreal,
}

impl Primitive {
    /// All primitive kinds in declaration order
    pub const ALL: [Primitive; 15] = [
        Primitive::Bool,
        Primitive::Byte,
        Primitive::Sint,
        Primitive::Word,
        Primitive::Int,
        Primitive::Uint,
        Primitive::Dword,
        Primitive::Dint,
        Primitive::Udint,
        Primitive::Time,
        Primitive::Real,
        Primitive::Lword,
        Primitive::Lint,
        Primitive::Ulint,
        Primitive::Lreal,
    ];

    /// Width in bits
    pub fn bits(self) -> u32 {
        match self {
            Primitive::Bool => 1,
            Primitive::Byte | Primitive::Sint => 8,
            Primitive::Word | Primitive::Int | Primitive::Uint => 16,
            Primitive::Dword
            | Primitive::Dint
            | Primitive::Udint
            | Primitive::Time
            | Primitive::Real => 32,
            Primitive::Lword | Primitive::Lint | Primitive::Ulint | Primitive::Lreal => 64,
        }
    }

    /// Width in whole bytes (BOOL reports 0)
    pub fn bytes(self) -> usize {
        (self.bits() / 8) as usize
    }

    /// Canonical upper-case name
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Bool => "BOOL",
            Primitive::Byte => "BYTE",
            Primitive::Sint => "SINT",
            Primitive::Word => "WORD",
            Primitive::Int => "INT",
            Primitive::Uint => "UINT",
            Primitive::Dword => "DWORD",
            Primitive::Dint => "DINT",
            Primitive::Udint => "UDINT",
            Primitive::Time => "TIME",
            Primitive::Real => "REAL",
            Primitive::Lword => "LWORD",
            Primitive::Lint => "LINT",
            Primitive::Ulint => "ULINT",
            Primitive::Lreal => "LREAL",
        }
    }

    /// Look up a primitive by name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// True for the two's complement kinds
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Primitive::Sint | Primitive::Int | Primitive::Dint | Primitive::Lint
        )
    }

    /// True for REAL and LREAL
    pub fn is_float(self) -> bool {
        matches!(self, Primitive::Real | Primitive::Lreal)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The type of a tag or compound member
///
/// Compound types are shared immutable definitions, so a `DataType` carries
/// everything needed to lay out and decode data without consulting the
/// registry again.
#[derive(Debug, Clone)]
pub enum DataType {
    Primitive(Primitive),
    Compound(Arc<CompoundType>),
}

impl DataType {
    /// Type name as registered (primitives use their canonical name)
    pub fn name(&self) -> &str {
        match self {
            DataType::Primitive(p) => p.name(),
            DataType::Compound(c) => c.name(),
        }
    }

    /// True for single-bit BOOL elements
    pub fn is_bool(&self) -> bool {
        matches!(self, DataType::Primitive(Primitive::Bool))
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, DataType::Compound(_))
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            DataType::Primitive(p) => Some(*p),
            DataType::Compound(_) => None,
        }
    }

    pub fn as_compound(&self) -> Option<&Arc<CompoundType>> {
        match self {
            DataType::Primitive(_) => None,
            DataType::Compound(c) => Some(c),
        }
    }

    /// Bits occupied by one element of this type inside an array
    pub fn element_bits(&self) -> u64 {
        match self {
            DataType::Primitive(p) => p.bits() as u64,
            DataType::Compound(c) => c.size_bytes() as u64 * 8,
        }
    }
}

impl PartialEq for DataType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DataType::Primitive(a), DataType::Primitive(b)) => a == b,
            (DataType::Compound(a), DataType::Compound(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl Eq for DataType {}

impl From<Primitive> for DataType {
    fn from(p: Primitive) -> Self {
        DataType::Primitive(p)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric handle of a tag (its creation index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagHandle(pub u32);

impl TagHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TagHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque identifier of an event registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a client session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value read from or written to a tag
///
/// Arrays map to [`TagValue::Array`]; compound elements map to
/// [`TagValue::Compound`] with members in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Bool(bool),
    /// Signed integer value
    Int(i64),
    /// Unsigned integer value
    Uint(u64),
    /// Floating-point value
    Real(f64),
    Array(Vec<TagValue>),
    Compound(Vec<(String, TagValue)>),
}

impl TagValue {
    /// Convert a scalar value to f64 for comparisons
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            TagValue::Int(v) => Some(*v as f64),
            TagValue::Uint(v) => Some(*v as f64),
            TagValue::Real(v) => Some(*v),
            TagValue::Array(_) | TagValue::Compound(_) => None,
        }
    }

    /// Convert a scalar value to i64 if possible
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TagValue::Bool(v) => Some(i64::from(*v)),
            TagValue::Int(v) => Some(*v),
            TagValue::Uint(v) => i64::try_from(*v).ok(),
            TagValue::Real(v) => Some(*v as i64),
            TagValue::Array(_) | TagValue::Compound(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TagValue::Bool(v) => Some(*v),
            TagValue::Int(v) => Some(*v != 0),
            TagValue::Uint(v) => Some(*v != 0),
            TagValue::Real(v) => Some(*v != 0.0),
            TagValue::Array(_) | TagValue::Compound(_) => None,
        }
    }

    /// Look up a member of a compound value
    pub fn member(&self, name: &str) -> Option<&TagValue> {
        match self {
            TagValue::Compound(members) => members
                .iter()
                .find(|(member, _)| member == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Element of an array value
    pub fn element(&self, index: usize) -> Option<&TagValue> {
        match self {
            TagValue::Array(items) => items.get(index),
            _ => None,
        }
    }

    /// True when every scalar inside this value is zero/false
    pub fn is_zero(&self) -> bool {
        match self {
            TagValue::Bool(v) => !*v,
            TagValue::Int(v) => *v == 0,
            TagValue::Uint(v) => *v == 0,
            TagValue::Real(v) => *v == 0.0,
            TagValue::Array(items) => items.iter().all(TagValue::is_zero),
            TagValue::Compound(members) => members.iter().all(|(_, v)| v.is_zero()),
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(v) => write!(f, "{}", if *v { "true" } else { "false" }),
            TagValue::Int(v) => write!(f, "{}", v),
            TagValue::Uint(v) => write!(f, "{}", v),
            TagValue::Real(v) => write!(f, "{:.3}", v),
            TagValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            TagValue::Compound(members) => {
                write!(f, "{{")?;
                for (i, (name, value)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Serialize for TagValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            TagValue::Bool(v) => serializer.serialize_bool(*v),
            TagValue::Int(v) => serializer.serialize_i64(*v),
            TagValue::Uint(v) => serializer.serialize_u64(*v),
            TagValue::Real(v) => serializer.serialize_f64(*v),
            TagValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            TagValue::Compound(members) => {
                let mut map = serializer.serialize_map(Some(members.len()))?;
                for (name, value) in members {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
        }
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        TagValue::Bool(v)
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

impl From<i32> for TagValue {
    fn from(v: i32) -> Self {
        TagValue::Int(v as i64)
    }
}

impl From<u8> for TagValue {
    fn from(v: u8) -> Self {
        TagValue::Uint(v as u64)
    }
}

impl From<u64> for TagValue {
    fn from(v: u64) -> Self {
        TagValue::Uint(v)
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        TagValue::Real(v)
    }
}

impl<T: Into<TagValue>> From<Vec<T>> for TagValue {
    fn from(items: Vec<T>) -> Self {
        TagValue::Array(items.into_iter().map(Into::into).collect())
    }
}
