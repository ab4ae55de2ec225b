//! Type registry
//!
//! This module contains the compound type definitions, their bit layout and
//! the registry that resolves type names for tag creation.

pub mod catalog;
pub mod compound;
pub mod definition;

// Re-export key types for convenience
pub use catalog::TypeRegistry;
pub use compound::{layout, CompoundType, Layout, Member};
pub use definition::{parse_type_definition, serialize_type, MemberDef};
