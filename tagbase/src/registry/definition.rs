//! Textual compound type definitions
//!
//! The canonical text form of a compound type is
//! `Name:Member,TYPE,count:Member,TYPE,count`. It is used to describe types
//! to clients and accepted back by [`parse_type_definition`].

use crate::registry::CompoundType;
use crate::types::{Result, TagError};
use serde::{Deserialize, Serialize};

/// A member as supplied by a client: the type is referenced by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDef {
    /// Member name
    pub name: String,
    /// Primitive or compound type name
    #[serde(rename = "type")]
    pub type_name: String,
    /// Array count (1 = scalar)
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

impl MemberDef {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            count,
        }
    }
}

/// Render a compound type in its canonical text form
pub fn serialize_type(compound: &CompoundType) -> String {
    let mut out = compound.name().to_string();
    for member in compound.members() {
        out.push(':');
        out.push_str(&member.name);
        out.push(',');
        out.push_str(member.data_type.name());
        out.push(',');
        out.push_str(&member.count.to_string());
    }
    out
}

/// Parse the canonical text form into a type name and its members
///
/// Counts may be decimal or `0x` hexadecimal.
pub fn parse_type_definition(text: &str) -> Result<(String, Vec<MemberDef>)> {
    let mut parts = text.split(':');

    let name = parts
        .next()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| TagError::InvalidArgument("type definition has no name".to_string()))?;

    let mut members = Vec::new();
    for part in parts {
        let fields: Vec<&str> = part.split(',').map(str::trim).collect();
        if fields.len() != 3 {
            return Err(TagError::InvalidArgument(format!(
                "member definition '{}' must be Name,Type,Count",
                part
            )));
        }
        let count = parse_count(fields[2]).ok_or_else(|| {
            TagError::InvalidArgument(format!("invalid member count '{}'", fields[2]))
        })?;
        members.push(MemberDef::new(fields[0], fields[1], count));
    }

    Ok((name.to_string(), members))
}

fn parse_count(text: &str) -> Option<u32> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}
