//! Compound type definitions and bit layout
//!
//! Layout rules:
//! - BOOL members pack contiguously at bit granularity
//! - every other member starts on the next byte boundary
//! - the total size is rounded up to a whole byte
//!
//! The layout is a pure function of the member list, so it is computed once
//! when a type is defined and recomputed identically by [`layout`].

use crate::types::DataType;

/// A member of a compound type with its resolved position
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    /// Member name (unique within the compound)
    pub name: String,
    /// Member type
    pub data_type: DataType,
    /// Array count (1 = scalar)
    pub count: u32,
    /// Bit offset from the start of the compound element
    pub bit_offset: u64,
}

impl Member {
    /// Bits occupied by all elements of this member
    pub fn size_bits(&self) -> u64 {
        self.data_type.element_bits() * self.count as u64
    }
}

/// An immutable, registered compound type
#[derive(Debug)]
pub struct CompoundType {
    id: u32,
    name: String,
    members: Vec<Member>,
    size_bytes: usize,
}

impl CompoundType {
    /// Build a compound type from resolved members, computing its layout
    pub(crate) fn new(id: u32, name: &str, members: Vec<(String, DataType, u32)>) -> Self {
        let (offsets, size_bits) = pack(members.iter().map(|(_, dt, count)| (dt, *count)));

        let members = members
            .into_iter()
            .zip(offsets)
            .map(|((name, data_type, count), bit_offset)| Member {
                name,
                data_type,
                count,
                bit_offset,
            })
            .collect();

        Self {
            id,
            name: name.to_string(),
            members,
            size_bytes: (size_bits / 8) as usize,
        }
    }

    /// Registry index of this type
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Find a member by exact name
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Size of one element in bytes
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// True if this definition has exactly the given members
    pub fn has_members(&self, members: &[(String, DataType, u32)]) -> bool {
        self.members.len() == members.len()
            && self
                .members
                .iter()
                .zip(members)
                .all(|(m, (name, dt, count))| m.name == *name && m.data_type == *dt && m.count == *count)
    }

    /// True if this type (or any nested type) has a member of the named type
    pub fn references(&self, type_name: &str) -> bool {
        self.members.iter().any(|m| match m.data_type.as_compound() {
            Some(nested) => {
                nested.name().eq_ignore_ascii_case(type_name) || nested.references(type_name)
            }
            None => false,
        })
    }
}

/// Bit layout of a type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Total size in bits (byte-rounded for compounds)
    pub size_bits: u64,
    /// Bit offset of each member, in declaration order
    pub member_offsets: Vec<(String, u64)>,
}

impl Layout {
    /// Size in whole bytes
    pub fn size_bytes(&self) -> usize {
        self.size_bits.div_ceil(8) as usize
    }
}

/// Compute the layout of a type
pub fn layout(data_type: &DataType) -> Layout {
    match data_type {
        DataType::Primitive(p) => Layout {
            size_bits: p.bits() as u64,
            member_offsets: Vec::new(),
        },
        DataType::Compound(compound) => {
            let members = compound.members();
            let (offsets, size_bits) = pack(members.iter().map(|m| (&m.data_type, m.count)));
            Layout {
                size_bits,
                member_offsets: members
                    .iter()
                    .map(|m| m.name.clone())
                    .zip(offsets)
                    .collect(),
            }
        }
    }
}

/// Assign bit offsets to a sequence of (type, count) members
///
/// Returns the offsets and the byte-rounded total size in bits.
fn pack<'a>(members: impl Iterator<Item = (&'a DataType, u32)>) -> (Vec<u64>, u64) {
    let mut pos: u64 = 0;
    let mut offsets = Vec::new();

    for (data_type, count) in members {
        if !data_type.is_bool() {
            pos = align_to_byte(pos);
        }
        offsets.push(pos);
        pos += data_type.element_bits() * count as u64;
    }

    (offsets, align_to_byte(pos))
}

fn align_to_byte(bits: u64) -> u64 {
    bits.div_ceil(8) * 8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Primitive;
    use std::sync::Arc;

    fn member(name: &str, p: Primitive, count: u32) -> (String, DataType, u32) {
        (name.to_string(), DataType::Primitive(p), count)
    }

    #[test]
    fn test_bools_pack_at_bit_granularity() {
        let cdt = CompoundType::new(
            0,
            "PyDAX_Type",
            vec![
                member("Mem1", Primitive::Bool, 10),
                member("Mem2", Primitive::Bool, 1),
                member("Mem3", Primitive::Bool, 3),
            ],
        );

        let offsets: Vec<u64> = cdt.members().iter().map(|m| m.bit_offset).collect();
        assert_eq!(offsets, vec![0, 10, 11]);
        // 14 bits round up to 2 bytes
        assert_eq!(cdt.size_bytes(), 2);
    }

    #[test]
    fn test_non_bool_members_align_to_bytes() {
        let cdt = CompoundType::new(
            0,
            "Mixed",
            vec![
                member("Flag", Primitive::Bool, 3),
                member("Count", Primitive::Int, 2),
                member("Done", Primitive::Bool, 1),
                member("Level", Primitive::Real, 1),
            ],
        );

        let offsets: Vec<u64> = cdt.members().iter().map(|m| m.bit_offset).collect();
        assert_eq!(offsets, vec![0, 8, 40, 48]);
        assert_eq!(cdt.size_bytes(), 10);
    }

    #[test]
    fn test_nested_compound_layout() {
        let inner = Arc::new(CompoundType::new(
            0,
            "Inner",
            vec![member("A", Primitive::Byte, 1), member("B", Primitive::Bool, 1)],
        ));
        let outer = CompoundType::new(
            1,
            "Outer",
            vec![
                member("X", Primitive::Bool, 1),
                ("In".to_string(), DataType::Compound(inner.clone()), 3),
            ],
        );

        assert_eq!(inner.size_bytes(), 2);
        assert_eq!(outer.members()[1].bit_offset, 8);
        assert_eq!(outer.size_bytes(), 7);
        assert!(outer.references("inner"));
        assert!(!inner.references("Outer"));
    }

    #[test]
    fn test_layout_is_deterministic() {
        let cdt = Arc::new(CompoundType::new(
            3,
            "Thing",
            vec![member("A", Primitive::Bool, 5), member("B", Primitive::Dint, 4)],
        ));
        let dt = DataType::Compound(cdt.clone());

        let first = layout(&dt);
        let second = layout(&dt.clone());
        assert_eq!(first, second);
        assert_eq!(first.size_bytes(), cdt.size_bytes());
        assert_eq!(
            first.member_offsets,
            vec![("A".to_string(), 0), ("B".to_string(), 8)]
        );
    }

    #[test]
    fn test_primitive_layout() {
        let l = layout(&DataType::Primitive(Primitive::Lint));
        assert_eq!(l.size_bits, 64);
        assert!(l.member_offsets.is_empty());
        assert_eq!(layout(&DataType::Primitive(Primitive::Bool)).size_bytes(), 1);
    }
}
