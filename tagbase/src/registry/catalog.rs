//! Compound type registry
//!
//! Holds every compound type defined in the store. Definitions are immutable
//! once registered; the registry only ever grows.

use crate::config::TagbaseConfig;
use crate::registry::compound::{layout, CompoundType, Layout};
use crate::registry::definition::{serialize_type, MemberDef};
use crate::types::{DataType, Primitive, Result, TagError};
use std::collections::HashMap;
use std::sync::Arc;

/// The registry of compound types
pub struct TypeRegistry {
    /// All compound types, indexed by id
    compounds: Vec<Arc<CompoundType>>,

    /// Lookup by lower-cased name
    by_name: HashMap<String, usize>,

    config: TagbaseConfig,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new(config: TagbaseConfig) -> Self {
        Self {
            compounds: Vec::new(),
            by_name: HashMap::new(),
            config,
        }
    }

    /// Register a compound type
    ///
    /// Redefining an existing name with identical members returns the
    /// existing type; any difference fails with `TypeConflict`.
    pub fn define(&mut self, name: &str, members: &[MemberDef]) -> Result<DataType> {
        if !self.config.is_valid_name(name) {
            return Err(TagError::InvalidName(name.to_string()));
        }
        if Primitive::from_name(name).is_some() {
            return Err(TagError::TypeConflict(format!(
                "'{}' is a primitive type name",
                name
            )));
        }
        if members.is_empty() {
            return Err(TagError::InvalidArgument(format!(
                "type '{}' has no members",
                name
            )));
        }

        let resolved = self.resolve_members(name, members)?;

        if let Some(existing) = self.find(name) {
            if existing.has_members(&resolved) {
                log::debug!("Type {} already defined with identical members", name);
                return Ok(DataType::Compound(existing));
            }
            return Err(TagError::TypeConflict(format!(
                "type '{}' already defined with different members",
                existing.name()
            )));
        }

        let id = self.compounds.len() as u32;
        let compound = Arc::new(CompoundType::new(id, name, resolved));

        log::info!(
            "Defined compound type {} ({} members, {} bytes)",
            name,
            compound.members().len(),
            compound.size_bytes()
        );

        self.by_name.insert(name.to_ascii_lowercase(), id as usize);
        self.compounds.push(compound.clone());
        Ok(DataType::Compound(compound))
    }

    /// Validate the member list and resolve every member's type
    fn resolve_members(
        &self,
        type_name: &str,
        members: &[MemberDef],
    ) -> Result<Vec<(String, DataType, u32)>> {
        let mut resolved: Vec<(String, DataType, u32)> = Vec::with_capacity(members.len());

        for member in members {
            if !self.config.is_valid_name(&member.name) {
                return Err(TagError::InvalidName(member.name.clone()));
            }
            if member.count == 0 {
                return Err(TagError::InvalidArgument(format!(
                    "member '{}' has a count of zero",
                    member.name
                )));
            }
            if resolved
                .iter()
                .any(|(name, _, _)| name.eq_ignore_ascii_case(&member.name))
            {
                return Err(TagError::InvalidArgument(format!(
                    "duplicate member '{}' in type '{}'",
                    member.name, type_name
                )));
            }
            if member.type_name.eq_ignore_ascii_case(type_name) {
                return Err(TagError::CyclicType(format!(
                    "member '{}' of '{}' references its own type",
                    member.name, type_name
                )));
            }

            let data_type =
                self.resolve(&member.type_name)
                    .map_err(|_| TagError::UnknownMemberType {
                        member: member.name.clone(),
                        type_name: member.type_name.clone(),
                    })?;

            if let Some(nested) = data_type.as_compound() {
                if nested.references(type_name) {
                    return Err(TagError::CyclicType(format!(
                        "member '{}' of '{}' transitively references '{}'",
                        member.name, type_name, type_name
                    )));
                }
            }

            resolved.push((member.name.clone(), data_type, member.count));
        }

        Ok(resolved)
    }

    fn find(&self, name: &str) -> Option<Arc<CompoundType>> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .and_then(|idx| self.compounds.get(*idx))
            .cloned()
    }

    /// Resolve a primitive or compound type by name (case-insensitive)
    pub fn resolve(&self, name: &str) -> Result<DataType> {
        if let Some(p) = Primitive::from_name(name) {
            return Ok(DataType::Primitive(p));
        }
        self.find(name)
            .map(DataType::Compound)
            .ok_or_else(|| TagError::UnknownType(name.to_string()))
    }

    /// Get a compound type by id
    pub fn get(&self, id: u32) -> Option<Arc<CompoundType>> {
        self.compounds.get(id as usize).cloned()
    }

    /// Compute the layout of a type
    pub fn layout(&self, data_type: &DataType) -> Layout {
        layout(data_type)
    }

    /// Canonical text form of a compound type
    pub fn serialize(&self, name: &str) -> Result<String> {
        self.find(name)
            .map(|cdt| serialize_type(&cdt))
            .ok_or_else(|| TagError::UnknownType(name.to_string()))
    }

    /// Names of all compound types in definition order
    pub fn names(&self) -> Vec<String> {
        self.compounds.iter().map(|c| c.name().to_string()).collect()
    }

    /// Number of compound types
    pub fn len(&self) -> usize {
        self.compounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compounds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::new(TagbaseConfig::new())
    }

    fn pydax_members() -> Vec<MemberDef> {
        vec![
            MemberDef::new("Mem1", "BOOL", 10),
            MemberDef::new("Mem2", "BOOL", 1),
            MemberDef::new("Mem3", "BOOL", 3),
        ]
    }

    #[test]
    fn test_define_and_resolve() {
        let mut reg = registry();
        let dt = reg.define("PyDAX_Type", &pydax_members()).unwrap();
        assert_eq!(dt.name(), "PyDAX_Type");

        // Case-insensitive lookup
        let resolved = reg.resolve("PyDAX_TYPE").unwrap();
        assert_eq!(resolved, dt);
        assert_eq!(reg.resolve("int").unwrap(), DataType::Primitive(Primitive::Int));
        assert!(matches!(reg.resolve("Nope"), Err(TagError::UnknownType(_))));
    }

    #[test]
    fn test_identical_redefinition_is_idempotent() {
        let mut reg = registry();
        let first = reg.define("PyDAX_Type", &pydax_members()).unwrap();
        let second = reg.define("PyDAX_Type", &pydax_members()).unwrap();
        assert_eq!(first, second);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_conflicting_redefinition_fails() {
        let mut reg = registry();
        reg.define("PyDAX_Type", &pydax_members()).unwrap();

        let mut changed = pydax_members();
        changed[2].count = 4;
        assert!(matches!(
            reg.define("PyDAX_Type", &changed),
            Err(TagError::TypeConflict(_))
        ));
        assert!(matches!(
            reg.define("DINT", &pydax_members()),
            Err(TagError::TypeConflict(_))
        ));
    }

    #[test]
    fn test_self_reference_is_cyclic() {
        let mut reg = registry();
        let members = vec![MemberDef::new("Next", "Node", 1)];
        assert!(matches!(
            reg.define("Node", &members),
            Err(TagError::CyclicType(_))
        ));
    }

    #[test]
    fn test_transitive_reference_is_cyclic() {
        let mut reg = registry();
        reg.define("Outer", &[MemberDef::new("A", "INT", 1)]).unwrap();
        reg.define("Middle", &[MemberDef::new("O", "Outer", 1)]).unwrap();

        // Redefining Outer to contain Middle would close a loop
        assert!(matches!(
            reg.define("Outer", &[MemberDef::new("M", "Middle", 1)]),
            Err(TagError::CyclicType(_))
        ));
    }

    #[test]
    fn test_unknown_member_type() {
        let mut reg = registry();
        let err = reg
            .define("T", &[MemberDef::new("A", "Missing", 1)])
            .unwrap_err();
        match err {
            TagError::UnknownMemberType { member, type_name } => {
                assert_eq!(member, "A");
                assert_eq!(type_name, "Missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(reg.is_empty());
    }

    #[test]
    fn test_member_validation() {
        let mut reg = registry();
        assert!(matches!(
            reg.define("T", &[MemberDef::new("1bad", "INT", 1)]),
            Err(TagError::InvalidName(_))
        ));
        assert!(matches!(
            reg.define("T", &[MemberDef::new("A", "INT", 0)]),
            Err(TagError::InvalidArgument(_))
        ));
        assert!(matches!(
            reg.define(
                "T",
                &[MemberDef::new("A", "INT", 1), MemberDef::new("a", "BOOL", 1)]
            ),
            Err(TagError::InvalidArgument(_))
        ));
        assert!(matches!(reg.define("T", &[]), Err(TagError::InvalidArgument(_))));
    }

    #[test]
    fn test_serialize_and_names() {
        let mut reg = registry();
        reg.define("PyDAX_Type", &pydax_members()).unwrap();
        assert_eq!(
            reg.serialize("pydax_type").unwrap(),
            "PyDAX_Type:Mem1,BOOL,10:Mem2,BOOL,1:Mem3,BOOL,3"
        );
        assert_eq!(reg.names(), vec!["PyDAX_Type".to_string()]);
        assert!(reg.get(0).is_some());
        assert!(reg.get(1).is_none());
    }

    #[test]
    fn test_layout_through_registry() {
        let mut reg = registry();
        let dt = reg.define("PyDAX_Type", &pydax_members()).unwrap();
        assert_eq!(reg.layout(&dt), reg.layout(&dt));
        assert_eq!(reg.layout(&dt).size_bits, 16);
    }
}
