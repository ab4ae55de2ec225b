//! Tag storage
//!
//! Each tag owns a zero-initialised byte image guarded by its own mutex, so
//! writers to different tags never contend. The same mutex guards the tag's
//! event registrations, which keeps write-then-evaluate atomic per tag.
//! Images are allocated once and never move or resize.
//!
//! The name index is behind a `RwLock`; it is only taken exclusively while a
//! tag is being added.

use crate::config::TagbaseConfig;
use crate::events::Registration;
use crate::types::{DataType, Result, TagError, TagHandle};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Metadata of a tag
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub handle: TagHandle,
    pub data_type: DataType,
    /// Number of elements (1 = scalar)
    pub count: u32,
    /// Size of the byte image
    pub size: usize,
}

impl Tag {
    pub fn is_array(&self) -> bool {
        self.count > 1
    }
}

/// Mutable state of a tag, only reachable through its slot lock
pub(crate) struct TagState {
    pub data: Vec<u8>,
    pub events: Vec<Registration>,
}

/// A tag together with its locked state
pub(crate) struct TagSlot {
    pub tag: Tag,
    pub state: Mutex<TagState>,
}

#[derive(Default)]
struct StoreIndex {
    slots: Vec<Arc<TagSlot>>,
    by_name: HashMap<String, TagHandle>,
}

/// The tag store
pub struct TagStore {
    index: RwLock<StoreIndex>,
    config: TagbaseConfig,
}

impl TagStore {
    pub fn new(config: TagbaseConfig) -> Self {
        Self {
            index: RwLock::new(StoreIndex::default()),
            config,
        }
    }

    /// Add a tag
    ///
    /// Adding a tag that already exists with the same type and count returns
    /// the existing handle. Any other redeclaration fails with `DuplicateTag`.
    pub fn add(&self, name: &str, data_type: DataType, count: u32) -> Result<TagHandle> {
        if !self.config.is_valid_name(name) {
            return Err(TagError::InvalidName(name.to_string()));
        }
        if count == 0 {
            return Err(TagError::InvalidArgument(format!(
                "tag '{}' has a count of zero",
                name
            )));
        }

        let mut index = self.index.write();

        if let Some(&handle) = index.by_name.get(name) {
            let existing = &index.slots[handle.index()].tag;
            if existing.data_type == data_type && existing.count == count {
                log::debug!("Tag {} already exists with identical type, reusing {}", name, handle);
                return Ok(handle);
            }
            return Err(TagError::DuplicateTag(format!(
                "'{}' already exists as {}[{}]",
                name, existing.data_type, existing.count
            )));
        }

        let size = (data_type.element_bits() * count as u64).div_ceil(8) as usize;
        let handle = TagHandle(index.slots.len() as u32);

        log::info!(
            "Added tag {} {} ({}[{}], {} bytes)",
            handle,
            name,
            data_type,
            count,
            size
        );

        let slot = Arc::new(TagSlot {
            tag: Tag {
                name: name.to_string(),
                handle,
                data_type,
                count,
                size,
            },
            state: Mutex::new(TagState {
                data: vec![0u8; size],
                events: Vec::new(),
            }),
        });

        index.slots.push(slot);
        index.by_name.insert(name.to_string(), handle);
        Ok(handle)
    }

    /// Find a tag handle by name
    pub fn lookup(&self, name: &str) -> Result<TagHandle> {
        self.index
            .read()
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| TagError::UnknownTag(name.to_string()))
    }

    /// Get tag metadata by handle
    pub fn get(&self, handle: TagHandle) -> Result<Tag> {
        self.slot(handle).map(|slot| slot.tag.clone())
    }

    pub(crate) fn slot(&self, handle: TagHandle) -> Result<Arc<TagSlot>> {
        self.index
            .read()
            .slots
            .get(handle.index())
            .cloned()
            .ok_or_else(|| TagError::UnknownTag(handle.to_string()))
    }

    pub(crate) fn slot_by_name(&self, name: &str) -> Result<Arc<TagSlot>> {
        let index = self.index.read();
        index
            .by_name
            .get(name)
            .and_then(|handle| index.slots.get(handle.index()))
            .cloned()
            .ok_or_else(|| TagError::UnknownTag(name.to_string()))
    }

    /// Metadata of every tag in handle order
    pub fn list(&self) -> Vec<Tag> {
        self.index
            .read()
            .slots
            .iter()
            .map(|slot| slot.tag.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.index.read().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes allocated for tag images
    pub fn storage_size(&self) -> usize {
        self.index.read().slots.iter().map(|s| s.tag.size).sum()
    }

    /// Number of active event registrations across all tags
    pub fn registration_count(&self) -> usize {
        let slots: Vec<Arc<TagSlot>> = self.index.read().slots.clone();
        slots.iter().map(|s| s.state.lock().events.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Primitive;

    fn store() -> TagStore {
        TagStore::new(TagbaseConfig::new())
    }

    #[test]
    fn test_add_and_lookup() {
        let store = store();
        let h = store.add("PyBYTE", Primitive::Byte.into(), 10).unwrap();
        assert_eq!(store.lookup("PyBYTE").unwrap(), h);

        let tag = store.get(h).unwrap();
        assert_eq!(tag.name, "PyBYTE");
        assert_eq!(tag.size, 10);
        assert!(tag.is_array());

        // Tag names are case sensitive
        assert!(matches!(store.lookup("pybyte"), Err(TagError::UnknownTag(_))));
        assert!(matches!(store.get(TagHandle(9)), Err(TagError::UnknownTag(_))));
    }

    #[test]
    fn test_identical_add_is_idempotent() {
        let store = store();
        let first = store.add("PyINT", Primitive::Int.into(), 10).unwrap();
        let second = store.add("PyINT", Primitive::Int.into(), 10).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);

        assert!(matches!(
            store.add("PyINT", Primitive::Dint.into(), 10),
            Err(TagError::DuplicateTag(_))
        ));
        assert!(matches!(
            store.add("PyINT", Primitive::Int.into(), 11),
            Err(TagError::DuplicateTag(_))
        ));
    }

    #[test]
    fn test_bool_arrays_are_bit_packed() {
        let store = store();
        let h = store.add("Flags", Primitive::Bool.into(), 10).unwrap();
        assert_eq!(store.get(h).unwrap().size, 2);
        store.add("Words", Primitive::Dint.into(), 3).unwrap();
        assert_eq!(store.storage_size(), 14);
    }

    #[test]
    fn test_storage_is_zeroed() {
        let store = store();
        let h = store.add("Zero", Primitive::Lint.into(), 2).unwrap();
        let slot = store.slot(h).unwrap();
        assert!(slot.state.lock().data.iter().all(|b| *b == 0));
        assert_eq!(store.registration_count(), 0);
    }

    #[test]
    fn test_add_rejects_bad_arguments() {
        let store = store();
        assert!(matches!(
            store.add("bad name", Primitive::Int.into(), 1),
            Err(TagError::InvalidName(_))
        ));
        assert!(matches!(
            store.add("Empty", Primitive::Int.into(), 0),
            Err(TagError::InvalidArgument(_))
        ));
        assert!(store.is_empty());
    }
}
