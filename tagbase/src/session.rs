//! Client sessions
//!
//! A [`Session`] is the surface a client binding talks to. It forwards calls
//! to the registry, store and engines, owns its notification queue and
//! remembers which registrations it created so they can be removed when the
//! session is dropped.

use crate::access::{Handle, ReadWriteEngine};
use crate::address::Address;
use crate::database::Shared;
use crate::events::{EventEngine, EventSpec, Notification, NotificationQueue, Pending};
use crate::registry::{parse_type_definition, Layout, MemberDef};
use crate::store::Tag;
use crate::types::{DataType, EventId, Result, SessionId, TagHandle, TagValue};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A client connection to a [`crate::Tagbase`]
pub struct Session {
    id: SessionId,
    name: String,
    shared: Arc<Shared>,
    queue: Arc<NotificationQueue>,
    /// Registrations owned by this session and the tag each one watches
    events: Mutex<HashMap<EventId, TagHandle>>,
}

impl Session {
    pub(crate) fn open(shared: Arc<Shared>, name: &str) -> Self {
        let id = shared.next_session_id();
        let queue = Arc::new(NotificationQueue::new(shared.config.queue_capacity));
        shared.adjust_sessions(1);
        log::debug!("Session {} ({}) opened", id, name);

        Self {
            id,
            name: name.to_string(),
            shared,
            queue,
            events: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ---- Types ----

    /// Define a compound type from a member list
    pub fn define_type(&self, name: &str, members: &[MemberDef]) -> Result<DataType> {
        self.shared.registry.write().define(name, members)
    }

    /// Define a compound type from its text form, `Name:Mem,TYPE,count:...`
    pub fn define_type_text(&self, text: &str) -> Result<DataType> {
        let (name, members) = parse_type_definition(text)?;
        self.define_type(&name, &members)
    }

    /// Resolve a primitive or compound type name
    pub fn resolve_type(&self, name: &str) -> Result<DataType> {
        self.shared.registry.read().resolve(name)
    }

    /// Text form of a compound type
    pub fn serialize_type(&self, name: &str) -> Result<String> {
        self.shared.registry.read().serialize(name)
    }

    /// Bit layout of a primitive or compound type
    pub fn type_layout(&self, name: &str) -> Result<Layout> {
        let registry = self.shared.registry.read();
        let data_type = registry.resolve(name)?;
        Ok(registry.layout(&data_type))
    }

    /// Names of all compound types
    pub fn list_types(&self) -> Vec<String> {
        self.shared.registry.read().names()
    }

    // ---- Tags ----

    /// Add a tag of the named type
    pub fn add_tag(&self, name: &str, type_name: &str, count: u32) -> Result<TagHandle> {
        let data_type = self.resolve_type(type_name)?;
        self.shared.store.add(name, data_type, count)
    }

    pub fn tag_by_name(&self, name: &str) -> Result<Tag> {
        let handle = self.shared.store.lookup(name)?;
        self.shared.store.get(handle)
    }

    pub fn tag_by_handle(&self, handle: TagHandle) -> Result<Tag> {
        self.shared.store.get(handle)
    }

    pub fn list_tags(&self) -> Vec<Tag> {
        self.shared.store.list()
    }

    // ---- Data ----

    /// Resolve an address and element count to a region handle
    pub fn resolve(&self, address: &str, count: u32) -> Result<Handle> {
        self.resolve_address(&Address::parse(address)?, count)
    }

    pub fn resolve_address(&self, address: &Address, count: u32) -> Result<Handle> {
        let slot = self.shared.store.slot_by_name(&address.tag)?;
        ReadWriteEngine::resolve(&slot.tag, address, count)
    }

    /// Read the addressed element, or the whole tag/member if no index is given
    pub fn read(&self, address: &str) -> Result<TagValue> {
        self.read_elements(address, 0)
    }

    /// Read `count` elements starting at the address
    pub fn read_elements(&self, address: &str, count: u32) -> Result<TagValue> {
        let handle = self.resolve(address, count)?;
        self.read_handle(&handle)
    }

    pub fn read_handle(&self, handle: &Handle) -> Result<TagValue> {
        let slot = self.shared.store.slot(handle.tag)?;
        ReadWriteEngine::read(&slot, handle)
    }

    /// Write the addressed element, or the whole tag/member if no index is given
    pub fn write(&self, address: &str, value: impl Into<TagValue>) -> Result<()> {
        self.write_elements(address, 0, &value.into())
    }

    /// Write `count` elements starting at the address
    pub fn write_elements(&self, address: &str, count: u32, value: &TagValue) -> Result<()> {
        let handle = self.resolve(address, count)?;
        self.write_handle(&handle, value)
    }

    pub fn write_handle(&self, handle: &Handle, value: &TagValue) -> Result<()> {
        let slot = self.shared.store.slot(handle.tag)?;
        ReadWriteEngine::write(&slot, handle, value)
    }

    /// Copy `len` raw bytes of a tag starting at `offset`
    pub fn read_bytes(&self, tag: TagHandle, offset: usize, len: usize) -> Result<Vec<u8>> {
        let slot = self.shared.store.slot(tag)?;
        ReadWriteEngine::read_bytes(&slot, offset, len)
    }

    /// Overwrite raw bytes of a tag starting at `offset`
    pub fn write_bytes(&self, tag: TagHandle, offset: usize, data: &[u8]) -> Result<()> {
        let slot = self.shared.store.slot(tag)?;
        ReadWriteEngine::mask_write(&slot, offset, data, None)
    }

    /// Write only the bits of `data` that are set in `mask`
    pub fn mask_write(&self, tag: TagHandle, offset: usize, data: &[u8], mask: &[u8]) -> Result<()> {
        let slot = self.shared.store.slot(tag)?;
        ReadWriteEngine::mask_write(&slot, offset, data, Some(mask))
    }

    // ---- Events ----

    /// Register an event on the region named by `spec`
    pub fn event_add(&self, spec: EventSpec) -> Result<EventId> {
        let address = Address::parse(&spec.address)?;
        let slot = self.shared.store.slot_by_name(&address.tag)?;
        let handle = ReadWriteEngine::resolve(&slot.tag, &address, spec.count)?;

        let id = EventEngine::register(
            &slot,
            handle,
            &spec,
            self.id,
            Arc::downgrade(&self.queue),
        )?;
        self.events.lock().insert(id, slot.tag.handle);
        Ok(id)
    }

    /// Remove a registration owned by this session
    ///
    /// Unknown or already deleted ids are ignored. Once this returns, no
    /// notification for `id` is pending or will be queued.
    pub fn event_del(&self, id: EventId) {
        let Some(tag) = self.events.lock().remove(&id) else {
            log::warn!("Session {} does not own event {}, ignoring delete", self.id, id);
            return;
        };

        match self.shared.store.slot(tag) {
            Ok(slot) => {
                EventEngine::unregister(&slot, id);
            }
            Err(e) => log::error!("Event {} refers to a missing tag: {}", id, e),
        }

        let purged = self.queue.purge(id);
        if purged > 0 {
            log::debug!("Discarded {} pending notifications of event {}", purged, id);
        }
    }

    /// Ids of the registrations owned by this session
    pub fn events(&self) -> Vec<EventId> {
        let mut ids: Vec<EventId> = self.events.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Wait up to `timeout` for the next notification
    ///
    /// Returns `None` on timeout. A registered callback is run on this
    /// thread before the notification is returned.
    pub fn event_wait(&self, timeout: Duration) -> Option<Notification> {
        self.queue.wait_for(timeout).map(dispatch)
    }

    /// Take the next notification without blocking
    pub fn event_poll(&self) -> Option<Notification> {
        self.queue.pop().map(dispatch)
    }

    /// Number of notifications waiting to be drained
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

fn dispatch(pending: Pending) -> Notification {
    if let Some(callback) = &pending.callback {
        callback(&pending.notification);
    }
    pending.notification
}

impl Drop for Session {
    fn drop(&mut self) {
        let events: Vec<(EventId, TagHandle)> = self.events.get_mut().drain().collect();
        for (id, tag) in &events {
            if let Ok(slot) = self.shared.store.slot(*tag) {
                EventEngine::unregister(&slot, *id);
            }
        }
        self.shared.adjust_sessions(-1);
        log::debug!(
            "Session {} ({}) closed, removed {} events",
            self.id,
            self.name,
            events.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::types::TagError;
    use crate::{Tagbase, TagbaseConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn db() -> Tagbase {
        Tagbase::new(TagbaseConfig::new().with_system_tags(false))
    }

    #[test]
    fn test_define_type_text() {
        let db = db();
        let s = db.connect("types");
        let dt = s
            .define_type_text("PyDAX_Type:Mem1,BOOL,10:Mem2,BOOL,1:Mem3,BOOL,3")
            .unwrap();
        assert_eq!(dt.as_compound().unwrap().size_bytes(), 2);
        assert_eq!(s.list_types(), vec!["PyDAX_Type".to_string()]);
        let layout = s.type_layout("pydax_type").unwrap();
        assert_eq!(
            layout.member_offsets,
            vec![
                ("Mem1".to_string(), 0),
                ("Mem2".to_string(), 10),
                ("Mem3".to_string(), 11)
            ]
        );
        assert_eq!(s.type_layout("DINT").unwrap().size_bits, 32);
        assert_eq!(
            s.serialize_type("PYDAX_TYPE").unwrap(),
            "PyDAX_Type:Mem1,BOOL,10:Mem2,BOOL,1:Mem3,BOOL,3"
        );
    }

    #[test]
    fn test_add_tag_unknown_type() {
        let db = db();
        let s = db.connect("tags");
        assert!(matches!(
            s.add_tag("T", "Missing", 1),
            Err(TagError::UnknownType(_))
        ));
    }

    #[test]
    fn test_counted_reads_and_writes() {
        let db = db();
        let s = db.connect("data");
        s.add_tag("PyINT", "INT", 10).unwrap();

        s.write_elements("PyINT[2]", 3, &TagValue::from(vec![-1, 2, 300]))
            .unwrap();
        assert_eq!(
            s.read_elements("PyINT[1]", 4).unwrap(),
            TagValue::from(vec![0, -1, 2, 300])
        );
        assert_eq!(s.read("PyINT[4]").unwrap(), TagValue::Int(300));
        assert!(matches!(
            s.read_elements("PyINT[8]", 3),
            Err(TagError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_raw_access_through_session() {
        let db = db();
        let s = db.connect("raw");
        let h = s.add_tag("Word", "UINT", 1).unwrap();
        s.write_bytes(h, 0, &[0x34, 0x12]).unwrap();
        assert_eq!(s.read("Word").unwrap(), TagValue::Uint(0x1234));
        s.mask_write(h, 1, &[0x00], &[0xF0]).unwrap();
        assert_eq!(s.read_bytes(h, 0, 2).unwrap(), vec![0x34, 0x02]);
    }

    #[test]
    fn test_callback_runs_at_drain_time() {
        let db = db();
        let s = db.connect("callbacks");
        s.add_tag("PyBYTE", "BYTE", 10).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        s.event_add(
            EventSpec::new("PyBYTE", EventKind::Write)
                .with_callback(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .unwrap();

        s.write("PyBYTE[0]", 1).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(s.event_poll().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_del_purges_pending() {
        let db = db();
        let s = db.connect("purge");
        s.add_tag("PyBYTE", "BYTE", 10).unwrap();
        let id = s
            .event_add(EventSpec::new("PyBYTE", EventKind::Write))
            .unwrap();

        s.write("PyBYTE[1]", 1).unwrap();
        assert_eq!(s.pending(), 1);
        s.event_del(id);
        assert_eq!(s.pending(), 0);
        assert!(s.events().is_empty());

        // Second delete is a no-op
        s.event_del(id);
        s.write("PyBYTE[1]", 2).unwrap();
        assert!(s.event_poll().is_none());
    }

    #[test]
    fn test_foreign_event_del_is_ignored() {
        let db = db();
        let owner = db.connect("owner");
        let other = db.connect("other");
        owner.add_tag("PyBYTE", "BYTE", 10).unwrap();
        let id = owner
            .event_add(EventSpec::new("PyBYTE", EventKind::Write))
            .unwrap();

        other.event_del(id);
        owner.write("PyBYTE[0]", 1).unwrap();
        assert_eq!(owner.event_poll().map(|n| n.id), Some(id));
    }

    #[test]
    fn test_event_add_errors() {
        let db = db();
        let s = db.connect("errors");
        s.add_tag("PyBYTE", "BYTE", 10).unwrap();

        assert!(matches!(
            s.event_add(EventSpec::new("Nope", EventKind::Change)),
            Err(TagError::UnknownTag(_))
        ));
        assert!(matches!(
            s.event_add(EventSpec::new("PyBYTE", EventKind::Set)),
            Err(TagError::TypeMismatch(_))
        ));
        assert!(matches!(
            s.event_add(EventSpec::new("PyBYTE", EventKind::Equal)),
            Err(TagError::InvalidArgument(_))
        ));
        assert!(s.events().is_empty());
    }
}
