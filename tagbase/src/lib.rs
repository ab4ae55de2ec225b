//! Tagbase - an in-process tag database
//!
//! A shared store of named, typed memory regions ("tags") with compound
//! types and change notifications.
//!
//! # Architecture
//!
//! - **Type registry**: primitive kinds plus user-defined compound types with
//!   a packed bit layout (BOOLs pack by bit, everything else by byte)
//! - **Tag store**: one zero-initialised byte image per tag, each behind its
//!   own lock
//! - **Read/write engine**: address resolution (`Tag[2].member[3]`) and
//!   masked, all-or-nothing writes
//! - **Event engine**: per-tag registrations evaluated synchronously on every
//!   write, with notifications queued per session
//! - **Sessions**: the client-facing API; dropping a session removes its
//!   registrations
//!
//! The library does NOT provide a transport, persistence or a CLI. The
//! `tagbase-cli` crate drives a store from a TOML script.
//!
//! # Example Usage
//!
//! ```
//! use tagbase::{EventKind, EventSpec, Tagbase, TagbaseConfig};
//! use std::time::Duration;
//!
//! let db = Tagbase::new(TagbaseConfig::new());
//! let session = db.connect("example");
//!
//! session
//!     .define_type_text("PyDAX_Type:Mem1,BOOL,10:Mem2,BOOL,1:Mem3,BOOL,3")
//!     .unwrap();
//! session.add_tag("PyCDTTAG", "PyDAX_Type", 1).unwrap();
//! session.add_tag("PyBYTE", "BYTE", 10).unwrap();
//!
//! let id = session
//!     .event_add(EventSpec::new("PyBYTE[5]", EventKind::Change))
//!     .unwrap();
//! session.write("PyBYTE[5]", 7).unwrap();
//!
//! let notification = session.event_wait(Duration::from_millis(100)).unwrap();
//! assert_eq!(notification.id, id);
//! ```

// Public modules
pub mod access;
pub mod address;
pub mod config;
pub mod database;
pub mod events;
pub mod registry;
pub mod session;
pub mod store;
pub mod types;

// Internal modules
mod codec;

// Re-export main types for convenience
pub use access::Handle;
pub use address::{Address, Segment};
pub use config::TagbaseConfig;
pub use database::{Tagbase, TagbaseStats, STATUS_TAG, SYSTEM_TYPE};
pub use events::{EventCallback, EventKind, EventSpec, Notification, UserData};
pub use registry::{parse_type_definition, CompoundType, Layout, Member, MemberDef};
pub use session::Session;
pub use store::Tag;
pub use types::{
    DataType, ErrorKind, EventId, Primitive, Result, SessionId, TagError, TagHandle, TagValue,
    Timestamp,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        let db = Tagbase::default();
        let stats = db.stats();
        assert_eq!(stats.num_tags, 1);
        assert!(!VERSION.is_empty());
    }
}
