//! Main store API
//!
//! [`Tagbase`] owns the type registry and tag store. Clients talk to it
//! through [`Session`]s obtained from [`Tagbase::connect`]; the store itself
//! exposes only construction and statistics.

use crate::access::{Handle, ReadWriteEngine};
use crate::address::Address;
use crate::config::TagbaseConfig;
use crate::registry::{MemberDef, TypeRegistry};
use crate::session::Session;
use crate::store::TagStore;
use crate::types::{Result, SessionId, TagValue, Timestamp};
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Name of the status tag created when system tags are enabled
pub const STATUS_TAG: &str = "_status";

/// Name of the compound type of the status tag
pub const SYSTEM_TYPE: &str = "System";

/// State shared by the store handle and all of its sessions
pub(crate) struct Shared {
    pub config: TagbaseConfig,
    pub registry: RwLock<TypeRegistry>,
    pub store: TagStore,
    pub started: Timestamp,
    next_session: AtomicU64,
    sessions: AtomicUsize,
    /// `_status.SessionCount`, if system tags are installed
    session_count: Option<Handle>,
}

impl Shared {
    pub fn next_session_id(&self) -> SessionId {
        SessionId(self.next_session.fetch_add(1, Ordering::Relaxed))
    }

    /// Track a session opening (+1) or closing (-1)
    pub fn adjust_sessions(&self, delta: i64) {
        if delta >= 0 {
            self.sessions.fetch_add(delta as usize, Ordering::Relaxed);
        } else {
            self.sessions.fetch_sub(delta.unsigned_abs() as usize, Ordering::Relaxed);
        }

        let Some(handle) = &self.session_count else {
            return;
        };
        let result = self.store.slot(handle.tag).and_then(|slot| {
            ReadWriteEngine::modify(&slot, handle, |current| {
                TagValue::Int(current.as_i64().unwrap_or(0) + delta)
            })
        });
        if let Err(e) = result {
            log::error!("Failed to update {}.SessionCount: {}", STATUS_TAG, e);
        }
    }
}

/// Statistics about the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagbaseStats {
    pub num_tags: usize,
    pub num_types: usize,
    pub num_sessions: usize,
    pub num_events: usize,
    pub storage_bytes: usize,
}

/// The tag database - entry point for all operations
pub struct Tagbase {
    shared: Arc<Shared>,
}

impl Tagbase {
    /// Create a new store
    ///
    /// With `system_tags` enabled this also defines the `System` type and
    /// creates the `_status` tag at handle 0.
    pub fn new(config: TagbaseConfig) -> Self {
        let started = Utc::now();
        let mut registry = TypeRegistry::new(config.clone());
        let store = TagStore::new(config.clone());

        let session_count = if config.system_tags {
            match install_system_tags(&mut registry, &store, started) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    log::error!("Failed to create system tags: {}", e);
                    None
                }
            }
        } else {
            None
        };

        log::info!(
            "Tag database started ({} system tags)",
            if session_count.is_some() { "with" } else { "without" }
        );

        Self {
            shared: Arc::new(Shared {
                config,
                registry: RwLock::new(registry),
                store,
                started,
                next_session: AtomicU64::new(1),
                sessions: AtomicUsize::new(0),
                session_count,
            }),
        }
    }

    /// Open a client session
    ///
    /// # Example
    /// ```
    /// use tagbase::{Tagbase, TagbaseConfig};
    ///
    /// let db = Tagbase::new(TagbaseConfig::new());
    /// let session = db.connect("demo");
    /// session.add_tag("PyBYTE", "BYTE", 10).unwrap();
    /// session.write("PyBYTE[5]", 7).unwrap();
    /// assert_eq!(session.read("PyBYTE[5]").unwrap().as_i64(), Some(7));
    /// ```
    pub fn connect(&self, name: &str) -> Session {
        Session::open(self.shared.clone(), name)
    }

    pub fn config(&self) -> &TagbaseConfig {
        &self.shared.config
    }

    /// Time the store was created
    pub fn start_time(&self) -> Timestamp {
        self.shared.started
    }

    /// Get statistics about the store
    pub fn stats(&self) -> TagbaseStats {
        let shared = &self.shared;
        TagbaseStats {
            num_tags: shared.store.len(),
            num_types: shared.registry.read().len(),
            num_sessions: shared.sessions.load(Ordering::Relaxed),
            num_events: shared.store.registration_count(),
            storage_bytes: shared.store.storage_size(),
        }
    }
}

impl Default for Tagbase {
    fn default() -> Self {
        Self::new(TagbaseConfig::default())
    }
}

/// Define `System`, create `_status` and record the start time
///
/// Returns the handle of `_status.SessionCount`.
fn install_system_tags(
    registry: &mut TypeRegistry,
    store: &TagStore,
    started: Timestamp,
) -> Result<Handle> {
    let system = registry.define(
        SYSTEM_TYPE,
        &[
            MemberDef::new("StartTime", "TIME", 1),
            MemberDef::new("SessionCount", "DINT", 1),
        ],
    )?;
    let handle = store.add(STATUS_TAG, system, 1)?;
    let slot = store.slot(handle)?;

    let start_time = ReadWriteEngine::resolve(
        &slot.tag,
        &Address::tag(STATUS_TAG).member("StartTime"),
        0,
    )?;
    ReadWriteEngine::write(
        &slot,
        &start_time,
        &TagValue::Uint(started.timestamp().max(0) as u64),
    )?;

    ReadWriteEngine::resolve(
        &slot.tag,
        &Address::tag(STATUS_TAG).member("SessionCount"),
        0,
    )
}
