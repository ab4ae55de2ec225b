//! Event registration and evaluation
//!
//! Registrations live in the state of the tag they watch, so adding,
//! removing and evaluating them are all serialized by the tag lock.

use super::{EventSpec, Notification, NotificationQueue, Pending, Registration};
use crate::access::{Handle, ReadWriteEngine};
use crate::store::{Tag, TagSlot, TagState};
use crate::types::{EventId, Result, SessionId};
use chrono::Utc;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Stateless engine for event registration and evaluation
pub struct EventEngine;

impl EventEngine {
    /// Attach a registration for `handle` to the tag in `slot`
    pub(crate) fn register(
        slot: &TagSlot,
        handle: Handle,
        spec: &EventSpec,
        session: SessionId,
        queue: Weak<NotificationQueue>,
    ) -> Result<EventId> {
        let id = EventId(NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed));
        let mut state = slot.state.lock();

        let registration = Registration::new(
            id,
            session,
            spec.kind,
            handle,
            spec.value.as_ref(),
            spec.callback.clone(),
            spec.user_data.clone(),
            queue,
            &state.data,
        )?;

        log::debug!(
            "Session {} registered {} event {} on {} (byte {}, bit {}, count {})",
            session,
            spec.kind,
            id,
            slot.tag.name,
            registration.handle.byte,
            registration.handle.bit,
            registration.handle.count
        );

        state.events.push(registration);
        Ok(id)
    }

    /// Detach a registration; returns false if it was not on this tag
    pub(crate) fn unregister(slot: &TagSlot, id: EventId) -> bool {
        let mut state = slot.state.lock();
        let before = state.events.len();
        state.events.retain(|r| r.id != id);
        let removed = state.events.len() != before;
        if removed {
            log::debug!("Removed event {} from {}", id, slot.tag.name);
        }
        removed
    }

    /// Evaluate every registration of a tag after a write
    ///
    /// Called with the tag lock held. Registrations whose session has gone
    /// away are dropped here.
    pub(crate) fn evaluate(tag: &Tag, state: &mut TagState, touched: &Range<usize>) {
        let TagState { data, events } = state;

        events.retain_mut(|registration| {
            let Some(queue) = registration.queue.upgrade() else {
                log::debug!(
                    "Dropping event {} on {}: session {} is gone",
                    registration.id,
                    tag.name,
                    registration.session
                );
                return false;
            };

            if !registration.check(data, touched) {
                log::trace!("Event {} on {} not triggered", registration.id, tag.name);
                return true;
            }

            log::trace!(
                "Event {} ({}) fired on {} for session {}",
                registration.id,
                registration.kind,
                tag.name,
                registration.session
            );

            let handle = &registration.handle;
            queue.push(Pending {
                notification: Notification {
                    id: registration.id,
                    tag: tag.handle,
                    tag_name: tag.name.clone(),
                    kind: registration.kind,
                    byte: handle.byte,
                    bit: handle.bit,
                    count: handle.count,
                    data_type: handle.data_type.clone(),
                    value: ReadWriteEngine::decode(data, handle),
                    timestamp: Utc::now(),
                    user_data: registration.user_data.clone(),
                },
                callback: registration.callback.clone(),
            });
            true
        });
    }
}
