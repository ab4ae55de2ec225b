//! Per-registration condition state

use super::{EventCallback, EventKind, NotificationQueue, UserData};
use crate::access::Handle;
use crate::codec::{check_range, compare, difference, encode_primitive, get_bit};
use crate::types::{EventId, Primitive, Result, SessionId, TagError, TagValue};
use std::cmp::Ordering;
use std::ops::Range;
use std::sync::Weak;

/// An active registration, stored with the tag it watches
pub(crate) struct Registration {
    pub id: EventId,
    pub session: SessionId,
    pub kind: EventKind,
    pub handle: Handle,
    pub callback: Option<EventCallback>,
    pub user_data: Option<UserData>,
    pub queue: Weak<NotificationQueue>,
    /// Encoded comparison parameter (one element wide)
    param: Vec<u8>,
    deadband: f64,
    /// Region bytes at the last check (CHANGE) or last report (DEADBAND)
    snapshot: Vec<u8>,
    /// Per element: condition held at the last check (edge kinds)
    satisfied: Vec<bool>,
}

impl Registration {
    /// Build a registration over `handle`, validating kind and parameter
    ///
    /// `image` is the tag's current byte image; CHANGE and DEADBAND compare
    /// later writes against it.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: EventId,
        session: SessionId,
        kind: EventKind,
        handle: Handle,
        value: Option<&TagValue>,
        callback: Option<EventCallback>,
        user_data: Option<UserData>,
        queue: Weak<NotificationQueue>,
        image: &[u8],
    ) -> Result<Self> {
        kind.check_type(&handle.data_type)?;

        let mut param = Vec::new();
        let mut deadband = 0.0;
        if kind.needs_value() {
            let value = value.ok_or_else(|| {
                TagError::InvalidArgument(format!("{} events need a comparison value", kind))
            })?;
            let primitive = handle.data_type.as_primitive().ok_or_else(|| {
                TagError::TypeMismatch(format!("{} events need primitive data", kind))
            })?;
            if kind == EventKind::Deadband {
                deadband = value.as_f64().ok_or_else(|| {
                    TagError::TypeMismatch(format!("deadband must be numeric, got {}", value))
                })?;
                if deadband < 0.0 {
                    return Err(TagError::InvalidArgument(format!(
                        "deadband must not be negative, got {}",
                        deadband
                    )));
                }
            } else {
                check_range(primitive, value)?;
                param = vec![0u8; primitive.bytes()];
                encode_primitive(primitive, value, &mut param)?;
            }
        }

        let snapshot = image[handle.byte_range()].to_vec();
        let satisfied = vec![false; handle.count as usize];

        Ok(Self {
            id,
            session,
            kind,
            handle,
            callback,
            user_data,
            queue,
            param,
            deadband,
            snapshot,
            satisfied,
        })
    }

    /// Evaluate the condition after a write that touched `touched`
    ///
    /// Returns true if a notification should be queued.
    pub fn check(&mut self, image: &[u8], touched: &Range<usize>) -> bool {
        if !self.handle.intersects(touched) {
            return false;
        }
        match self.kind {
            EventKind::Write => true,
            EventKind::Change => self.check_change(image),
            EventKind::Deadband => self.check_deadband(image, touched),
            _ => self.check_edges(image, touched),
        }
    }

    fn check_change(&mut self, image: &[u8]) -> bool {
        let region = &image[self.handle.byte_range()];
        let changed = if self.handle.data_type.is_bool() {
            let first = self.handle.bit as u64;
            (first..first + self.handle.count as u64)
                .any(|bit| get_bit(region, bit) != get_bit(&self.snapshot, bit))
        } else {
            region != self.snapshot.as_slice()
        };
        if changed {
            self.snapshot.copy_from_slice(region);
        }
        changed
    }

    fn check_deadband(&mut self, image: &[u8], touched: &Range<usize>) -> bool {
        let Some(primitive) = self.handle.data_type.as_primitive() else {
            return false;
        };
        let width = primitive.bytes();
        let base = self.handle.byte;

        let fired = (0..self.handle.count as usize).any(|i| {
            let start = base + i * width;
            if start >= touched.end || touched.start >= start + width {
                return false;
            }
            let old = &self.snapshot[i * width..(i + 1) * width];
            difference(primitive, &image[start..start + width], old) >= self.deadband
        });

        if fired {
            self.snapshot.copy_from_slice(&image[self.handle.byte_range()]);
        }
        fired
    }

    /// SET, RESET, EQUAL, GREATER and LESS fire when an element newly
    /// satisfies the condition and re-arm when it stops satisfying it
    fn check_edges(&mut self, image: &[u8], touched: &Range<usize>) -> bool {
        let mut fired = false;
        for i in 0..self.handle.count as usize {
            let Some(now) = self.element_satisfies(image, i, touched) else {
                continue;
            };
            if now && !self.satisfied[i] {
                fired = true;
            }
            self.satisfied[i] = now;
        }
        fired
    }

    /// Condition state of element `i`, or `None` if the write missed it
    fn element_satisfies(&self, image: &[u8], i: usize, touched: &Range<usize>) -> Option<bool> {
        match self.handle.data_type.as_primitive()? {
            Primitive::Bool => {
                let bit = self.handle.bit_offset() + i as u64;
                let byte = (bit / 8) as usize;
                if !touched.contains(&byte) {
                    return None;
                }
                let value = get_bit(image, bit);
                Some(if self.kind == EventKind::Set { value } else { !value })
            }
            primitive => {
                let width = primitive.bytes();
                let start = self.handle.byte + i * width;
                if start >= touched.end || touched.start >= start + width {
                    return None;
                }
                let ordering = compare(primitive, &image[start..start + width], &self.param)?;
                Some(match self.kind {
                    EventKind::Equal => ordering == Ordering::Equal,
                    EventKind::Greater => ordering == Ordering::Greater,
                    EventKind::Less => ordering == Ordering::Less,
                    _ => false,
                })
            }
        }
    }
}
