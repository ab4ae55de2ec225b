//! Event subscriptions and notifications
//!
//! A session registers an [`EventSpec`] against a region of a tag. Every
//! write that touches the region evaluates the registration's condition
//! while the tag is still locked; hits are queued as [`Notification`]s on
//! the owning session's queue.

mod condition;
mod engine;
mod queue;

pub(crate) use condition::Registration;
pub(crate) use engine::EventEngine;
pub(crate) use queue::NotificationQueue;
pub(crate) use queue::Pending;

use crate::types::{DataType, EventId, Result, TagError, TagHandle, TagValue, Timestamp};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Callback invoked when a notification is drained
pub type EventCallback = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Opaque value handed back with every notification of a registration
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Condition kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    /// Any write to the region
    Write,
    /// Any write that changes the region
    Change,
    /// A BOOL element becomes true
    Set,
    /// A BOOL element becomes false
    Reset,
    /// An element becomes equal to the parameter
    Equal,
    /// An element becomes greater than the parameter
    Greater,
    /// An element becomes less than the parameter
    Less,
    /// An element moves at least the parameter away from its last reported value
    Deadband,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::Write,
        EventKind::Change,
        EventKind::Set,
        EventKind::Reset,
        EventKind::Equal,
        EventKind::Greater,
        EventKind::Less,
        EventKind::Deadband,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Write => "WRITE",
            EventKind::Change => "CHANGE",
            EventKind::Set => "SET",
            EventKind::Reset => "RESET",
            EventKind::Equal => "EQUAL",
            EventKind::Greater => "GREATER",
            EventKind::Less => "LESS",
            EventKind::Deadband => "DEADBAND",
        }
    }

    /// True for kinds that compare against a parameter
    pub fn needs_value(self) -> bool {
        matches!(
            self,
            EventKind::Equal | EventKind::Greater | EventKind::Less | EventKind::Deadband
        )
    }

    /// True for kinds that fire once per transition into the condition
    pub fn is_edge(self) -> bool {
        matches!(
            self,
            EventKind::Set
                | EventKind::Reset
                | EventKind::Equal
                | EventKind::Greater
                | EventKind::Less
        )
    }

    /// Check that this kind can watch data of the given type
    pub fn check_type(self, data_type: &DataType) -> Result<()> {
        let primitive = data_type.as_primitive();
        let allowed = match self {
            EventKind::Write | EventKind::Change => true,
            EventKind::Set | EventKind::Reset => data_type.is_bool(),
            EventKind::Equal => primitive.is_some_and(|p| !data_type.is_bool() && !p.is_float()),
            EventKind::Greater | EventKind::Less | EventKind::Deadband => {
                primitive.is_some() && !data_type.is_bool()
            }
        };
        if allowed {
            Ok(())
        } else {
            Err(TagError::TypeMismatch(format!(
                "{} events cannot watch {} data",
                self, data_type
            )))
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TagError::InvalidArgument(format!("unknown event kind '{}'", s)))
    }
}

/// Parameters of an event registration
#[derive(Clone)]
pub struct EventSpec {
    /// Address of the watched region
    pub address: String,
    /// Element count (0 = addressed element or whole array)
    pub count: u32,
    pub kind: EventKind,
    /// Comparison parameter for EQUAL, GREATER, LESS and DEADBAND
    pub value: Option<TagValue>,
    pub callback: Option<EventCallback>,
    pub user_data: Option<UserData>,
}

impl EventSpec {
    /// Create a specification for the given address and kind
    pub fn new(address: impl Into<String>, kind: EventKind) -> Self {
        Self {
            address: address.into(),
            count: 0,
            kind,
            value: None,
            callback: None,
            user_data: None,
        }
    }

    /// Builder method: watch `count` elements
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Builder method: set the comparison parameter
    pub fn with_value(mut self, value: impl Into<TagValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Builder method: attach a callback run when notifications are drained
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Builder method: attach opaque user data
    pub fn with_user_data<T: Any + Send + Sync>(mut self, data: T) -> Self {
        self.user_data = Some(Arc::new(data));
        self
    }
}

impl fmt::Debug for EventSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSpec")
            .field("address", &self.address)
            .field("count", &self.count)
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("callback", &self.callback.is_some())
            .field("user_data", &self.user_data.is_some())
            .finish()
    }
}

/// A fired event, queued for its owning session
#[derive(Clone)]
pub struct Notification {
    pub id: EventId,
    pub tag: TagHandle,
    pub tag_name: String,
    pub kind: EventKind,
    /// Watched region: first byte, bit within it, element count and type
    pub byte: usize,
    pub bit: u8,
    pub count: u32,
    pub data_type: DataType,
    /// Value of the watched region when the event fired
    pub value: TagValue,
    pub timestamp: Timestamp,
    pub user_data: Option<UserData>,
}

impl Notification {
    /// Downcast the registration's user data
    pub fn user_data<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.user_data.as_ref().and_then(|d| d.downcast_ref::<T>())
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("tag_name", &self.tag_name)
            .field("kind", &self.kind)
            .field("byte", &self.byte)
            .field("bit", &self.bit)
            .field("count", &self.count)
            .field("data_type", &self.data_type.name())
            .field("value", &self.value)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Primitive;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("change".parse::<EventKind>().unwrap(), EventKind::Change);
        assert_eq!(" Deadband ".parse::<EventKind>().unwrap(), EventKind::Deadband);
        assert!(matches!(
            "rising".parse::<EventKind>(),
            Err(TagError::InvalidArgument(_))
        ));
        assert_eq!(EventKind::Greater.to_string(), "GREATER");
    }

    #[test]
    fn test_kind_type_compatibility() {
        let bool_type = DataType::Primitive(Primitive::Bool);
        let int_type = DataType::Primitive(Primitive::Int);
        let real_type = DataType::Primitive(Primitive::Real);

        assert!(EventKind::Set.check_type(&bool_type).is_ok());
        assert!(EventKind::Set.check_type(&int_type).is_err());
        assert!(EventKind::Equal.check_type(&int_type).is_ok());
        assert!(EventKind::Equal.check_type(&real_type).is_err());
        assert!(EventKind::Equal.check_type(&bool_type).is_err());
        assert!(EventKind::Greater.check_type(&real_type).is_ok());
        assert!(EventKind::Deadband.check_type(&bool_type).is_err());
        for kind in [EventKind::Write, EventKind::Change] {
            assert!(kind.check_type(&bool_type).is_ok());
        }
    }

    #[test]
    fn test_spec_builder() {
        let spec = EventSpec::new("PyBYTE[5]", EventKind::Greater)
            .with_count(2)
            .with_value(10)
            .with_user_data("ctx".to_string());
        assert_eq!(spec.count, 2);
        assert_eq!(spec.value, Some(TagValue::Int(10)));
        assert!(spec.user_data.is_some());
        assert!(spec.callback.is_none());
        assert!(format!("{:?}", spec).contains("PyBYTE[5]"));
    }
}
