//! Output of values, notifications and statistics
//!
//! Plain text by default; with `--json` every record is one JSON object per
//! line.

use anyhow::Result;
use chrono::Local;
use serde::Serialize;
use tagbase::{EventKind, Notification, TagValue, TagbaseStats};

#[derive(Debug, Serialize)]
struct NotificationRecord<'a> {
    event: u64,
    tag: &'a str,
    handle: u32,
    kind: EventKind,
    byte: usize,
    bit: u8,
    count: u32,
    data_type: &'a str,
    value: &'a TagValue,
    timestamp: String,
    label: Option<&'a str>,
}

impl<'a> NotificationRecord<'a> {
    fn new(n: &'a Notification) -> Self {
        Self {
            event: n.id.0,
            tag: &n.tag_name,
            handle: n.tag.0,
            kind: n.kind,
            byte: n.byte,
            bit: n.bit,
            count: n.count,
            data_type: n.data_type.name(),
            value: &n.value,
            timestamp: n.timestamp.to_rfc3339(),
            label: n.user_data::<String>().map(String::as_str),
        }
    }
}

#[derive(Debug, Serialize)]
struct ValueRecord<'a> {
    tag: &'a str,
    value: &'a TagValue,
}

/// Formats records for stdout
pub struct Reporter {
    json: bool,
}

impl Reporter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn notification(&self, n: &Notification) -> Result<String> {
        if self.json {
            return Ok(serde_json::to_string(&NotificationRecord::new(n))?);
        }
        let label = n.user_data::<String>().map(String::as_str).unwrap_or("-");
        Ok(format!(
            "[{}] event {} {} on {} (byte {}, bit {}, {} x {}) = {}  ({})",
            n.timestamp.with_timezone(&Local).format("%H:%M:%S%.3f"),
            n.id,
            n.kind,
            n.tag_name,
            n.byte,
            n.bit,
            n.count,
            n.data_type,
            n.value,
            label
        ))
    }

    pub fn value(&self, tag: &str, value: &TagValue) -> Result<String> {
        if self.json {
            return Ok(serde_json::to_string(&ValueRecord { tag, value })?);
        }
        Ok(format!("  {:<12} = {}", tag, value))
    }

    pub fn stats(&self, stats: &TagbaseStats) -> Result<String> {
        if self.json {
            return Ok(serde_json::to_string(stats)?);
        }
        Ok(format!(
            "Tags: {}  Types: {}  Sessions: {}  Events: {}  Storage: {} bytes",
            stats.num_tags,
            stats.num_types,
            stats.num_sessions,
            stats.num_events,
            stats.storage_bytes
        ))
    }
}
