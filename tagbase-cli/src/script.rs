//! Applying a configuration script to a store

use crate::config::{AppConfig, WriteConfig};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tagbase::{EventId, EventKind, EventSpec, Session, Tagbase};

/// Define types, add tags and register events on `session`
///
/// Returns the registered event ids in script order.
pub fn apply(session: &Session, config: &AppConfig) -> Result<Vec<EventId>> {
    for (i, t) in config.types.iter().enumerate() {
        let data_type = match (&t.definition, &t.name) {
            (Some(text), _) => session.define_type_text(text),
            (None, Some(name)) => session.define_type(name, &t.members),
            (None, None) => continue,
        }
        .with_context(|| format!("Failed to define types[{}]", i))?;
        log::debug!("types[{}] -> {}", i, data_type);
    }

    for tag in &config.tags {
        session
            .add_tag(&tag.name, &tag.type_name, tag.count)
            .with_context(|| format!("Failed to add tag {}", tag.name))?;
    }

    let mut ids = Vec::with_capacity(config.events.len());
    for event in &config.events {
        let kind: EventKind = event.kind.parse()?;
        let mut spec = EventSpec::new(&event.address, kind).with_count(event.count);
        if let Some(value) = &event.value {
            spec = spec.with_value(value.to_tag_value());
        }
        let label = event
            .label
            .clone()
            .unwrap_or_else(|| format!("{} {}", kind, event.address));
        spec = spec.with_user_data(label);

        let id = session
            .event_add(spec)
            .with_context(|| format!("Failed to add {} event on {}", kind, event.address))?;
        log::info!("Registered {} event {} on {}", kind, id, event.address);
        ids.push(id);
    }

    Ok(ids)
}

/// Replay scripted writes from a second session on a background thread
///
/// The thread returns the number of writes performed.
pub fn spawn_writer(db: Arc<Tagbase>, writes: Vec<WriteConfig>) -> JoinHandle<Result<usize>> {
    thread::spawn(move || {
        let session = db.connect("writer");
        for (i, write) in writes.iter().enumerate() {
            if write.delay_ms > 0 {
                thread::sleep(Duration::from_millis(write.delay_ms));
            }
            session
                .write_elements(&write.address, write.count, &write.value.to_tag_value())
                .with_context(|| format!("writes[{}] to {} failed", i, write.address))?;
            log::debug!("Wrote {:?} to {}", write.value, write.address);
        }
        Ok(writes.len())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigValue;
    use tagbase::{TagValue, TagbaseConfig};

    #[test]
    fn test_demo_script_produces_notification() {
        let config = AppConfig::demo();
        let db = Arc::new(Tagbase::new(config.server.clone()));
        let session = db.connect("test");

        let ids = apply(&session, &config).unwrap();
        assert_eq!(ids.len(), 1);
        assert!(session.read("PyCDTTAG").unwrap().is_zero());

        let writer = spawn_writer(db.clone(), config.writes.clone());
        let n = session.event_wait(Duration::from_secs(5)).unwrap();
        assert_eq!(writer.join().unwrap().unwrap(), 1);

        assert_eq!(n.id, ids[0]);
        assert_eq!(n.user_data::<String>().map(String::as_str), Some("PyBYTE[5] changed"));
        assert_eq!(session.read("PyBYTE[5]").unwrap(), TagValue::Uint(7));
    }

    #[test]
    fn test_motor_script() {
        let config: AppConfig = toml::from_str(include_str!("../scripts/motor.toml")).unwrap();
        config.validate().unwrap();
        let db = Arc::new(Tagbase::new(config.server.clone()));
        let session = db.connect("test");
        assert_eq!(apply(&session, &config).unwrap().len(), 4);

        let writer = spawn_writer(db.clone(), config.writes.clone());
        assert_eq!(writer.join().unwrap().unwrap(), 5);

        let mut labels = Vec::new();
        while let Some(n) = session.event_poll() {
            labels.push(n.user_data::<String>().cloned().unwrap());
        }
        assert_eq!(
            labels,
            vec![
                "CHANGE Setpoint",
                "motor 1 started",
                "motor 0 overspeed",
                "motor 0 current",
                "motor 0 current",
            ]
        );
        assert_eq!(session.read("Motors[0].Speed").unwrap(), TagValue::Int(1600));
    }

    #[test]
    fn test_apply_reports_failures() {
        let db = Tagbase::new(TagbaseConfig::default());
        let session = db.connect("test");

        let mut config = AppConfig::demo();
        config.tags.push(crate::config::TagConfig {
            name: "PyINT".to_string(),
            type_name: "DINT".to_string(),
            count: 10,
        });
        let err = apply(&session, &config).unwrap_err();
        assert!(format!("{:#}", err).contains("PyINT"));
    }

    #[test]
    fn test_writer_reports_bad_writes() {
        let db = Arc::new(Tagbase::default());
        let writes = vec![WriteConfig {
            address: "Missing".to_string(),
            value: ConfigValue::Int(1),
            count: 0,
            delay_ms: 0,
        }];
        assert!(spawn_writer(db, writes).join().unwrap().is_err());
    }
}
