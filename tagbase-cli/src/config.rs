//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tagbase::{MemberDef, TagValue, TagbaseConfig};

/// Main application configuration (loaded from a TOML script)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: TagbaseConfig,
    #[serde(default)]
    pub types: Vec<TypeConfig>,
    #[serde(default)]
    pub tags: Vec<TagConfig>,
    #[serde(default)]
    pub events: Vec<EventConfig>,
    #[serde(default)]
    pub writes: Vec<WriteConfig>,
}

/// A compound type, either as a member list or in text form
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TypeConfig {
    pub name: Option<String>,
    #[serde(default)]
    pub members: Vec<MemberDef>,
    /// `Name:Mem,TYPE,count:...`
    pub definition: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TagConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventConfig {
    pub address: String,
    /// Event kind name, e.g. "change" or "GREATER"
    pub kind: String,
    #[serde(default)]
    pub count: u32,
    pub value: Option<ConfigValue>,
    /// Label reported with every notification of this event
    pub label: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WriteConfig {
    pub address: String,
    pub value: ConfigValue,
    #[serde(default)]
    pub count: u32,
    /// Pause before this write
    #[serde(default)]
    pub delay_ms: u64,
}

/// A TOML value that can be written to a tag
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    List(Vec<ConfigValue>),
    Table(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn to_tag_value(&self) -> TagValue {
        match self {
            ConfigValue::Bool(v) => TagValue::Bool(*v),
            ConfigValue::Int(v) => TagValue::Int(*v),
            ConfigValue::Real(v) => TagValue::Real(*v),
            ConfigValue::List(items) => {
                TagValue::Array(items.iter().map(ConfigValue::to_tag_value).collect())
            }
            ConfigValue::Table(members) => TagValue::Compound(
                members
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_tag_value()))
                    .collect(),
            ),
        }
    }
}

impl AppConfig {
    /// The reference client sequence as a script
    pub fn demo() -> Self {
        Self {
            server: TagbaseConfig::default(),
            types: vec![TypeConfig {
                name: Some("PyDAX_Type".to_string()),
                members: vec![
                    MemberDef::new("Mem1", "BOOL", 10),
                    MemberDef::new("Mem2", "BOOL", 1),
                    MemberDef::new("Mem3", "BOOL", 3),
                ],
                definition: None,
            }],
            tags: vec![
                TagConfig {
                    name: "PyCDTTAG".to_string(),
                    type_name: "PyDAX_TYPE".to_string(),
                    count: 1,
                },
                TagConfig {
                    name: "PyBYTE".to_string(),
                    type_name: "BYTE".to_string(),
                    count: 10,
                },
                TagConfig {
                    name: "PyINT".to_string(),
                    type_name: "INT".to_string(),
                    count: 10,
                },
                TagConfig {
                    name: "PyINT".to_string(),
                    type_name: "INT".to_string(),
                    count: 10,
                },
            ],
            events: vec![EventConfig {
                address: "PyBYTE[5]".to_string(),
                kind: "CHANGE".to_string(),
                count: 0,
                value: None,
                label: Some("PyBYTE[5] changed".to_string()),
            }],
            writes: vec![WriteConfig {
                address: "PyBYTE[5]".to_string(),
                value: ConfigValue::Int(7),
                count: 0,
                delay_ms: 100,
            }],
        }
    }

    /// Check the script for entries that can never be applied
    pub fn validate(&self) -> Result<()> {
        for (i, t) in self.types.iter().enumerate() {
            match (&t.definition, &t.name) {
                (Some(_), None) => {}
                (None, Some(_)) if !t.members.is_empty() => {}
                _ => bail!(
                    "types[{}]: give either `definition` or `name` with `members`",
                    i
                ),
            }
        }
        for (i, e) in self.events.iter().enumerate() {
            e.kind
                .parse::<tagbase::EventKind>()
                .with_context(|| format!("events[{}]: invalid kind", i))?;
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCRIPT: &str = r#"
        [server]
        queue_capacity = 64

        [[types]]
        name = "Motor"
        members = [
            { name = "Run", type = "BOOL" },
            { name = "Speed", type = "INT", count = 2 },
        ]

        [[types]]
        definition = "PyDAX_Type:Mem1,BOOL,10:Mem2,BOOL,1:Mem3,BOOL,3"

        [[tags]]
        name = "M1"
        type = "Motor"

        [[events]]
        address = "M1.Speed[1]"
        kind = "greater"
        value = 100
        label = "overspeed"

        [[writes]]
        address = "M1"
        value = { Run = true, Speed = [10, 120] }
        delay_ms = 5
    "#;

    #[test]
    fn test_config_deserialization() {
        let config: AppConfig = toml::from_str(SCRIPT).unwrap();
        assert_eq!(config.server.queue_capacity, 64);
        assert_eq!(config.server.max_name_length, 32);
        assert_eq!(config.types.len(), 2);
        assert_eq!(config.types[0].members[0].count, 1);
        assert_eq!(config.tags[0].count, 1);
        assert_eq!(config.events[0].value, Some(ConfigValue::Int(100)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_values_convert_to_tag_values() {
        let config: AppConfig = toml::from_str(SCRIPT).unwrap();
        let value = config.writes[0].value.to_tag_value();
        assert_eq!(value.member("Run"), Some(&TagValue::Bool(true)));
        assert_eq!(
            value.member("Speed"),
            Some(&TagValue::Array(vec![TagValue::Int(10), TagValue::Int(120)]))
        );
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCRIPT.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.writes[0].delay_ms, 5);
        assert_eq!(config.events[0].label.as_deref(), Some("overspeed"));
    }

    #[test]
    fn test_load_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(&dir.path().join("missing.toml")).is_err());

        let bad_kind = dir.path().join("bad.toml");
        fs::write(
            &bad_kind,
            "[[events]]\naddress = \"A\"\nkind = \"rising\"\n",
        )
        .unwrap();
        assert!(load_config(&bad_kind).is_err());

        let bad_type = dir.path().join("type.toml");
        fs::write(&bad_type, "[[types]]\nname = \"Empty\"\n").unwrap();
        assert!(load_config(&bad_type).is_err());
    }

    #[test]
    fn test_demo_config_is_valid() {
        let config = AppConfig::demo();
        assert!(config.validate().is_ok());
        assert_eq!(config.tags.len(), 4);
    }
}
