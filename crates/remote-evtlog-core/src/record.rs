//! Rendered record and invocation modes.

use serde::{Deserialize, Serialize};

/// One event log record with its message resolved.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StructuredRecord {
    pub record_id: u64,
    pub event_id: String,
    #[serde(rename = "logname")]
    pub channel: String,
    #[serde(rename = "source")]
    pub provider_name: String,
    pub computer: String,
    pub time_created: String,
    pub task: String,
    pub level: String,
    /// Backslash-escaped provider message; empty when unresolved.
    #[serde(default)]
    pub message: String,
}

/// Whether enumeration stops after the first rendered record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    #[default]
    Default,
    LastRecordOnly,
}

/// Output format for emitted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// One JSON object per record.
    #[default]
    Structured,
    /// `||`-separated text with a header row.
    Delimited,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names() {
        let record = StructuredRecord {
            record_id: 7,
            channel: "System".into(),
            provider_name: "Service Control Manager".into(),
            ..Default::default()
        };
        let value = serde_json::to_value(&record).unwrap();
        let keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        for key in [
            "record_id",
            "event_id",
            "logname",
            "source",
            "computer",
            "time_created",
            "task",
            "level",
            "message",
        ] {
            assert!(keys.contains(&key), "missing {key}");
        }
        assert_eq!(value["logname"], "System");
    }

    #[test]
    fn test_output_mode_serialization() {
        let mode: OutputMode = serde_json::from_str("\"delimited\"").unwrap();
        assert_eq!(mode, OutputMode::Delimited);
        assert_eq!(OutputMode::default(), OutputMode::Structured);
    }
}
