//! Serde description of a graph: engine settings, stages by kind, edges.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

pub const DEFAULT_EVENT_QUEUE_LIMIT: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pending events kept before the oldest is dropped; 0 means unbounded
    #[serde(default = "default_event_queue_limit")]
    pub event_queue_limit: usize,
}

fn default_event_queue_limit() -> usize {
    DEFAULT_EVENT_QUEUE_LIMIT
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_queue_limit: DEFAULT_EVENT_QUEUE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    /// Registry key, e.g. "passthrough"
    pub kind: String,
    /// Decoded by the kind's own parameter struct
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub producer: String,
    #[serde(default = "default_output")]
    pub output: String,
    pub consumer: String,
    #[serde(default = "default_input")]
    pub input: String,
}

fn default_output() -> String {
    "out".to_string()
}

fn default_input() -> String {
    "in".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
    #[serde(default)]
    pub edges: Vec<EdgeConfig>,
}

impl GraphConfig {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        tracing::debug!("Loaded graph config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_fill_in() {
        let config = GraphConfig::from_value(json!({
            "stages": [{"name": "src", "kind": "manual_source"}],
            "edges": [{"producer": "src", "consumer": "sink"}]
        }))
        .unwrap();

        assert_eq!(config.engine.event_queue_limit, DEFAULT_EVENT_QUEUE_LIMIT);
        assert_eq!(config.stages[0].params, Value::Null);
        assert_eq!(config.edges[0].output, "out");
        assert_eq!(config.edges[0].input, "in");
    }

    #[test]
    fn test_malformed_json_is_reported() {
        let err = GraphConfig::from_json_str("{\"stages\": 3}").unwrap_err();
        assert!(matches!(err, crate::error::FlowError::Json(_)));
    }
}
