//! Stage kinds by name.
//!
//! Built-in kinds register themselves through `#[derive(StageKind)]`; an
//! application adds its own with [`StageRegistry::register`].

mod metadata;

pub use metadata::{
    ParameterSchema, SlotMetadata, StageDescriptor, StageDescriptorFactory,
    StageDescriptorFactoryWrapper, StageFactory,
};

use crate::config::StageConfig;
use crate::error::{FlowError, Result};
use crate::stage::Stage;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

/// Decode a kind's parameter struct; missing params mean defaults
pub fn decode_params<T>(params: &Value) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    if params.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(params.clone())?)
}

#[derive(Debug, Default, Clone)]
pub struct StageRegistry {
    descriptors: BTreeMap<String, StageDescriptor>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every kind submitted through `inventory`
    pub fn discover() -> Self {
        let mut registry = Self::new();
        for wrapper in inventory::iter::<StageDescriptorFactoryWrapper> {
            registry.register(wrapper.0());
        }
        tracing::debug!("Discovered {} stage kind(s)", registry.descriptors.len());
        registry
    }

    /// Add or replace a kind
    pub fn register(&mut self, descriptor: StageDescriptor) {
        if self.descriptors.contains_key(&descriptor.kind) {
            tracing::warn!("Replacing stage kind '{}'", descriptor.kind);
        }
        self.descriptors.insert(descriptor.kind.clone(), descriptor);
    }

    pub fn descriptor(&self, kind: &str) -> Option<&StageDescriptor> {
        self.descriptors.get(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.descriptors.keys().map(String::as_str).collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &StageDescriptor> {
        self.descriptors.values()
    }

    pub fn create(&self, config: &StageConfig) -> Result<Box<dyn Stage>> {
        let descriptor = self
            .descriptor(&config.kind)
            .ok_or_else(|| FlowError::UnknownKind(config.kind.clone()))?;

        descriptor.create_instance(&config.params).map_err(|e| {
            FlowError::Configuration(format!("stage '{}' ({}): {}", config.name, config.kind, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Params {
        depth: u32,
        label: String,
    }

    #[test]
    fn test_decode_params_defaults() {
        let params: Params = decode_params(&Value::Null).unwrap();
        assert_eq!(params, Params::default());

        let params: Params = decode_params(&json!({"depth": 3})).unwrap();
        assert_eq!(params.depth, 3);
        assert!(params.label.is_empty());
    }

    #[test]
    fn test_unknown_kind() {
        let registry = StageRegistry::new();
        let config = StageConfig {
            name: "x".to_string(),
            kind: "missing".to_string(),
            params: Value::Null,
        };
        assert!(matches!(registry.create(&config), Err(FlowError::UnknownKind(_))));
    }
}
