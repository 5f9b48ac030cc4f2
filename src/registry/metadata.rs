use crate::stage::Stage;
use serde::{Deserialize, Serialize};

/// Metadata describing a slot (input or output)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotMetadata {
    pub id: String,
    pub name: String,
    pub media_type: String,
}

/// Schema for a configurable parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub default: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Builds a stage from its config params
pub type StageFactory = fn(&serde_json::Value) -> anyhow::Result<Box<dyn Stage>>;

/// Complete metadata for a stage kind
#[derive(Clone, Serialize)]
pub struct StageDescriptor {
    /// Registry key used in graph configs
    pub kind: String,
    pub name: String,
    pub category: String,
    pub inputs: Vec<SlotMetadata>,
    pub outputs: Vec<SlotMetadata>,
    pub parameters: Vec<ParameterSchema>,
    #[serde(skip)]
    pub factory: StageFactory,
}

impl StageDescriptor {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, category: impl Into<String>, factory: StageFactory) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            category: category.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            parameters: Vec::new(),
            factory,
        }
    }

    pub fn add_input(mut self, id: impl Into<String>, name: impl Into<String>, media_type: impl Into<String>) -> Self {
        self.inputs.push(SlotMetadata {
            id: id.into(),
            name: name.into(),
            media_type: media_type.into(),
        });
        self
    }

    pub fn add_output(mut self, id: impl Into<String>, name: impl Into<String>, media_type: impl Into<String>) -> Self {
        self.outputs.push(SlotMetadata {
            id: id.into(),
            name: name.into(),
            media_type: media_type.into(),
        });
        self
    }

    pub fn add_parameter(mut self, param: ParameterSchema) -> Self {
        self.parameters.push(param);
        self
    }

    /// Create a new instance of this stage kind
    pub fn create_instance(&self, params: &serde_json::Value) -> anyhow::Result<Box<dyn Stage>> {
        (self.factory)(params)
    }
}

impl std::fmt::Debug for StageDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDescriptor")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("parameters", &self.parameters)
            .finish()
    }
}

// Factory type for creating stage descriptors at runtime
pub type StageDescriptorFactory = fn() -> StageDescriptor;

// Wrapper for inventory collection
pub struct StageDescriptorFactoryWrapper(pub StageDescriptorFactory);

// Inventory submission type
inventory::collect!(StageDescriptorFactoryWrapper);
