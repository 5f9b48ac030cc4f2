use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("out of memory: failed to allocate {0} bytes")]
    OutOfMemory(usize),

    #[error("valid size {size} exceeds capacity {capacity}")]
    SizeExceedsCapacity { size: usize, capacity: usize },

    #[error("buffer is shared; producer-side mutation is no longer allowed")]
    BufferShared,

    #[error("invalid slot map: {0}")]
    InvalidSlotMap(String),

    #[error("stage '{stage}' is not ready: {state}")]
    StageNotReady { stage: String, state: String },

    #[error("stage '{0}' is stopped")]
    StageStopped(String),

    #[error("stage not found: {0}")]
    StageNotFound(String),

    #[error("stage already exists: {0}")]
    StageAlreadyExists(String),

    #[error("unknown slot '{slot}' on stage '{stage}'")]
    UnknownSlot { stage: String, slot: String },

    #[error("incompatible edge: {0}")]
    IncompatibleEdge(String),

    #[error("edge already exists: {0}")]
    EdgeAlreadyExists(String),

    #[error("binding would create a cycle: {0}")]
    Cycle(String),

    #[error("edge not found: {0}")]
    EdgeNotFound(u64),

    #[error("transform failed in stage '{stage}': {source}")]
    TransformFailed {
        stage: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("control command not supported by stage '{stage}': {command}")]
    ControlUnsupported { stage: String, command: String },

    #[error("unknown stage kind: {0}")]
    UnknownKind(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;
