use serde::{Deserialize, Serialize};

/// Well-known message ids. Applications number their own from `USER_BASE`.
pub mod ids {
    pub const END_OF_STREAM: u32 = 1;
    pub const STAGE_FAILED: u32 = 2;
    pub const DETECTION: u32 = 3;
    pub const USER_BASE: u32 = 0x1000;
}

/// Where a message lands in the pending queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrdering {
    #[default]
    Fifo,
    /// Jumps ahead of everything pending
    Lifo,
    /// Replaces any pending message with the same id, then queues at the back
    Unique,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub sender: String,
    pub id: u32,
    #[serde(default)]
    pub param: i64,
    #[serde(default)]
    pub payload: Option<Vec<u8>>,
    #[serde(default)]
    pub ordering: EventOrdering,
}

impl EventMessage {
    pub fn new(id: u32) -> Self {
        Self {
            sender: String::new(),
            id,
            param: 0,
            payload: None,
            ordering: EventOrdering::Fifo,
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn with_param(mut self, param: i64) -> Self {
        self.param = param;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_ordering(mut self, ordering: EventOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn payload_str(&self) -> Option<&str> {
        self.payload.as_deref().and_then(|p| std::str::from_utf8(p).ok())
    }
}
