use crate::buffer::MediaBuffer;
use crate::stage::{
    ControlCommand, ControlReply, Emitter, InputBatch, InputSlot, OverflowPolicy, Scheduling,
    SlotMap, Stage, DEFAULT_SLOT_CAPACITY,
};
use anyhow::Result;
use mediaflow_macros::StageKind;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Buffers retained by a [`CollectorSink`], readable from any thread.
#[derive(Clone, Default)]
pub struct Collected {
    inner: Arc<(Mutex<Vec<MediaBuffer>>, Condvar)>,
}

impl Collected {
    fn push_all(&self, buffers: impl IntoIterator<Item = MediaBuffer>) {
        let (lock, arrived) = &*self.inner;
        lock.lock().extend(buffers);
        arrived.notify_all();
    }

    pub fn buffers(&self) -> Vec<MediaBuffer> {
        self.inner.0.lock().clone()
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.inner.0.lock().iter().map(|b| b.sequence()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release everything held so far
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.inner.0.lock());
        drop(drained);
    }

    /// Block until at least `count` buffers arrived; false on timeout
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, arrived) = &*self.inner;
        let mut buffers = lock.lock();
        while buffers.len() < count {
            if arrived.wait_until(&mut buffers, deadline).timed_out() {
                return buffers.len() >= count;
            }
        }
        true
    }
}

impl fmt::Debug for Collected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collected").field("len", &self.len()).finish()
    }
}

/// Keeps every buffer it receives, optionally sleeping per dispatch to play
/// a slow consumer.
#[derive(StageKind, Debug, Clone, Serialize, Deserialize)]
#[stage_meta(name = "Collector", category = "Sinks", kind = "collector")]
#[serde(default)]
pub struct CollectorSink {
    #[input(name = "In")]
    #[serde(skip)]
    _in: (),

    #[param(default = "{\"mode\": \"inline\"}")]
    pub scheduling: Scheduling,

    #[param(default = "4", min = 0.0)]
    pub capacity: usize,

    #[param(default = "\"block\"")]
    pub overflow: OverflowPolicy,

    #[param(default = "0", min = 0.0)]
    pub delay_ms: u64,

    #[serde(skip)]
    collected: Collected,
}

impl CollectorSink {
    pub fn new(scheduling: Scheduling) -> Self {
        Self {
            scheduling,
            ..Self::default()
        }
    }

    pub fn with_queue(mut self, capacity: usize, overflow: OverflowPolicy) -> Self {
        self.capacity = capacity;
        self.overflow = overflow;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = delay.as_millis() as u64;
        self
    }

    /// Shared view of what this sink receives
    pub fn collected(&self) -> Collected {
        self.collected.clone()
    }
}

impl Default for CollectorSink {
    fn default() -> Self {
        Self {
            _in: (),
            scheduling: Scheduling::Inline,
            capacity: DEFAULT_SLOT_CAPACITY,
            overflow: OverflowPolicy::Block,
            delay_ms: 0,
            collected: Collected::default(),
        }
    }
}

impl Stage for CollectorSink {
    fn slot_map(&self) -> SlotMap {
        SlotMap::new(self.scheduling)
            .input(InputSlot::new("in").capacity(self.capacity).overflow(self.overflow))
    }

    fn transform(&mut self, inputs: InputBatch, _out: &Emitter<'_>) -> Result<()> {
        if self.delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.delay_ms));
        }
        self.collected.push_all(inputs.into_buffers().map(|(_, buffer)| buffer));
        Ok(())
    }

    fn control(&mut self, command: ControlCommand) -> Result<ControlReply> {
        match command {
            ControlCommand::Get { key } if key == "count" => Ok(ControlReply::Value(json!(self.collected.len()))),
            ControlCommand::Set { key, value } if key == "delay_ms" => {
                let Some(delay_ms) = value.as_u64() else {
                    anyhow::bail!("delay_ms expects a non-negative integer, got {}", value);
                };
                self.delay_ms = delay_ms;
                Ok(ControlReply::Done)
            }
            _ => Ok(ControlReply::Unsupported),
        }
    }

    fn teardown(&mut self) {
        tracing::debug!("Collector held {} buffer(s) at teardown", self.collected.len());
    }
}
