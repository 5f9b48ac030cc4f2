use super::queue::SlotQueue;
use super::slot::{InputSlot, OutputSlot, PushOutcome, SlotMap};
use super::state::StageState;
use super::traits::{ControlCommand, ControlReply, InputBatch, Stage};
use crate::buffer::MediaBuffer;
use crate::dispatch::{spawn_worker, Dispatcher};
use crate::error::{FlowError, Result};
use crate::event::{ids, EventMessage, EventSender};
use crate::graph::EdgeId;
use crate::observability::StageMetrics;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

/// Consumer end of an edge, stored on the producer's output slot
#[derive(Clone)]
pub(crate) struct EdgeTarget {
    pub edge: EdgeId,
    pub consumer: Arc<StageCore>,
    pub input: usize,
}

/// Everything fixed at configure time
pub(crate) struct Wiring {
    map: SlotMap,
    queues: Vec<SlotQueue>,
    outputs: Vec<RwLock<Vec<EdgeTarget>>>,
    dispatcher: Dispatcher,
}

impl Wiring {
    fn new(map: SlotMap) -> Self {
        let queues = map.inputs.iter().map(SlotQueue::new).collect();
        let outputs = map.outputs.iter().map(|_| RwLock::new(Vec::new())).collect();
        let dispatcher = Dispatcher::new(map.scheduling);
        Self {
            map,
            queues,
            outputs,
            dispatcher,
        }
    }

    /// Waiting slots must all hold data; with none, any data will do
    fn ready(&self) -> bool {
        let mut waiting = self
            .map
            .inputs
            .iter()
            .zip(&self.queues)
            .filter(|(slot, _)| slot.wait_for_data)
            .peekable();

        if waiting.peek().is_some() {
            waiting.all(|(_, queue)| !queue.is_empty())
        } else {
            self.queues.iter().any(|queue| !queue.is_empty())
        }
    }

    fn collect(&self) -> InputBatch {
        InputBatch::new(
            self.map
                .inputs
                .iter()
                .zip(&self.queues)
                .map(|(slot, queue)| (slot.id.clone(), queue.take_all()))
                .collect(),
        )
    }

    fn close(&self) -> usize {
        let drained: Vec<MediaBuffer> = self.queues.iter().flat_map(|q| q.close()).collect();
        drained.len()
    }
}

struct Lifecycle {
    state: StageState,
    edges: usize,
}

pub(crate) struct StageCore {
    name: String,
    stage: Mutex<Box<dyn Stage>>,
    lifecycle: Mutex<Lifecycle>,
    wiring: OnceLock<Wiring>,
    events: OnceLock<EventSender>,
    metrics: Arc<StageMetrics>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Thread currently inside this stage's transform
    running_on: Mutex<Option<ThreadId>>,
    teardown_deferred: AtomicBool,
}

impl StageCore {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> StageState {
        self.lifecycle.lock().state.clone()
    }

    fn not_ready(&self, state: &StageState) -> FlowError {
        match state {
            StageState::Stopping | StageState::Stopped | StageState::Failed { .. } => {
                FlowError::StageStopped(self.name.clone())
            }
            other => FlowError::StageNotReady {
                stage: self.name.clone(),
                state: other.name().to_string(),
            },
        }
    }

    fn wiring(&self) -> Result<&Wiring> {
        self.wiring.get().ok_or_else(|| self.not_ready(&self.state()))
    }

    fn live_wiring(&self) -> Result<&Wiring> {
        let state = self.state();
        if !state.is_live() {
            return Err(self.not_ready(&state));
        }
        self.wiring()
    }

    fn transition(&self, target: StageState) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state.can_transition_to(&target) {
            lifecycle.state = target;
            true
        } else {
            false
        }
    }

    fn configure(self: &Arc<Self>) -> Result<()> {
        let current = self.state();
        if current != StageState::Unconfigured {
            return Err(self.not_ready(&current));
        }

        let prepared = {
            let mut stage = self.stage.lock();
            match stage.init() {
                Err(e) => Err(FlowError::InvalidSlotMap(format!("init failed: {}", e))),
                Ok(()) => {
                    let map = stage.slot_map();
                    map.validate().and_then(|()| {
                        if stage.has_transform() {
                            Ok(map)
                        } else {
                            Err(FlowError::InvalidSlotMap("no transform callback".to_string()))
                        }
                    })
                }
            }
        };

        let map = match prepared {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!("[{}] Configure failed: {}", self.name, e);
                self.transition(StageState::Invalid {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let scheduling = map.scheduling;
        let (inputs, outputs) = (map.inputs.len(), map.outputs.len());
        if self.wiring.set(Wiring::new(map)).is_err() {
            return Err(FlowError::StageNotReady {
                stage: self.name.clone(),
                state: "already configured".to_string(),
            });
        }

        if let Some(Wiring {
            dispatcher: Dispatcher::Worker(channels),
            ..
        }) = self.wiring.get()
        {
            match spawn_worker(self, channels) {
                Ok(handle) => *self.worker.lock() = Some(handle),
                Err(e) => {
                    self.transition(StageState::Invalid {
                        reason: e.to_string(),
                    });
                    return Err(FlowError::Io(e));
                }
            }
        }

        self.transition(StageState::Ready);
        tracing::info!(
            "[{}] Configured: {} input(s), {} output(s), {:?}",
            self.name,
            inputs,
            outputs,
            scheduling
        );
        Ok(())
    }

    pub fn push(&self, input: usize, buffer: MediaBuffer) -> Result<PushOutcome> {
        let wiring = self.live_wiring()?;
        let queue = wiring.queues.get(input).ok_or_else(|| FlowError::UnknownSlot {
            stage: self.name.clone(),
            slot: format!("#{}", input),
        })?;

        let outcome = match queue.push(buffer) {
            Ok(outcome) => outcome,
            Err(_) => {
                self.metrics.record_rejected();
                return Err(FlowError::StageStopped(self.name.clone()));
            }
        };
        self.metrics.record_push(outcome);
        tracing::trace!("[{}] push into slot #{}: {:?}", self.name, input, outcome);

        match &wiring.dispatcher {
            Dispatcher::Inline => self.dispatch_inline(wiring)?,
            worker => worker.wake(input, outcome),
        }
        Ok(outcome)
    }

    fn dispatch_inline(&self, wiring: &Wiring) -> Result<()> {
        let result = {
            let mut stage = self.stage.lock();
            if !wiring.ready() {
                return Ok(());
            }
            let batch = wiring.collect();
            self.run_transform(&mut **stage, batch)
        };
        self.finish_deferred_teardown();

        if let Err(e) = &result {
            if self.owns_failure(e) {
                self.fail(e);
            }
        }
        result
    }

    /// Worker, common dispatch: run until nothing is ready. False stops the worker.
    pub fn dispatch_ready(&self) -> bool {
        let Some(wiring) = self.wiring.get() else {
            return false;
        };

        loop {
            let result = {
                let mut stage = self.stage.lock();
                if !wiring.ready() {
                    return true;
                }
                let batch = wiring.collect();
                self.run_transform(&mut **stage, batch)
            };
            self.finish_deferred_teardown();

            if let Err(e) = result {
                if self.owns_failure(&e) {
                    self.fail(&e);
                    return false;
                }
                tracing::debug!("[{}] Downstream failure: {}", self.name, e);
            }
        }
    }

    /// Worker, atomic dispatch: one buffer from one slot. False stops the worker.
    pub fn dispatch_one(&self, input: usize) -> bool {
        let Some(wiring) = self.wiring.get() else {
            return false;
        };
        let (Some(slot), Some(queue)) = (wiring.map.inputs.get(input), wiring.queues.get(input)) else {
            return true;
        };

        let result = {
            let mut stage = self.stage.lock();
            // Evicted by drop-oldest or drained by stop
            let Some(buffer) = queue.pop() else {
                return true;
            };
            self.run_transform(&mut **stage, InputBatch::single(slot.id.clone(), buffer))
        };
        self.finish_deferred_teardown();

        match result {
            Ok(()) => true,
            Err(e) if self.owns_failure(&e) => {
                self.fail(&e);
                false
            }
            Err(e) => {
                tracing::debug!("[{}] Downstream failure: {}", self.name, e);
                true
            }
        }
    }

    /// Run the transform. A failure raised by an inline consumer further down
    /// is passed through under that consumer's name; only this stage's own
    /// failures are attributed to it.
    fn run_transform(&self, stage: &mut dyn Stage, batch: InputBatch) -> Result<()> {
        let start = self.metrics.start_processing();
        let emitter = Emitter { core: self };

        *self.running_on.lock() = Some(thread::current().id());
        let outcome = stage.transform(batch, &emitter);
        *self.running_on.lock() = None;

        let source = match outcome {
            Ok(()) => {
                self.metrics.finish_processing(start);
                self.metrics.record_dispatch();
                return Ok(());
            }
            Err(source) => source,
        };

        match source.downcast::<FlowError>() {
            Ok(FlowError::TransformFailed { stage, source }) if stage != self.name => {
                self.metrics.finish_processing(start);
                self.metrics.record_dispatch();
                Err(FlowError::TransformFailed { stage, source })
            }
            Ok(own) => {
                self.metrics.record_error();
                Err(FlowError::TransformFailed {
                    stage: self.name.clone(),
                    source: own.into(),
                })
            }
            Err(source) => {
                self.metrics.record_error();
                Err(FlowError::TransformFailed {
                    stage: self.name.clone(),
                    source,
                })
            }
        }
    }

    fn owns_failure(&self, error: &FlowError) -> bool {
        matches!(error, FlowError::TransformFailed { stage, .. } if *stage == self.name)
    }

    /// Teardown requested by `stop` from inside this stage's own transform
    fn finish_deferred_teardown(&self) {
        if self.teardown_deferred.swap(false, Ordering::AcqRel) {
            self.stage.lock().teardown();
            tracing::debug!("[{}] Deferred teardown done", self.name);
        }
    }

    /// Mark failed, release queued buffers, report on the event channel
    fn fail(&self, error: &FlowError) {
        let reason = error.to_string();
        if !self.transition(StageState::Failed {
            reason: reason.clone(),
        }) {
            return;
        }

        tracing::warn!("[{}] Stage failed: {}", self.name, reason);
        if let Some(wiring) = self.wiring.get() {
            let released = wiring.close();
            tracing::debug!("[{}] Released {} queued buffer(s)", self.name, released);
        }

        self.notify(
            EventMessage::new(ids::STAGE_FAILED)
                .with_payload(reason.into_bytes()),
        );
    }

    fn notify(&self, mut message: EventMessage) {
        if message.sender.is_empty() {
            message.sender = self.name.clone();
        }
        match self.events.get() {
            Some(events) => events.notify(message),
            None => tracing::debug!("[{}] No event channel, dropping event {}", self.name, message.id),
        }
    }

    pub fn emit(&self, output: usize, buffer: MediaBuffer) -> Result<()> {
        let wiring = self.wiring()?;
        let slot = wiring.outputs.get(output).ok_or_else(|| FlowError::UnknownSlot {
            stage: self.name.clone(),
            slot: format!("#{}", output),
        })?;

        // Snapshot so no lock is held while consumers run or block
        let targets: Vec<EdgeTarget> = slot.read().clone();
        self.metrics.record_emit();

        let Some((last, rest)) = targets.split_last() else {
            tracing::trace!("[{}] emit on unbound output #{}", self.name, output);
            return Ok(());
        };

        let mut first_failure = None;
        for target in rest {
            self.deliver(target, buffer.clone(), &mut first_failure);
        }
        self.deliver(last, buffer, &mut first_failure);

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn deliver(&self, target: &EdgeTarget, buffer: MediaBuffer, first_failure: &mut Option<FlowError>) {
        match target.consumer.push(target.input, buffer) {
            Ok(_) => {}
            Err(e @ FlowError::TransformFailed { .. }) => {
                if first_failure.is_none() {
                    *first_failure = Some(e);
                }
            }
            Err(e) => {
                tracing::debug!(
                    "[{}] edge {} to '{}' not delivered: {}",
                    self.name,
                    target.edge,
                    target.consumer.name(),
                    e
                );
            }
        }
    }

    pub fn input_index(&self, slot: &str) -> Result<usize> {
        self.wiring()?
            .map
            .input_index(slot)
            .ok_or_else(|| FlowError::UnknownSlot {
                stage: self.name.clone(),
                slot: slot.to_string(),
            })
    }

    pub fn output_index(&self, slot: &str) -> Result<usize> {
        self.wiring()?
            .map
            .output_index(slot)
            .ok_or_else(|| FlowError::UnknownSlot {
                stage: self.name.clone(),
                slot: slot.to_string(),
            })
    }

    pub fn input_slot(&self, input: usize) -> Option<&InputSlot> {
        self.wiring.get().and_then(|w| w.map.inputs.get(input))
    }

    pub fn output_slot(&self, output: usize) -> Option<&OutputSlot> {
        self.wiring.get().and_then(|w| w.map.outputs.get(output))
    }

    pub fn is_bindable(&self) -> Result<()> {
        let state = self.state();
        if state.is_bindable() {
            Ok(())
        } else {
            Err(FlowError::StageNotReady {
                stage: self.name.clone(),
                state: state.name().to_string(),
            })
        }
    }

    /// Count one more edge touching this stage
    pub fn edge_added(&self) {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.edges += 1;
        if lifecycle.state == StageState::Ready {
            lifecycle.state = StageState::Bound;
        }
    }

    pub fn edge_removed(&self) {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.edges = lifecycle.edges.saturating_sub(1);
        if lifecycle.edges == 0 && lifecycle.state == StageState::Bound {
            lifecycle.state = StageState::Ready;
        }
    }

    pub fn attach_output(&self, output: usize, target: EdgeTarget) -> Result<()> {
        let wiring = self.live_wiring()?;
        let slot = wiring.outputs.get(output).ok_or_else(|| FlowError::UnknownSlot {
            stage: self.name.clone(),
            slot: format!("#{}", output),
        })?;
        slot.write().push(target);
        Ok(())
    }

    /// Remove one edge from whichever output carries it
    pub fn detach_output(&self, edge: EdgeId) -> bool {
        let Some(wiring) = self.wiring.get() else {
            return false;
        };
        for slot in &wiring.outputs {
            let mut targets = slot.write();
            if let Some(pos) = targets.iter().position(|t| t.edge == edge) {
                targets.remove(pos);
                return true;
            }
        }
        false
    }

    fn stop(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            match lifecycle.state {
                StageState::Stopping | StageState::Stopped | StageState::Invalid { .. } => return,
                _ => lifecycle.state = StageState::Stopping,
            }
        }

        if let Some(wiring) = self.wiring.get() {
            let released = wiring.close();
            wiring.dispatcher.shutdown();
            for slot in &wiring.outputs {
                slot.write().clear();
            }
            tracing::debug!("[{}] Released {} queued buffer(s)", self.name, released);
        }

        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!("[{}] Worker panicked", self.name);
            }
        }

        // From inside the transform the stage is still borrowed; teardown runs once it returns
        let from_transform = *self.running_on.lock() == Some(thread::current().id());
        if from_transform {
            self.teardown_deferred.store(true, Ordering::Release);
        } else {
            self.stage.lock().teardown();
        }
        self.transition(StageState::Stopped);
        tracing::info!("[{}] Stopped", self.name);
    }
}

impl Drop for StageCore {
    fn drop(&mut self) {
        if let Some(wiring) = self.wiring.get() {
            wiring.close();
            wiring.dispatcher.shutdown();
        }
    }
}

/// Output side handed to a transform.
pub struct Emitter<'a> {
    core: &'a StageCore,
}

impl Emitter<'_> {
    /// Fan out to every consumer bound on `slot`; unbound slots drop the buffer.
    ///
    /// Consumers that are stopped are skipped. An inline consumer whose
    /// transform fails makes this return that failure after every consumer
    /// has been offered the buffer.
    pub fn emit(&self, slot: &str, buffer: MediaBuffer) -> Result<()> {
        let output = self.core.output_index(slot)?;
        self.core.emit(output, buffer)
    }

    /// Post an out-of-band event; the sender defaults to this stage's name
    pub fn notify(&self, message: EventMessage) {
        self.core.notify(message);
    }

    pub fn stage_name(&self) -> &str {
        self.core.name()
    }

    pub fn has_consumers(&self, slot: &str) -> bool {
        let Ok(output) = self.core.output_index(slot) else {
            return false;
        };
        self.core
            .wiring
            .get()
            .and_then(|w| w.outputs.get(output))
            .map(|targets| !targets.read().is_empty())
            .unwrap_or(false)
    }
}

/// Shared handle to a stage instance.
#[derive(Clone)]
pub struct StageHandle {
    core: Arc<StageCore>,
}

impl StageHandle {
    pub fn new(name: impl Into<String>, stage: Box<dyn Stage>) -> Self {
        let name = name.into();
        Self {
            core: Arc::new(StageCore {
                metrics: Arc::new(StageMetrics::new(&name)),
                name,
                stage: Mutex::new(stage),
                lifecycle: Mutex::new(Lifecycle {
                    state: StageState::Unconfigured,
                    edges: 0,
                }),
                wiring: OnceLock::new(),
                events: OnceLock::new(),
                worker: Mutex::new(None),
                running_on: Mutex::new(None),
                teardown_deferred: AtomicBool::new(false),
            }),
        }
    }

    pub fn from_stage<S: Stage + 'static>(name: impl Into<String>, stage: S) -> Self {
        Self::new(name, Box::new(stage))
    }

    /// Init the stage, validate its slot map, start its worker.
    ///
    /// On failure the stage is `Invalid` for good.
    pub fn configure(&self) -> Result<()> {
        self.core.configure()
    }

    /// Route this stage's events (failures, stage notifications) to a channel
    pub fn set_event_sender(&self, sender: EventSender) {
        let _ = self.core.events.set(sender);
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn state(&self) -> StageState {
        self.core.state()
    }

    pub fn slot_map(&self) -> Option<&SlotMap> {
        self.core.wiring.get().map(|w| &w.map)
    }

    pub fn edge_count(&self) -> usize {
        self.core.lifecycle.lock().edges
    }

    pub fn is_bound(&self) -> bool {
        self.edge_count() > 0
    }

    pub fn metrics(&self) -> Arc<StageMetrics> {
        self.core.metrics.clone()
    }

    /// Deliver a buffer into an input slot, applying its overflow policy
    pub fn push(&self, slot: &str, buffer: MediaBuffer) -> Result<PushOutcome> {
        let input = self.core.input_index(slot)?;
        self.core.push(input, buffer)
    }

    /// Send a buffer out of an output slot as if the stage produced it
    pub fn emit(&self, slot: &str, buffer: MediaBuffer) -> Result<()> {
        let output = self.core.output_index(slot)?;
        self.core.emit(output, buffer)
    }

    pub fn control(&self, command: ControlCommand) -> Result<ControlReply> {
        let name = command.name().to_string();
        let reply = self.core.stage.lock().control(command)?;
        match reply {
            ControlReply::Unsupported => Err(FlowError::ControlUnsupported {
                stage: self.core.name.clone(),
                command: name,
            }),
            reply => Ok(reply),
        }
    }

    /// Buffers waiting on an input slot
    pub fn queued(&self, slot: &str) -> usize {
        self.core
            .input_index(slot)
            .ok()
            .and_then(|i| self.core.wiring.get().map(|w| w.queues[i].len()))
            .unwrap_or(0)
    }

    /// Stop the worker, release queued buffers, tear the stage down. Idempotent.
    pub fn stop(&self) {
        self.core.stop();
    }

    pub(crate) fn core(&self) -> &Arc<StageCore> {
        &self.core
    }
}

impl fmt::Debug for StageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageHandle")
            .field("name", &self.core.name)
            .field("state", &self.state())
            .field("edges", &self.edge_count())
            .finish()
    }
}
