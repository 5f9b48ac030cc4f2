use mediaflow::event::ids;
use mediaflow::stages::{CollectorSink, FnStage, ManualSource, NullSink, Passthrough};
use mediaflow::{
    ControlCommand, ControlReply, Emitter, FlowError, Graph, InputBatch, InputSlot, MediaBuffer,
    MediaType, OutputSlot, Scheduling, SlotMap, Stage, StageHandle, StageState,
};
use serde_json::json;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

fn buffer() -> MediaBuffer {
    MediaBuffer::from_vec(vec![0; 8])
}

#[test]
fn test_duplicate_slot_ids_invalidate_stage() {
    let slots = SlotMap::new(Scheduling::Inline)
        .input(InputSlot::new("in"))
        .input(InputSlot::new("in"));
    let stage = StageHandle::from_stage("dup", FnStage::new(slots, |_, _| Ok(())));

    let err = stage.configure().unwrap_err();
    assert!(matches!(err, FlowError::InvalidSlotMap(_)));
    assert!(matches!(stage.state(), StageState::Invalid { .. }));

    // Invalid is terminal
    assert!(stage.configure().is_err());
    assert!(matches!(stage.state(), StageState::Invalid { .. }));
}

#[test]
fn test_worker_without_inputs_is_invalid() {
    let slots = SlotMap::new(Scheduling::worker()).output(OutputSlot::new("out"));
    let stage = StageHandle::from_stage("orphan", FnStage::new(slots, |_, _| Ok(())));
    assert!(stage.configure().is_err());
    assert!(matches!(stage.state(), StageState::Invalid { .. }));
}

#[test]
fn test_missing_transform_is_invalid() {
    let slots = SlotMap::new(Scheduling::Inline).input(InputSlot::new("in"));
    let stage = StageHandle::from_stage("empty", FnStage::without_transform(slots));
    assert!(matches!(stage.configure(), Err(FlowError::InvalidSlotMap(_))));
}

#[test]
fn test_control_forwarded_to_stage() {
    let stage = StageHandle::from_stage("relay", Passthrough::default());
    stage.configure().unwrap();
    stage.push("in", buffer()).unwrap();
    stage.push("in", buffer()).unwrap();

    let reply = stage
        .control(ControlCommand::Get {
            key: "forwarded".to_string(),
        })
        .unwrap();
    assert_eq!(reply, ControlReply::Value(json!(2)));

    let err = stage.control(ControlCommand::RequestKeyFrame).unwrap_err();
    assert!(matches!(err, FlowError::ControlUnsupported { .. }));
}

#[test]
fn test_typed_control_payload() {
    let (tx, rx) = mpsc::channel();
    let slots = SlotMap::new(Scheduling::Inline).input(InputSlot::new("in"));
    let stage = FnStage::new(slots, |_, _| Ok(())).on_control(move |command| {
        tx.send(command).unwrap();
        Ok(ControlReply::Done)
    });
    let handle = StageHandle::from_stage("encoder", stage);
    handle.configure().unwrap();

    let reply = handle
        .control(ControlCommand::SetBitrate {
            bits_per_second: 2_000_000,
        })
        .unwrap();
    assert_eq!(reply, ControlReply::Done);
    assert_eq!(
        rx.recv().unwrap(),
        ControlCommand::SetBitrate {
            bits_per_second: 2_000_000
        }
    );
}

#[test]
fn test_inline_failure_marks_failed_and_posts_event() {
    let graph = Graph::new();
    let (tx, rx) = mpsc::channel();
    graph.events().register_hook(move |message| tx.send(message).unwrap()).unwrap();

    let slots = SlotMap::new(Scheduling::Inline).input(InputSlot::new("in"));
    graph
        .add_stage(
            "broken",
            Box::new(FnStage::new(slots, |_, _| Err(anyhow::anyhow!("decoder exploded")))),
        )
        .unwrap();

    let err = graph.push("broken", "in", buffer()).unwrap_err();
    assert!(matches!(err, FlowError::TransformFailed { .. }));

    let stage = graph.stage("broken").unwrap();
    assert!(matches!(stage.state(), StageState::Failed { .. }));
    assert!(matches!(graph.push("broken", "in", buffer()), Err(FlowError::StageStopped(_))));

    let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(event.id, ids::STAGE_FAILED);
    assert_eq!(event.sender, "broken");
    assert!(event.payload_str().unwrap().contains("decoder exploded"));
}

#[test]
fn test_worker_failure_stops_only_that_stage() {
    let graph = Graph::new();
    let (tx, rx) = mpsc::channel();
    graph.events().register_hook(move |message| tx.send(message).unwrap()).unwrap();

    let slots = SlotMap::new(Scheduling::worker()).input(InputSlot::new("in"));
    graph
        .add_stage(
            "flaky",
            Box::new(FnStage::new(slots, |_, _| anyhow::bail!("lost device"))),
        )
        .unwrap();
    graph.add_stage("healthy", Box::new(Passthrough::default())).unwrap();

    // Worker push only enqueues; the failure arrives on the event channel
    assert!(graph.push("flaky", "in", buffer()).is_ok());
    let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(event.id, ids::STAGE_FAILED);
    assert_eq!(event.sender, "flaky");

    assert!(matches!(graph.push("flaky", "in", buffer()), Err(FlowError::StageStopped(_))));
    assert!(graph.push("healthy", "in", buffer()).is_ok());
    assert_eq!(graph.stage("healthy").unwrap().state(), StageState::Ready);

    // Failed stages can still be stopped
    graph.stop();
    assert_eq!(graph.stage("flaky").unwrap().state(), StageState::Stopped);
}

#[test]
fn test_stop_is_idempotent_and_drains() {
    let slots = SlotMap::new(Scheduling::Inline)
        .input(InputSlot::new("in"))
        .input(InputSlot::new("gate"));
    let stage = StageHandle::from_stage("drain", FnStage::new(slots, |_, _| Ok(())));
    stage.configure().unwrap();

    let tracked = buffer();
    stage.push("in", tracked.clone()).unwrap();
    assert_eq!(tracked.ref_count(), 2);

    stage.stop();
    stage.stop();
    assert_eq!(stage.state(), StageState::Stopped);
    assert!(tracked.is_unique());
}

/// src -> relay -> {bad, good}; `bad` rejects everything
fn relay_graph(relay: Passthrough, good: Box<dyn Stage>) -> (Graph, mpsc::Receiver<(u32, String)>) {
    let graph = Graph::new();
    let (tx, rx) = mpsc::channel();
    graph
        .events()
        .register_hook(move |message| tx.send((message.id, message.sender.clone())).unwrap())
        .unwrap();

    let bad = SlotMap::new(Scheduling::Inline).input(InputSlot::new("in"));
    graph.add_stage("src", Box::new(ManualSource::new(MediaType::Opaque))).unwrap();
    graph.add_stage("relay", Box::new(relay)).unwrap();
    graph
        .add_stage("bad", Box::new(FnStage::new(bad, |_, _| anyhow::bail!("corrupt frame"))))
        .unwrap();
    graph.add_stage("good", good).unwrap();

    graph.bind("src", "out", "relay", "in").unwrap();
    graph.bind("relay", "out", "bad", "in").unwrap();
    graph.bind("relay", "out", "good", "in").unwrap();
    (graph, rx)
}

#[test]
fn test_inline_downstream_failure_leaves_relay_bound() {
    let (graph, rx) = relay_graph(Passthrough::default(), Box::new(NullSink::default()));

    let err = graph.emit("src", "out", buffer()).unwrap_err();
    match err {
        FlowError::TransformFailed { stage, .. } => assert_eq!(stage, "bad"),
        other => panic!("unexpected error: {}", other),
    }
    assert!(matches!(graph.stage("bad").unwrap().state(), StageState::Failed { .. }));
    assert_eq!(graph.stage("relay").unwrap().state(), StageState::Bound);

    // The failed consumer is skipped; the healthy one keeps receiving
    graph.emit("src", "out", buffer()).unwrap();
    let consumed = graph
        .control("good", ControlCommand::Get {
            key: "consumed".to_string(),
        })
        .unwrap();
    assert_eq!(consumed, ControlReply::Value(json!(2)));

    let relay = graph.stage("relay").unwrap();
    assert_eq!(relay.metrics().snapshot().errors, 0);

    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), (ids::STAGE_FAILED, "bad".to_string()));
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_worker_relay_survives_downstream_failure() {
    let good = CollectorSink::default();
    let collected = good.collected();
    let (graph, rx) = relay_graph(Passthrough::new(Scheduling::worker()), Box::new(good));

    graph.emit("src", "out", buffer()).unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), (ids::STAGE_FAILED, "bad".to_string()));

    graph.emit("src", "out", buffer()).unwrap();
    assert!(collected.wait_for(2, Duration::from_secs(2)));
    assert_eq!(graph.stage("relay").unwrap().state(), StageState::Bound);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

/// Stops its own handle from inside the transform
struct SelfStopping {
    scheduling: Scheduling,
    handle: Arc<Mutex<Option<StageHandle>>>,
    torn_down: mpsc::Sender<()>,
}

impl Stage for SelfStopping {
    fn slot_map(&self) -> SlotMap {
        SlotMap::new(self.scheduling).input(InputSlot::new("in"))
    }

    fn transform(&mut self, _inputs: InputBatch, _out: &Emitter<'_>) -> anyhow::Result<()> {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.stop();
        }
        Ok(())
    }

    fn teardown(&mut self) {
        self.torn_down.send(()).unwrap();
    }
}

fn self_stopping(name: &str, scheduling: Scheduling) -> (StageHandle, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel();
    let slot = Arc::new(Mutex::new(None));
    let handle = StageHandle::from_stage(
        name,
        SelfStopping {
            scheduling,
            handle: slot.clone(),
            torn_down: tx,
        },
    );
    handle.configure().unwrap();
    *slot.lock().unwrap() = Some(handle.clone());
    (handle, rx)
}

#[test]
fn test_stop_from_own_worker_still_tears_down() {
    let (stage, torn_down) = self_stopping("quitter", Scheduling::worker());
    stage.push("in", buffer()).unwrap();

    torn_down.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(stage.state(), StageState::Stopped);

    // A later stop from outside does not tear down again
    stage.stop();
    assert!(torn_down.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_stop_from_own_inline_transform_tears_down() {
    let (stage, torn_down) = self_stopping("quitter", Scheduling::Inline);
    stage.push("in", buffer()).unwrap();

    torn_down.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(stage.state(), StageState::Stopped);
    assert!(matches!(stage.push("in", buffer()), Err(FlowError::StageStopped(_))));
}
