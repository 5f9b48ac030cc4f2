use mediaflow::registry::{StageDescriptor, StageDescriptorFactoryWrapper, StageRegistry};
use mediaflow::stages::{CollectorSink, FnStage, ManualSource, NullSink, Passthrough};
use mediaflow::{
    ControlCommand, ControlReply, FlowError, Graph, GraphConfig, InputSlot, Scheduling, SlotMap,
    StageConfig, StageState,
};
use serde_json::json;
use std::io::Write;

#[test]
fn test_inventory_collects_builtin_stages() {
    // Force the built-in stages to be linked
    let _ = (
        Passthrough::default(),
        ManualSource::default(),
        NullSink::default(),
        CollectorSink::default(),
    );

    let mut descriptors: Vec<StageDescriptor> = Vec::new();
    for wrapper in inventory::iter::<StageDescriptorFactoryWrapper> {
        descriptors.push((wrapper.0)());
    }

    let kinds: Vec<&str> = descriptors.iter().map(|d| d.kind.as_str()).collect();
    for expected in ["passthrough", "manual_source", "null_sink", "collector"] {
        assert!(kinds.contains(&expected), "{} not registered", expected);
    }
}

#[test]
fn test_descriptor_structure() {
    let registry = StageRegistry::discover();
    let passthrough = registry.descriptor("passthrough").expect("passthrough not found");

    assert_eq!(passthrough.name, "Passthrough");
    assert_eq!(passthrough.category, "Utility");
    assert_eq!(passthrough.inputs.len(), 1);
    assert_eq!(passthrough.inputs[0].id, "in");
    assert_eq!(passthrough.outputs[0].id, "out");

    let capacity = passthrough
        .parameters
        .iter()
        .find(|p| p.name == "capacity")
        .expect("capacity parameter not found");
    assert_eq!(capacity.param_type, "number");
    assert_eq!(capacity.default, json!(4));
    assert_eq!(capacity.min, Some(0.0));

    let overflow = passthrough.parameters.iter().find(|p| p.name == "overflow").unwrap();
    assert_eq!(overflow.default, json!("block"));

    let source = registry.descriptor("manual_source").unwrap();
    assert!(source.inputs.is_empty());
    assert_eq!(source.outputs.len(), 1);
}

#[test]
fn test_create_reports_bad_params() {
    let registry = StageRegistry::discover();
    let config = StageConfig {
        name: "relay".to_string(),
        kind: "passthrough".to_string(),
        params: json!({"overflow": "sideways"}),
    };
    assert!(matches!(registry.create(&config), Err(FlowError::Configuration(_))));
}

#[test]
fn test_custom_kind_registration() {
    fn build(_params: &serde_json::Value) -> anyhow::Result<Box<dyn mediaflow::Stage>> {
        let slots = SlotMap::new(Scheduling::Inline).input(InputSlot::new("in"));
        Ok(Box::new(FnStage::new(slots, |_, _| Ok(()))))
    }

    let mut registry = StageRegistry::new();
    registry.register(StageDescriptor::new("discard", "Discard", "Sinks", build).add_input("in", "In", "any"));
    assert_eq!(registry.kinds(), vec!["discard"]);

    let config = GraphConfig::from_value(json!({
        "stages": [{"name": "bin", "kind": "discard"}]
    }))
    .unwrap();
    let graph = Graph::from_config(&config, &registry).unwrap();
    assert_eq!(graph.stage("bin").unwrap().state(), StageState::Ready);
}

#[test]
fn test_graph_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "{}",
        json!({
            "engine": {"event_queue_limit": 8},
            "stages": [
                {"name": "camera", "kind": "manual_source", "params": {"media_type": "image"}},
                {"name": "relay", "kind": "passthrough"},
                {"name": "sink", "kind": "null_sink"}
            ],
            "edges": [
                {"producer": "camera", "consumer": "relay"},
                {"producer": "relay", "output": "out", "consumer": "sink", "input": "in"}
            ]
        })
    )
    .unwrap();

    let config = GraphConfig::load(file.path()).unwrap();
    assert_eq!(config.engine.event_queue_limit, 8);

    let graph = Graph::from_config(&config, &StageRegistry::discover()).unwrap();
    assert_eq!(graph.edges().len(), 2);
    assert_eq!(graph.events().limit(), 8);

    for _ in 0..3 {
        graph
            .emit("camera", "out", mediaflow::MediaBuffer::from_vec(vec![0; 16]))
            .unwrap();
    }
    let reply = graph
        .control(
            "sink",
            ControlCommand::Get {
                key: "consumed".to_string(),
            },
        )
        .unwrap();
    assert_eq!(reply, ControlReply::Value(json!(3)));

    let report = graph.monitor().generate_report();
    assert!(report.contains("[relay]"));
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = GraphConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, FlowError::Io(_)));
}
