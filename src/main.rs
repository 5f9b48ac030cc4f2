use mediaflow::buffer::{BufferKind, BufferPool, SampleFormat, SampleInfo};
use mediaflow::event::ids;
use mediaflow::{ControlCommand, ControlReply, Graph, GraphConfig, StageRegistry};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("mediaflow demo");
    println!("==============\n");

    // capture -> relay (worker) -> sink
    let config = GraphConfig::from_value(serde_json::json!({
        "engine": { "event_queue_limit": 64 },
        "stages": [
            { "name": "capture", "kind": "manual_source", "params": { "media_type": "sample" } },
            {
                "name": "relay",
                "kind": "passthrough",
                "params": {
                    "scheduling": { "mode": "worker", "dispatch": "common" },
                    "capacity": 4,
                    "overflow": "drop_oldest"
                }
            },
            { "name": "sink", "kind": "null_sink" }
        ],
        "edges": [
            { "producer": "capture", "consumer": "relay" },
            { "producer": "relay", "consumer": "sink" }
        ]
    }))?;

    let registry = StageRegistry::discover();
    println!("Registered stage kinds: {:?}", registry.kinds());

    let graph = Graph::from_config(&config, &registry)?;
    graph.events().register_hook(|message| {
        let label = match message.id {
            ids::END_OF_STREAM => "end-of-stream",
            ids::STAGE_FAILED => "stage-failed",
            _ => "event",
        };
        println!("[{}] {} from '{}'", label, message.id, message.sender);
    })?;

    let info = SampleInfo {
        sample_rate: 48_000,
        channels: 2,
        format: SampleFormat::S16,
        samples_per_channel: 480,
    };
    let pool = BufferPool::new(info.byte_len(), 8);

    for sequence in 0..20u64 {
        let mut buffer = pool.acquire()?;
        buffer.set_kind(BufferKind::Sample(info))?;
        buffer.set_sequence(sequence)?;
        buffer.set_pts_us(sequence as i64 * 10_000)?;
        graph.emit("capture", "out", buffer)?;
    }

    std::thread::sleep(Duration::from_millis(50));
    graph
        .events()
        .notify(mediaflow::EventMessage::new(ids::END_OF_STREAM).with_sender("capture"));

    if let Ok(ControlReply::Value(consumed)) = graph.control(
        "sink",
        ControlCommand::Get {
            key: "consumed".to_string(),
        },
    ) {
        println!("\nSink consumed {} buffer(s)", consumed);
    }

    println!("{}", graph.monitor().generate_report());
    graph.stop();
    println!("Pool outstanding after stop: {}", pool.outstanding());

    Ok(())
}
