use super::{Wake, WorkerChannels};
use crate::stage::handle::StageCore;
use crate::stage::WorkerDispatch;
use crossbeam_channel::{select, Receiver};
use std::io;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

/// Start the worker thread for a configured stage.
///
/// The thread holds only a weak reference; it exits when the stage is
/// stopped, fails, or is dropped.
pub(crate) fn spawn_worker(core: &Arc<StageCore>, channels: &WorkerChannels) -> io::Result<JoinHandle<()>> {
    let name = core.name().to_string();
    let weak = Arc::downgrade(core);
    let dispatch = channels.dispatch;
    let wake_rx = channels.wake_rx.clone();
    let shutdown_rx = channels.shutdown_rx.clone();

    thread::Builder::new()
        .name(format!("stage-{}", name))
        .spawn(move || run_worker(name, weak, dispatch, wake_rx, shutdown_rx))
}

fn run_worker(
    name: String,
    core: Weak<StageCore>,
    dispatch: WorkerDispatch,
    wake_rx: Receiver<Wake>,
    shutdown_rx: Receiver<()>,
) {
    tracing::info!("[{}] Worker started ({:?} dispatch)", name, dispatch);

    loop {
        select! {
            recv(shutdown_rx) -> _ => break,
            recv(wake_rx) -> wake => {
                let Ok(wake) = wake else {
                    break;
                };
                let Some(core) = core.upgrade() else {
                    break;
                };

                let keep_running = match wake {
                    Wake::Data => core.dispatch_ready(),
                    Wake::Slot(slot) => core.dispatch_one(slot),
                };
                if !keep_running {
                    break;
                }
            }
        }
    }

    tracing::debug!("[{}] Worker stopped", name);
}
