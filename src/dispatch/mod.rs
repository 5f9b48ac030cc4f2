//! Turns pushes into transform calls.
//!
//! Inline stages run the transform on the pushing thread. Worker stages own
//! one thread that sleeps on a wake channel; `Common` wakes coalesce into a
//! single-slot channel, `Atomic` wakes queue one token per accepted push.

mod worker;

pub(crate) use worker::spawn_worker;

use crate::stage::{PushOutcome, Scheduling, WorkerDispatch};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

/// Wake token delivered to a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    /// Something arrived somewhere; dispatch everything ready
    Data,
    /// One buffer arrived on this input slot
    Slot(usize),
}

pub(crate) struct WorkerChannels {
    pub dispatch: WorkerDispatch,
    wake_tx: Sender<Wake>,
    pub wake_rx: Receiver<Wake>,
    shutdown_tx: Sender<()>,
    pub shutdown_rx: Receiver<()>,
}

pub(crate) enum Dispatcher {
    Inline,
    Worker(WorkerChannels),
}

impl Dispatcher {
    pub fn new(scheduling: Scheduling) -> Self {
        match scheduling {
            Scheduling::Inline => Self::Inline,
            Scheduling::Worker(dispatch) => {
                let (wake_tx, wake_rx) = match dispatch {
                    WorkerDispatch::Common => bounded(1),
                    WorkerDispatch::Atomic => unbounded(),
                };
                let (shutdown_tx, shutdown_rx) = bounded(1);
                Self::Worker(WorkerChannels {
                    dispatch,
                    wake_tx,
                    wake_rx,
                    shutdown_tx,
                    shutdown_rx,
                })
            }
        }
    }

    /// Signal the worker after a push into `slot`
    pub fn wake(&self, slot: usize, outcome: PushOutcome) {
        let Self::Worker(channels) = self else {
            return;
        };

        match channels.dispatch {
            // A pending token already covers this push
            WorkerDispatch::Common => {
                let _ = channels.wake_tx.try_send(Wake::Data);
            }
            WorkerDispatch::Atomic => {
                if outcome != PushOutcome::DroppedNewest {
                    let _ = channels.wake_tx.send(Wake::Slot(slot));
                }
            }
        }
    }

    pub fn shutdown(&self) {
        if let Self::Worker(channels) = self {
            let _ = channels.shutdown_tx.try_send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_wakes_coalesce() {
        let dispatcher = Dispatcher::new(Scheduling::worker());
        for _ in 0..10 {
            dispatcher.wake(0, PushOutcome::Queued);
        }
        let Dispatcher::Worker(channels) = &dispatcher else {
            panic!("expected worker dispatcher");
        };
        assert_eq!(channels.wake_rx.len(), 1);
    }

    #[test]
    fn test_atomic_wakes_per_push() {
        let dispatcher = Dispatcher::new(Scheduling::atomic());
        dispatcher.wake(0, PushOutcome::Queued);
        dispatcher.wake(1, PushOutcome::DroppedOldest);
        dispatcher.wake(1, PushOutcome::DroppedNewest);
        let Dispatcher::Worker(channels) = &dispatcher else {
            panic!("expected worker dispatcher");
        };
        let tokens: Vec<Wake> = channels.wake_rx.try_iter().collect();
        assert_eq!(tokens, vec![Wake::Slot(0), Wake::Slot(1)]);
    }
}
