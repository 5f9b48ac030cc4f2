use super::{EventMessage, EventOrdering};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

struct Shared {
    pending: Mutex<VecDeque<EventMessage>>,
    /// 0 means unbounded
    limit: usize,
    dropped: AtomicU64,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Shared {
    fn notify(&self, message: EventMessage) {
        let ordering = message.ordering;
        let evicted = {
            let mut pending = self.pending.lock();
            match message.ordering {
                EventOrdering::Fifo => pending.push_back(message),
                EventOrdering::Lifo => pending.push_front(message),
                EventOrdering::Unique => {
                    pending.retain(|queued| queued.id != message.id);
                    pending.push_back(message);
                }
            }
            if self.limit == 0 || pending.len() <= self.limit {
                None
            } else if ordering == EventOrdering::Lifo {
                // Keep the message that just jumped the queue
                pending.pop_back()
            } else {
                pending.pop_front()
            }
        };

        if let Some(evicted) = evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                "Event queue full ({}), dropped event {} from '{}'",
                self.limit,
                evicted.id,
                evicted.sender
            );
        }

        // A pending wake already covers this message
        let _ = self.wake_tx.try_send(());
    }

    fn pop(&self) -> Option<EventMessage> {
        self.pending.lock().pop_front()
    }
}

/// Cloneable producer side of an [`EventChannel`]
#[derive(Clone)]
pub struct EventSender {
    shared: Arc<Shared>,
}

impl EventSender {
    pub fn notify(&self, message: EventMessage) {
        self.shared.notify(message);
    }
}

struct HookWorker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Out-of-band notification queue drained by one hook thread.
///
/// Messages posted while no hook is registered stay queued until the next
/// [`EventChannel::register_hook`].
pub struct EventChannel {
    shared: Arc<Shared>,
    hook: Mutex<Option<HookWorker>>,
}

impl EventChannel {
    /// `limit` bounds the pending queue; 0 means unbounded
    pub fn new(limit: usize) -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(VecDeque::new()),
                limit,
                dropped: AtomicU64::new(0),
                wake_tx,
                wake_rx,
            }),
            hook: Mutex::new(None),
        }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            shared: self.shared.clone(),
        }
    }

    pub fn notify(&self, message: EventMessage) {
        self.shared.notify(message);
    }

    /// Start the hook worker, replacing (and joining) any previous one
    pub fn register_hook<F>(&self, hook: F) -> io::Result<()>
    where
        F: FnMut(EventMessage) + Send + 'static,
    {
        self.unregister_hook();

        let (stop_tx, stop_rx) = bounded(1);
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("event-hook".to_string())
            .spawn(move || run_hook(shared, stop_rx, hook))?;

        *self.hook.lock() = Some(HookWorker { stop_tx, handle });

        // Deliver whatever queued up while no hook was registered
        if !self.shared.pending.lock().is_empty() {
            let _ = self.shared.wake_tx.try_send(());
        }
        tracing::debug!("Event hook registered");
        Ok(())
    }

    /// Stop the hook worker and wait for it. Safe to call repeatedly.
    ///
    /// When called from inside the hook itself the worker is told to stop
    /// but not joined.
    pub fn unregister_hook(&self) {
        let Some(worker) = self.hook.lock().take() else {
            return;
        };

        let _ = worker.stop_tx.send(());
        if worker.handle.thread().id() == thread::current().id() {
            return;
        }
        if worker.handle.join().is_err() {
            tracing::warn!("Event hook panicked");
        }
        tracing::debug!("Event hook unregistered");
    }

    pub fn has_hook(&self) -> bool {
        self.hook.lock().is_some()
    }

    /// Messages waiting for the hook
    pub fn pending(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Messages evicted because the queue was full
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn limit(&self) -> usize {
        self.shared.limit
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.unregister_hook();
    }
}

fn run_hook<F>(shared: Arc<Shared>, stop_rx: Receiver<()>, mut hook: F)
where
    F: FnMut(EventMessage),
{
    loop {
        select! {
            recv(stop_rx) -> _ => break,
            recv(shared.wake_rx) -> _ => {
                while let Some(message) = shared.pop() {
                    hook(message);
                    if !stop_rx.is_empty() {
                        return;
                    }
                }
            }
        }
    }
}
