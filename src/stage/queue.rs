use super::slot::{InputSlot, OverflowPolicy, PushOutcome};
use crate::buffer::MediaBuffer;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Push refused because the queue was closed by stage teardown
#[derive(Debug)]
pub(crate) struct QueueClosed;

struct QueueState {
    items: VecDeque<MediaBuffer>,
    closed: bool,
}

/// Bounded FIFO behind one input slot.
pub(crate) struct SlotQueue {
    capacity: usize,
    overflow: OverflowPolicy,
    state: Mutex<QueueState>,
    space: Condvar,
}

impl SlotQueue {
    pub fn new(slot: &InputSlot) -> Self {
        Self {
            capacity: slot.capacity,
            overflow: slot.overflow,
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            space: Condvar::new(),
        }
    }

    fn is_full(&self, state: &QueueState) -> bool {
        self.capacity != 0 && state.items.len() >= self.capacity
    }

    pub fn push(&self, buffer: MediaBuffer) -> Result<PushOutcome, QueueClosed> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QueueClosed);
        }

        if !self.is_full(&state) {
            state.items.push_back(buffer);
            return Ok(PushOutcome::Queued);
        }

        match self.overflow {
            OverflowPolicy::Block => {
                while self.is_full(&state) && !state.closed {
                    self.space.wait(&mut state);
                }
                if state.closed {
                    return Err(QueueClosed);
                }
                state.items.push_back(buffer);
                Ok(PushOutcome::Queued)
            }
            OverflowPolicy::DropOldest => {
                let evicted = state.items.pop_front();
                state.items.push_back(buffer);
                drop(state);
                // Release outside the lock; a release action may be slow
                drop(evicted);
                Ok(PushOutcome::DroppedOldest)
            }
            OverflowPolicy::DropNewest => {
                drop(state);
                drop(buffer);
                Ok(PushOutcome::DroppedNewest)
            }
        }
    }

    pub fn pop(&self) -> Option<MediaBuffer> {
        let item = self.state.lock().items.pop_front();
        if item.is_some() {
            self.space.notify_one();
        }
        item
    }

    /// Take everything queued, in push order
    pub fn take_all(&self) -> Vec<MediaBuffer> {
        let items: Vec<MediaBuffer> = self.state.lock().items.drain(..).collect();
        if !items.is_empty() {
            self.space.notify_all();
        }
        items
    }

    /// Refuse further pushes, wake blocked producers, hand back what was queued
    pub fn close(&self) -> Vec<MediaBuffer> {
        let items: Vec<MediaBuffer> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.items.drain(..).collect()
        };
        self.space.notify_all();
        items
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
