use super::media_buffer::{try_alloc_zeroed, ExternalMemory, MediaBuffer, MemoryBlock, SharedHandle};
use crate::error::Result;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Block owned by the ring while armed (ready for the device to fill)
struct ArmedBlock {
    handle: SharedHandle,
    bytes: Vec<u8>,
}

/// Driver-style ring of externally owned blocks.
///
/// A dequeued block is wrapped as a [`MediaBuffer`]; when the last owner
/// drops it, the block is re-armed (queued back) instead of freed.
pub struct RearmRing {
    armed_tx: Sender<ArmedBlock>,
    armed_rx: Receiver<ArmedBlock>,
    slots: usize,
    block_size: usize,
    rearms: Arc<AtomicU64>,
}

impl RearmRing {
    pub fn new(slots: usize, block_size: usize) -> Result<Self> {
        let (armed_tx, armed_rx) = bounded(slots);
        for index in 0..slots {
            let bytes = try_alloc_zeroed(block_size)?;
            let handle = SharedHandle::new(index as i32);
            let armed = armed_tx.try_send(ArmedBlock { handle, bytes });
            debug_assert!(armed.is_ok());
        }

        Ok(Self {
            armed_tx,
            armed_rx,
            slots,
            block_size,
            rearms: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Take the next filled block, if any is armed
    pub fn dequeue(&self) -> Option<MediaBuffer> {
        self.armed_rx.try_recv().ok().map(|block| self.wrap(block))
    }

    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<MediaBuffer> {
        self.armed_rx
            .recv_timeout(timeout)
            .ok()
            .map(|block| self.wrap(block))
    }

    fn wrap(&self, block: ArmedBlock) -> MediaBuffer {
        let armed_tx = self.armed_tx.clone();
        let rearms = self.rearms.clone();
        let mut buffer = MediaBuffer::wrap_external(
            ExternalMemory::new(self.block_size)
                .with_handle(block.handle)
                .with_mapping(block.bytes)
                .on_release(move |released: MemoryBlock| {
                    let handle = released.handle().unwrap_or(SharedHandle::new(-1));
                    let bytes = released.into_bytes();
                    if armed_tx.try_send(ArmedBlock { handle, bytes }).is_ok() {
                        rearms.fetch_add(1, Ordering::Relaxed);
                    } else {
                        tracing::debug!("ring gone, freeing block {}", handle.raw());
                    }
                }),
        );
        // A device would report the filled length
        let sized = buffer.set_valid_size(self.block_size);
        debug_assert!(sized.is_ok());
        buffer
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Blocks available for the device
    pub fn armed(&self) -> usize {
        self.armed_rx.len()
    }

    /// Blocks currently held by consumers
    pub fn in_flight(&self) -> usize {
        self.slots - self.armed()
    }

    pub fn rearm_count(&self) -> u64 {
        self.rearms.load(Ordering::Relaxed)
    }
}
