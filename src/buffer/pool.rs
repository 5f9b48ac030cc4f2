use super::media_buffer::{try_alloc_zeroed, MediaBuffer, MemoryBlock};
use crate::error::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

struct PoolShared {
    free: Mutex<Vec<Vec<u8>>>,
    block_size: usize,
    max_cached: usize,
    outstanding: AtomicUsize,
    allocations: AtomicU64,
}

impl PoolShared {
    fn give_back(&self, bytes: Vec<u8>) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        let mut free = self.free.lock();
        if free.len() < self.max_cached {
            free.push(bytes);
        }
    }
}

/// Fixed-size block pool. Buffers acquired here return their block on last drop.
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

impl BufferPool {
    pub fn new(block_size: usize, max_cached: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                free: Mutex::new(Vec::new()),
                block_size,
                max_cached,
                outstanding: AtomicUsize::new(0),
                allocations: AtomicU64::new(0),
            }),
        }
    }

    /// Take a block from the free list, or allocate one.
    pub fn acquire(&self) -> Result<MediaBuffer> {
        let cached = self.shared.free.lock().pop();
        let bytes = match cached {
            Some(bytes) => bytes,
            None => {
                let bytes = try_alloc_zeroed(self.shared.block_size)?;
                self.shared.allocations.fetch_add(1, Ordering::Relaxed);
                bytes
            }
        };

        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        let pool: Weak<PoolShared> = Arc::downgrade(&self.shared);
        let block = MemoryBlock::new(bytes, self.shared.block_size, None);

        Ok(MediaBuffer::with_release(
            block,
            Box::new(move |block: MemoryBlock| {
                // Pool gone: the block is simply freed
                if let Some(pool) = pool.upgrade() {
                    pool.give_back(block.into_bytes());
                }
            }),
        ))
    }

    pub fn block_size(&self) -> usize {
        self.shared.block_size
    }

    /// Buffers handed out and not yet released
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }

    /// Blocks sitting in the free list
    pub fn cached(&self) -> usize {
        self.shared.free.lock().len()
    }

    /// Fresh allocations made over the pool's lifetime
    pub fn allocations(&self) -> u64 {
        self.shared.allocations.load(Ordering::Relaxed)
    }
}

impl Clone for BufferPool {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}
