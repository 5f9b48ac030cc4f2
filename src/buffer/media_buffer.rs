use super::meta::{BufferFlags, BufferKind, ImageInfo, MediaType, SampleInfo};
use crate::error::{FlowError, Result};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Shareable descriptor for hardware-mappable memory (e.g. a dma-buf fd).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SharedHandle(i32);

impl SharedHandle {
    pub fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> i32 {
        self.0
    }
}

/// The memory behind a buffer, handed to the release action on last drop.
#[derive(Debug)]
pub struct MemoryBlock {
    bytes: Vec<u8>,
    capacity: usize,
    handle: Option<SharedHandle>,
}

impl MemoryBlock {
    pub(crate) fn new(bytes: Vec<u8>, capacity: usize, handle: Option<SharedHandle>) -> Self {
        Self {
            bytes,
            capacity,
            handle,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn handle(&self) -> Option<SharedHandle> {
        self.handle
    }

    /// Process-local mapping, empty when the block is handle-only
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Runs once, when the last owner of a buffer drops it.
pub type ReleaseFn = Box<dyn FnOnce(MemoryBlock) + Send + Sync>;

/// Describes memory owned by someone else (a driver, an allocator) that a
/// buffer should wrap, and what must happen when the wrapper goes away.
pub struct ExternalMemory {
    capacity: usize,
    handle: Option<SharedHandle>,
    mapping: Vec<u8>,
    release: Option<ReleaseFn>,
}

impl ExternalMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            handle: None,
            mapping: Vec::new(),
            release: None,
        }
    }

    pub fn with_handle(mut self, handle: SharedHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Attach a process-local mapping; capacity grows to cover it
    pub fn with_mapping(mut self, mapping: Vec<u8>) -> Self {
        self.capacity = self.capacity.max(mapping.len());
        self.mapping = mapping;
        self
    }

    pub fn on_release<F>(mut self, release: F) -> Self
    where
        F: FnOnce(MemoryBlock) + Send + Sync + 'static,
    {
        self.release = Some(Box::new(release));
        self
    }
}

struct BufferInner {
    block: Option<MemoryBlock>,
    valid_size: usize,
    kind: BufferKind,
    pts_us: i64,
    wall_clock_ms: u64,
    flags: BufferFlags,
    sequence: u64,
    related: Vec<MediaBuffer>,
    release: Option<ReleaseFn>,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        let block = self.block.take();
        if let (Some(block), Some(release)) = (block, self.release.take()) {
            release(block);
        }
    }
}

/// Reference-counted handle to a media buffer.
///
/// Cloning shares the buffer. Mutators only work while the handle is the
/// sole owner, i.e. before the producer hands it to any consumer.
#[derive(Clone)]
pub struct MediaBuffer {
    inner: Arc<BufferInner>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl MediaBuffer {
    fn from_parts(block: MemoryBlock, valid_size: usize, release: Option<ReleaseFn>) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                block: Some(block),
                valid_size,
                kind: BufferKind::Opaque,
                pts_us: 0,
                wall_clock_ms: now_ms(),
                flags: BufferFlags::empty(),
                sequence: 0,
                related: Vec::new(),
                release,
            }),
        }
    }

    /// Allocate a zeroed heap buffer. Valid size starts at zero.
    pub fn allocate(capacity: usize) -> Result<Self> {
        let bytes = try_alloc_zeroed(capacity)?;
        Ok(Self::from_parts(MemoryBlock::new(bytes, capacity, None), 0, None))
    }

    /// Take ownership of bytes; the whole vector is valid.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self::from_parts(MemoryBlock::new(bytes, len, None), len, None)
    }

    /// Wrap externally owned memory. Valid size starts at zero.
    pub fn wrap_external(memory: ExternalMemory) -> Self {
        let block = MemoryBlock::new(memory.mapping, memory.capacity, memory.handle);
        Self::from_parts(block, 0, memory.release)
    }

    pub(crate) fn with_release(block: MemoryBlock, release: ReleaseFn) -> Self {
        Self::from_parts(block, 0, Some(release))
    }

    fn block(&self) -> Option<&MemoryBlock> {
        self.inner.block.as_ref()
    }

    fn inner_mut(&mut self) -> Result<&mut BufferInner> {
        Arc::get_mut(&mut self.inner).ok_or(FlowError::BufferShared)
    }

    pub fn capacity(&self) -> usize {
        self.block().map(|b| b.capacity).unwrap_or(0)
    }

    pub fn valid_size(&self) -> usize {
        self.inner.valid_size
    }

    pub fn handle(&self) -> Option<SharedHandle> {
        self.block().and_then(|b| b.handle)
    }

    /// Valid bytes of the process-local mapping; empty for handle-only memory
    pub fn data(&self) -> &[u8] {
        match self.block() {
            Some(block) => {
                let end = self.inner.valid_size.min(block.bytes.len());
                &block.bytes[..end]
            }
            None => &[],
        }
    }

    pub fn kind(&self) -> &BufferKind {
        &self.inner.kind
    }

    pub fn media_type(&self) -> MediaType {
        self.inner.kind.media_type()
    }

    pub fn image_info(&self) -> Option<&ImageInfo> {
        match &self.inner.kind {
            BufferKind::Image(info) => Some(info),
            _ => None,
        }
    }

    pub fn sample_info(&self) -> Option<&SampleInfo> {
        match &self.inner.kind {
            BufferKind::Sample(info) => Some(info),
            _ => None,
        }
    }

    pub fn pts_us(&self) -> i64 {
        self.inner.pts_us
    }

    pub fn wall_clock_ms(&self) -> u64 {
        self.inner.wall_clock_ms
    }

    pub fn flags(&self) -> BufferFlags {
        self.inner.flags
    }

    pub fn sequence(&self) -> u64 {
        self.inner.sequence
    }

    pub fn related(&self) -> &[MediaBuffer] {
        &self.inner.related
    }

    /// Number of live handles to this buffer
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn is_unique(&self) -> bool {
        self.ref_count() == 1
    }

    pub fn ptr_eq(&self, other: &MediaBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn set_valid_size(&mut self, size: usize) -> Result<()> {
        let capacity = self.capacity();
        if size > capacity {
            return Err(FlowError::SizeExceedsCapacity { size, capacity });
        }
        self.inner_mut()?.valid_size = size;
        Ok(())
    }

    pub fn set_kind(&mut self, kind: BufferKind) -> Result<()> {
        self.inner_mut()?.kind = kind;
        Ok(())
    }

    pub fn set_pts_us(&mut self, pts_us: i64) -> Result<()> {
        self.inner_mut()?.pts_us = pts_us;
        Ok(())
    }

    pub fn set_wall_clock_ms(&mut self, wall_clock_ms: u64) -> Result<()> {
        self.inner_mut()?.wall_clock_ms = wall_clock_ms;
        Ok(())
    }

    pub fn set_flags(&mut self, flags: BufferFlags) -> Result<()> {
        self.inner_mut()?.flags = flags;
        Ok(())
    }

    pub fn insert_flags(&mut self, flags: BufferFlags) -> Result<()> {
        self.inner_mut()?.flags.insert(flags);
        Ok(())
    }

    pub fn set_sequence(&mut self, sequence: u64) -> Result<()> {
        self.inner_mut()?.sequence = sequence;
        Ok(())
    }

    /// Attach side metadata produced for the same logical frame
    pub fn attach_related(&mut self, related: MediaBuffer) -> Result<()> {
        self.inner_mut()?.related.push(related);
        Ok(())
    }

    /// Whole process-local mapping (up to capacity), for filling
    pub fn data_mut(&mut self) -> Result<&mut [u8]> {
        let inner = self.inner_mut()?;
        Ok(inner
            .block
            .as_mut()
            .map(|b| b.bytes.as_mut_slice())
            .unwrap_or(&mut []))
    }
}

impl fmt::Debug for MediaBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaBuffer")
            .field("sequence", &self.inner.sequence)
            .field("kind", &self.inner.kind)
            .field("capacity", &self.capacity())
            .field("valid_size", &self.inner.valid_size)
            .field("pts_us", &self.inner.pts_us)
            .field("flags", &self.inner.flags)
            .field("handle", &self.handle())
            .field("related", &self.inner.related.len())
            .field("refs", &self.ref_count())
            .finish()
    }
}

pub(crate) fn try_alloc_zeroed(capacity: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(capacity)
        .map_err(|_| FlowError::OutOfMemory(capacity))?;
    bytes.resize(capacity, 0);
    Ok(bytes)
}
