pub mod media_buffer;
pub mod meta;
pub mod pool;
pub mod ring;

pub use media_buffer::{ExternalMemory, MediaBuffer, MemoryBlock, ReleaseFn, SharedHandle};
pub use meta::{
    AudioCodec, BufferFlags, BufferKind, ImageInfo, MediaType, PixelFormat, SampleFormat,
    SampleInfo, VideoCodec,
};
pub use pool::BufferPool;
pub use ring::RearmRing;
