use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

bitflags! {
    /// Content flags carried by a buffer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct BufferFlags: u32 {
        /// Independently decodable unit (IDR / key frame)
        const KEY_UNIT = 1 << 0;
        /// Unit predicted from earlier units
        const PREDICTED_UNIT = 1 << 1;
        /// Codec header / extra data (SPS, PPS, ...)
        const EXTRA_DATA = 1 << 2;
        /// Exactly one logical unit per buffer
        const SINGLE_UNIT = 1 << 3;
        /// Last buffer of the stream
        const END_OF_STREAM = 1 << 4;
    }
}

/// Classification tag, used for edge compatibility checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Sample,
    EncodedVideo,
    EncodedAudio,
    #[default]
    Opaque,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Sample => "sample",
            Self::EncodedVideo => "encoded_video",
            Self::EncodedAudio => "encoded_audio",
            Self::Opaque => "opaque",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "sample" => Ok(Self::Sample),
            "encoded_video" => Ok(Self::EncodedVideo),
            "encoded_audio" => Ok(Self::EncodedAudio),
            "opaque" => Ok(Self::Opaque),
            other => Err(format!("unknown media type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Nv12,
    Nv21,
    Yuv420p,
    Yuv422sp,
    Rgb888,
    Bgr888,
    Rgba8888,
    Gray8,
}

impl PixelFormat {
    /// Bytes needed for one frame at the given strides
    pub fn frame_size(&self, hor_stride: u32, ver_stride: u32) -> usize {
        let plane = hor_stride as usize * ver_stride as usize;
        match self {
            Self::Nv12 | Self::Nv21 | Self::Yuv420p => plane * 3 / 2,
            Self::Yuv422sp => plane * 2,
            Self::Rgb888 | Self::Bgr888 => plane * 3,
            Self::Rgba8888 => plane * 4,
            Self::Gray8 => plane,
        }
    }
}

/// Geometry view for image buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub hor_stride: u32,
    pub ver_stride: u32,
    pub format: PixelFormat,
}

impl ImageInfo {
    /// Tightly packed image (strides equal to dimensions)
    pub fn packed(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            hor_stride: width,
            ver_stride: height,
            format,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.format.frame_size(self.hor_stride, self.ver_stride)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16 => 2,
            Self::S32 | Self::F32 => 4,
        }
    }
}

/// Sample layout view for audio / structured-sample buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    pub samples_per_channel: u32,
}

impl SampleInfo {
    pub fn byte_len(&self) -> usize {
        self.samples_per_channel as usize * self.channels as usize * self.format.bytes_per_sample()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    H264,
    H265,
    Mjpeg,
    Vp8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    Aac,
    Opus,
    G711a,
    G711u,
    Mp3,
}

/// What a buffer holds; each variant carries the view that is meaningful for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BufferKind {
    Image(ImageInfo),
    Sample(SampleInfo),
    EncodedVideo { codec: VideoCodec },
    EncodedAudio { codec: AudioCodec },
    #[default]
    Opaque,
}

impl BufferKind {
    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Image(_) => MediaType::Image,
            Self::Sample(_) => MediaType::Sample,
            Self::EncodedVideo { .. } => MediaType::EncodedVideo,
            Self::EncodedAudio { .. } => MediaType::EncodedAudio,
            Self::Opaque => MediaType::Opaque,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_nv12() {
        let info = ImageInfo::packed(1920, 1080, PixelFormat::Nv12);
        assert_eq!(info.frame_size(), 1920 * 1080 * 3 / 2);
    }

    #[test]
    fn test_media_type_round_trips_through_str() {
        for ty in [
            MediaType::Image,
            MediaType::Sample,
            MediaType::EncodedVideo,
            MediaType::EncodedAudio,
            MediaType::Opaque,
        ] {
            assert_eq!(ty.as_str().parse::<MediaType>().unwrap(), ty);
        }
        assert!("video".parse::<MediaType>().is_err());
    }

    #[test]
    fn test_kind_maps_to_media_type() {
        let kind = BufferKind::EncodedVideo { codec: VideoCodec::H265 };
        assert_eq!(kind.media_type(), MediaType::EncodedVideo);
        assert_eq!(BufferKind::default().media_type(), MediaType::Opaque);
    }

    #[test]
    fn test_sample_byte_len() {
        let info = SampleInfo {
            sample_rate: 48000,
            channels: 2,
            format: SampleFormat::S16,
            samples_per_channel: 1024,
        };
        assert_eq!(info.byte_len(), 4096);
    }
}
