//! 编码类型标识.

use std::fmt;

use md_core::MediaType;

/// 轨道格式可映射到的编码类型 (封闭集合)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaMime {
    /// H.264 / AVC
    H264,
    /// H.263
    H263,
    /// AAC (LC)
    Aac,
    /// MPEG-1 Audio Layer III
    Mp3,
    /// AMR 窄带
    AmrNb,
    /// AMR 宽带
    AmrWb,
    /// 线性 PCM
    Pcm,
    /// FLAC
    Flac,
    /// Vorbis
    Vorbis,
}

impl MediaMime {
    /// 所属媒体类型
    pub const fn media_type(self) -> MediaType {
        match self {
            Self::H264 | Self::H263 => MediaType::Video,
            _ => MediaType::Audio,
        }
    }

    /// MIME 名称
    pub const fn name(self) -> &'static str {
        match self {
            Self::H264 => "video/avc",
            Self::H263 => "video/3gpp",
            Self::Aac => "audio/mp4a-latm",
            Self::Mp3 => "audio/mpeg",
            Self::AmrNb => "audio/3gpp",
            Self::AmrWb => "audio/amr-wb",
            Self::Pcm => "audio/raw",
            Self::Flac => "audio/flac",
            Self::Vorbis => "audio/vorbis",
        }
    }
}

impl fmt::Display for MediaMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
