//! 可识别的输入格式.

use std::fmt;

/// 输入格式标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatId {
    // ========================
    // 容器
    // ========================
    /// ISO-BMFF / QuickTime (MP4, MOV, 3GP, M4A)
    Mp4,
    /// Flash Video
    Flv,
    /// Ogg
    Ogg,

    // ========================
    // 无容器的音频基本流
    // ========================
    /// AAC ADTS
    Adts,
    /// MPEG-1/2 Audio (MP3 等)
    MpegAudio,
    /// 带 ID3v2 标签头的 MPEG 音频
    Id3,
    /// AMR 窄带 (RFC 4867 存储格式)
    AmrNb,
    /// AMR 宽带
    AmrWb,
}

impl FormatId {
    /// 是否为需要多路解复用的容器
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Mp4 | Self::Flv | Self::Ogg)
    }

    /// 格式名称
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Flv => "flv",
            Self::Ogg => "ogg",
            Self::Adts => "adts",
            Self::MpegAudio => "mpegaudio",
            Self::Id3 => "id3",
            Self::AmrNb => "amr-nb",
            Self::AmrWb => "amr-wb",
        }
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
