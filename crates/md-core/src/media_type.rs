//! 轨道媒体类型.

use std::fmt;

/// 轨道的媒体类型
///
/// 由发现阶段的 pad 名称首字母推断 (`v`/`a`/`s`), 其余归为 `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    /// 视频轨道
    Video,
    /// 音频轨道
    Audio,
    /// 字幕轨道
    Subtitle,
    /// 其他 (数据、时间码等)
    Other,
}

impl MediaType {
    /// 根据流标识 (pad 名称) 的首字母推断媒体类型
    pub fn from_stream_name(name: &str) -> Self {
        match name.as_bytes().first() {
            Some(b'v') => Self::Video,
            Some(b'a') => Self::Audio,
            Some(b's') => Self::Subtitle,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Video => "视频",
            Self::Audio => "音频",
            Self::Subtitle => "字幕",
            Self::Other => "其他",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_从名称推断类型() {
        assert_eq!(MediaType::from_stream_name("video_0"), MediaType::Video);
        assert_eq!(MediaType::from_stream_name("audio"), MediaType::Audio);
        assert_eq!(MediaType::from_stream_name("subtitle_1"), MediaType::Subtitle);
        assert_eq!(MediaType::from_stream_name("private_2"), MediaType::Other);
        assert_eq!(MediaType::from_stream_name(""), MediaType::Other);
    }
}
