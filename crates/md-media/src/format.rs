//! 轨道格式描述.
//!
//! [`MediaFormat`] 是不可变的值类型, 内部以 `Arc` 共享存储.
//! 克隆只增加引用计数, 调用 setter 时才复制一份私有存储 (写时复制),
//! 因此缓存中的格式与交给调用方的副本互不影响.

use std::sync::Arc;

use md_core::{MediaType, Rational};

use crate::mime::MediaMime;

/// 视频参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 帧率, 未知时为 None
    pub frame_rate: Option<Rational>,
    /// 平均码率 (bps), 0 表示未知
    pub bit_rate: u32,
}

/// 音频参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// 声道数
    pub channels: u32,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 位深
    pub bit_depth: u32,
    /// 平均码率 (bps), 0 表示未知
    pub bit_rate: u32,
}

impl Default for AudioFormat {
    /// 解析器未提供参数时使用的默认值: 2 声道, 44100 Hz, 16 位
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 44100,
            bit_depth: 16,
            bit_rate: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FormatInner {
    media_type: MediaType,
    mime: Option<MediaMime>,
    video: Option<VideoFormat>,
    audio: Option<AudioFormat>,
}

/// 轨道格式
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFormat {
    inner: Arc<FormatInner>,
}

impl MediaFormat {
    /// 创建只有媒体类型、尚未映射编码的格式
    pub fn new(media_type: MediaType) -> Self {
        Self {
            inner: Arc::new(FormatInner {
                media_type,
                mime: None,
                video: None,
                audio: None,
            }),
        }
    }

    /// 创建视频格式
    pub fn video(mime: Option<MediaMime>, video: VideoFormat) -> Self {
        Self {
            inner: Arc::new(FormatInner {
                media_type: MediaType::Video,
                mime,
                video: Some(video),
                audio: None,
            }),
        }
    }

    /// 创建音频格式
    pub fn audio(mime: Option<MediaMime>, audio: AudioFormat) -> Self {
        Self {
            inner: Arc::new(FormatInner {
                media_type: MediaType::Audio,
                mime,
                video: None,
                audio: Some(audio),
            }),
        }
    }

    pub fn media_type(&self) -> MediaType {
        self.inner.media_type
    }

    /// 映射到的编码类型, 未识别的类型描述返回 None
    pub fn mime(&self) -> Option<MediaMime> {
        self.inner.mime
    }

    pub fn video_format(&self) -> Option<&VideoFormat> {
        self.inner.video.as_ref()
    }

    pub fn audio_format(&self) -> Option<&AudioFormat> {
        self.inner.audio.as_ref()
    }

    pub fn set_mime(&mut self, mime: Option<MediaMime>) {
        Arc::make_mut(&mut self.inner).mime = mime;
    }

    pub fn set_video_format(&mut self, video: VideoFormat) {
        let inner = Arc::make_mut(&mut self.inner);
        inner.media_type = MediaType::Video;
        inner.video = Some(video);
    }

    pub fn set_audio_format(&mut self, audio: AudioFormat) {
        let inner = Arc::make_mut(&mut self.inner);
        inner.media_type = MediaType::Audio;
        inner.audio = Some(audio);
    }

    /// 两个格式是否共享同一份存储 (均未被修改过的克隆)
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h264() -> MediaFormat {
        MediaFormat::video(
            Some(MediaMime::H264),
            VideoFormat {
                width: 640,
                height: 480,
                frame_rate: Some(Rational::new(25, 1)),
                bit_rate: 0,
            },
        )
    }

    #[test]
    fn test_克隆共享存储() {
        let a = h264();
        let b = a.clone();
        assert!(a.shares_storage(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn test_修改时写时复制() {
        let cached = h264();
        let mut copy = cached.clone();
        copy.set_video_format(VideoFormat {
            width: 320,
            height: 240,
            frame_rate: None,
            bit_rate: 0,
        });
        assert!(!cached.shares_storage(&copy));
        assert_eq!(cached.video_format().map(|v| v.width), Some(640));
        assert_eq!(copy.video_format().map(|v| v.width), Some(320));
    }

    #[test]
    fn test_音频默认参数() {
        let f = MediaFormat::audio(None, AudioFormat::default());
        let audio = f.audio_format().copied().unwrap_or_default();
        assert_eq!((audio.channels, audio.sample_rate, audio.bit_depth), (2, 44100, 16));
        assert_eq!(f.media_type(), MediaType::Audio);
        assert!(f.mime().is_none());
    }
}
