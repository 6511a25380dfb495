//! 轨道描述.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use md_core::MediaType;
use md_format::{AppSink, Caps};
use md_media::MediaFormat;

use super::marshal;

/// 发现阶段产生的一个基本流
#[derive(Debug)]
pub struct TrackDescriptor {
    /// 发现顺序, 即对外的轨道序号
    pub index: usize,
    /// pad 名称, 如 `video_0`
    pub name: String,
    pub media_type: MediaType,
    pub caps: Caps,
    /// caps 的文本形式
    pub caps_string: String,
    pub sink: Arc<AppSink>,
    /// 从 caps 文本中提取的编码配置
    pub codec_data: Option<Bytes>,
    selected: AtomicBool,
    /// 曾经选中过, 读取通道可能已离开起点
    selected_once: AtomicBool,
    format: OnceLock<MediaFormat>,
}

impl TrackDescriptor {
    /// 创建描述, 接收器保持未选中配置
    pub fn new(index: usize, name: impl Into<String>, caps: Caps) -> Self {
        let name = name.into();
        let caps_string = caps.to_string();
        let codec_data = marshal::codec_data_from_caps_string(&caps_string);
        log::debug!("轨道 {} ({}): {}", index, name, caps_string);
        Self {
            index,
            media_type: MediaType::from_stream_name(&name),
            sink: Arc::new(AppSink::new(name.clone())),
            name,
            caps,
            caps_string,
            codec_data,
            selected: AtomicBool::new(false),
            selected_once: AtomicBool::new(false),
            format: OnceLock::new(),
        }
    }

    pub fn is_selected(&self) -> bool {
        self.selected.load(Ordering::Acquire)
    }

    pub fn was_selected_once(&self) -> bool {
        self.selected_once.load(Ordering::Acquire)
    }

    /// 选中: 接收器容量 `capacity`, 满时阻塞; 此前未选中时返回 true
    pub fn select(&self, capacity: usize) -> bool {
        self.selected_once.store(true, Ordering::Release);
        let was_selected = self.selected.swap(true, Ordering::AcqRel);
        self.sink.configure(capacity, false);
        !was_selected
    }

    /// 取消选中: 接收器容量 0, 新样本直接丢弃
    pub fn unselect(&self) {
        self.selected.store(false, Ordering::Release);
        self.sink.configure(0, true);
    }

    /// 轨道格式, 首次调用时由 caps 推导并缓存
    pub fn format(&self) -> &MediaFormat {
        self.format
            .get_or_init(|| marshal::format_from_caps(self.media_type, &self.caps))
    }
}

#[cfg(test)]
mod tests {
    use md_media::MediaMime;

    use super::*;

    #[test]
    fn test_由_pad_名称推断媒体类型() {
        let video = TrackDescriptor::new(0, "video_0", Caps::new("video/x-h264"));
        let audio = TrackDescriptor::new(1, "audio", Caps::new("audio/AMR"));
        let text = TrackDescriptor::new(2, "subtitle_0", Caps::new("text/x-raw"));
        assert_eq!(video.media_type, MediaType::Video);
        assert_eq!(audio.media_type, MediaType::Audio);
        assert_eq!(text.media_type, MediaType::Subtitle);
    }

    #[test]
    fn test_选中切换接收器配置() {
        let track = TrackDescriptor::new(0, "audio_0", Caps::new("audio/x-vorbis"));
        assert!(!track.is_selected());
        assert_eq!((track.sink.max_buffers(), track.sink.is_drop()), (0, true));
        assert!(!track.was_selected_once());
        assert!(track.select(100));
        assert!(!track.select(100));
        assert!(track.is_selected());
        assert_eq!((track.sink.max_buffers(), track.sink.is_drop()), (100, false));
        track.unselect();
        assert_eq!((track.sink.max_buffers(), track.sink.is_drop()), (0, true));
        assert!(!track.is_selected());
        assert!(track.was_selected_once());
    }

    #[test]
    fn test_格式缓存() {
        let caps = Caps::new("audio/mpeg")
            .with_int("mpegversion", 4)
            .with_buffer("codec_data", vec![0x12, 0x10]);
        let track = TrackDescriptor::new(0, "audio_0", caps);
        let first = track.format().clone();
        let second = track.format().clone();
        assert!(first.shares_storage(&second));
        assert_eq!(first.mime(), Some(MediaMime::Aac));
        assert_eq!(track.codec_data.as_deref(), Some(&[0x12, 0x10][..]));
    }
}
