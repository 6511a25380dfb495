//! caps 到 [`MediaFormat`] 的映射, 以及缓冲到 [`MediaPacket`] 的转换.

use bytes::Bytes;
use md_core::MediaType;
use md_format::{Buffer, BufferFlags, Caps, CapsValue};
use md_media::{AudioFormat, MediaFormat, MediaMime, MediaPacket, PacketFlags, VideoFormat};

use super::track::TrackDescriptor;

/// 由 caps 推导轨道格式
///
/// 未识别的编码不报错, 只是 `mime()` 为 None.
pub fn format_from_caps(media_type: MediaType, caps: &Caps) -> MediaFormat {
    let name = caps.name();
    if name.starts_with("video/") {
        let mime = match name {
            "video/x-h264" => Some(MediaMime::H264),
            "video/x-h263" => Some(MediaMime::H263),
            _ => None,
        };
        return MediaFormat::video(
            mime,
            VideoFormat {
                width: caps_u32(caps, "width").unwrap_or(0),
                height: caps_u32(caps, "height").unwrap_or(0),
                frame_rate: caps.get_fraction("framerate").filter(|r| r.is_valid()),
                bit_rate: caps_u32(caps, "bitrate").unwrap_or(0),
            },
        );
    }
    if name.starts_with("audio/") {
        let (mime, defaults) = audio_mime(caps);
        let audio = AudioFormat {
            channels: caps_u32(caps, "channels").unwrap_or(defaults.channels),
            sample_rate: caps_u32(caps, "rate").unwrap_or(defaults.sample_rate),
            bit_depth: caps
                .get_str("format")
                .and_then(raw_bit_depth)
                .unwrap_or(defaults.bit_depth),
            bit_rate: caps_u32(caps, "bitrate").unwrap_or(0),
        };
        return MediaFormat::audio(mime, audio);
    }
    MediaFormat::new(media_type)
}

fn audio_mime(caps: &Caps) -> (Option<MediaMime>, AudioFormat) {
    let defaults = AudioFormat::default();
    let mono = |sample_rate| AudioFormat {
        channels: 1,
        sample_rate,
        ..defaults
    };
    match caps.name() {
        "audio/mpeg" => match (caps.get_int("mpegversion"), caps.get_int("layer")) {
            (Some(2 | 4), _) => (Some(MediaMime::Aac), defaults),
            (Some(1), Some(3)) => (Some(MediaMime::Mp3), defaults),
            _ => (None, defaults),
        },
        "audio/AMR" | "audio/x-amr-nb-sh" => (Some(MediaMime::AmrNb), mono(8000)),
        "audio/AMR-WB" | "audio/x-amr-wb-sh" => (Some(MediaMime::AmrWb), mono(16000)),
        "audio/x-raw" => (Some(MediaMime::Pcm), defaults),
        "audio/x-flac" => (Some(MediaMime::Flac), defaults),
        "audio/x-vorbis" => (Some(MediaMime::Vorbis), defaults),
        _ => (None, defaults),
    }
}

/// PCM 样本格式名 (如 `S16LE`, `U8`) 对应的位深
fn raw_bit_depth(format: &str) -> Option<u32> {
    let digits: String = format
        .chars()
        .skip(1)
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok().filter(|&bits| bits > 0)
}

fn caps_u32(caps: &Caps, key: &str) -> Option<u32> {
    caps.get_int(key)
        .and_then(|v| u32::try_from(v).ok())
        .filter(|&v| v > 0)
}

/// 从 caps 文本中提取 `codec_data=(buffer)<hex>` 字段
pub fn codec_data_from_caps_string(caps_string: &str) -> Option<Bytes> {
    caps_string
        .split(", ")
        .filter_map(|part| part.split_once('='))
        .find(|(key, _)| *key == "codec_data")
        .and_then(|(_, value)| match value.parse::<CapsValue>() {
            Ok(CapsValue::Buffer(data)) => Some(data),
            _ => None,
        })
}

/// 将接收器中取出的缓冲转换为调用方持有的数据包
///
/// 时间戳换算为微秒; 同步样本附带轨道的编码配置.
pub fn buffer_to_packet(track: &TrackDescriptor, buffer: Buffer) -> MediaPacket {
    let mut flags = PacketFlags::empty();
    if buffer.is_sync() {
        flags |= PacketFlags::SYNC;
    }
    if buffer.flags.contains(BufferFlags::HEADER) {
        flags |= PacketFlags::CODEC_CONFIG;
    }
    if buffer.flags.contains(BufferFlags::DISCONT) {
        flags |= PacketFlags::DISCONT;
    }
    let codec_data = if flags.contains(PacketFlags::SYNC) && !flags.contains(PacketFlags::CODEC_CONFIG) {
        track.codec_data.clone()
    } else {
        None
    };

    let mut packet = MediaPacket::new(track.format().clone(), buffer.data);
    packet.pts = buffer.pts.map(|t| t.useconds());
    packet.dts = buffer.dts.map(|t| t.useconds());
    packet.duration = buffer.duration.map(|t| t.useconds());
    packet.flags = flags;
    packet.codec_data = codec_data;
    packet
}

#[cfg(test)]
mod tests {
    use md_core::{ClockTime, Rational};

    use super::*;

    #[test]
    fn test_视频格式映射() {
        let caps = Caps::new("video/x-h264")
            .with_int("width", 1280)
            .with_int("height", 720)
            .with_fraction("framerate", Rational::new(30000, 1001));
        let format = format_from_caps(MediaType::Video, &caps);
        assert_eq!(format.mime(), Some(MediaMime::H264));
        let video = format.video_format().copied().unwrap();
        assert_eq!((video.width, video.height), (1280, 720));
        assert_eq!(video.frame_rate, Some(Rational::new(30000, 1001)));

        let h263 = format_from_caps(MediaType::Video, &Caps::new("video/x-h263"));
        assert_eq!(h263.mime(), Some(MediaMime::H263));
    }

    #[test]
    fn test_音频格式映射与默认值() {
        let aac = format_from_caps(
            MediaType::Audio,
            &Caps::new("audio/mpeg").with_int("mpegversion", 4),
        );
        assert_eq!(aac.mime(), Some(MediaMime::Aac));
        let audio = aac.audio_format().copied().unwrap();
        assert_eq!((audio.channels, audio.sample_rate, audio.bit_depth), (2, 44100, 16));

        let mp3 = Caps::new("audio/mpeg")
            .with_int("mpegversion", 1)
            .with_int("layer", 3)
            .with_int("channels", 1)
            .with_int("rate", 22050);
        let mp3 = format_from_caps(MediaType::Audio, &mp3);
        assert_eq!(mp3.mime(), Some(MediaMime::Mp3));
        assert_eq!(mp3.audio_format().map(|a| (a.channels, a.sample_rate)), Some((1, 22050)));

        let amr = format_from_caps(MediaType::Audio, &Caps::new("audio/x-amr-wb-sh"));
        assert_eq!(amr.mime(), Some(MediaMime::AmrWb));
        assert_eq!(amr.audio_format().map(|a| (a.channels, a.sample_rate)), Some((1, 16000)));

        let pcm = Caps::new("audio/x-raw").with_str("format", "S24LE");
        let pcm = format_from_caps(MediaType::Audio, &pcm);
        assert_eq!(pcm.mime(), Some(MediaMime::Pcm));
        assert_eq!(pcm.audio_format().map(|a| a.bit_depth), Some(24));
    }

    #[test]
    fn test_未识别的编码不报错() {
        let opus = format_from_caps(MediaType::Audio, &Caps::new("audio/x-opus"));
        assert_eq!(opus.mime(), None);
        assert_eq!(opus.media_type(), MediaType::Audio);

        let text = format_from_caps(MediaType::Subtitle, &Caps::new("text/x-raw"));
        assert_eq!(text.mime(), None);
        assert_eq!(text.media_type(), MediaType::Subtitle);
    }

    #[test]
    fn test_从_caps_文本提取编码配置() {
        let s = "video/x-h264, stream-format=(string)avc, codec_data=(buffer)01640028ff";
        assert_eq!(
            codec_data_from_caps_string(s).as_deref(),
            Some(&[0x01, 0x64, 0x00, 0x28, 0xff][..])
        );
        assert!(codec_data_from_caps_string("audio/x-raw, rate=(int)8000").is_none());
    }

    #[test]
    fn test_缓冲转换为数据包() {
        let caps = Caps::new("video/x-h264").with_buffer("codec_data", vec![1, 2, 3]);
        let track = TrackDescriptor::new(0, "video_0", caps);

        let key = Buffer::new(vec![0xAA; 4]).with_timing(
            Some(ClockTime::from_mseconds(40)),
            Some(ClockTime::from_mseconds(40)),
            Some(ClockTime::from_mseconds(40)),
        );
        let packet = buffer_to_packet(&track, key);
        assert_eq!(packet.pts, Some(40_000));
        assert_eq!(packet.duration, Some(40_000));
        assert!(packet.is_sync());
        assert_eq!(packet.codec_data.as_deref(), Some(&[1, 2, 3][..]));
        assert!(packet.format.shares_storage(track.format()));

        let delta = Buffer::new(vec![0xBB]).with_flags(BufferFlags::DELTA_UNIT | BufferFlags::DISCONT);
        let packet = buffer_to_packet(&track, delta);
        assert!(!packet.is_sync());
        assert!(packet.flags.contains(PacketFlags::DISCONT));
        assert!(packet.codec_data.is_none());
        assert_eq!(packet.pts, None);

        let header = Buffer::new(vec![0x01]).with_flags(BufferFlags::HEADER);
        let packet = buffer_to_packet(&track, header);
        assert!(packet.flags.contains(PacketFlags::CODEC_CONFIG));
        assert!(packet.codec_data.is_none());
    }
}
