//! FLV (Flash Video) 容器解析器.
//!
//! ```text
//! FLV Header (9 bytes): "FLV" | version | flags (bit0=video, bit2=audio) | data_offset
//! PreviousTagSize0 (4 bytes)
//! Tag: type (1) | data_size (3) | timestamp (3) + ext (1) | stream_id (3) | data
//! PreviousTagSize (4 bytes)
//! ...
//! ```
//!
//! 打开时扫描开头若干 tag 收集编码信息 (含 AAC/AVC sequence header), 然后回到数据区起点.

use bytes::Bytes;
use md_core::{ClockTime, MdError, MdResult, Rational};

use super::adts::audio_specific_config_info;
use crate::buffer::{Buffer, BufferFlags};
use crate::caps::Caps;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::parser::{ContainerParser, PadInfo, PadListener};
use crate::typefind::{ProbeScore, SCORE_EXTENSION, SCORE_MAX, TypeFind, has_extension};

const TAG_AUDIO: u8 = 8;
const TAG_VIDEO: u8 = 9;
const TAG_SCRIPT: u8 = 18;

const VIDEO_H263: u8 = 2;
const VIDEO_VP6: u8 = 4;
const VIDEO_AVC: u8 = 7;
const VIDEO_HEVC: u8 = 12;

const AUDIO_PCM: u8 = 0;
const AUDIO_MP3: u8 = 2;
const AUDIO_PCM_LE: u8 = 3;
const AUDIO_ALAW: u8 = 7;
const AUDIO_MULAW: u8 = 8;
const AUDIO_AAC: u8 = 10;
const AUDIO_SPEEX: u8 = 11;
const AUDIO_MP3_8K: u8 = 14;

/// 打开时最多扫描的 tag 数
const MAX_SCAN_TAGS: usize = 64;

const SOUND_RATES: [u32; 4] = [5512, 11025, 22050, 44100];

/// Tag 头部
#[derive(Debug, Clone, Copy)]
struct TagHeader {
    tag_type: u8,
    data_size: u32,
    /// 毫秒
    timestamp: u32,
}

fn read_tag_header(io: &mut IoContext) -> MdResult<TagHeader> {
    let tag_type = io.read_u8()? & 0x1F;
    let data_size = io.read_u24_be()?;
    let low = io.read_u24_be()?;
    let ext = io.read_u8()?;
    let _stream_id = io.read_u24_be()?;
    Ok(TagHeader {
        tag_type,
        data_size,
        timestamp: (u32::from(ext) << 24) | low,
    })
}

/// 读取 tag 之后的 PreviousTagSize, 文件末尾缺失时忽略
fn skip_previous_tag_size(io: &mut IoContext) -> MdResult<()> {
    match io.read_u32_be() {
        Ok(_) | Err(MdError::Eof) => Ok(()),
        Err(e) => Err(e),
    }
}

/// 音频流信息
#[derive(Debug, Clone, Default)]
struct AudioInfo {
    sound_format: u8,
    rate_index: u8,
    sample_16bit: bool,
    stereo: bool,
    config: Option<Bytes>,
}

impl AudioInfo {
    fn from_flags(flags: u8) -> Self {
        Self {
            sound_format: flags >> 4,
            rate_index: (flags >> 2) & 0x03,
            sample_16bit: flags & 0x02 != 0,
            stereo: flags & 0x01 != 0,
            config: None,
        }
    }

    fn needs_config(&self) -> bool {
        self.sound_format == AUDIO_AAC && self.config.is_none()
    }

    fn caps(&self) -> Caps {
        let mut rate = SOUND_RATES[usize::from(self.rate_index)];
        let mut channels: u16 = if self.stereo { 2 } else { 1 };
        let caps = match self.sound_format {
            AUDIO_AAC => {
                let caps = Caps::new("audio/mpeg")
                    .with_int("mpegversion", 4)
                    .with_str("stream-format", "raw");
                match &self.config {
                    Some(config) => {
                        if let Some((r, c)) = audio_specific_config_info(config) {
                            rate = r;
                            channels = c.max(1);
                        }
                        caps.with_buffer("codec_data", config.clone())
                    }
                    None => caps,
                }
            }
            AUDIO_MP3 | AUDIO_MP3_8K => {
                if self.sound_format == AUDIO_MP3_8K {
                    rate = 8000;
                }
                Caps::new("audio/mpeg")
                    .with_int("mpegversion", 1)
                    .with_int("layer", 3)
            }
            AUDIO_PCM | AUDIO_PCM_LE => {
                let format = if self.sample_16bit { "S16LE" } else { "U8" };
                Caps::new("audio/x-raw")
                    .with_str("format", format)
                    .with_str("layout", "interleaved")
            }
            AUDIO_ALAW => Caps::new("audio/x-alaw"),
            AUDIO_MULAW => Caps::new("audio/x-mulaw"),
            AUDIO_SPEEX => {
                rate = 16000;
                Caps::new("audio/x-speex")
            }
            4..=6 => {
                rate = match self.sound_format {
                    4 => 16000,
                    5 => 8000,
                    _ => rate,
                };
                Caps::new("audio/x-nellymoser")
            }
            other => Caps::new("audio/x-unknown").with_int("sound-format", i64::from(other)),
        };
        caps.with_int("channels", i64::from(channels))
            .with_int("rate", i64::from(rate))
    }
}

/// 视频流信息
#[derive(Debug, Clone, Default)]
struct VideoInfo {
    codec: u8,
    config: Option<Bytes>,
}

impl VideoInfo {
    fn has_packet_type(&self) -> bool {
        matches!(self.codec, VIDEO_AVC | VIDEO_HEVC)
    }

    fn needs_config(&self) -> bool {
        self.has_packet_type() && self.config.is_none()
    }

    fn caps(&self, meta: &Metadata) -> Caps {
        let mut caps = match self.codec {
            VIDEO_AVC => Caps::new("video/x-h264")
                .with_str("stream-format", "avc")
                .with_str("alignment", "au"),
            VIDEO_HEVC => Caps::new("video/x-h265")
                .with_str("stream-format", "hvc1")
                .with_str("alignment", "au"),
            VIDEO_H263 => Caps::new("video/x-flash-video").with_int("flvversion", 1),
            VIDEO_VP6 => Caps::new("video/x-vp6-flash"),
            other => Caps::new("video/x-unknown").with_int("codec-id", i64::from(other)),
        };
        if let Some(config) = &self.config {
            caps = caps.with_buffer("codec_data", config.clone());
        }
        if let (Some(w), Some(h)) = (meta.width, meta.height) {
            caps = caps.with_int("width", w as i64).with_int("height", h as i64);
        }
        if let Some(fps) = meta.frame_rate {
            // 按千分之一精度表示非整数帧率
            let rate = Rational::new((fps * 1000.0).round() as i32, 1000).reduce();
            caps = caps.with_fraction("framerate", rate);
        }
        caps
    }
}

/// onMetaData 中关心的字段
#[derive(Debug, Default)]
struct Metadata {
    duration: Option<f64>,
    width: Option<f64>,
    height: Option<f64>,
    frame_rate: Option<f64>,
}

impl Metadata {
    /// 在 AMF0 数据中查找 `key` 后紧跟的 number 值
    fn amf_number(data: &[u8], key: &[u8]) -> Option<f64> {
        let pos = data.windows(key.len()).position(|w| w == key)? + key.len();
        if *data.get(pos)? != 0x00 {
            return None;
        }
        let bytes: [u8; 8] = data.get(pos + 1..pos + 9)?.try_into().ok()?;
        let value = f64::from_bits(u64::from_be_bytes(bytes));
        (value.is_finite() && value > 0.0).then_some(value)
    }

    fn parse(data: &[u8]) -> Self {
        Self {
            duration: Self::amf_number(data, b"duration"),
            width: Self::amf_number(data, b"width"),
            height: Self::amf_number(data, b"height"),
            frame_rate: Self::amf_number(data, b"framerate"),
        }
    }
}

/// FLV 解析器
pub struct FlvParser {
    data_start: u64,
    audio_pad: Option<usize>,
    video_pad: Option<usize>,
    video_has_packet_type: bool,
    audio_is_aac: bool,
    duration: Option<ClockTime>,
    discont: bool,
}

impl FlvParser {
    /// 创建实例 (工厂函数)
    pub fn create() -> MdResult<Box<dyn ContainerParser>> {
        Ok(Box::new(Self {
            data_start: 0,
            audio_pad: None,
            video_pad: None,
            video_has_packet_type: false,
            audio_is_aac: false,
            duration: None,
            discont: false,
        }))
    }

    /// 扫描开头的 tag, 收集流信息
    fn scan_streams(
        &self,
        io: &mut IoContext,
        expect_audio: bool,
        expect_video: bool,
    ) -> MdResult<(Option<AudioInfo>, Option<VideoInfo>, Metadata)> {
        let mut audio: Option<AudioInfo> = None;
        let mut video: Option<VideoInfo> = None;
        let mut meta = Metadata::default();

        for _ in 0..MAX_SCAN_TAGS {
            let audio_ready = !expect_audio || audio.as_ref().is_some_and(|a| !a.needs_config());
            let video_ready = !expect_video || video.as_ref().is_some_and(|v| !v.needs_config());
            if (audio.is_some() || video.is_some()) && audio_ready && video_ready {
                break;
            }

            let tag = match read_tag_header(io) {
                Ok(tag) => tag,
                Err(MdError::Eof) => break,
                Err(e) => return Err(e),
            };
            let body = match io.read_bytes(tag.data_size as usize) {
                Ok(body) => body,
                Err(MdError::Eof) => break,
                Err(e) => return Err(e),
            };
            skip_previous_tag_size(io)?;

            match tag.tag_type {
                TAG_SCRIPT => {
                    meta = Metadata::parse(&body);
                    log::debug!("FLV: onMetaData {:?}", meta);
                }
                TAG_AUDIO if !body.is_empty() => {
                    let info = audio.get_or_insert_with(|| AudioInfo::from_flags(body[0]));
                    if info.sound_format == AUDIO_AAC && body.get(1) == Some(&0) {
                        info.config = Some(Bytes::copy_from_slice(&body[2..]));
                    }
                }
                TAG_VIDEO if !body.is_empty() => {
                    let frame_type = body[0] >> 4;
                    if frame_type == 5 {
                        continue;
                    }
                    let info = video.get_or_insert_with(|| VideoInfo {
                        codec: body[0] & 0x0F,
                        config: None,
                    });
                    if info.has_packet_type() && body.get(1) == Some(&0) && body.len() > 5 {
                        info.config = Some(Bytes::copy_from_slice(&body[5..]));
                    }
                }
                _ => {}
            }
        }
        Ok((audio, video, meta))
    }
}

impl ContainerParser for FlvParser {
    fn name(&self) -> &'static str {
        "flv"
    }

    fn open(&mut self, io: &mut IoContext, pads: &mut dyn PadListener) -> MdResult<()> {
        let signature = io.read_bytes(3)?;
        if signature != b"FLV" {
            return Err(MdError::InvalidData("不是 FLV 文件".into()));
        }
        let version = io.read_u8()?;
        let flags = io.read_u8()?;
        let data_offset = io.read_u32_be()?;
        log::debug!("FLV: version={version} flags=0x{flags:02X} data_offset={data_offset}");

        io.seek_to(u64::from(data_offset))?;
        io.read_u32_be()?;
        self.data_start = u64::from(data_offset) + 4;

        let (audio, video, meta) =
            self.scan_streams(io, flags & 0x04 != 0, flags & 0x01 != 0)?;
        if audio.is_none() && video.is_none() {
            return Err(MdError::InvalidData("FLV: 未发现音视频流".into()));
        }
        self.duration = meta
            .duration
            .map(|d| ClockTime::from_nseconds((d * ClockTime::SECOND as f64) as u64));

        let mut index = 0;
        if let Some(video) = &video {
            self.video_pad = Some(index);
            self.video_has_packet_type = video.has_packet_type();
            index += 1;
            pads.pad_added(PadInfo {
                name: "video_0".into(),
                caps: video.caps(&meta),
            })?;
        }
        if let Some(audio) = &audio {
            self.audio_pad = Some(index);
            self.audio_is_aac = audio.sound_format == AUDIO_AAC;
            pads.pad_added(PadInfo {
                name: "audio_0".into(),
                caps: audio.caps(),
            })?;
        }
        pads.no_more_pads();

        io.seek_to(self.data_start)?;
        Ok(())
    }

    fn next_buffer(&mut self, io: &mut IoContext) -> MdResult<(usize, Buffer)> {
        loop {
            let tag = read_tag_header(io)?;
            let body = io.read_bytes(tag.data_size as usize)?;
            skip_previous_tag_size(io)?;
            if body.is_empty() {
                continue;
            }
            let dts = ClockTime::from_mseconds(u64::from(tag.timestamp));

            let (pad, mut buffer) = match (tag.tag_type, self.audio_pad, self.video_pad) {
                (TAG_AUDIO, Some(pad), _) => {
                    let skip = if self.audio_is_aac {
                        // sequence header 已在 caps 中给出
                        if body.get(1) != Some(&1) {
                            continue;
                        }
                        2
                    } else {
                        1
                    };
                    let data = Bytes::from(body).slice(skip..);
                    let buffer = Buffer::new(data).with_timing(Some(dts), Some(dts), None);
                    (pad, buffer)
                }
                (TAG_VIDEO, _, Some(pad)) => {
                    let frame_type = body[0] >> 4;
                    if frame_type == 5 {
                        continue;
                    }
                    let (pts, skip) = if self.video_has_packet_type {
                        if body.len() < 5 || body[1] != 1 {
                            continue;
                        }
                        let raw = (u32::from(body[2]) << 16)
                            | (u32::from(body[3]) << 8)
                            | u32::from(body[4]);
                        // 24 位有符号
                        let cts = ((raw << 8) as i32) >> 8;
                        (dts.offset_useconds(i64::from(cts) * 1000), 5)
                    } else {
                        (dts, 1)
                    };
                    let mut flags = BufferFlags::empty();
                    if frame_type != 1 {
                        flags |= BufferFlags::DELTA_UNIT;
                    }
                    let data = Bytes::from(body).slice(skip..);
                    let buffer = Buffer::new(data)
                        .with_timing(Some(pts), Some(dts), None)
                        .with_flags(flags);
                    (pad, buffer)
                }
                _ => continue,
            };

            if std::mem::take(&mut self.discont) {
                buffer.flags |= BufferFlags::DISCONT;
            }
            return Ok((pad, buffer));
        }
    }

    fn seek(&mut self, io: &mut IoContext, target: ClockTime) -> MdResult<()> {
        if !io.is_seekable() {
            return Err(MdError::SeekFailed("FLV: 数据源不支持随机访问".into()));
        }
        let target_ms = target.nseconds() / 1_000_000;
        io.seek_to(self.data_start)?;

        // 有视频时落在关键帧上, 纯音频时落在任意音频 tag 上
        let mut best = self.data_start;
        loop {
            let pos = io.position()?;
            let tag = match read_tag_header(io) {
                Ok(tag) => tag,
                Err(MdError::Eof) => break,
                Err(e) => return Err(e),
            };
            if u64::from(tag.timestamp) > target_ms {
                break;
            }
            let first = if tag.data_size > 0 { io.read_u8()? } else { 0 };
            let candidate = match tag.tag_type {
                TAG_VIDEO => self.video_pad.is_some() && first >> 4 == 1,
                TAG_AUDIO => self.video_pad.is_none(),
                _ => false,
            };
            if candidate {
                best = pos;
            }
            let rest = tag.data_size.saturating_sub(u32::from(tag.data_size > 0));
            if io.skip(rest as usize + 4).is_err() {
                break;
            }
        }

        log::debug!("FLV: seek {} -> 偏移 {}", target, best);
        io.seek_to(best)?;
        self.discont = true;
        Ok(())
    }

    fn duration(&self) -> Option<ClockTime> {
        self.duration
    }
}

/// FLV 格式探测器
pub struct FlvProbe;

impl TypeFind for FlvProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        if data.len() >= 9 && &data[..3] == b"FLV" && data[3] == 1 {
            return Some(SCORE_MAX);
        }
        has_extension(filename, &["flv"]).then_some(SCORE_EXTENSION)
    }

    fn format_id(&self) -> FormatId {
        FormatId::Flv
    }

    fn caps(&self, _data: &[u8]) -> Caps {
        Caps::new("video/x-flv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(tag_type: u8, timestamp: u32, body: &[u8]) -> Vec<u8> {
        let mut out = vec![tag_type];
        out.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
        out.extend_from_slice(&(timestamp & 0xFF_FFFF).to_be_bytes()[1..]);
        out.push((timestamp >> 24) as u8);
        out.extend_from_slice(&[0, 0, 0]);
        out.extend_from_slice(body);
        out.extend_from_slice(&(11 + body.len() as u32).to_be_bytes());
        out
    }

    fn video(keyframe: bool, packet_type: u8, cts: u32, payload: &[u8]) -> Vec<u8> {
        let mut body = vec![if keyframe { 0x17 } else { 0x27 }, packet_type];
        body.extend_from_slice(&cts.to_be_bytes()[1..]);
        body.extend_from_slice(payload);
        body
    }

    fn audio(packet_type: u8, payload: &[u8]) -> Vec<u8> {
        // AAC, 44kHz, 16 bit, 立体声
        let mut body = vec![0xAF, packet_type];
        body.extend_from_slice(payload);
        body
    }

    /// 视频 25fps, 每 5 帧一个关键帧; 音频每 40ms 一帧
    fn build_file(frames: u32) -> Vec<u8> {
        let mut data = b"FLV\x01\x05\x00\x00\x00\x09\x00\x00\x00\x00".to_vec();
        data.extend(tag(TAG_VIDEO, 0, &video(true, 0, 0, &[0x01, 0x64, 0x00, 0x1F])));
        data.extend(tag(TAG_AUDIO, 0, &audio(0, &[0x12, 0x10])));
        for i in 0..frames {
            let ts = i * 40;
            data.extend(tag(TAG_VIDEO, ts, &video(i % 5 == 0, 1, 40, &[i as u8; 8])));
            data.extend(tag(TAG_AUDIO, ts, &audio(1, &[i as u8; 6])));
        }
        data
    }

    #[derive(Default)]
    struct Collect {
        pads: Vec<PadInfo>,
        done: bool,
    }

    impl PadListener for Collect {
        fn pad_added(&mut self, pad: PadInfo) -> MdResult<()> {
            self.pads.push(pad);
            Ok(())
        }

        fn no_more_pads(&mut self) {
            self.done = true;
        }
    }

    fn open(frames: u32) -> (Box<dyn ContainerParser>, IoContext, Collect) {
        let mut io = IoContext::from_memory(build_file(frames));
        let mut parser = FlvParser::create().unwrap();
        let mut pads = Collect::default();
        parser.open(&mut io, &mut pads).unwrap();
        (parser, io, pads)
    }

    #[test]
    fn test_探测_flv() {
        assert_eq!(FlvProbe.probe(&build_file(1), None), Some(SCORE_MAX));
        assert_eq!(FlvProbe.probe(b"FLX", Some("a.flv")), Some(SCORE_EXTENSION));
        assert_eq!(FlvProbe.probe(b"FLX", None), None);
    }

    #[test]
    fn test_打开_宣告音视频流() {
        let (_, _, pads) = open(3);
        assert!(pads.done);
        assert_eq!(pads.pads.len(), 2);
        assert_eq!(pads.pads[0].name, "video_0");
        assert_eq!(pads.pads[0].caps.name(), "video/x-h264");
        assert_eq!(
            pads.pads[0].caps.get_buffer("codec_data").map(|b| b.to_vec()),
            Some(vec![0x01, 0x64, 0x00, 0x1F])
        );
        assert_eq!(pads.pads[1].name, "audio_0");
        assert_eq!(pads.pads[1].caps.get_int("rate"), Some(44100));
        assert_eq!(pads.pads[1].caps.get_int("channels"), Some(2));
    }

    #[test]
    fn test_读取_跳过_sequence_header() {
        let (mut parser, mut io, _) = open(2);
        let (pad, first) = parser.next_buffer(&mut io).unwrap();
        assert_eq!(pad, 0);
        assert_eq!(first.data.len(), 8);
        assert!(first.is_sync());
        assert_eq!(first.pts, Some(ClockTime::from_mseconds(40)));
        assert_eq!(first.dts, Some(ClockTime::ZERO));

        let (pad, second) = parser.next_buffer(&mut io).unwrap();
        assert_eq!(pad, 1);
        assert_eq!(second.data.to_vec(), vec![0u8; 6]);

        let (_, third) = parser.next_buffer(&mut io).unwrap();
        assert!(!third.is_sync());
        parser.next_buffer(&mut io).unwrap();
        assert!(matches!(parser.next_buffer(&mut io), Err(MdError::Eof)));
    }

    #[test]
    fn test_seek_到关键帧() {
        let (mut parser, mut io, _) = open(20);
        parser.seek(&mut io, ClockTime::from_mseconds(330)).unwrap();
        let (pad, buf) = parser.next_buffer(&mut io).unwrap();
        assert_eq!(pad, 0);
        assert_eq!(buf.data[0], 5);
        assert!(buf.flags.contains(BufferFlags::DISCONT));
    }
}
