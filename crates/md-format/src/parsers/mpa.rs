//! MPEG-1/2/2.5 音频帧解析器 (Layer I/II/III).
//!
//! ```text
//! [ID3v2 标签 (可选)]
//! [Xing/Info 帧 (可选, 不含音频)]
//! [MPEG 音频帧 #0] [MPEG 音频帧 #1] ...
//! [ID3v1 标签 (可选, 文件末尾 128 字节)]
//! ```
//!
//! 帧头 (32 位):
//! ```text
//! AAAA AAAA  AAAB BCCD  EEEE FFGH  IIJJ KLMM
//! A = 同步位 (11)  B = 版本  C = 层  D = CRC 保护
//! E = 比特率索引   F = 采样率索引  G = 填充  I = 声道模式
//! ```

use md_core::{ClockTime, MdError, MdResult};

use super::{find_sync, id3v2_size, seek_frames, skip_id3v2};
use crate::buffer::{Buffer, BufferFlags};
use crate::caps::Caps;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::parser::FrameParser;
use crate::typefind::{ProbeScore, SCORE_EXTENSION, SCORE_LIKELY, SCORE_MAX, TypeFind, has_extension};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MpegVersion {
    V1,
    V2,
    V25,
}

#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    version: MpegVersion,
    layer: u8,
    bitrate: u32,
    sample_rate: u32,
    /// 3 = 单声道
    channel_mode: u8,
    /// 含头部的帧长度
    frame_size: u32,
    samples_per_frame: u32,
}

impl FrameHeader {
    fn channels(&self) -> u16 {
        if self.channel_mode == 3 { 1 } else { 2 }
    }

    /// Xing/Info 标签相对帧头起点的偏移
    fn xing_offset(&self) -> usize {
        4 + match (self.version, self.channel_mode) {
            (MpegVersion::V1, 3) => 17,
            (MpegVersion::V1, _) => 32,
            (_, 3) => 9,
            (_, _) => 17,
        }
    }
}

/// 比特率表 (kbps): [V1 L1, V1 L2, V1 L3, V2 L1, V2 L2/L3]
const BITRATES: [[u16; 15]; 5] = [
    [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];

const SAMPLE_RATES_V1: [u32; 3] = [44100, 48000, 32000];

const MAX_SYNC_SEARCH: usize = 64 * 1024;
const RESYNC_WINDOW: usize = 4096;

fn parse_frame_header(data: &[u8]) -> Option<FrameHeader> {
    let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
    let header = u32::from_be_bytes(bytes);
    if header >> 21 != 0x7FF {
        return None;
    }
    let version = match (header >> 19) & 0x03 {
        0 => MpegVersion::V25,
        2 => MpegVersion::V2,
        3 => MpegVersion::V1,
        _ => return None,
    };
    let layer = match (header >> 17) & 0x03 {
        1 => 3,
        2 => 2,
        3 => 1,
        _ => return None,
    };
    let br_idx = ((header >> 12) & 0x0F) as usize;
    if br_idx == 0 || br_idx == 15 {
        return None;
    }
    let sr_idx = ((header >> 10) & 0x03) as usize;
    if sr_idx == 3 {
        return None;
    }

    let table = match (version, layer) {
        (MpegVersion::V1, l) => usize::from(l - 1),
        (_, 1) => 3,
        _ => 4,
    };
    let bitrate = u32::from(BITRATES[table][br_idx]) * 1000;
    let sample_rate = match version {
        MpegVersion::V1 => SAMPLE_RATES_V1[sr_idx],
        MpegVersion::V2 => SAMPLE_RATES_V1[sr_idx] / 2,
        MpegVersion::V25 => SAMPLE_RATES_V1[sr_idx] / 4,
    };
    let padding = (header >> 9) & 1;
    let samples_per_frame = match (version, layer) {
        (_, 1) => 384,
        (MpegVersion::V1, _) | (_, 2) => 1152,
        _ => 576,
    };
    let frame_size = if layer == 1 {
        (12 * bitrate / sample_rate + padding) * 4
    } else {
        samples_per_frame / 8 * bitrate / sample_rate + padding
    };
    if frame_size <= 4 {
        return None;
    }

    Some(FrameHeader {
        version,
        layer,
        bitrate,
        sample_rate,
        channel_mode: ((header >> 6) & 0x03) as u8,
        frame_size,
        samples_per_frame,
    })
}

fn mpa_frame_len(data: &[u8]) -> Option<usize> {
    parse_frame_header(data).map(|h| h.frame_size as usize)
}

/// MPEG 音频帧解析器
pub struct MpaParser {
    data_start: u64,
    sample_rate: u32,
    samples_per_frame: u32,
    frames: u64,
    discont: bool,
}

impl MpaParser {
    /// 创建实例 (工厂函数)
    pub fn create() -> MdResult<Box<dyn FrameParser>> {
        Ok(Box::new(Self {
            data_start: 0,
            sample_rate: 0,
            samples_per_frame: 1152,
            frames: 0,
            discont: false,
        }))
    }

    fn timestamp(&self, frames: u64) -> ClockTime {
        ClockTime::from_scaled(frames * u64::from(self.samples_per_frame), self.sample_rate)
    }
}

impl FrameParser for MpaParser {
    fn name(&self) -> &'static str {
        "mpegaudioparse"
    }

    fn open(&mut self, io: &mut IoContext) -> MdResult<Caps> {
        skip_id3v2(io)?;
        let mut start = find_sync(io, MAX_SYNC_SEARCH, mpa_frame_len)?
            .ok_or_else(|| MdError::InvalidData("MP3: 未找到有效的 MPEG 音频帧".into()))?;
        let head = io.read_bytes(4)?;
        let header = parse_frame_header(&head)
            .ok_or_else(|| MdError::InvalidData("MP3: 无效的帧头".into()))?;

        // Xing/Info 帧只携带元数据
        io.seek_to(start)?;
        let probe_len = header.xing_offset() + 4;
        if (header.frame_size as usize) >= probe_len {
            let frame = io.read_bytes(probe_len)?;
            let tag = &frame[header.xing_offset()..];
            if tag == b"Xing" || tag == b"Info" {
                log::debug!("MP3: 跳过 {} 帧", String::from_utf8_lossy(tag));
                start += u64::from(header.frame_size);
            }
        }
        io.seek_to(start)?;

        self.data_start = start;
        self.sample_rate = header.sample_rate;
        self.samples_per_frame = header.samples_per_frame;
        log::debug!(
            "MP3: 首帧偏移={} layer={} br={} sr={} ch={}",
            start,
            header.layer,
            header.bitrate,
            header.sample_rate,
            header.channels()
        );

        let audio_version = match header.version {
            MpegVersion::V1 => 1,
            MpegVersion::V2 => 2,
            MpegVersion::V25 => 3,
        };
        Ok(Caps::new("audio/mpeg")
            .with_int("mpegversion", 1)
            .with_int("mpegaudioversion", audio_version)
            .with_int("layer", i64::from(header.layer))
            .with_int("channels", i64::from(header.channels()))
            .with_int("rate", i64::from(header.sample_rate))
            .with_bool("parsed", true))
    }

    fn next_frame(&mut self, io: &mut IoContext) -> MdResult<Buffer> {
        let header = loop {
            let pos = io.position()?;
            let head = io.read_bytes(4)?;
            if &head[..3] == b"TAG" {
                // ID3v1 标签位于文件末尾
                return Err(MdError::Eof);
            }
            if let Some(h) = parse_frame_header(&head) {
                io.seek_to(pos)?;
                break h;
            }
            log::debug!("MP3: 偏移 {} 处失去同步", pos);
            io.seek_to(pos + 1)?;
            if find_sync(io, RESYNC_WINDOW, mpa_frame_len)?.is_none() {
                return Err(MdError::Eof);
            }
            self.discont = true;
        };
        let data = io.read_bytes(header.frame_size as usize)?;

        let pts = self.timestamp(self.frames);
        let duration = self.timestamp(self.frames + 1).nseconds() - pts.nseconds();
        self.frames += 1;
        let mut buffer = Buffer::new(data).with_timing(
            Some(pts),
            Some(pts),
            Some(ClockTime::from_nseconds(duration)),
        );
        if std::mem::take(&mut self.discont) {
            buffer.flags |= BufferFlags::DISCONT;
        }
        Ok(buffer)
    }

    fn seek(&mut self, io: &mut IoContext, target: ClockTime) -> MdResult<()> {
        let wanted = target.to_scaled(self.sample_rate) / u64::from(self.samples_per_frame.max(1));
        self.frames = seek_frames(io, self.data_start, wanted, |io| {
            let head = io.read_bytes(4)?;
            Ok(parse_frame_header(&head).map(|h| u64::from(h.frame_size)))
        })?;
        self.discont = true;
        Ok(())
    }
}

/// MPEG 音频探测器
pub struct MpaProbe;

impl TypeFind for MpaProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        let start = id3v2_size(data).unwrap_or(0) as usize;
        if let Some(header) = data.get(start..).and_then(parse_frame_header) {
            let next = start + header.frame_size as usize;
            let confirmed = data.get(next..).and_then(parse_frame_header).is_some();
            return Some(if confirmed { SCORE_MAX - 1 } else { SCORE_LIKELY });
        }
        has_extension(filename, &["mp3", "mp2", "mpga"]).then_some(SCORE_EXTENSION)
    }

    fn format_id(&self) -> FormatId {
        FormatId::MpegAudio
    }

    fn caps(&self, data: &[u8]) -> Caps {
        let start = id3v2_size(data).unwrap_or(0) as usize;
        let layer = data
            .get(start..)
            .and_then(parse_frame_header)
            .map_or(3, |h| h.layer);
        Caps::new("audio/mpeg")
            .with_int("mpegversion", 1)
            .with_int("layer", i64::from(layer))
    }
}

/// ID3v2 标签探测器
///
/// 标签超出探测窗口时看不到后面的音频帧, 此时按带标签的 MPEG 音频处理.
pub struct Id3Probe;

impl TypeFind for Id3Probe {
    fn probe(&self, data: &[u8], _filename: Option<&str>) -> Option<ProbeScore> {
        id3v2_size(data).map(|_| SCORE_LIKELY - 1)
    }

    fn format_id(&self) -> FormatId {
        FormatId::Id3
    }

    fn caps(&self, _data: &[u8]) -> Caps {
        Caps::new("application/x-id3")
    }
}
