//! AAC ADTS 帧解析器.
//!
//! ADTS 帧头 (7 或 9 字节):
//! ```text
//! sync word (12)  ID (1)  layer (2)  protection_absent (1)
//! profile (2)  sampling_frequency_index (4)  private (1)  channel_configuration (3)
//! ...  frame_length (13)  buffer_fullness (11)  raw_data_blocks (2)
//! [CRC (16)]
//! ```
//!
//! 输出去掉帧头的原始 AAC 帧, 并在 caps 中给出 AudioSpecificConfig.

use md_core::{ClockTime, MdError, MdResult};

use super::{find_sync, seek_frames, skip_id3v2};
use crate::buffer::{Buffer, BufferFlags};
use crate::caps::Caps;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::parser::FrameParser;
use crate::typefind::{ProbeScore, SCORE_EXTENSION, SCORE_LIKELY, SCORE_MAX, TypeFind, has_extension};

/// AAC 采样率索引表 (ISO 14496-3)
pub(crate) const AAC_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// 每帧采样数
const SAMPLES_PER_FRAME: u64 = 1024;

/// 首帧最大搜索范围
const MAX_SYNC_SEARCH: usize = 64 * 1024;

/// 流中间失去同步时的搜索范围
const RESYNC_WINDOW: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct AdtsHeader {
    /// MPEG-2 (ID=1)
    mpeg2: bool,
    profile: u8,
    sampling_frequency_index: u8,
    channel_configuration: u8,
    frame_length: u16,
    header_size: u8,
}

impl AdtsHeader {
    fn sample_rate(&self) -> u32 {
        AAC_SAMPLE_RATES[usize::from(self.sampling_frequency_index)]
    }

    fn channels(&self) -> u16 {
        match self.channel_configuration {
            0 => 2,
            7 => 8,
            c => u16::from(c),
        }
    }

    /// 2 字节 AudioSpecificConfig
    fn audio_specific_config(&self) -> [u8; 2] {
        let aot = self.profile + 1;
        let sfi = self.sampling_frequency_index;
        [
            (aot << 3) | (sfi >> 1),
            ((sfi & 1) << 7) | (self.channel_configuration << 3),
        ]
    }
}

fn parse_adts_header(data: &[u8]) -> Option<AdtsHeader> {
    if data.len() < 7 || data[0] != 0xFF || data[1] & 0xF6 != 0xF0 {
        return None;
    }
    let protection_absent = data[1] & 0x01 != 0;
    let sampling_frequency_index = (data[2] >> 2) & 0x0F;
    if usize::from(sampling_frequency_index) >= AAC_SAMPLE_RATES.len() {
        return None;
    }
    let frame_length =
        (u16::from(data[3] & 0x03) << 11) | (u16::from(data[4]) << 3) | (u16::from(data[5]) >> 5);
    let header_size = if protection_absent { 7 } else { 9 };
    if frame_length <= u16::from(header_size) {
        return None;
    }
    Some(AdtsHeader {
        mpeg2: data[1] & 0x08 != 0,
        profile: (data[2] >> 6) & 0x03,
        sampling_frequency_index,
        channel_configuration: ((data[2] & 0x01) << 2) | (data[3] >> 6),
        frame_length,
        header_size,
    })
}

fn adts_frame_len(data: &[u8]) -> Option<usize> {
    parse_adts_header(data).map(|h| usize::from(h.frame_length))
}

/// 从 AudioSpecificConfig 取 (采样率, 声道数)
pub(crate) fn audio_specific_config_info(asc: &[u8]) -> Option<(u32, u16)> {
    let mut bits = asc
        .iter()
        .flat_map(|&b| (0..8).rev().map(move |i| u32::from((b >> i) & 1)));
    let mut read = |n: u32| -> Option<u32> {
        (0..n).try_fold(0u32, |acc, _| Some((acc << 1) | bits.next()?))
    };

    let object_type = read(5)?;
    if object_type == 31 {
        read(6)?;
    }
    let rate = match read(4)? {
        15 => read(24)?,
        idx => *AAC_SAMPLE_RATES.get(idx as usize)?,
    };
    let channels = match read(4)? {
        7 => 8,
        c => c as u16,
    };
    Some((rate, channels))
}

/// ADTS 帧解析器
pub struct AdtsParser {
    data_start: u64,
    sample_rate: u32,
    /// 已输出的帧数
    frames: u64,
    discont: bool,
}

impl AdtsParser {
    /// 创建实例 (工厂函数)
    pub fn create() -> MdResult<Box<dyn FrameParser>> {
        Ok(Box::new(Self {
            data_start: 0,
            sample_rate: 0,
            frames: 0,
            discont: false,
        }))
    }

    fn frame_duration(&self) -> ClockTime {
        ClockTime::from_scaled(SAMPLES_PER_FRAME, self.sample_rate)
    }
}

impl FrameParser for AdtsParser {
    fn name(&self) -> &'static str {
        "aacparse"
    }

    fn open(&mut self, io: &mut IoContext) -> MdResult<Caps> {
        skip_id3v2(io)?;
        let start = find_sync(io, MAX_SYNC_SEARCH, adts_frame_len)?
            .ok_or_else(|| MdError::InvalidData("AAC: 未找到有效的 ADTS 帧".into()))?;
        let mut head = [0u8; 7];
        io.read_exact(&mut head)?;
        io.seek_to(start)?;
        let header = parse_adts_header(&head)
            .ok_or_else(|| MdError::InvalidData("AAC: 无效的 ADTS 帧头部".into()))?;

        self.data_start = start;
        self.sample_rate = header.sample_rate();
        log::debug!(
            "AAC: 首帧偏移={} profile={} sr={} ch={}",
            start,
            header.profile,
            self.sample_rate,
            header.channels()
        );

        Ok(Caps::new("audio/mpeg")
            .with_int("mpegversion", if header.mpeg2 { 2 } else { 4 })
            .with_str("stream-format", "raw")
            .with_int("channels", i64::from(header.channels()))
            .with_int("rate", i64::from(self.sample_rate))
            .with_buffer("codec_data", header.audio_specific_config().to_vec()))
    }

    fn next_frame(&mut self, io: &mut IoContext) -> MdResult<Buffer> {
        let header = loop {
            let pos = io.position()?;
            let mut head = [0u8; 7];
            io.read_exact(&mut head)?;
            if let Some(h) = parse_adts_header(&head) {
                break h;
            }
            log::debug!("AAC: 偏移 {} 处失去同步", pos);
            io.seek_to(pos + 1)?;
            if find_sync(io, RESYNC_WINDOW, adts_frame_len)?.is_none() {
                return Err(MdError::Eof);
            }
            self.discont = true;
        };
        if header.header_size == 9 {
            io.skip(2)?;
        }
        let data =
            io.read_bytes(usize::from(header.frame_length - u16::from(header.header_size)))?;

        let duration = self.frame_duration();
        let pts = ClockTime::from_scaled(self.frames * SAMPLES_PER_FRAME, self.sample_rate);
        self.frames += 1;
        let mut buffer = Buffer::new(data).with_timing(Some(pts), Some(pts), Some(duration));
        if std::mem::take(&mut self.discont) {
            buffer.flags |= BufferFlags::DISCONT;
        }
        Ok(buffer)
    }

    fn seek(&mut self, io: &mut IoContext, target: ClockTime) -> MdResult<()> {
        let wanted = target.nseconds() / self.frame_duration().nseconds().max(1);
        self.frames = seek_frames(io, self.data_start, wanted, |io| {
            let mut head = [0u8; 7];
            io.read_exact(&mut head)?;
            Ok(parse_adts_header(&head).map(|h| u64::from(h.frame_length)))
        })?;
        self.discont = true;
        Ok(())
    }
}

/// ADTS 格式探测器
pub struct AdtsProbe;

impl TypeFind for AdtsProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        let start = super::id3v2_size(data).unwrap_or(0) as usize;
        if let Some(header) = data.get(start..).and_then(parse_adts_header) {
            let next = start + usize::from(header.frame_length);
            let confirmed = data.get(next..).and_then(parse_adts_header).is_some();
            return Some(if confirmed { SCORE_MAX - 1 } else { SCORE_LIKELY });
        }
        has_extension(filename, &["aac", "adts"]).then_some(SCORE_EXTENSION)
    }

    fn format_id(&self) -> FormatId {
        FormatId::Adts
    }

    fn caps(&self, _data: &[u8]) -> Caps {
        Caps::new("audio/mpeg")
            .with_int("mpegversion", 4)
            .with_str("stream-format", "adts")
    }
}
