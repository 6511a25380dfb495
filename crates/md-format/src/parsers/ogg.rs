//! Ogg 容器解析器.
//!
//! 页面结构:
//! ```text
//! "OggS" | version (1) | header_type (1) | granule (8, LE) | serial (4) | sequence (4)
//! | crc (4) | segments (1) | segment_table (N) | data
//! ```
//!
//! 开头连续的 BOS 页面各自宣告一个逻辑流. 各流的头部包照常输出, 并带 HEADER 标记.
//! 时间戳取自页面粒度位置: 一个页面中首个完成的包使用上一页的结束时间.

use std::collections::VecDeque;

use bytes::Bytes;
use md_core::{ClockTime, MdError, MdResult, MediaType, Rational};

use crate::buffer::{Buffer, BufferFlags};
use crate::caps::Caps;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::parser::{ContainerParser, PadInfo, PadListener};
use crate::typefind::{ProbeScore, SCORE_EXTENSION, SCORE_MAX, TypeFind, has_extension};

const OGG_SYNC: &[u8; 4] = b"OggS";
const OGG_CRC_POLY: u32 = 0x04C1_1DB7;

const FLAG_CONTINUED: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;

/// 失去同步后的最大搜索范围
const RESYNC_WINDOW: usize = 64 * 1024;

fn ogg_crc32(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |mut crc, &byte| {
        crc ^= u32::from(byte) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ OGG_CRC_POLY
            } else {
                crc << 1
            };
        }
        crc
    })
}

struct OggPage {
    header_type: u8,
    /// -1 表示本页没有包结束
    granule: i64,
    serial: u32,
    segments: Vec<u8>,
    data: Vec<u8>,
}

impl OggPage {
    fn is_bos(&self) -> bool {
        self.header_type & FLAG_BOS != 0
    }

    fn is_continued(&self) -> bool {
        self.header_type & FLAG_CONTINUED != 0
    }

    /// 按段表切分包: (数据, 是否在本页结束)
    fn packets(&self) -> Vec<(&[u8], bool)> {
        let mut out = Vec::new();
        let (mut start, mut len) = (0usize, 0usize);
        for &seg in &self.segments {
            len += usize::from(seg);
            if seg < 255 {
                out.push((&self.data[start..start + len], true));
                start += len;
                len = 0;
            }
        }
        if len > 0 {
            out.push((&self.data[start..start + len], false));
        }
        out
    }
}

/// 读取一个页面并校验 CRC
fn read_page(io: &mut IoContext) -> MdResult<OggPage> {
    let mut header = [0u8; 27];
    io.read_exact(&mut header)?;
    if &header[..4] != OGG_SYNC || header[4] != 0 {
        return Err(MdError::InvalidData("Ogg: 无效的页面头".into()));
    }
    let segments = io.read_bytes(usize::from(header[26]))?;
    let size: usize = segments.iter().map(|&s| usize::from(s)).sum();
    let data = io.read_bytes(size)?;

    let stored = u32::from_le_bytes([header[22], header[23], header[24], header[25]]);
    header[22..26].fill(0);
    let mut page_bytes = Vec::with_capacity(27 + segments.len() + size);
    page_bytes.extend_from_slice(&header);
    page_bytes.extend_from_slice(&segments);
    page_bytes.extend_from_slice(&data);
    let computed = ogg_crc32(&page_bytes);
    if stored != computed {
        return Err(MdError::InvalidData(format!(
            "Ogg: 页面 CRC 校验失败: 读取=0x{stored:08X}, 计算=0x{computed:08X}"
        )));
    }

    let granule_bytes: [u8; 8] = header[6..14]
        .try_into()
        .map_err(|_| MdError::InvalidData("Ogg: 页面头过短".into()))?;
    Ok(OggPage {
        header_type: header[5],
        granule: i64::from_le_bytes(granule_bytes),
        serial: u32::from_le_bytes([header[14], header[15], header[16], header[17]]),
        segments,
        data,
    })
}

/// 从当前位置读取下一个有效页面, 必要时向后搜索同步字
fn next_page(io: &mut IoContext) -> MdResult<OggPage> {
    let start = io.position()?;
    match read_page(io) {
        Ok(page) => return Ok(page),
        Err(MdError::InvalidData(msg)) => log::debug!("{} @{}", msg, start),
        Err(e) => return Err(e),
    }
    let mut from = start + 1;
    loop {
        io.seek_to(from)?;
        let window = io.read_up_to(RESYNC_WINDOW)?;
        let Some(found) = window.windows(4).position(|w| w == OGG_SYNC) else {
            if window.len() < RESYNC_WINDOW {
                return Err(MdError::Eof);
            }
            from += (window.len() - 3) as u64;
            continue;
        };
        io.seek_to(from + found as u64)?;
        match read_page(io) {
            Ok(page) => return Ok(page),
            Err(MdError::InvalidData(_)) => from += found as u64 + 1,
            Err(e) => return Err(e),
        }
    }
}

/// 逻辑流承载的编码
#[derive(Debug, Clone, Copy, PartialEq)]
enum OggCodec {
    Vorbis { rate: u32, channels: u8 },
    Opus { pre_skip: u16, channels: u8 },
    Flac { rate: u32, channels: u8 },
    Theora { width: u32, height: u32, fps: Rational, shift: u8 },
}

impl OggCodec {
    /// 根据 BOS 包识别编码, 同时给出头部包个数 (含 BOS 包)
    fn identify(packet: &[u8]) -> Option<(Self, u32)> {
        if packet.len() >= 16 && packet[0] == 1 && &packet[1..7] == b"vorbis" {
            let channels = packet[11];
            let rate = u32::from_le_bytes([packet[12], packet[13], packet[14], packet[15]]);
            return Some((Self::Vorbis { rate, channels }, 3));
        }
        if packet.len() >= 12 && &packet[..8] == b"OpusHead" {
            let pre_skip = u16::from_le_bytes([packet[10], packet[11]]);
            return Some((
                Self::Opus {
                    pre_skip,
                    channels: packet[9],
                },
                2,
            ));
        }
        if packet.len() >= 30 && &packet[..5] == b"\x7fFLAC" && &packet[9..13] == b"fLaC" {
            // 映射头之后是 4 字节元数据块头, 再之后为 STREAMINFO
            let info = &packet[17..];
            let rate = (u32::from(info[10]) << 12) | (u32::from(info[11]) << 4) | (u32::from(info[12]) >> 4);
            let channels = ((info[12] >> 1) & 0x07) + 1;
            let extra = u32::from(u16::from_be_bytes([packet[7], packet[8]]));
            return Some((Self::Flac { rate, channels }, 1 + extra));
        }
        if packet.len() >= 42 && packet[0] == 0x80 && &packet[1..7] == b"theora" {
            let u24 = |i: usize| {
                (u32::from(packet[i]) << 16) | (u32::from(packet[i + 1]) << 8) | u32::from(packet[i + 2])
            };
            let u32_be = |i: usize| u32::from_be_bytes([packet[i], packet[i + 1], packet[i + 2], packet[i + 3]]);
            let fps = Rational::new(
                i32::try_from(u32_be(22)).unwrap_or(0),
                i32::try_from(u32_be(26)).unwrap_or(0),
            );
            let shift = ((packet[40] & 0x03) << 3) | (packet[41] >> 5);
            return Some((
                Self::Theora {
                    width: u24(14),
                    height: u24(17),
                    fps,
                    shift,
                },
                3,
            ));
        }
        None
    }

    fn media_type(&self) -> MediaType {
        match self {
            Self::Theora { .. } => MediaType::Video,
            _ => MediaType::Audio,
        }
    }

    fn caps(&self, id_packet: &[u8]) -> Caps {
        let caps = match *self {
            Self::Vorbis { rate, channels } => Caps::new("audio/x-vorbis")
                .with_int("rate", i64::from(rate))
                .with_int("channels", i64::from(channels)),
            Self::Opus { channels, .. } => Caps::new("audio/x-opus")
                .with_int("rate", 48000)
                .with_int("channels", i64::from(channels)),
            Self::Flac { rate, channels } => Caps::new("audio/x-flac")
                .with_bool("framed", true)
                .with_int("rate", i64::from(rate))
                .with_int("channels", i64::from(channels)),
            Self::Theora {
                width, height, fps, ..
            } => {
                let caps = Caps::new("video/x-theora")
                    .with_int("width", i64::from(width))
                    .with_int("height", i64::from(height));
                if fps.is_valid() {
                    caps.with_fraction("framerate", fps.reduce())
                } else {
                    caps
                }
            }
        };
        caps.with_buffer("codec_data", Bytes::copy_from_slice(id_packet))
    }

    /// 粒度位置换算为时间
    fn granule_time(&self, granule: i64) -> Option<ClockTime> {
        let granule = u64::try_from(granule).ok()?;
        match *self {
            Self::Vorbis { rate, .. } | Self::Flac { rate, .. } => {
                Some(ClockTime::from_scaled(granule, rate))
            }
            Self::Opus { pre_skip, .. } => Some(ClockTime::from_scaled(
                granule.saturating_sub(u64::from(pre_skip)),
                48000,
            )),
            Self::Theora { fps, shift, .. } => {
                if fps.num <= 0 || fps.den <= 0 {
                    return None;
                }
                let frames = (granule >> shift) + (granule & ((1u64 << shift) - 1));
                let ns = u128::from(frames) * u128::from(ClockTime::SECOND) * fps.den.unsigned_abs() as u128
                    / fps.num.unsigned_abs() as u128;
                Some(ClockTime::from_nseconds(u64::try_from(ns).ok()?))
            }
        }
    }

    /// Theora 关键帧判断: 粒度位置低位为 0 的帧之后首个包
    fn is_keyframe_packet(&self, packet: &[u8]) -> bool {
        match self {
            Self::Theora { .. } => packet.first().is_some_and(|b| b & 0x40 == 0),
            _ => true,
        }
    }
}

struct OggStream {
    serial: u32,
    codec: OggCodec,
    pad: usize,
    headers_left: u32,
    /// 跨页的未完成包
    partial: Vec<u8>,
    /// seek 后丢弃首个续包
    skip_continued: bool,
    /// 上一页的结束时间
    last_time: Option<ClockTime>,
    discont: bool,
}

/// Ogg 解析器
pub struct OggParser {
    streams: Vec<OggStream>,
    pending: VecDeque<(usize, Buffer)>,
    /// 第一个非 BOS 页面的偏移
    data_start: u64,
}

impl OggParser {
    /// 创建实例 (工厂函数)
    pub fn create() -> MdResult<Box<dyn ContainerParser>> {
        Ok(Box::new(Self {
            streams: Vec::new(),
            pending: VecDeque::new(),
            data_start: 0,
        }))
    }

    /// 处理一个页面, 产出的包放入 pending
    fn process_page(&mut self, page: &OggPage) {
        let Some(stream) = self.streams.iter_mut().find(|s| s.serial == page.serial) else {
            return;
        };
        let page_time = stream.codec.granule_time(page.granule);
        let mut first_in_page = true;

        for (i, (data, complete)) in page.packets().into_iter().enumerate() {
            if i == 0 && page.is_continued() && stream.skip_continued {
                stream.partial.clear();
                stream.skip_continued = false;
                continue;
            }
            if i == 0 && !page.is_continued() {
                stream.partial.clear();
            }
            stream.skip_continued = false;
            stream.partial.extend_from_slice(data);
            if !complete {
                continue;
            }
            let packet = Bytes::from(std::mem::take(&mut stream.partial));

            let mut flags = BufferFlags::empty();
            let mut pts = None;
            if stream.headers_left > 0 {
                stream.headers_left -= 1;
                flags |= BufferFlags::HEADER;
            } else {
                if first_in_page {
                    pts = stream.last_time;
                    first_in_page = false;
                }
                if !stream.codec.is_keyframe_packet(&packet) {
                    flags |= BufferFlags::DELTA_UNIT;
                }
            }
            if std::mem::take(&mut stream.discont) {
                flags |= BufferFlags::DISCONT;
            }
            let buffer = Buffer::new(packet).with_timing(pts, pts, None).with_flags(flags);
            self.pending.push_back((stream.pad, buffer));
        }
        if page_time.is_some() {
            stream.last_time = page_time;
        }
    }

    /// 主流: 第一个音频流, 没有时取第一个流
    fn primary_serial(&self) -> Option<u32> {
        self.streams
            .iter()
            .find(|s| s.codec.media_type() == MediaType::Audio)
            .or_else(|| self.streams.first())
            .map(|s| s.serial)
    }
}

impl ContainerParser for OggParser {
    fn name(&self) -> &'static str {
        "ogg"
    }

    fn open(&mut self, io: &mut IoContext, pads: &mut dyn PadListener) -> MdResult<()> {
        let mut counters = [0u32; 2];
        loop {
            let pos = io.position()?;
            let page = match next_page(io) {
                Ok(page) => page,
                Err(MdError::Eof) => break,
                Err(e) => return Err(e),
            };
            if !page.is_bos() {
                io.seek_to(pos)?;
                break;
            }
            let packets = page.packets();
            let Some((id_packet, _)) = packets.first() else {
                continue;
            };
            let Some((codec, headers)) = OggCodec::identify(id_packet) else {
                log::debug!("Ogg: 忽略无法识别的逻辑流 0x{:08x}", page.serial);
                continue;
            };

            let (prefix, slot) = match codec.media_type() {
                MediaType::Video => ("video", 0),
                _ => ("audio", 1),
            };
            let name = format!("{prefix}_{}", counters[slot]);
            counters[slot] += 1;
            let caps = codec.caps(id_packet);
            log::debug!("Ogg: 逻辑流 0x{:08x} -> {}: {}", page.serial, name, caps);

            let pad = self.streams.len();
            self.streams.push(OggStream {
                serial: page.serial,
                codec,
                pad,
                headers_left: headers,
                partial: Vec::new(),
                skip_continued: false,
                last_time: Some(ClockTime::ZERO),
                discont: false,
            });
            pads.pad_added(PadInfo { name, caps })?;
            // BOS 包本身作为第一个头部包输出
            self.process_page(&page);
        }

        if self.streams.is_empty() {
            return Err(MdError::InvalidData("Ogg: 未发现可识别的逻辑流".into()));
        }
        self.data_start = io.position()?;
        pads.no_more_pads();
        Ok(())
    }

    fn next_buffer(&mut self, io: &mut IoContext) -> MdResult<(usize, Buffer)> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Ok(item);
            }
            let page = next_page(io)?;
            self.process_page(&page);
        }
    }

    fn seek(&mut self, io: &mut IoContext, target: ClockTime) -> MdResult<()> {
        if !io.is_seekable() {
            return Err(MdError::SeekFailed("Ogg: 数据源不支持随机访问".into()));
        }
        let primary = self
            .primary_serial()
            .ok_or_else(|| MdError::SeekFailed("Ogg: 没有逻辑流".into()))?;

        // 找到主流中结束时间不晚于目标的最后一个页面, 从其下一页开始输出
        io.seek_to(self.data_start)?;
        let mut resume = self.data_start;
        let mut resume_time = ClockTime::ZERO;
        loop {
            let page = match next_page(io) {
                Ok(page) => page,
                Err(MdError::Eof) => break,
                Err(e) => return Err(e),
            };
            if page.serial != primary {
                continue;
            }
            let Some(stream) = self.streams.iter().find(|s| s.serial == primary) else {
                break;
            };
            match stream.codec.granule_time(page.granule) {
                Some(t) if t <= target => {
                    resume = io.position()?;
                    resume_time = t;
                }
                Some(_) => break,
                None => {}
            }
        }

        io.seek_to(resume)?;
        self.pending.clear();
        for stream in &mut self.streams {
            stream.partial.clear();
            stream.headers_left = 0;
            stream.skip_continued = true;
            stream.discont = true;
            stream.last_time = if stream.serial == primary {
                Some(resume_time)
            } else {
                None
            };
        }
        log::debug!("Ogg: seek {} -> 偏移 {} ({})", target, resume, resume_time);
        Ok(())
    }
}

/// Ogg 格式探测器
pub struct OggProbe;

impl TypeFind for OggProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        if data.starts_with(OGG_SYNC) {
            return Some(SCORE_MAX);
        }
        has_extension(filename, &["ogg", "oga", "ogv", "opus"]).then_some(SCORE_EXTENSION)
    }

    fn format_id(&self) -> FormatId {
        FormatId::Ogg
    }

    fn caps(&self, _data: &[u8]) -> Caps {
        Caps::new("application/ogg")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_page(header_type: u8, granule: i64, serial: u32, seq: u32, packets: &[&[u8]]) -> Vec<u8> {
        let mut segments = Vec::new();
        let mut body = Vec::new();
        for p in packets {
            let mut left = p.len();
            while left >= 255 {
                segments.push(255);
                left -= 255;
            }
            segments.push(left as u8);
            body.extend_from_slice(p);
        }
        let mut page = OGG_SYNC.to_vec();
        page.push(0);
        page.push(header_type);
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&serial.to_le_bytes());
        page.extend_from_slice(&seq.to_le_bytes());
        page.extend_from_slice(&[0; 4]);
        page.push(segments.len() as u8);
        page.extend_from_slice(&segments);
        page.extend_from_slice(&body);
        let crc = ogg_crc32(&page);
        page[22..26].copy_from_slice(&crc.to_le_bytes());
        page
    }

    fn vorbis_id() -> Vec<u8> {
        let mut p = vec![1];
        p.extend_from_slice(b"vorbis");
        p.extend_from_slice(&0u32.to_le_bytes());
        p.push(2);
        p.extend_from_slice(&44100u32.to_le_bytes());
        p.extend_from_slice(&[0u8; 14]);
        p
    }

    /// 1 个 Vorbis 流: 3 个头部包, 之后每页 1 个 1024 采样的数据包
    fn build_file(pages: u32) -> Vec<u8> {
        let mut data = build_page(FLAG_BOS, 0, 7, 0, &[&vorbis_id()]);
        data.extend(build_page(0, 0, 7, 1, &[b"\x03vorbis-comment", b"\x05vorbis-setup"]));
        for i in 0..pages {
            let granule = i64::from(i + 1) * 1024;
            data.extend(build_page(0, granule, 7, i + 2, &[&[i as u8; 32]]));
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

    fn open(pages: u32) -> (Box<dyn ContainerParser>, IoContext, Collect) {
        let mut io = IoContext::from_memory(build_file(pages));
        let mut parser = OggParser::create().unwrap();
        let mut pads = Collect::default();
        parser.open(&mut io, &mut pads).unwrap();
        (parser, io, pads)
    }

    #[test]
    fn test_crc_校验() {
        let mut page = build_page(FLAG_BOS, 0, 1, 0, &[&vorbis_id()]);
        assert!(read_page(&mut IoContext::from_memory(page.clone())).is_ok());
        page[40] ^= 0xFF;
        assert!(matches!(
            read_page(&mut IoContext::from_memory(page)),
            Err(MdError::InvalidData(_))
        ));
    }

    #[test]
    fn test_识别_vorbis_流() {
        let (_, _, pads) = open(1);
        assert!(pads.done);
        assert_eq!(pads.pads.len(), 1);
        assert_eq!(pads.pads[0].name, "audio_0");
        assert_eq!(pads.pads[0].caps.name(), "audio/x-vorbis");
        assert_eq!(pads.pads[0].caps.get_int("rate"), Some(44100));
        assert_eq!(pads.pads[0].caps.get_int("channels"), Some(2));
    }

    #[test]
    fn test_读取_头部包与数据包() {
        let (mut parser, mut io, _) = open(3);
        for _ in 0..3 {
            let (_, header) = parser.next_buffer(&mut io).unwrap();
            assert!(header.flags.contains(BufferFlags::HEADER));
        }
        let (_, first) = parser.next_buffer(&mut io).unwrap();
        assert_eq!(first.pts, Some(ClockTime::ZERO));
        let (_, second) = parser.next_buffer(&mut io).unwrap();
        assert_eq!(second.pts, Some(ClockTime::from_scaled(1024, 44100)));
        assert_eq!(second.data[0], 1);
        parser.next_buffer(&mut io).unwrap();
        assert!(matches!(parser.next_buffer(&mut io), Err(MdError::Eof)));
    }

    #[test]
    fn test_seek_从目标之前的页面继续() {
        let (mut parser, mut io, _) = open(40);
        // 每页约 23.2ms, 300ms 之前结束的最后一页是第 12 页 (granule 12*1024)
        parser.seek(&mut io, ClockTime::from_mseconds(300)).unwrap();
        let (_, buf) = parser.next_buffer(&mut io).unwrap();
        assert_eq!(buf.data[0], 12);
        assert_eq!(buf.pts, Some(ClockTime::from_scaled(12 * 1024, 44100)));
        assert!(buf.flags.contains(BufferFlags::DISCONT));
        assert!(!buf.flags.contains(BufferFlags::HEADER));
    }

    #[test]
    fn test_跳过损坏页面() {
        let mut data = build_file(3);
        // 破坏第一个数据页的负载
        let len = data.len();
        data[len - 2 * (27 + 1 + 32) - 5] ^= 0xFF;
        let mut io = IoContext::from_memory(data);
        let mut parser = OggParser::create().unwrap();
        parser.open(&mut io, &mut Collect::default()).unwrap();
        let mut payloads = Vec::new();
        while let Ok((_, buf)) = parser.next_buffer(&mut io) {
            if !buf.flags.contains(BufferFlags::HEADER) {
                payloads.push(buf.data[0]);
            }
        }
        assert_eq!(payloads, vec![1, 2]);
    }
}
