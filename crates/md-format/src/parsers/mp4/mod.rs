//! MP4 / MOV / 3GP 容器解析器.
//!
//! 结构概览:
//! ```text
//! ftyp          文件类型
//! moov          元数据
//!   mvhd        电影头部 (时间刻度, 时长)
//!   trak        轨道 (可多个)
//!     tkhd / mdia / mdhd / hdlr / minf / stbl
//! mdat          媒体数据
//! ```
//!
//! 打开时展开各轨道的样本表, 按 `video_%u`/`audio_%u`/`subtitle_%u` 宣告 pad.
//! 样本按文件偏移顺序交错输出.

mod boxes;
mod sample_table;

use bytes::Bytes;
use md_core::{ClockTime, MdError, MdResult, MediaType, Rational};

use self::boxes::BoxHeader;
use self::sample_table::{EntryLayout, SampleDescription, SampleEntry, SampleTable};
use crate::buffer::{Buffer, BufferFlags};
use crate::caps::{Caps, CapsValue};
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::parser::{ContainerParser, PadInfo, PadListener};
use crate::parsers::adts::audio_specific_config_info;
use crate::typefind::{
    ProbeScore, SCORE_EXTENSION, SCORE_LIKELY, SCORE_MAX, TypeFind, has_extension,
};

/// 单个轨道
struct Mp4Track {
    track_id: u32,
    media_type: MediaType,
    timescale: u32,
    description: Option<SampleDescription>,
    samples: Vec<SampleEntry>,
    /// 下一个待输出的样本
    cursor: usize,
    /// 下一个样本需带不连续标记
    discont: bool,
}

/// trak 解析过程中的中间状态
#[derive(Default)]
struct TrakBuilder {
    track_id: u32,
    timescale: u32,
    handler: [u8; 4],
    description: Option<SampleDescription>,
    table: SampleTable,
}

impl TrakBuilder {
    fn media_type(&self) -> MediaType {
        match &self.handler {
            b"vide" => MediaType::Video,
            b"soun" => MediaType::Audio,
            b"text" | b"sbtl" | b"subt" => MediaType::Subtitle,
            _ => MediaType::Other,
        }
    }

    fn layout(&self) -> EntryLayout {
        match self.media_type() {
            MediaType::Video => EntryLayout::Video,
            MediaType::Audio => EntryLayout::Audio,
            _ => EntryLayout::Other,
        }
    }
}

/// MP4 解析器
pub struct Mp4Parser {
    tracks: Vec<Mp4Track>,
    movie_timescale: u32,
    movie_duration: u64,
}

impl Mp4Parser {
    /// 创建实例 (工厂函数)
    pub fn create() -> MdResult<Box<dyn ContainerParser>> {
        Ok(Box::new(Self {
            tracks: Vec::new(),
            movie_timescale: 0,
            movie_duration: 0,
        }))
    }

    /// 依次处理 [start, end) 内的子 box
    fn walk(
        &mut self,
        io: &mut IoContext,
        end: u64,
        mut visit: impl FnMut(&mut Self, &mut IoContext, &BoxHeader) -> MdResult<()>,
    ) -> MdResult<()> {
        while io.position()? + 8 <= end {
            let header = boxes::read_box_header(io, end)?;
            visit(self, io, &header)?;
            io.seek_to(header.end)?;
        }
        Ok(())
    }

    fn parse_moov(&mut self, io: &mut IoContext, end: u64) -> MdResult<()> {
        self.walk(io, end, |this, io, header| {
            match header.kind {
                boxes::MVHD => this.parse_mvhd(io)?,
                boxes::TRAK => {
                    let mut trak = TrakBuilder::default();
                    parse_trak_boxes(io, header.end, &mut trak)?;
                    this.add_track(trak)?;
                }
                _ => {}
            }
            Ok(())
        })
    }

    fn parse_mvhd(&mut self, io: &mut IoContext) -> MdResult<()> {
        let (version, _) = boxes::read_full_box(io)?;
        if version == 1 {
            io.skip(16)?;
            self.movie_timescale = io.read_u32_be()?;
            self.movie_duration = io.read_u64_be()?;
        } else {
            io.skip(8)?;
            self.movie_timescale = io.read_u32_be()?;
            self.movie_duration = u64::from(io.read_u32_be()?);
        }
        Ok(())
    }

    fn add_track(&mut self, trak: TrakBuilder) -> MdResult<()> {
        let media_type = trak.media_type();
        if media_type == MediaType::Other {
            log::debug!(
                "MP4: 忽略轨道 #{} (handler '{}')",
                trak.track_id,
                String::from_utf8_lossy(&trak.handler)
            );
            return Ok(());
        }
        if trak.timescale == 0 {
            log::warn!("MP4: 轨道 #{} 时间刻度为 0, 忽略", trak.track_id);
            return Ok(());
        }
        let samples = trak.table.build_index()?;
        log::debug!(
            "MP4: 轨道 #{} {} 样本数={} timescale={}",
            trak.track_id,
            media_type,
            samples.len(),
            trak.timescale
        );
        self.tracks.push(Mp4Track {
            track_id: trak.track_id,
            media_type,
            timescale: trak.timescale,
            description: trak.description,
            samples,
            cursor: 0,
            discont: false,
        });
        Ok(())
    }

    /// 下一个样本所在的轨道: 取文件偏移最小者
    fn next_track(&self) -> Option<usize> {
        self.tracks
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.samples.get(t.cursor).map(|s| (i, s.offset)))
            .min_by_key(|&(_, offset)| offset)
            .map(|(i, _)| i)
    }
}

fn parse_trak_boxes(io: &mut IoContext, end: u64, trak: &mut TrakBuilder) -> MdResult<()> {
    while io.position()? + 8 <= end {
        let header = boxes::read_box_header(io, end)?;
        match header.kind {
            boxes::MDIA | boxes::MINF | boxes::STBL => {
                parse_trak_boxes(io, header.end, trak)?;
            }
            boxes::TKHD => {
                let (version, _) = boxes::read_full_box(io)?;
                io.skip(if version == 1 { 16 } else { 8 })?;
                trak.track_id = io.read_u32_be()?;
            }
            boxes::MDHD => {
                let (version, _) = boxes::read_full_box(io)?;
                io.skip(if version == 1 { 16 } else { 8 })?;
                trak.timescale = io.read_u32_be()?;
            }
            boxes::HDLR => {
                boxes::read_full_box(io)?;
                io.skip(4)?;
                trak.handler = io.read_tag()?;
            }
            boxes::STSD => {
                trak.description = sample_table::parse_stsd(io, &header, trak.layout())?;
            }
            _ => {
                trak.table.parse_box(io, &header)?;
            }
        }
        io.seek_to(header.end)?;
    }
    Ok(())
}

/// 平均帧率; 时长恒定时为精确值
fn frame_rate(track: &Mp4Track) -> Option<Rational> {
    let first = track.samples.first()?;
    let constant = track
        .samples
        .iter()
        .all(|s| s.duration == first.duration);
    let (num, den) = if constant {
        (u64::from(track.timescale), u64::from(first.duration))
    } else {
        let total: u64 = track.samples.iter().map(|s| u64::from(s.duration)).sum();
        (
            track.samples.len() as u64 * u64::from(track.timescale),
            total,
        )
    };
    if den == 0 {
        return None;
    }
    let (num, den) = (i32::try_from(num).ok()?, i32::try_from(den).ok()?);
    Some(Rational::new(num, den).reduce())
}

fn raw_audio_format(bits: u16, little_endian: bool) -> String {
    match bits {
        8 => "U8".to_string(),
        0 => format!("S16{}", if little_endian { "LE" } else { "BE" }),
        n => format!("S{n}{}", if little_endian { "LE" } else { "BE" }),
    }
}

/// 根据样本描述构建轨道 caps
fn track_caps(track: &Mp4Track) -> Caps {
    let Some(desc) = &track.description else {
        return Caps::new(match track.media_type {
            MediaType::Video => "video/x-unknown",
            MediaType::Audio => "audio/x-unknown",
            _ => "text/x-unknown",
        });
    };
    let config = |kind: &[u8; 4]| -> Option<Bytes> {
        desc.config
            .as_ref()
            .filter(|(k, _)| k == kind)
            .map(|(_, b)| b.clone())
    };
    let esds_config = desc.esds.as_ref().and_then(|e| e.decoder_specific.clone());

    let mut caps = match &desc.fourcc {
        b"avc1" | b"avc3" => {
            let format = if &desc.fourcc == b"avc3" { "avc3" } else { "avc" };
            let caps = Caps::new("video/x-h264")
                .with_str("stream-format", format)
                .with_str("alignment", "au");
            match config(b"avcC") {
                Some(data) => caps.with_buffer("codec_data", data),
                None => caps,
            }
        }
        b"hvc1" | b"hev1" => {
            let format = if &desc.fourcc == b"hev1" { "hev1" } else { "hvc1" };
            let caps = Caps::new("video/x-h265")
                .with_str("stream-format", format)
                .with_str("alignment", "au");
            match config(b"hvcC") {
                Some(data) => caps.with_buffer("codec_data", data),
                None => caps,
            }
        }
        b"s263" | b"h263" | b"H263" => Caps::new("video/x-h263").with_str("variant", "itu"),
        b"mp4v" => {
            let caps = Caps::new("video/mpeg")
                .with_int("mpegversion", 4)
                .with_bool("systemstream", false);
            match esds_config.clone() {
                Some(data) => caps.with_buffer("codec_data", data),
                None => caps,
            }
        }
        b"mp4a" => {
            let object_type = desc.esds.as_ref().map_or(0x40, |e| e.object_type);
            match object_type {
                // MPEG-1/2 Layer 3
                0x69 | 0x6B => Caps::new("audio/mpeg")
                    .with_int("mpegversion", 1)
                    .with_int("layer", 3),
                _ => {
                    let version = if (0x66..=0x68).contains(&object_type) { 2 } else { 4 };
                    let caps = Caps::new("audio/mpeg")
                        .with_int("mpegversion", version)
                        .with_str("stream-format", "raw");
                    match esds_config.clone() {
                        Some(data) => caps.with_buffer("codec_data", data),
                        None => caps,
                    }
                }
            }
        }
        b".mp3" | b"ms\0U" => Caps::new("audio/mpeg")
            .with_int("mpegversion", 1)
            .with_int("layer", 3),
        b"samr" => Caps::new("audio/AMR"),
        b"sawb" => Caps::new("audio/AMR-WB"),
        b"sowt" => Caps::new("audio/x-raw")
            .with_str("format", &raw_audio_format(desc.sample_size, true))
            .with_str("layout", "interleaved"),
        b"twos" | b"lpcm" | b"ipcm" | b"in24" | b"in32" => Caps::new("audio/x-raw")
            .with_str("format", &raw_audio_format(desc.sample_size, false))
            .with_str("layout", "interleaved"),
        b"fLaC" => {
            let caps = Caps::new("audio/x-flac").with_bool("framed", true);
            match config(b"dfLa") {
                Some(data) => caps.with_buffer("codec_data", data),
                None => caps,
            }
        }
        b"Opus" => Caps::new("audio/x-opus"),
        b"tx3g" => Caps::new("text/x-raw").with_str("format", "utf8"),
        other => {
            let name = match track.media_type {
                MediaType::Video => "video/x-unknown",
                MediaType::Audio => "audio/x-unknown",
                _ => "text/x-unknown",
            };
            Caps::new(name).with_str("fourcc", &String::from_utf8_lossy(other))
        }
    };

    match track.media_type {
        MediaType::Video => {
            if desc.width > 0 && desc.height > 0 {
                caps.set("width", CapsValue::Int(i64::from(desc.width)));
                caps.set("height", CapsValue::Int(i64::from(desc.height)));
            }
            if let Some(rate) = frame_rate(track) {
                caps.set("framerate", CapsValue::Fraction(rate));
            }
        }
        MediaType::Audio => {
            let (mut rate, mut channels) = (desc.sample_rate, desc.channels);
            match &desc.fourcc {
                b"samr" => (rate, channels) = (8000, 1),
                b"sawb" => (rate, channels) = (16000, 1),
                _ => {}
            }
            // AAC 以 AudioSpecificConfig 为准
            if caps.get_int("mpegversion").is_some_and(|v| v != 1) {
                if let Some((r, c)) = esds_config.as_deref().and_then(audio_specific_config_info) {
                    rate = r;
                    if c > 0 {
                        channels = c;
                    }
                }
            }
            if channels > 0 {
                caps.set("channels", CapsValue::Int(i64::from(channels)));
            }
            if rate > 0 {
                caps.set("rate", CapsValue::Int(i64::from(rate)));
            }
        }
        _ => {}
    }
    caps
}

impl ContainerParser for Mp4Parser {
    fn name(&self) -> &'static str {
        "mp4"
    }

    fn open(&mut self, io: &mut IoContext, pads: &mut dyn PadListener) -> MdResult<()> {
        let limit = io.size().unwrap_or(u64::MAX);
        let mut found_moov = false;

        loop {
            let pos = io.position()?;
            if pos + 8 > limit {
                break;
            }
            let header = match boxes::read_box_header(io, limit) {
                Ok(h) => h,
                Err(MdError::Eof) => break,
                Err(e) => return Err(e),
            };
            log::trace!("MP4: 顶层 box '{}' @{}", header.kind_str(), pos);
            match header.kind {
                boxes::FTYP => {
                    let brand = io.read_tag()?;
                    log::debug!("MP4: major brand '{}'", String::from_utf8_lossy(&brand));
                }
                boxes::MOOV => {
                    self.parse_moov(io, header.end)?;
                    found_moov = true;
                }
                boxes::MDAT if found_moov => break,
                _ => {}
            }
            if header.end == u64::MAX {
                break;
            }
            io.seek_to(header.end)?;
        }

        if !found_moov {
            return Err(MdError::InvalidData("MP4: 未找到 moov box".into()));
        }
        if self.tracks.is_empty() {
            return Err(MdError::InvalidData("MP4: 没有可用的轨道".into()));
        }

        let mut counters = [0u32; 3];
        for track in &self.tracks {
            let (prefix, slot) = match track.media_type {
                MediaType::Video => ("video", 0),
                MediaType::Audio => ("audio", 1),
                _ => ("subtitle", 2),
            };
            let name = format!("{prefix}_{}", counters[slot]);
            counters[slot] += 1;
            let caps = track_caps(track);
            log::debug!("MP4: 轨道 #{} -> {}: {}", track.track_id, name, caps);
            pads.pad_added(PadInfo { name, caps })?;
        }
        pads.no_more_pads();
        Ok(())
    }

    fn next_buffer(&mut self, io: &mut IoContext) -> MdResult<(usize, Buffer)> {
        let index = self.next_track().ok_or(MdError::Eof)?;
        let track = &mut self.tracks[index];
        let sample = track.samples[track.cursor];
        track.cursor += 1;

        if io.position()? != sample.offset {
            io.seek_to(sample.offset)?;
        }
        let data = io.read_bytes(sample.size as usize)?;

        let mut flags = BufferFlags::empty();
        if !sample.sync {
            flags |= BufferFlags::DELTA_UNIT;
        }
        if std::mem::take(&mut track.discont) {
            flags |= BufferFlags::DISCONT;
        }
        let buffer = Buffer::new(data)
            .with_timing(
                Some(ClockTime::from_scaled(sample.pts(), track.timescale)),
                Some(ClockTime::from_scaled(sample.dts, track.timescale)),
                Some(ClockTime::from_scaled(
                    u64::from(sample.duration),
                    track.timescale,
                )),
            )
            .with_flags(flags);
        Ok((index, buffer))
    }

    fn seek(&mut self, io: &mut IoContext, target: ClockTime) -> MdResult<()> {
        if !io.is_seekable() {
            return Err(MdError::SeekFailed("MP4: 数据源不支持随机访问".into()));
        }
        for track in &mut self.tracks {
            let ts = target.to_scaled(track.timescale);
            let upper = track.samples.partition_point(|s| s.dts <= ts);
            track.cursor = track.samples[..upper]
                .iter()
                .rposition(|s| s.sync)
                .unwrap_or(0);
            track.discont = true;
            log::debug!(
                "MP4: 轨道 #{} seek {} -> 样本 {}",
                track.track_id,
                target,
                track.cursor
            );
        }
        Ok(())
    }

    fn duration(&self) -> Option<ClockTime> {
        (self.movie_timescale > 0 && self.movie_duration > 0)
            .then(|| ClockTime::from_scaled(self.movie_duration, self.movie_timescale))
    }
}

/// MP4 格式探测器
pub struct Mp4Probe;

impl TypeFind for Mp4Probe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        if data.len() >= 8 {
            match &data[4..8] {
                b"ftyp" => return Some(SCORE_MAX),
                b"moov" | b"mdat" | b"free" | b"wide" | b"skip" => return Some(SCORE_LIKELY),
                _ => {}
            }
        }
        has_extension(filename, &["mp4", "m4a", "m4v", "mov", "3gp", "3g2"])
            .then_some(SCORE_EXTENSION)
    }

    fn format_id(&self) -> FormatId {
        FormatId::Mp4
    }

    fn caps(&self, data: &[u8]) -> Caps {
        let variant = match data.get(8..12) {
            Some(b"qt  ") => "apple",
            Some(brand) if brand.starts_with(b"3g") => "3gpp",
            _ => "iso",
        };
        Caps::new("video/quicktime").with_str("variant", variant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 构建 MP4 box
    fn make_box(kind: &[u8; 4], content: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + content.len());
        out.extend_from_slice(&(8 + content.len() as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(content);
        out
    }

    fn make_full_box(kind: &[u8; 4], content: &[u8]) -> Vec<u8> {
        let mut body = vec![0u8; 4];
        body.extend_from_slice(content);
        make_box(kind, &body)
    }

    fn u32s(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    fn video_entry() -> Vec<u8> {
        let mut e = vec![0u8; 6];
        e.extend_from_slice(&1u16.to_be_bytes());
        e.extend_from_slice(&[0u8; 16]);
        e.extend_from_slice(&320u16.to_be_bytes());
        e.extend_from_slice(&240u16.to_be_bytes());
        e.extend_from_slice(&[0u8; 4 + 4 + 4 + 2 + 32 + 2 + 2]);
        e.extend(make_box(b"avcC", &[0x01, 0x42, 0xC0, 0x1E]));
        make_box(b"avc1", &e)
    }

    fn amr_entry() -> Vec<u8> {
        let mut e = vec![0u8; 6];
        e.extend_from_slice(&1u16.to_be_bytes());
        e.extend_from_slice(&[0u8; 8]);
        e.extend_from_slice(&2u16.to_be_bytes());
        e.extend_from_slice(&16u16.to_be_bytes());
        e.extend_from_slice(&[0u8; 4]);
        e.extend_from_slice(&(8000u32 << 16).to_be_bytes());
        make_box(b"samr", &e)
    }

    fn trak(id: u32, handler: &[u8; 4], entry: Vec<u8>, timescale: u32, stbl: &[u8]) -> Vec<u8> {
        let tkhd = make_full_box(b"tkhd", &u32s(&[0, 0, id, 0, 0]));
        let mdhd = make_full_box(b"mdhd", &u32s(&[0, 0, timescale, 0, 0]));
        let mut hdlr_body = u32s(&[0]);
        hdlr_body.extend_from_slice(handler);
        hdlr_body.extend_from_slice(&[0u8; 13]);
        let hdlr = make_full_box(b"hdlr", &hdlr_body);
        let mut stsd_body = u32s(&[1]);
        stsd_body.extend(entry);
        let mut stbl_body = make_full_box(b"stsd", &stsd_body);
        stbl_body.extend_from_slice(stbl);
        let minf = make_box(b"minf", &make_box(b"stbl", &stbl_body));
        let mdia = make_box(b"mdia", &[mdhd, hdlr, minf].concat());
        make_box(b"trak", &[tkhd, mdia].concat())
    }

    /// 视频 4 帧 (第 1、3 帧为关键帧), 音频 2 帧, 媒体数据交错排列
    fn build_file() -> Vec<u8> {
        let ftyp = make_box(b"ftyp", b"isom\0\0\0\0isom");
        // mdat 负载: V0 V1 A0 V2 V3 A1, 每个 4 字节
        let payload: Vec<u8> = (0u8..6).flat_map(|i| [i; 4]).collect();
        let mdat = make_box(b"mdat", &payload);
        let data_start = (ftyp.len() + 8) as u32;

        let video_stbl = [
            make_full_box(b"stts", &u32s(&[1, 4, 1000])),
            make_full_box(b"stsc", &u32s(&[2, 1, 2, 1, 2, 2, 1])),
            make_full_box(b"stsz", &u32s(&[4, 4])),
            make_full_box(b"stco", &u32s(&[2, data_start, data_start + 12])),
            make_full_box(b"stss", &u32s(&[2, 1, 3])),
        ]
        .concat();
        let audio_stbl = [
            make_full_box(b"stts", &u32s(&[1, 2, 160])),
            make_full_box(b"stsc", &u32s(&[1, 1, 1, 1])),
            make_full_box(b"stsz", &u32s(&[4, 2])),
            make_full_box(b"stco", &u32s(&[2, data_start + 8, data_start + 20])),
        ]
        .concat();

        let mvhd = make_full_box(b"mvhd", &u32s(&[0, 0, 1000, 160, 0]));
        let moov = make_box(
            b"moov",
            &[
                mvhd,
                trak(1, b"vide", video_entry(), 25000, &video_stbl),
                trak(2, b"soun", amr_entry(), 8000, &audio_stbl),
            ]
            .concat(),
        );
        [ftyp, mdat, moov].concat()
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

    fn open() -> (Box<dyn ContainerParser>, IoContext, Collect) {
        let mut io = IoContext::from_memory(build_file());
        let mut parser = Mp4Parser::create().unwrap();
        let mut pads = Collect::default();
        parser.open(&mut io, &mut pads).unwrap();
        (parser, io, pads)
    }

    #[test]
    fn test_探测_mp4_ftyp() {
        let data = build_file();
        assert_eq!(Mp4Probe.probe(&data, None), Some(SCORE_MAX));
        assert_eq!(Mp4Probe.caps(&data).name(), "video/quicktime");
        assert_eq!(Mp4Probe.probe(b"xxxx", Some("a.M4A")), Some(SCORE_EXTENSION));
        assert_eq!(Mp4Probe.probe(b"xxxxxxxx", None), None);
    }

    #[test]
    fn test_打开_宣告轨道() {
        let (parser, _, pads) = open();
        assert!(pads.done);
        assert_eq!(pads.pads.len(), 2);
        let video = &pads.pads[0];
        assert_eq!(video.name, "video_0");
        assert_eq!(video.caps.name(), "video/x-h264");
        assert_eq!(video.caps.get_int("width"), Some(320));
        assert_eq!(video.caps.get_fraction("framerate"), Some(Rational::new(25, 1)));
        assert_eq!(
            video.caps.get_buffer("codec_data").map(|b| b.len()),
            Some(4)
        );
        let audio = &pads.pads[1];
        assert_eq!(audio.name, "audio_0");
        assert_eq!(audio.caps.name(), "audio/AMR");
        assert_eq!(audio.caps.get_int("rate"), Some(8000));
        assert_eq!(audio.caps.get_int("channels"), Some(1));
        assert_eq!(parser.duration(), Some(ClockTime::from_mseconds(160)));
    }

    #[test]
    fn test_按文件偏移交错读取() {
        let (mut parser, mut io, _) = open();
        let mut order = Vec::new();
        loop {
            match parser.next_buffer(&mut io) {
                Ok((idx, buf)) => order.push((idx, buf.data[0], buf.is_sync())),
                Err(MdError::Eof) => break,
                Err(e) => panic!("读取失败: {e}"),
            }
        }
        assert_eq!(
            order,
            vec![
                (0, 0, true),
                (0, 1, false),
                (1, 2, true),
                (0, 3, true),
                (0, 4, false),
                (1, 5, true),
            ]
        );
    }

    #[test]
    fn test_时间戳换算() {
        let (mut parser, mut io, _) = open();
        let (_, first) = parser.next_buffer(&mut io).unwrap();
        let (_, second) = parser.next_buffer(&mut io).unwrap();
        assert_eq!(first.pts, Some(ClockTime::ZERO));
        assert_eq!(second.pts, Some(ClockTime::from_mseconds(40)));
        assert_eq!(second.duration, Some(ClockTime::from_mseconds(40)));
    }

    #[test]
    fn test_seek_到前一个关键帧() {
        let (mut parser, mut io, _) = open();
        parser.seek(&mut io, ClockTime::from_mseconds(130)).unwrap();
        let (idx, buf) = parser.next_buffer(&mut io).unwrap();
        assert_eq!((idx, buf.data[0]), (0, 3));
        assert_eq!(buf.pts, Some(ClockTime::from_mseconds(80)));
        assert!(buf.flags.contains(BufferFlags::DISCONT));
    }

    #[test]
    fn test_缺少_moov() {
        let mut io = IoContext::from_memory(make_box(b"ftyp", b"isom\0\0\0\0"));
        let mut parser = Mp4Parser::create().unwrap();
        let mut pads = Collect::default();
        assert!(parser.open(&mut io, &mut pads).is_err());
        assert!(!pads.done);
    }
}
