//! 样本表 (stbl) 解析与样本索引构建.
//!
//! 打开文件时一次性把 stts/stsc/stsz/stco/stss/ctts 展开成逐样本的索引,
//! 之后读取与 seek 都只做数组查找.

use bytes::Bytes;
use md_core::{MdError, MdResult};

use super::boxes::{self, BoxHeader};
use crate::io::IoContext;

/// 单个样本索引项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEntry {
    /// 文件内偏移
    pub offset: u64,
    /// 字节数
    pub size: u32,
    /// 解码时间 (轨道时间刻度)
    pub dts: u64,
    /// 显示时间相对解码时间的偏移
    pub cts_offset: i64,
    /// 时长 (轨道时间刻度)
    pub duration: u32,
    /// 是否为同步样本
    pub sync: bool,
}

impl SampleEntry {
    /// 显示时间 (轨道时间刻度), 下限为 0
    pub fn pts(&self) -> u64 {
        self.dts.saturating_add_signed(self.cts_offset)
    }
}

/// stsc 条目
#[derive(Debug, Clone, Copy)]
struct ChunkRun {
    first_chunk: u32,
    samples_per_chunk: u32,
}

/// 样本表原始数据
#[derive(Debug, Default)]
pub struct SampleTable {
    /// (样本数, 单样本时长)
    time_to_sample: Vec<(u32, u32)>,
    chunk_runs: Vec<ChunkRun>,
    /// 每样本大小; 统一大小时为空
    sizes: Vec<u32>,
    uniform_size: u32,
    sample_count: u32,
    chunk_offsets: Vec<u64>,
    /// 同步样本序号 (从 1 开始); None 表示全部为同步样本
    sync_samples: Option<Vec<u32>>,
    /// (样本数, 显示时间偏移)
    composition: Vec<(u32, i64)>,
}

/// 样本描述中的 ES 描述符
#[derive(Debug, Clone, Default)]
pub struct EsDescriptor {
    /// objectTypeIndication
    pub object_type: u8,
    /// DecoderSpecificInfo 负载
    pub decoder_specific: Option<Bytes>,
}

/// stsd 中的一个样本描述
#[derive(Debug, Clone, Default)]
pub struct SampleDescription {
    pub fourcc: [u8; 4],
    pub width: u16,
    pub height: u16,
    pub channels: u16,
    pub sample_size: u16,
    pub sample_rate: u32,
    /// 编码配置子 box (avcC, hvcC, dfLa, dOps 等) 的类型与内容
    pub config: Option<([u8; 4], Bytes)>,
    pub esds: Option<EsDescriptor>,
}

/// 单表条目数上限, 防止损坏文件导致巨量分配
const MAX_TABLE_ENTRIES: u32 = 1 << 24;

fn entry_count(io: &mut IoContext, what: &str) -> MdResult<u32> {
    let count = io.read_u32_be()?;
    if count > MAX_TABLE_ENTRIES {
        return Err(MdError::InvalidData(format!("MP4: {what} 条目数过大: {count}")));
    }
    Ok(count)
}

impl SampleTable {
    /// 解析样本表中的一个子 box; 非样本表 box 返回 false
    pub fn parse_box(&mut self, io: &mut IoContext, header: &BoxHeader) -> MdResult<bool> {
        match header.kind {
            boxes::STTS => {
                boxes::read_full_box(io)?;
                let n = entry_count(io, "stts")?;
                self.time_to_sample = (0..n)
                    .map(|_| Ok((io.read_u32_be()?, io.read_u32_be()?)))
                    .collect::<MdResult<_>>()?;
            }
            boxes::STSC => {
                boxes::read_full_box(io)?;
                let n = entry_count(io, "stsc")?;
                self.chunk_runs = (0..n)
                    .map(|_| {
                        let first_chunk = io.read_u32_be()?;
                        let samples_per_chunk = io.read_u32_be()?;
                        let _description_index = io.read_u32_be()?;
                        Ok(ChunkRun {
                            first_chunk,
                            samples_per_chunk,
                        })
                    })
                    .collect::<MdResult<_>>()?;
            }
            boxes::STSZ => {
                boxes::read_full_box(io)?;
                self.uniform_size = io.read_u32_be()?;
                self.sample_count = entry_count(io, "stsz")?;
                if self.uniform_size == 0 {
                    self.sizes = (0..self.sample_count)
                        .map(|_| io.read_u32_be())
                        .collect::<MdResult<_>>()?;
                }
            }
            boxes::STZ2 => {
                boxes::read_full_box(io)?;
                let field_size = io.read_u32_be()? & 0xFF;
                self.sample_count = entry_count(io, "stz2")?;
                self.uniform_size = 0;
                self.sizes = read_compact_sizes(io, field_size, self.sample_count)?;
            }
            boxes::STCO => {
                boxes::read_full_box(io)?;
                let n = entry_count(io, "stco")?;
                self.chunk_offsets = (0..n)
                    .map(|_| io.read_u32_be().map(u64::from))
                    .collect::<MdResult<_>>()?;
            }
            boxes::CO64 => {
                boxes::read_full_box(io)?;
                let n = entry_count(io, "co64")?;
                self.chunk_offsets = (0..n)
                    .map(|_| io.read_u64_be())
                    .collect::<MdResult<_>>()?;
            }
            boxes::STSS => {
                boxes::read_full_box(io)?;
                let n = entry_count(io, "stss")?;
                self.sync_samples = Some(
                    (0..n)
                        .map(|_| io.read_u32_be())
                        .collect::<MdResult<_>>()?,
                );
            }
            boxes::CTTS => {
                let (version, _) = boxes::read_full_box(io)?;
                let n = entry_count(io, "ctts")?;
                self.composition = (0..n)
                    .map(|_| {
                        let count = io.read_u32_be()?;
                        let raw = io.read_u32_be()?;
                        // version 1 为有符号偏移; version 0 实际文件中也常见负值写法
                        let offset = if version == 1 || raw > i32::MAX as u32 {
                            i64::from(raw as i32)
                        } else {
                            i64::from(raw)
                        };
                        Ok((count, offset))
                    })
                    .collect::<MdResult<_>>()?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn sample_size(&self, index: usize) -> u32 {
        if self.uniform_size != 0 {
            self.uniform_size
        } else {
            self.sizes.get(index).copied().unwrap_or(0)
        }
    }

    /// 展开为逐样本索引
    pub fn build_index(&self) -> MdResult<Vec<SampleEntry>> {
        let total = self.sample_count as usize;
        let mut entries = Vec::with_capacity(total);
        if total == 0 {
            return Ok(entries);
        }
        if self.chunk_runs.is_empty() || self.chunk_offsets.is_empty() {
            return Err(MdError::InvalidData("MP4: 样本表缺少 stsc/stco".into()));
        }

        // 块 -> 样本: stsc 的每个条目覆盖到下一个条目的 first_chunk 之前
        let mut run_idx = 0usize;
        'chunks: for (chunk_idx, &chunk_offset) in self.chunk_offsets.iter().enumerate() {
            let chunk_no = chunk_idx as u32 + 1;
            while run_idx + 1 < self.chunk_runs.len()
                && self.chunk_runs[run_idx + 1].first_chunk <= chunk_no
            {
                run_idx += 1;
            }
            let mut offset = chunk_offset;
            for _ in 0..self.chunk_runs[run_idx].samples_per_chunk {
                if entries.len() >= total {
                    break 'chunks;
                }
                let size = self.sample_size(entries.len());
                entries.push(SampleEntry {
                    offset,
                    size,
                    dts: 0,
                    cts_offset: 0,
                    duration: 0,
                    sync: self.sync_samples.is_none(),
                });
                offset += u64::from(size);
            }
        }
        if entries.len() < total {
            log::warn!(
                "MP4: 块表只覆盖 {} / {} 个样本, 截断",
                entries.len(),
                total
            );
        }

        let mut dts = 0u64;
        let mut durations = self
            .time_to_sample
            .iter()
            .flat_map(|&(count, delta)| std::iter::repeat_n(delta, count as usize));
        for entry in &mut entries {
            let delta = durations.next().unwrap_or(0);
            entry.dts = dts;
            entry.duration = delta;
            dts += u64::from(delta);
        }

        let mut offsets = self
            .composition
            .iter()
            .flat_map(|&(count, off)| std::iter::repeat_n(off, count as usize));
        for entry in &mut entries {
            match offsets.next() {
                Some(off) => entry.cts_offset = off,
                None => break,
            }
        }

        if let Some(sync) = &self.sync_samples {
            for &n in sync {
                if let Some(entry) = (n as usize).checked_sub(1).and_then(|i| entries.get_mut(i)) {
                    entry.sync = true;
                }
            }
        }

        Ok(entries)
    }
}

fn read_compact_sizes(io: &mut IoContext, field_size: u32, count: u32) -> MdResult<Vec<u32>> {
    let mut sizes = Vec::with_capacity(count as usize);
    match field_size {
        4 => {
            while sizes.len() < count as usize {
                let b = io.read_u8()?;
                sizes.push(u32::from(b >> 4));
                if sizes.len() < count as usize {
                    sizes.push(u32::from(b & 0x0F));
                }
            }
        }
        8 => {
            for _ in 0..count {
                sizes.push(u32::from(io.read_u8()?));
            }
        }
        16 => {
            for _ in 0..count {
                sizes.push(u32::from(io.read_u16_be()?));
            }
        }
        other => {
            return Err(MdError::InvalidData(format!(
                "MP4: stz2 字段宽度无效: {other}"
            )));
        }
    }
    Ok(sizes)
}

/// 轨道处理类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryLayout {
    Video,
    Audio,
    Other,
}

/// 解析 stsd, 只保留第一个样本描述
pub fn parse_stsd(
    io: &mut IoContext,
    header: &BoxHeader,
    layout: EntryLayout,
) -> MdResult<Option<SampleDescription>> {
    boxes::read_full_box(io)?;
    let count = io.read_u32_be()?;
    if count == 0 {
        return Ok(None);
    }
    let entry = boxes::read_box_header(io, header.end)?;
    let mut desc = SampleDescription {
        fourcc: entry.kind,
        ..Default::default()
    };

    match layout {
        EntryLayout::Video => {
            io.skip(6 + 2 + 16)?;
            desc.width = io.read_u16_be()?;
            desc.height = io.read_u16_be()?;
            // 分辨率、保留、帧数、压缩器名称、深度、预定义
            io.skip(4 + 4 + 4 + 2 + 32 + 2 + 2)?;
        }
        EntryLayout::Audio => {
            io.skip(6 + 2)?;
            let version = io.read_u16_be()?;
            io.skip(6)?;
            desc.channels = io.read_u16_be()?;
            desc.sample_size = io.read_u16_be()?;
            io.skip(4)?;
            desc.sample_rate = io.read_u32_be()? >> 16;
            match version {
                1 => io.skip(16)?,
                2 => {
                    io.skip(4)?;
                    let rate = f64::from_bits(io.read_u64_be()?);
                    desc.sample_rate = rate as u32;
                    desc.channels = io.read_u32_be()? as u16;
                    io.skip(4)?;
                    desc.sample_size = io.read_u32_be()? as u16;
                    io.skip(12)?;
                }
                _ => {}
            }
        }
        EntryLayout::Other => {
            io.seek_to(entry.end)?;
            return Ok(Some(desc));
        }
    }

    // 样本描述内的子 box
    while io.position()? + 8 <= entry.end {
        let child = boxes::read_box_header(io, entry.end)?;
        match &child.kind {
            b"esds" => {
                let payload = io.read_bytes(child.content_size() as usize)?;
                desc.esds = parse_esds(&payload);
            }
            b"avcC" | b"hvcC" | b"dfLa" | b"dOps" | b"d263" | b"damr" => {
                let payload = io.read_bytes(child.content_size() as usize)?;
                if desc.config.is_none() {
                    desc.config = Some((child.kind, Bytes::from(payload)));
                }
            }
            _ => {
                log::trace!("MP4: 跳过样本描述子 box '{}'", child.kind_str());
            }
        }
        io.seek_to(child.end)?;
    }
    io.seek_to(entry.end)?;
    Ok(Some(desc))
}

/// 读取描述符头部 (tag, 长度), 长度为 7 位变长编码
fn read_descriptor(data: &[u8], pos: &mut usize) -> Option<(u8, usize)> {
    let tag = *data.get(*pos)?;
    *pos += 1;
    let mut len = 0usize;
    for _ in 0..4 {
        let b = *data.get(*pos)?;
        *pos += 1;
        len = (len << 7) | usize::from(b & 0x7F);
        if b & 0x80 == 0 {
            break;
        }
    }
    Some((tag, len))
}

/// 解析 esds 内容 (含 full box 头部)
pub fn parse_esds(data: &[u8]) -> Option<EsDescriptor> {
    let mut pos = 4;
    let (tag, _) = read_descriptor(data, &mut pos)?;
    if tag != 0x03 {
        return None;
    }
    pos += 2; // ES_ID
    let flags = *data.get(pos)?;
    pos += 1;
    if flags & 0x80 != 0 {
        pos += 2;
    }
    if flags & 0x40 != 0 {
        pos += 1 + usize::from(*data.get(pos)?);
    }
    if flags & 0x20 != 0 {
        pos += 2;
    }

    let (tag, len) = read_descriptor(data, &mut pos)?;
    if tag != 0x04 {
        return None;
    }
    let config_end = pos + len;
    let mut es = EsDescriptor {
        object_type: *data.get(pos)?,
        decoder_specific: None,
    };
    // objectTypeIndication, streamType, bufferSizeDB, maxBitrate, avgBitrate
    pos += 13;
    if pos < config_end {
        if let Some((0x05, len)) = read_descriptor(data, &mut pos) {
            es.decoder_specific = data.get(pos..pos + len).map(Bytes::copy_from_slice);
        }
    }
    Some(es)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SampleTable {
        SampleTable {
            time_to_sample: vec![(4, 1000)],
            chunk_runs: vec![
                ChunkRun {
                    first_chunk: 1,
                    samples_per_chunk: 3,
                },
                ChunkRun {
                    first_chunk: 2,
                    samples_per_chunk: 1,
                },
            ],
            sizes: vec![10, 20, 30, 40],
            uniform_size: 0,
            sample_count: 4,
            chunk_offsets: vec![100, 500],
            sync_samples: Some(vec![1, 4]),
            composition: vec![(1, 0), (1, 2000), (2, 0)],
        }
    }

    #[test]
    fn test_样本索引_块偏移与大小() {
        let idx = table().build_index().unwrap();
        let offsets: Vec<u64> = idx.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![100, 110, 130, 500]);
        assert_eq!(idx[3].size, 40);
    }

    #[test]
    fn test_样本索引_时间与同步() {
        let idx = table().build_index().unwrap();
        let dts: Vec<u64> = idx.iter().map(|s| s.dts).collect();
        assert_eq!(dts, vec![0, 1000, 2000, 3000]);
        assert_eq!(idx[1].pts(), 3000);
        let sync: Vec<bool> = idx.iter().map(|s| s.sync).collect();
        assert_eq!(sync, vec![true, false, false, true]);
    }

    #[test]
    fn test_样本索引_缺少块表() {
        let mut t = table();
        t.chunk_offsets.clear();
        assert!(t.build_index().is_err());
    }

    #[test]
    fn test_解析_esds() {
        let data = [
            0, 0, 0, 0, // version/flags
            0x03, 0x16, 0x00, 0x01, 0x00, // ES_Descriptor
            0x04, 0x11, 0x40, 0x15, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // DecoderConfig
            0x05, 0x02, 0x12, 0x10, // DecoderSpecificInfo
        ];
        let es = parse_esds(&data).unwrap();
        assert_eq!(es.object_type, 0x40);
        assert_eq!(es.decoder_specific.as_deref(), Some(&[0x12, 0x10][..]));
    }
}
