//! 内置解析器.
//!
//! 容器: MP4, FLV, Ogg. 无容器音频流: AAC ADTS, MPEG 音频, AMR.

pub mod adts;
pub mod amr;
pub mod flv;
pub mod mp4;
pub mod mpa;
pub mod ogg;

use md_core::{MdError, MdResult};

use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::registry::ParserRegistry;

/// 注册所有内置解析器与探测器
pub fn register_all(registry: &mut ParserRegistry) {
    registry.register_container(FormatId::Mp4, "qtdemux", mp4::Mp4Parser::create);
    registry.register_container(FormatId::Flv, "flvdemux", flv::FlvParser::create);
    registry.register_container(FormatId::Ogg, "oggdemux", ogg::OggParser::create);

    registry.register_frame(FormatId::Adts, "aacparse", adts::AdtsParser::create);
    registry.register_frame(FormatId::MpegAudio, "mpegaudioparse", mpa::MpaParser::create);
    registry.register_frame(FormatId::Id3, "mpegaudioparse", mpa::MpaParser::create);
    registry.register_frame(FormatId::AmrNb, "amrparse", amr::AmrParser::create_nb);
    registry.register_frame(FormatId::AmrWb, "amrparse", amr::AmrParser::create_wb);

    registry.register_probe(Box::new(mp4::Mp4Probe));
    registry.register_probe(Box::new(flv::FlvProbe));
    registry.register_probe(Box::new(ogg::OggProbe));
    registry.register_probe(Box::new(adts::AdtsProbe));
    registry.register_probe(Box::new(mpa::MpaProbe));
    registry.register_probe(Box::new(mpa::Id3Probe));
    registry.register_probe(Box::new(amr::AmrProbe::NARROW));
    registry.register_probe(Box::new(amr::AmrProbe::WIDE));
}

/// ID3v2 标签总长度 (含 10 字节头部); 不是 ID3v2 时返回 None
pub(crate) fn id3v2_size(data: &[u8]) -> Option<u64> {
    if data.len() < 10 || &data[..3] != b"ID3" {
        return None;
    }
    // syncsafe 整数, 每字节只用低 7 位
    let size = data[6..10]
        .iter()
        .fold(0u64, |acc, &b| (acc << 7) | u64::from(b & 0x7F));
    // footer 标志
    let footer = if data[5] & 0x10 != 0 { 10 } else { 0 };
    Some(10 + size + footer)
}

/// 跳过开头的 ID3v2 标签, 返回音频数据起始偏移
pub(crate) fn skip_id3v2(io: &mut IoContext) -> MdResult<u64> {
    io.seek_to(0)?;
    let head = io.read_up_to(10)?;
    let start = match id3v2_size(&head) {
        Some(size) => {
            log::debug!("跳过 ID3v2 标签, 大小={} 字节", size);
            size
        }
        None => 0,
    };
    io.seek_to(start)?;
    Ok(start)
}

/// 从当前位置向后搜索帧头
///
/// `frame_len` 对合法帧头返回整帧长度. 窗口内能看到下一帧时要求下一帧同样合法.
/// 找到时定位到帧头并返回其偏移.
pub(crate) fn find_sync(
    io: &mut IoContext,
    max_search: usize,
    frame_len: impl Fn(&[u8]) -> Option<usize>,
) -> MdResult<Option<u64>> {
    let start = io.position()?;
    let window = io.read_up_to(max_search)?;
    for i in 0..window.len() {
        let Some(len) = frame_len(&window[i..]) else {
            continue;
        };
        let next = i + len;
        let confirmed = match window.get(next..) {
            Some(rest) if !rest.is_empty() => frame_len(rest).is_some(),
            _ => true,
        };
        if confirmed {
            let offset = start + i as u64;
            io.seek_to(offset)?;
            return Ok(Some(offset));
        }
    }
    io.seek_to(start)?;
    Ok(None)
}

/// 从数据起点逐帧前进 `frames` 帧, 返回实际越过的帧数
///
/// `frame_len` 读取当前位置的帧头并返回整帧长度, 帧头无效时返回 None.
pub(crate) fn seek_frames(
    io: &mut IoContext,
    data_start: u64,
    frames: u64,
    mut frame_len: impl FnMut(&mut IoContext) -> MdResult<Option<u64>>,
) -> MdResult<u64> {
    if !io.is_seekable() {
        return Err(MdError::SeekFailed("数据源不支持随机访问".into()));
    }
    io.seek_to(data_start)?;
    let mut pos = data_start;
    let mut passed = 0;
    while passed < frames {
        match frame_len(io) {
            Ok(Some(len)) => {
                let consumed = io.position()? - pos;
                io.skip(len.saturating_sub(consumed) as usize)?;
                pos += len;
                passed += 1;
            }
            Ok(None) | Err(MdError::Eof) => break,
            Err(e) => return Err(e),
        }
    }
    io.seek_to(pos)?;
    Ok(passed)
}
