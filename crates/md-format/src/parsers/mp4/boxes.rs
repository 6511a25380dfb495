//! Box (Atom) 头部读取.
//!
//! ```text
//! Size:       4 bytes (big-endian, 含头部本身)
//! Type:       4 bytes (FourCC)
//! [ExtSize]:  8 bytes (仅当 Size==1 时存在)
//! ```
//!
//! Size 为 0 表示 box 延伸到文件末尾.

use md_core::{MdError, MdResult};

use crate::io::IoContext;

pub const FTYP: [u8; 4] = *b"ftyp";
pub const MOOV: [u8; 4] = *b"moov";
pub const MVHD: [u8; 4] = *b"mvhd";
pub const TRAK: [u8; 4] = *b"trak";
pub const TKHD: [u8; 4] = *b"tkhd";
pub const MDIA: [u8; 4] = *b"mdia";
pub const MDHD: [u8; 4] = *b"mdhd";
pub const HDLR: [u8; 4] = *b"hdlr";
pub const MINF: [u8; 4] = *b"minf";
pub const STBL: [u8; 4] = *b"stbl";
pub const STSD: [u8; 4] = *b"stsd";
pub const STTS: [u8; 4] = *b"stts";
pub const STSC: [u8; 4] = *b"stsc";
pub const STSZ: [u8; 4] = *b"stsz";
pub const STZ2: [u8; 4] = *b"stz2";
pub const STCO: [u8; 4] = *b"stco";
pub const CO64: [u8; 4] = *b"co64";
pub const STSS: [u8; 4] = *b"stss";
pub const CTTS: [u8; 4] = *b"ctts";
pub const MDAT: [u8; 4] = *b"mdat";

/// 已读取的 box 头部
#[derive(Debug, Clone, Copy)]
pub struct BoxHeader {
    /// FourCC
    pub kind: [u8; 4],
    /// 内容起始偏移
    pub content_start: u64,
    /// box 结束偏移 (不含), 大小为 0 时由调用方给出的上限决定
    pub end: u64,
}

impl BoxHeader {
    pub fn content_size(&self) -> u64 {
        self.end.saturating_sub(self.content_start)
    }

    /// FourCC 文本, 用于日志
    pub fn kind_str(&self) -> String {
        String::from_utf8_lossy(&self.kind).into_owned()
    }
}

/// 读取一个 box 头部
///
/// `limit` 为所在父容器的结束偏移, 用于处理 size==0 的情形与越界检查.
pub fn read_box_header(io: &mut IoContext, limit: u64) -> MdResult<BoxHeader> {
    let start = io.position()?;
    let size32 = io.read_u32_be()?;
    let kind = io.read_tag()?;

    let (size, header_size) = match size32 {
        1 => (io.read_u64_be()?, 16u64),
        0 => (limit.saturating_sub(start), 8u64),
        n => (u64::from(n), 8u64),
    };
    if size < header_size {
        return Err(MdError::InvalidData(format!(
            "MP4: box '{}' 大小无效: {}",
            String::from_utf8_lossy(&kind),
            size
        )));
    }

    Ok(BoxHeader {
        kind,
        content_start: start + header_size,
        end: (start + size).min(limit),
    })
}

/// 读取 full box 的 version 与 flags
pub fn read_full_box(io: &mut IoContext) -> MdResult<(u8, u32)> {
    let v = io.read_u32_be()?;
    Ok(((v >> 24) as u8, v & 0x00FF_FFFF))
}
