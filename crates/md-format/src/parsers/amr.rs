//! AMR 存储格式解析器 (RFC 4867 §5).
//!
//! ```text
//! "#!AMR\n" 或 "#!AMR-WB\n"
//! [帧头 1 字节: P(1) FT(4) Q(1) P(2)] [语音数据] ...
//! ```
//!
//! 每帧 20ms, 输出的帧包含帧头字节.

use md_core::{ClockTime, MdError, MdResult};

use super::seek_frames;
use crate::buffer::{Buffer, BufferFlags};
use crate::caps::Caps;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::parser::FrameParser;
use crate::typefind::{ProbeScore, SCORE_EXTENSION, SCORE_MAX, TypeFind, has_extension};

const MAGIC_NB: &[u8] = b"#!AMR\n";
const MAGIC_WB: &[u8] = b"#!AMR-WB\n";

/// 各帧类型的语音数据字节数 (不含帧头), None 为保留类型
const FRAME_SIZES_NB: [Option<u8>; 16] = [
    Some(12),
    Some(13),
    Some(15),
    Some(17),
    Some(19),
    Some(20),
    Some(26),
    Some(31),
    Some(5),
    None,
    None,
    None,
    None,
    None,
    None,
    Some(0),
];

const FRAME_SIZES_WB: [Option<u8>; 16] = [
    Some(17),
    Some(23),
    Some(32),
    Some(36),
    Some(40),
    Some(46),
    Some(50),
    Some(58),
    Some(60),
    Some(5),
    None,
    None,
    None,
    None,
    Some(0),
    Some(0),
];

/// 每帧时长
const FRAME_DURATION: ClockTime = ClockTime::from_mseconds(20);

/// AMR 变体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Narrow,
    Wide,
}

impl Band {
    fn magic(self) -> &'static [u8] {
        match self {
            Self::Narrow => MAGIC_NB,
            Self::Wide => MAGIC_WB,
        }
    }

    fn sample_rate(self) -> u32 {
        match self {
            Self::Narrow => 8000,
            Self::Wide => 16000,
        }
    }

    /// 含帧头的整帧长度
    fn frame_len(self, toc: u8) -> Option<usize> {
        if toc & 0x83 != 0 {
            return None;
        }
        let table = match self {
            Self::Narrow => &FRAME_SIZES_NB,
            Self::Wide => &FRAME_SIZES_WB,
        };
        table[usize::from((toc >> 3) & 0x0F)].map(|n| usize::from(n) + 1)
    }
}

/// AMR 帧解析器
pub struct AmrParser {
    band: Band,
    data_start: u64,
    frames: u64,
    discont: bool,
}

impl AmrParser {
    fn create(band: Band) -> MdResult<Box<dyn FrameParser>> {
        Ok(Box::new(Self {
            band,
            data_start: 0,
            frames: 0,
            discont: false,
        }))
    }

    /// 窄带实例 (工厂函数)
    pub fn create_nb() -> MdResult<Box<dyn FrameParser>> {
        Self::create(Band::Narrow)
    }

    /// 宽带实例 (工厂函数)
    pub fn create_wb() -> MdResult<Box<dyn FrameParser>> {
        Self::create(Band::Wide)
    }
}

impl FrameParser for AmrParser {
    fn name(&self) -> &'static str {
        "amrparse"
    }

    fn open(&mut self, io: &mut IoContext) -> MdResult<Caps> {
        io.seek_to(0)?;
        let magic = self.band.magic();
        let head = io.read_bytes(magic.len())?;
        if head != magic {
            return Err(MdError::InvalidData("AMR: 文件头不匹配".into()));
        }
        self.data_start = magic.len() as u64;
        let name = match self.band {
            Band::Narrow => "audio/AMR",
            Band::Wide => "audio/AMR-WB",
        };
        log::debug!("AMR: {} 数据起始={}", name, self.data_start);
        Ok(Caps::new(name)
            .with_int("channels", 1)
            .with_int("rate", i64::from(self.band.sample_rate())))
    }

    fn next_frame(&mut self, io: &mut IoContext) -> MdResult<Buffer> {
        let toc = io.read_u8()?;
        let len = self.band.frame_len(toc).ok_or_else(|| {
            MdError::InvalidData(format!("AMR: 无效帧头 0x{toc:02x}"))
        })?;
        let mut data = Vec::with_capacity(len);
        data.push(toc);
        data.extend(io.read_bytes(len - 1)?);

        let pts = ClockTime::from_nseconds(self.frames * FRAME_DURATION.nseconds());
        self.frames += 1;
        let mut buffer = Buffer::new(data).with_timing(Some(pts), Some(pts), Some(FRAME_DURATION));
        if std::mem::take(&mut self.discont) {
            buffer.flags |= BufferFlags::DISCONT;
        }
        Ok(buffer)
    }

    fn seek(&mut self, io: &mut IoContext, target: ClockTime) -> MdResult<()> {
        let band = self.band;
        let wanted = target.nseconds() / FRAME_DURATION.nseconds();
        self.frames = seek_frames(io, self.data_start, wanted, |io| {
            Ok(band.frame_len(io.read_u8()?).map(|n| n as u64))
        })?;
        self.discont = true;
        Ok(())
    }
}

/// AMR 探测器, 窄带与宽带各一个实例
pub struct AmrProbe {
    band: Band,
}

impl AmrProbe {
    pub const NARROW: Self = Self { band: Band::Narrow };
    pub const WIDE: Self = Self { band: Band::Wide };
}

impl TypeFind for AmrProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        if data.starts_with(self.band.magic()) {
            return Some(SCORE_MAX);
        }
        let ext = match self.band {
            Band::Narrow => "amr",
            Band::Wide => "awb",
        };
        has_extension(filename, &[ext]).then_some(SCORE_EXTENSION)
    }

    fn format_id(&self) -> FormatId {
        match self.band {
            Band::Narrow => FormatId::AmrNb,
            Band::Wide => FormatId::AmrWb,
        }
    }

    fn caps(&self, _data: &[u8]) -> Caps {
        Caps::new(match self.band {
            Band::Narrow => "audio/x-amr-nb-sh",
            Band::Wide => "audio/x-amr-wb-sh",
        })
    }
}
