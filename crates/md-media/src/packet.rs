//! 样本数据包.
//!
//! 每次成功的 `read_sample` 都会生成一个新的 [`MediaPacket`], 所有权交给调用方,
//! 调用方丢弃 (drop) 即释放.

use bitflags::bitflags;
use bytes::Bytes;

use crate::format::MediaFormat;

bitflags! {
    /// 样本标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PacketFlags: u32 {
        /// 同步样本 (关键帧), 可从此处开始解码
        const SYNC = 1 << 0;
        /// 负载本身是编码配置数据
        const CODEC_CONFIG = 1 << 1;
        /// 与前一个样本之间存在不连续 (如 seek 之后)
        const DISCONT = 1 << 2;
    }
}

/// 单个基本流样本
#[derive(Debug, Clone)]
pub struct MediaPacket {
    /// 负载数据 (仍为编码数据)
    pub data: Bytes,
    /// 显示时间戳 (微秒)
    pub pts: Option<u64>,
    /// 解码时间戳 (微秒)
    pub dts: Option<u64>,
    /// 时长 (微秒)
    pub duration: Option<u64>,
    /// 标志
    pub flags: PacketFlags,
    /// 附带的编码配置数据 (如 avcC / AudioSpecificConfig)
    pub codec_data: Option<Bytes>,
    /// 所属轨道的格式
    pub format: MediaFormat,
}

impl MediaPacket {
    /// 从负载创建, 时间戳未定义
    pub fn new(format: MediaFormat, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: None,
            dts: None,
            duration: None,
            flags: PacketFlags::empty(),
            codec_data: None,
            format,
        }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否为同步样本
    pub fn is_sync(&self) -> bool {
        self.flags.contains(PacketFlags::SYNC)
    }
}
