//! 解析器产出的样本缓冲.

use bitflags::bitflags;
use bytes::Bytes;
use md_core::ClockTime;

bitflags! {
    /// 缓冲标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferFlags: u32 {
        /// 非同步样本 (依赖前面的样本才能解码)
        const DELTA_UNIT = 1 << 0;
        /// 负载为流头部/编码配置
        const HEADER = 1 << 1;
        /// 与前一个缓冲不连续
        const DISCONT = 1 << 2;
    }
}

/// 单个基本流样本
#[derive(Debug, Clone)]
pub struct Buffer {
    /// 负载
    pub data: Bytes,
    /// 显示时间
    pub pts: Option<ClockTime>,
    /// 解码时间
    pub dts: Option<ClockTime>,
    /// 时长
    pub duration: Option<ClockTime>,
    /// 标志
    pub flags: BufferFlags,
}

impl Buffer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: None,
            dts: None,
            duration: None,
            flags: BufferFlags::empty(),
        }
    }

    pub fn with_timing(
        mut self,
        pts: Option<ClockTime>,
        dts: Option<ClockTime>,
        duration: Option<ClockTime>,
    ) -> Self {
        self.pts = pts;
        self.dts = dts;
        self.duration = duration;
        self
    }

    pub fn with_flags(mut self, flags: BufferFlags) -> Self {
        self.flags = flags;
        self
    }

    /// 是否为同步样本
    pub fn is_sync(&self) -> bool {
        !self.flags.contains(BufferFlags::DELTA_UNIT)
    }
}
