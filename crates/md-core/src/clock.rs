//! 时钟时间.
//!
//! 解析库内部统一使用纳秒精度, 对外 API 以微秒表示.

use std::fmt;

/// 纳秒精度的时钟时间
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u64);

impl ClockTime {
    /// 零时刻
    pub const ZERO: Self = Self(0);

    /// 每秒纳秒数
    pub const SECOND: u64 = 1_000_000_000;

    /// 从纳秒创建
    pub const fn from_nseconds(ns: u64) -> Self {
        Self(ns)
    }

    /// 从微秒创建
    pub const fn from_useconds(us: u64) -> Self {
        Self(us.saturating_mul(1_000))
    }

    /// 从毫秒创建
    pub const fn from_mseconds(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000_000))
    }

    /// 从 `value / timescale` 秒创建 (如 MP4 轨道时间刻度)
    ///
    /// 通过 128 位中间值避免溢出.
    pub fn from_scaled(value: u64, timescale: u32) -> Self {
        if timescale == 0 {
            return Self::ZERO;
        }
        let ns = u128::from(value) * u128::from(Self::SECOND) / u128::from(timescale);
        Self(u64::try_from(ns).unwrap_or(u64::MAX))
    }

    /// 换算回 `timescale` 刻度
    pub fn to_scaled(self, timescale: u32) -> u64 {
        let v = u128::from(self.0) * u128::from(timescale) / u128::from(Self::SECOND);
        u64::try_from(v).unwrap_or(u64::MAX)
    }

    /// 纳秒值
    pub const fn nseconds(self) -> u64 {
        self.0
    }

    /// 微秒值
    pub const fn useconds(self) -> u64 {
        self.0 / 1_000
    }

    /// 加上有符号微秒偏移, 结果下限为 0
    pub fn offset_useconds(self, offset_us: i64) -> Self {
        let delta = offset_us.unsigned_abs().saturating_mul(1_000);
        if offset_us >= 0 {
            Self(self.0.saturating_add(delta))
        } else {
            Self(self.0.saturating_sub(delta))
        }
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0 / Self::SECOND;
        let nanos = self.0 % Self::SECOND;
        write!(
            f,
            "{}:{:02}:{:02}.{:09}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            nanos
        )
    }
}
