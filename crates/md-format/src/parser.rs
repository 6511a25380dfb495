//! 解析器接口.
//!
//! 两类解析器:
//! - [`ContainerParser`]: 解析容器头部, 逐个宣告基本流 (pad), 最后发出 "no more pads"
//! - [`FrameParser`]: 无容器的单一音频基本流, 只给出源类型描述, 不宣告 pad

use md_core::{ClockTime, MdResult};

use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::io::IoContext;

/// 解析器宣告的一个基本流
#[derive(Debug, Clone)]
pub struct PadInfo {
    /// 流标识, 如 `video_0`, `audio_1`
    pub name: String,
    /// 类型描述
    pub caps: Caps,
}

/// 接收流宣告的一方
pub trait PadListener {
    /// 发现一个基本流, 返回错误时解析器中止
    fn pad_added(&mut self, pad: PadInfo) -> MdResult<()>;

    /// 所有基本流均已宣告
    fn no_more_pads(&mut self);
}

/// 容器解析器
pub trait ContainerParser: Send {
    /// 解析器名称
    fn name(&self) -> &'static str;

    /// 解析头部, 通过 `pads` 宣告每个基本流并最终调用 `no_more_pads`
    fn open(&mut self, io: &mut IoContext, pads: &mut dyn PadListener) -> MdResult<()>;

    /// 读取下一个样本, 返回 (pad 序号, 样本); 结束时返回 `MdError::Eof`
    fn next_buffer(&mut self, io: &mut IoContext) -> MdResult<(usize, Buffer)>;

    /// 定位到目标时间之前最近的同步样本
    fn seek(&mut self, io: &mut IoContext, target: ClockTime) -> MdResult<()>;

    /// 总时长 (如果可知)
    fn duration(&self) -> Option<ClockTime> {
        None
    }
}

/// 音频帧解析器
pub trait FrameParser: Send {
    /// 解析器名称
    fn name(&self) -> &'static str;

    /// 定位首帧并返回输出类型描述
    fn open(&mut self, io: &mut IoContext) -> MdResult<Caps>;

    /// 读取下一帧; 结束时返回 `MdError::Eof`
    fn next_frame(&mut self, io: &mut IoContext) -> MdResult<Buffer>;

    /// 定位到目标时间所在的帧
    fn seek(&mut self, io: &mut IoContext, target: ClockTime) -> MdResult<()>;
}

/// 解析器类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    Container,
    Frame,
}

/// 已实例化的解析器
pub enum Parser {
    Container(Box<dyn ContainerParser>),
    Frame(Box<dyn FrameParser>),
}

impl Parser {
    pub fn kind(&self) -> ParserKind {
        match self {
            Self::Container(_) => ParserKind::Container,
            Self::Frame(_) => ParserKind::Frame,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Container(p) => p.name(),
            Self::Frame(p) => p.name(),
        }
    }

    /// 读取下一个样本; 帧解析器只有一个流, 序号恒为 0
    pub fn next_buffer(&mut self, io: &mut IoContext) -> MdResult<(usize, Buffer)> {
        match self {
            Self::Container(p) => p.next_buffer(io),
            Self::Frame(p) => p.next_frame(io).map(|b| (0, b)),
        }
    }

    pub fn seek(&mut self, io: &mut IoContext, target: ClockTime) -> MdResult<()> {
        match self {
            Self::Container(p) => p.seek(io, target),
            Self::Frame(p) => p.seek(io, target),
        }
    }
}
