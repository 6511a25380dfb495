//! # md-format
//!
//! 容器解析库, 为解封装后端提供基础原语:
//!
//! - [`io::IoContext`]: 统一字节源 (文件、内存、HTTP)
//! - [`typefind`]: 根据头部数据识别容器类型
//! - [`parser`]: 容器解析器 (宣告多个 pad) 与音频帧解析器 (单一流)
//! - [`sink::AppSink`]: 单轨道有界样本缓冲
//!
//! 解析器只负责拆分样本与描述流, 不解码负载.

pub mod buffer;
pub mod caps;
pub mod format_id;
pub mod io;
pub mod parser;
pub mod parsers;
pub mod registry;
pub mod sink;
pub mod typefind;

pub use buffer::{Buffer, BufferFlags};
pub use caps::{Caps, CapsValue};
pub use format_id::FormatId;
pub use io::IoContext;
pub use parser::{ContainerParser, FrameParser, PadInfo, PadListener, Parser, ParserKind};
pub use registry::ParserRegistry;
pub use sink::{AppSink, PullResult, PushResult};
pub use typefind::{TypeFind, TypeFindResult};

/// 创建已注册所有内置解析器与探测器的注册表
pub fn default_registry() -> ParserRegistry {
    let mut registry = ParserRegistry::new();
    parsers::register_all(&mut registry);
    registry
}
