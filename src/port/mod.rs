//! 后端端口.
//!
//! 会话只通过 [`DemuxerPort`] 调用后端, 具体实现由 [`PortRegistry`] 按配置创建.

pub mod pipeline;
pub mod registry;
pub mod unsupported;

use std::fmt;
use std::sync::Arc;

use md_core::{MdError, MdResult};
use md_media::{MediaFormat, MediaPacket};
use serde::{Deserialize, Serialize};

pub use self::registry::{PortFactory, PortRegistry};

/// 异步错误回调, 在总线线程上调用
pub type ErrorCallback = Arc<dyn Fn(&MdError) + Send + Sync>;

/// 流结束回调, 参数为到达结束的轨道序号
pub type EosCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// 后端标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PortKind {
    /// 解析图后端
    #[default]
    #[serde(rename = "GST_PORT")]
    Pipeline,
    /// FFmpeg 后端 (未实现)
    #[serde(rename = "FFMPEG_PORT")]
    Ffmpeg,
    /// 自定义后端 (未实现)
    #[serde(rename = "CUSTOM_PORT")]
    Custom,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pipeline => "GST_PORT",
            Self::Ffmpeg => "FFMPEG_PORT",
            Self::Custom => "CUSTOM_PORT",
        };
        write!(f, "{name}")
    }
}

/// 后端操作集合
///
/// 状态校验由会话负责, 后端只校验参数与自身资源.
pub trait DemuxerPort: Send + Sync {
    /// 后端名称
    fn name(&self) -> &'static str;

    /// 设置数据源并完成轨道发现
    fn prepare(&mut self, uri: &str) -> MdResult<()>;

    fn track_count(&self) -> MdResult<usize>;

    fn select_track(&self, index: usize) -> MdResult<()>;

    fn unselect_track(&self, index: usize) -> MdResult<()>;

    /// 开始输出样本
    fn start(&mut self) -> MdResult<()>;

    fn track_info(&self, index: usize) -> MdResult<MediaFormat>;

    /// 读取一个样本, 到达流末尾时返回 `Ok(None)`
    fn read_sample(&self, index: usize) -> MdResult<Option<MediaPacket>>;

    /// 相对当前位置定位 (微秒)
    fn seek(&self, offset_us: i64) -> MdResult<()>;

    fn stop(&mut self) -> MdResult<()>;

    /// 释放解析图与轨道
    fn unprepare(&mut self) -> MdResult<()>;

    fn destroy(&mut self) -> MdResult<()>;

    fn set_error_cb(&mut self, callback: ErrorCallback) -> MdResult<()>;

    fn unset_error_cb(&mut self) -> MdResult<()>;

    fn set_eos_cb(&mut self, callback: EosCallback) -> MdResult<()>;

    fn unset_eos_cb(&mut self) -> MdResult<()>;
}

/// 注册所有内置后端
pub fn register_all(registry: &mut PortRegistry) {
    registry.register(PortKind::Pipeline, "pipeline", pipeline::PipelinePort::create);
    registry.register(PortKind::Ffmpeg, "ffmpeg", unsupported::UnsupportedPort::create_ffmpeg);
    registry.register(PortKind::Custom, "custom", unsupported::UnsupportedPort::create_custom);
}
