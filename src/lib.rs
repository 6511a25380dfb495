//! # mediademux
//!
//! 统一媒体解封装器: 识别输入的容器格式, 发现其中的音频/视频/字幕轨道,
//! 并按轨道拉取尚未解码的样本, 支持 seek.
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use mediademux::{Demuxer, DemuxerConfig};
//!
//! # fn main() -> mediademux::core::MdResult<()> {
//! let demuxer = Demuxer::with_config(DemuxerConfig::default())?;
//! demuxer.set_data_source("/path/to/movie.mp4")?;
//! demuxer.prepare()?;
//! for index in 0..demuxer.track_count()? {
//!     println!("轨道 {index}: {:?}", demuxer.track_info(index)?.mime());
//! }
//! demuxer.select_track(0)?;
//! demuxer.start()?;
//! while let Some(packet) = demuxer.read_sample(0)? {
//!     println!("pts={:?} size={}", packet.pts, packet.size());
//! }
//! demuxer.stop()?;
//! demuxer.unprepare()?;
//! demuxer.destroy()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `md-core` | 错误类型、媒体类型、时间 |
//! | `md-media` | 轨道格式与样本数据包 |
//! | `md-format` | 字节源、类型探测、容器解析器、轨道接收器 |

pub mod config;
pub mod logging;
pub mod port;
pub mod session;

/// 核心类型
pub use md_core as core;

/// 格式与数据包
pub use md_media as media;

/// 容器解析库
pub use md_format as format;

pub use config::DemuxerConfig;
pub use md_core::{ErrorCode, MdError, MdResult};
pub use md_media::{MediaFormat, MediaPacket};
pub use port::{DemuxerPort, PortKind, PortRegistry};
pub use session::{Demuxer, DemuxerState};

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置后端的注册表
pub fn default_port_registry() -> PortRegistry {
    let mut registry = PortRegistry::new();
    port::register_all(&mut registry);
    registry
}
