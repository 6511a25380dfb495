//! 解封装器配置.
//!
//! JSON 格式, 所有字段可省略:
//! ```json
//! { "port": "GST_PORT", "discovery_timeout_ms": 5000, "sink_capacity": 100 }
//! ```

use std::path::Path;
use std::time::Duration;

use md_core::{MdError, MdResult};
use serde::{Deserialize, Serialize};

use crate::port::PortKind;

/// 配置文件路径的环境变量
pub const CONFIG_ENV: &str = "MEDIADEMUX_CONFIG";

/// 选中轨道的默认接收器容量
pub const MAX_SINK_BUFFERS: usize = 100;

/// 默认发现超时 (毫秒)
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 5000;

/// 解封装器配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DemuxerConfig {
    /// 后端
    pub port: PortKind,
    /// 等待轨道发现完成的时间
    pub discovery_timeout_ms: u64,
    /// 选中轨道的接收器容量, 0 表示不限
    pub sink_capacity: usize,
}

impl Default for DemuxerConfig {
    fn default() -> Self {
        Self {
            port: PortKind::Pipeline,
            discovery_timeout_ms: DEFAULT_DISCOVERY_TIMEOUT_MS,
            sink_capacity: MAX_SINK_BUFFERS,
        }
    }
}

impl DemuxerConfig {
    /// 解析 JSON 文本
    pub fn from_json(text: &str) -> MdResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| MdError::InvalidArgument(format!("配置格式错误: {e}")))
    }

    /// 从文件加载, 文件缺失或格式错误时使用默认配置
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("配置文件不存在, 使用默认配置: {}", path.display());
                return Self::default();
            }
            Err(e) => {
                log::warn!("读取配置文件失败, 使用默认配置: {}: {}", path.display(), e);
                return Self::default();
            }
        };
        match Self::from_json(&text) {
            Ok(config) => {
                log::info!("已加载配置 {}: 后端 {}", path.display(), config.port);
                config
            }
            Err(e) => {
                log::warn!("{}: {}, 使用默认配置", path.display(), e);
                Self::default()
            }
        }
    }

    /// 按环境变量 `MEDIADEMUX_CONFIG` 指定的路径加载
    pub fn from_env() -> Self {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(path),
            None => Self::default(),
        }
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}
