//! 后端注册表.

use std::collections::HashMap;

use md_core::{MdError, MdResult};

use super::{DemuxerPort, PortKind};
use crate::config::DemuxerConfig;

/// 后端工厂函数
pub type PortFactory = fn(&DemuxerConfig) -> MdResult<Box<dyn DemuxerPort>>;

struct PortEntry {
    name: String,
    factory: PortFactory,
}

/// 后端注册表
pub struct PortRegistry {
    ports: HashMap<PortKind, PortEntry>,
}

impl PortRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            ports: HashMap::new(),
        }
    }

    /// 注册后端, 同一标识后注册的覆盖先注册的
    pub fn register(&mut self, kind: PortKind, name: impl Into<String>, factory: PortFactory) {
        self.ports.insert(
            kind,
            PortEntry {
                name: name.into(),
                factory,
            },
        );
    }

    /// 创建后端实例
    pub fn create(&self, kind: PortKind, config: &DemuxerConfig) -> MdResult<Box<dyn DemuxerPort>> {
        let entry = self
            .ports
            .get(&kind)
            .ok_or_else(|| MdError::NotSupported(format!("未注册的后端: {kind}")))?;
        log::debug!("创建后端: {} ({})", entry.name, kind);
        (entry.factory)(config)
    }

    /// 已注册的后端列表
    pub fn list_ports(&self) -> Vec<(PortKind, &str)> {
        self.ports
            .iter()
            .map(|(kind, entry)| (*kind, entry.name.as_str()))
            .collect()
    }
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new()
    }
}
