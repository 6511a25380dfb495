//! 解析器注册表.
//!
//! 管理类型探测器与解析器工厂, 支持按格式创建解析器和自动探测.

use std::collections::HashMap;

use md_core::{MdError, MdResult};

use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::parser::{ContainerParser, FrameParser, Parser, ParserKind};
use crate::typefind::{PROBE_SIZE, TypeFind, TypeFindResult};

/// 容器解析器工厂函数
pub type ContainerFactory = fn() -> MdResult<Box<dyn ContainerParser>>;

/// 帧解析器工厂函数
pub type FrameFactory = fn() -> MdResult<Box<dyn FrameParser>>;

/// 工厂
#[derive(Clone, Copy)]
enum ParserFactory {
    Container(ContainerFactory),
    Frame(FrameFactory),
}

/// 注册条目
struct ParserEntry {
    name: String,
    factory: ParserFactory,
}

/// 解析器注册表
pub struct ParserRegistry {
    parsers: HashMap<FormatId, ParserEntry>,
    probes: Vec<Box<dyn TypeFind>>,
}

impl ParserRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
            probes: Vec::new(),
        }
    }

    /// 注册容器解析器
    pub fn register_container(
        &mut self,
        format_id: FormatId,
        name: impl Into<String>,
        factory: ContainerFactory,
    ) {
        self.parsers.insert(
            format_id,
            ParserEntry {
                name: name.into(),
                factory: ParserFactory::Container(factory),
            },
        );
    }

    /// 注册帧解析器
    pub fn register_frame(
        &mut self,
        format_id: FormatId,
        name: impl Into<String>,
        factory: FrameFactory,
    ) {
        self.parsers.insert(
            format_id,
            ParserEntry {
                name: name.into(),
                factory: ParserFactory::Frame(factory),
            },
        );
    }

    /// 注册类型探测器
    pub fn register_probe(&mut self, probe: Box<dyn TypeFind>) {
        self.probes.push(probe);
    }

    /// 格式对应的解析器类别
    pub fn parser_kind(&self, format_id: FormatId) -> Option<ParserKind> {
        self.parsers.get(&format_id).map(|e| match e.factory {
            ParserFactory::Container(_) => ParserKind::Container,
            ParserFactory::Frame(_) => ParserKind::Frame,
        })
    }

    /// 创建指定格式的解析器
    pub fn create(&self, format_id: FormatId) -> MdResult<Parser> {
        let entry = self
            .parsers
            .get(&format_id)
            .ok_or_else(|| MdError::NotSupported(format!("未找到 {} 的解析器", format_id)))?;
        log::debug!("创建解析器: {} ({})", entry.name, format_id);
        match entry.factory {
            ParserFactory::Container(f) => f().map(Parser::Container),
            ParserFactory::Frame(f) => f().map(Parser::Frame),
        }
    }

    /// 探测数据的格式
    ///
    /// 取置信度最高的结果; 同分时容器格式优先于无容器音频流.
    pub fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<TypeFindResult> {
        let mut best: Option<(TypeFindResult, bool)> = None;
        for probe in &self.probes {
            let Some(score) = probe.probe(data, filename) else {
                continue;
            };
            let format_id = probe.format_id();
            let is_container = format_id.is_container();
            let is_better = best.as_ref().is_none_or(|(b, b_container)| {
                score > b.score || (score == b.score && is_container && !b_container)
            });
            if is_better {
                best = Some((
                    TypeFindResult {
                        format_id,
                        score,
                        caps: probe.caps(data),
                    },
                    is_container,
                ));
            }
        }
        best.map(|(r, _)| r)
    }

    /// 探测输入数据源, 完成后定位回起点
    pub fn probe_input(
        &self,
        io: &mut IoContext,
        filename: Option<&str>,
    ) -> MdResult<TypeFindResult> {
        let probe_buf = io.read_up_to(PROBE_SIZE)?;
        io.seek_to(0)?;

        self.probe(&probe_buf, filename)
            .ok_or_else(|| MdError::NotSupported("无法识别输入数据的格式".to_string()))
    }

    /// 已注册的解析器列表
    pub fn list_parsers(&self) -> Vec<(FormatId, &str)> {
        self.parsers
            .iter()
            .map(|(id, entry)| (*id, entry.name.as_str()))
            .collect()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
