//! 类型探测.
//!
//! 读取数据源开头的若干字节, 由各探测器给出置信度, 取最高者作为容器类型.

use crate::caps::Caps;
use crate::format_id::FormatId;

/// 探测置信度, 数值越高越可信
pub type ProbeScore = u32;

/// 仅扩展名匹配
pub const SCORE_EXTENSION: ProbeScore = 50;

/// 帧同步字匹配但未连续验证
pub const SCORE_LIKELY: ProbeScore = 75;

/// 魔数完全匹配
pub const SCORE_MAX: ProbeScore = 100;

/// 探测时读取的最大字节数
pub const PROBE_SIZE: usize = 8192;

/// 探测结果
#[derive(Debug, Clone)]
pub struct TypeFindResult {
    /// 识别出的格式
    pub format_id: FormatId,
    /// 置信度
    pub score: ProbeScore,
    /// 向下游宣告的类型描述
    pub caps: Caps,
}

/// 类型探测器 trait
pub trait TypeFind: Send + Sync {
    /// 根据头部数据探测, 不是此格式时返回 None
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore>;

    /// 对应的格式
    fn format_id(&self) -> FormatId;

    /// 识别成功后宣告的类型描述
    fn caps(&self, data: &[u8]) -> Caps;
}

/// 判断文件名扩展名 (不区分大小写)
pub(crate) fn has_extension(filename: Option<&str>, exts: &[&str]) -> bool {
    filename
        .and_then(|f| f.rsplit_once('.'))
        .is_some_and(|(_, ext)| exts.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}
