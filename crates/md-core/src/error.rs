//! 统一错误类型定义.
//!
//! 会话、端口、后端与容器解析库共用同一错误类型, 错误逐层原样向上传递.

use std::fmt;

use thiserror::Error;

/// mediademux 统一错误类型
#[derive(Debug, Error)]
pub enum MdError {
    /// 无效参数 (越界索引、空数据源、重复注册回调等)
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 当前状态下不允许该操作
    #[error("无效状态: {0}")]
    InvalidState(String),

    /// 操作与当前资源状况不符 (如读取未选中的轨道)
    #[error("无效操作: {0}")]
    InvalidOperation(String),

    /// 数据源路径无效
    #[error("无效路径: {0}")]
    InvalidPath(String),

    /// 本地文件不存在或长度为 0
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    /// 资源耗尽
    #[error("内存分配失败: {0}")]
    OutOfMemory(String),

    /// 不支持 (未识别的容器、未实现的后端)
    #[error("不支持的操作: {0}")]
    NotSupported(String),

    /// seek 失败
    #[error("seek 失败: {0}")]
    SeekFailed(String),

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 已到达流末尾 (仅在解析库内部使用)
    #[error("已到达流末尾")]
    Eof,

    /// 后端内部错误 (图构建、链接、状态切换、发现超时)
    #[error("内部错误: {0}")]
    Internal(String),
}

impl MdError {
    /// 映射到对外公开的封闭错误码
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidParameter,
            Self::InvalidState(_) => ErrorCode::InvalidState,
            Self::InvalidOperation(_) => ErrorCode::InvalidOperation,
            Self::InvalidPath(_) | Self::FileNotFound(_) => ErrorCode::InvalidPath,
            Self::OutOfMemory(_) => ErrorCode::OutOfMemory,
            Self::NotSupported(_) => ErrorCode::NotSupported,
            Self::SeekFailed(_) => ErrorCode::SeekFailed,
            Self::InvalidData(_) | Self::Io(_) | Self::Eof | Self::Internal(_) => {
                ErrorCode::Internal
            }
        }
    }
}

/// 公开错误码
///
/// 调用方只能看到这一组封闭取值, `MdError` 携带的文本仅用于日志.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// 无效参数
    InvalidParameter,
    /// 无效状态
    InvalidState,
    /// 无效操作
    InvalidOperation,
    /// 无效或不可访问的路径
    InvalidPath,
    /// 内存不足
    OutOfMemory,
    /// 不支持
    NotSupported,
    /// seek 失败
    SeekFailed,
    /// 后端内部错误
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidParameter => "INVALID_PARAMETER",
            Self::InvalidState => "INVALID_STATE",
            Self::InvalidOperation => "INVALID_OPERATION",
            Self::InvalidPath => "INVALID_PATH",
            Self::OutOfMemory => "OUT_OF_MEMORY",
            Self::NotSupported => "NOT_SUPPORTED",
            Self::SeekFailed => "SEEK_FAILED",
            Self::Internal => "INTERNAL",
        };
        write!(f, "{name}")
    }
}

/// mediademux 统一 Result 类型
pub type MdResult<T> = Result<T, MdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_错误码映射() {
        assert_eq!(
            MdError::FileNotFound("a.mp4".into()).code(),
            ErrorCode::InvalidPath
        );
        assert_eq!(MdError::Eof.code(), ErrorCode::Internal);
        assert_eq!(
            MdError::InvalidArgument("x".into()).code(),
            ErrorCode::InvalidParameter
        );
        assert_eq!(ErrorCode::InvalidState.to_string(), "INVALID_STATE");
    }

    #[test]
    fn test_io_错误自动转换() {
        fn open() -> MdResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "x"))?;
            Ok(())
        }
        assert!(matches!(open(), Err(MdError::Io(_))));
    }
}
