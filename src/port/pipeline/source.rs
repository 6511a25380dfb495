//! 数据源定位符分类.
//!
//! 本地路径会被检查存在性与长度, 并统一改写为 `file://` 形式.

use std::fmt;
use std::path::Path;

use md_core::{MdError, MdResult};

const FILE_SCHEME: &str = "file://";

/// 数据源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// 本地文件
    File,
    /// HTTP/HTTPS 渐进下载
    Http,
    /// RTSP 流 (含本地 SDP 描述文件)
    Rtsp,
    /// Wi-Fi Display (RTSP 地址中含 `/wfd1.0/`)
    Wfd,
    /// Smooth Streaming 清单
    SmoothStreaming,
    /// 无法识别的定位符
    Unknown,
}

impl SourceKind {
    /// 源元素名称
    pub const fn element_name(self) -> &'static str {
        match self {
            Self::File => "filesrc",
            Self::Http => "httpsrc",
            Self::Rtsp => "rtspsrc",
            Self::Wfd => "wfdrtspsrc",
            Self::SmoothStreaming => "mssdemux",
            Self::Unknown => "unknownsrc",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::File => "file",
            Self::Http => "http",
            Self::Rtsp => "rtsp",
            Self::Wfd => "wfd",
            Self::SmoothStreaming => "smooth-streaming",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// 分类后的数据源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub kind: SourceKind,
    /// 规范化后的定位符 (本地路径带 `file://` 前缀)
    pub uri: String,
}

impl Source {
    /// 本地文件路径 (去掉 `file://` 前缀), 非文件源返回 None
    pub fn local_path(&self) -> Option<&str> {
        match self.kind {
            SourceKind::File => self.uri.strip_prefix(FILE_SCHEME),
            _ => None,
        }
    }

    /// 用于格式探测的文件名
    pub fn filename(&self) -> &str {
        self.uri
            .rsplit('/')
            .next()
            .and_then(|s| s.split('?').next())
            .unwrap_or(&self.uri)
    }
}

/// 对定位符分类
pub fn classify(locator: &str) -> MdResult<Source> {
    let lower = locator.to_ascii_lowercase();

    if let Some(path) = locator.strip_prefix(FILE_SCHEME) {
        check_local_file(path)?;
        return Ok(local_source(format!("{FILE_SCHEME}{path}")));
    }
    if lower.starts_with("rtsp://") {
        let kind = if locator.contains("/wfd1.0/") {
            SourceKind::Wfd
        } else {
            SourceKind::Rtsp
        };
        return Ok(Source {
            kind,
            uri: locator.to_string(),
        });
    }
    if lower.starts_with("http://") || lower.starts_with("https://") {
        let kind = if lower.ends_with(".ism/manifest") || lower.ends_with(".isml/manifest") {
            SourceKind::SmoothStreaming
        } else {
            SourceKind::Http
        };
        return Ok(Source {
            kind,
            uri: locator.to_string(),
        });
    }
    if has_scheme(locator) {
        return Ok(Source {
            kind: SourceKind::Unknown,
            uri: locator.to_string(),
        });
    }

    check_local_file(locator)?;
    Ok(local_source(format!("{FILE_SCHEME}{locator}")))
}

/// 本地文件: `.sdp` 描述文件交给 RTSP 处理
fn local_source(uri: String) -> Source {
    let trimmed = uri.trim().to_ascii_lowercase();
    let kind = if trimmed.len() > FILE_SCHEME.len() + 4 && trimmed.ends_with("sdp") {
        SourceKind::Rtsp
    } else {
        SourceKind::File
    };
    Source { kind, uri }
}

/// 文件必须存在且长度不为 0
fn check_local_file(path: &str) -> MdResult<()> {
    match Path::new(path).metadata() {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(MdError::FileNotFound(format!("文件为空或不是普通文件: {path}"))),
        Err(e) => Err(MdError::FileNotFound(format!("{path}: {e}"))),
    }
}

/// 形如 `scheme://` 的前缀
fn has_scheme(locator: &str) -> bool {
    locator.split_once("://").is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn temp_file(suffix: &str, content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .unwrap();
        file.write_all(content).unwrap();
        file
    }

    #[test]
    fn test_本地路径改写为_file_uri() {
        let file = temp_file(".mp4", b"data");
        let path = file.path().to_str().unwrap();
        let source = classify(path).unwrap();
        assert_eq!(source.kind, SourceKind::File);
        assert_eq!(source.uri, format!("file://{path}"));
        assert_eq!(source.local_path(), Some(path));
    }

    #[test]
    fn test_file_uri() {
        let file = temp_file(".aac", b"data");
        let uri = format!("file://{}", file.path().display());
        let source = classify(&uri).unwrap();
        assert_eq!(source.kind, SourceKind::File);
        assert_eq!(source.uri, uri);
    }

    #[test]
    fn test_不存在或空文件() {
        assert!(matches!(
            classify("/definitely/not/here.mp4"),
            Err(MdError::FileNotFound(_))
        ));
        let empty = temp_file(".mp4", b"");
        assert!(matches!(
            classify(empty.path().to_str().unwrap()),
            Err(MdError::FileNotFound(_))
        ));
        assert!(matches!(
            classify("file:///definitely/not/here.mp4"),
            Err(MdError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_sdp_文件交给_rtsp() {
        let file = temp_file(".sdp", b"v=0\n");
        let source = classify(file.path().to_str().unwrap()).unwrap();
        assert_eq!(source.kind, SourceKind::Rtsp);
    }

    #[test]
    fn test_网络地址分类() {
        let kind = |s: &str| classify(s).unwrap().kind;
        assert_eq!(kind("rtsp://host/stream"), SourceKind::Rtsp);
        assert_eq!(kind("rtsp://host/wfd1.0/streamid=0"), SourceKind::Wfd);
        assert_eq!(kind("http://host/a.mp4"), SourceKind::Http);
        assert_eq!(kind("https://host/a.mp4?x=1"), SourceKind::Http);
        assert_eq!(kind("http://host/Movie.ISM/Manifest"), SourceKind::SmoothStreaming);
        assert_eq!(kind("http://host/live.isml/manifest"), SourceKind::SmoothStreaming);
        assert_eq!(kind("mms://host/stream"), SourceKind::Unknown);
    }

    #[test]
    fn test_探测文件名() {
        let source = classify("https://host/dir/clip.flv?token=1").unwrap();
        assert_eq!(source.filename(), "clip.flv");
        assert_eq!(source.local_path(), None);
    }
}
