//! 流类型描述 (caps).
//!
//! 由一个媒体类型名称和一组有序字段组成, 可与文本形式互相转换:
//!
//! ```text
//! video/x-h264, stream-format=(string)avc, width=(int)640, height=(int)480,
//!     framerate=(fraction)25/1, codec_data=(buffer)014d401fffe1...
//! ```

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use md_core::{MdError, Rational};

/// 字段取值
#[derive(Debug, Clone, PartialEq)]
pub enum CapsValue {
    Int(i64),
    Bool(bool),
    Str(String),
    Fraction(Rational),
    /// 二进制数据, 文本形式为十六进制
    Buffer(Bytes),
}

/// 流类型描述
#[derive(Debug, Clone, PartialEq)]
pub struct Caps {
    name: String,
    fields: Vec<(String, CapsValue)>,
}

impl Caps {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// 媒体类型名称, 如 `audio/mpeg`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 设置字段, 已存在时覆盖
    pub fn set(&mut self, key: &str, value: CapsValue) {
        match self.fields.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.fields.push((key.to_string(), value)),
        }
    }

    pub fn with_int(mut self, key: &str, value: i64) -> Self {
        self.set(key, CapsValue::Int(value));
        self
    }

    pub fn with_bool(mut self, key: &str, value: bool) -> Self {
        self.set(key, CapsValue::Bool(value));
        self
    }

    pub fn with_str(mut self, key: &str, value: &str) -> Self {
        self.set(key, CapsValue::Str(value.to_string()));
        self
    }

    pub fn with_fraction(mut self, key: &str, value: Rational) -> Self {
        self.set(key, CapsValue::Fraction(value));
        self
    }

    pub fn with_buffer(mut self, key: &str, value: impl Into<Bytes>) -> Self {
        self.set(key, CapsValue::Buffer(value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&CapsValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            CapsValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            CapsValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_fraction(&self, key: &str) -> Option<Rational> {
        match self.get(key)? {
            CapsValue::Fraction(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_buffer(&self, key: &str) -> Option<&Bytes> {
        match self.get(key)? {
            CapsValue::Buffer(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for CapsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "(int){v}"),
            Self::Bool(v) => write!(f, "(boolean){v}"),
            Self::Str(v) => write!(f, "(string){v}"),
            Self::Fraction(v) => write!(f, "(fraction){v}"),
            Self::Buffer(v) => {
                write!(f, "(buffer)")?;
                for b in v.iter() {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (key, value) in &self.fields {
            write!(f, ", {key}={value}")?;
        }
        Ok(())
    }
}

impl FromStr for CapsValue {
    type Err = MdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MdError::InvalidData(format!("无法解析 caps 字段值: {s}"));
        let rest = s.strip_prefix('(').ok_or_else(invalid)?;
        let (ty, value) = rest.split_once(')').ok_or_else(invalid)?;
        match ty {
            "int" => value.parse().map(Self::Int).map_err(|_| invalid()),
            "boolean" => value.parse().map(Self::Bool).map_err(|_| invalid()),
            "string" => Ok(Self::Str(value.to_string())),
            "fraction" => value.parse().map(Self::Fraction),
            "buffer" => decode_hex(value).map(|b| Self::Buffer(Bytes::from(b))).ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }
}

impl FromStr for Caps {
    type Err = MdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(", ");
        let name = parts
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| MdError::InvalidData("caps 名称为空".into()))?;
        let mut caps = Caps::new(name);
        for part in parts {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| MdError::InvalidData(format!("无法解析 caps 字段: {part}")))?;
            caps.set(key, value.parse()?);
        }
        Ok(caps)
    }
}

/// 十六进制文本解码
fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}
