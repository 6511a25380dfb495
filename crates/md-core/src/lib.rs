//! # md-core
//!
//! mediademux 核心库, 提供错误类型、媒体类型、有理数与时钟时间.
//!
//! 其余 crate (md-media, md-format, mediademux) 都建立在这些基础类型之上.

pub mod clock;
pub mod error;
pub mod media_type;
pub mod rational;

// 重导出常用类型
pub use clock::ClockTime;
pub use error::{ErrorCode, MdError, MdResult};
pub use media_type::MediaType;
pub use rational::Rational;
