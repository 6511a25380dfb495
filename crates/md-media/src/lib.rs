//! # md-media
//!
//! 媒体格式描述与样本数据包.
//!
//! - [`MediaFormat`]: 不可变、可廉价克隆的轨道格式, 修改时写时复制
//! - [`MediaPacket`]: 调用方持有的单个样本, 携带时间戳与标志

pub mod format;
pub mod mime;
pub mod packet;

pub use format::{AudioFormat, MediaFormat, VideoFormat};
pub use mime::MediaMime;
pub use packet::{MediaPacket, PacketFlags};
