//! 未实现的后端.
//!
//! 每个操作都返回 [`MdError::NotSupported`].

use md_core::{MdError, MdResult};
use md_media::{MediaFormat, MediaPacket};

use super::{DemuxerPort, EosCallback, ErrorCallback, PortKind};
use crate::config::DemuxerConfig;

/// 占位后端
pub struct UnsupportedPort {
    kind: PortKind,
}

impl UnsupportedPort {
    pub fn new(kind: PortKind) -> Self {
        Self { kind }
    }

    /// FFmpeg 后端 (工厂函数)
    pub fn create_ffmpeg(_config: &DemuxerConfig) -> MdResult<Box<dyn DemuxerPort>> {
        Ok(Box::new(Self::new(PortKind::Ffmpeg)))
    }

    /// 自定义后端 (工厂函数)
    pub fn create_custom(_config: &DemuxerConfig) -> MdResult<Box<dyn DemuxerPort>> {
        Ok(Box::new(Self::new(PortKind::Custom)))
    }

    fn unsupported<T>(&self, op: &str) -> MdResult<T> {
        log::error!("{} 后端未实现 {}", self.kind, op);
        Err(MdError::NotSupported(format!("{} 后端未实现 {}", self.kind, op)))
    }
}

impl DemuxerPort for UnsupportedPort {
    fn name(&self) -> &'static str {
        match self.kind {
            PortKind::Ffmpeg => "ffmpeg",
            PortKind::Custom => "custom",
            PortKind::Pipeline => "unsupported",
        }
    }

    fn prepare(&mut self, _uri: &str) -> MdResult<()> {
        self.unsupported("prepare")
    }

    fn track_count(&self) -> MdResult<usize> {
        self.unsupported("track_count")
    }

    fn select_track(&self, _index: usize) -> MdResult<()> {
        self.unsupported("select_track")
    }

    fn unselect_track(&self, _index: usize) -> MdResult<()> {
        self.unsupported("unselect_track")
    }

    fn start(&mut self) -> MdResult<()> {
        self.unsupported("start")
    }

    fn track_info(&self, _index: usize) -> MdResult<MediaFormat> {
        self.unsupported("track_info")
    }

    fn read_sample(&self, _index: usize) -> MdResult<Option<MediaPacket>> {
        self.unsupported("read_sample")
    }

    fn seek(&self, _offset_us: i64) -> MdResult<()> {
        self.unsupported("seek")
    }

    fn stop(&mut self) -> MdResult<()> {
        self.unsupported("stop")
    }

    fn unprepare(&mut self) -> MdResult<()> {
        self.unsupported("unprepare")
    }

    fn destroy(&mut self) -> MdResult<()> {
        self.unsupported("destroy")
    }

    fn set_error_cb(&mut self, _callback: ErrorCallback) -> MdResult<()> {
        self.unsupported("set_error_cb")
    }

    fn unset_error_cb(&mut self) -> MdResult<()> {
        self.unsupported("unset_error_cb")
    }

    fn set_eos_cb(&mut self, _callback: EosCallback) -> MdResult<()> {
        self.unsupported("set_eos_cb")
    }

    fn unset_eos_cb(&mut self) -> MdResult<()> {
        self.unsupported("unset_eos_cb")
    }
}
