//! 解封装会话.
//!
//! 状态机:
//! ```text
//! NONE --create--> IDLE --prepare--> READY --start--> DEMUXING
//!                  IDLE <-unprepare- READY <--stop--- DEMUXING
//! NONE <-destroy-- IDLE
//! ```
//! 其余 (操作, 状态) 组合返回 [`MdError::InvalidState`] 且不产生副作用.
//! 改变状态的操作只有在后端成功后才提交新状态.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use md_core::{MdError, MdResult};
use md_media::{MediaFormat, MediaPacket};

use crate::config::DemuxerConfig;
use crate::port::{DemuxerPort, PortKind, PortRegistry};

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemuxerState {
    /// 已销毁
    None,
    /// 已创建, 可设置数据源与回调
    Idle,
    /// 轨道发现完成
    Ready,
    /// 正在输出样本
    Demuxing,
}

impl fmt::Display for DemuxerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "NONE",
            Self::Idle => "IDLE",
            Self::Ready => "READY",
            Self::Demuxing => "DEMUXING",
        };
        write!(f, "{name}")
    }
}

struct SessionInner {
    state: DemuxerState,
    port: Box<dyn DemuxerPort>,
    uri: Option<String>,
}

impl SessionInner {
    /// 校验当前状态是否允许 `op`
    fn ensure(&self, op: &str, allowed: &[DemuxerState]) -> MdResult<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        log::error!("{}: 状态 {} 下不允许该操作", op, self.state);
        Err(MdError::InvalidState(format!("{op} 不能在 {} 状态下调用", self.state)))
    }

    fn transition(&mut self, op: &str, to: DemuxerState) {
        log::info!("{}: {} -> {}", op, self.state, to);
        self.state = to;
    }
}

/// 解封装会话
///
/// 所有操作都接受 `&self`, 可以通过 `Arc` 在多个读取线程之间共享.
/// 每条轨道同一时间只应由一个线程读取.
pub struct Demuxer {
    kind: PortKind,
    inner: RwLock<SessionInner>,
}

impl Demuxer {
    /// 按 `MEDIADEMUX_CONFIG` 指定的配置创建会话
    pub fn create() -> MdResult<Self> {
        Self::with_config(DemuxerConfig::from_env())
    }

    /// 按给定配置创建会话, 进入 IDLE
    pub fn with_config(config: DemuxerConfig) -> MdResult<Self> {
        Self::with_registry(&crate::default_port_registry(), config)
    }

    /// 使用自定义后端注册表创建会话
    pub fn with_registry(registry: &PortRegistry, config: DemuxerConfig) -> MdResult<Self> {
        let port = registry.create(config.port, &config)?;
        log::info!("创建会话: 后端 {} ({})", port.name(), config.port);
        Ok(Self {
            kind: config.port,
            inner: RwLock::new(SessionInner {
                state: DemuxerState::Idle,
                port,
                uri: None,
            }),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 会话使用的后端
    pub fn port_kind(&self) -> PortKind {
        self.kind
    }

    /// 当前状态, 任何状态下都可调用
    pub fn state(&self) -> DemuxerState {
        self.read().state
    }

    /// 设置数据源 (本地路径或 URI), 在 `prepare` 时才校验
    pub fn set_data_source(&self, uri: &str) -> MdResult<()> {
        let mut inner = self.write();
        inner.ensure("set_data_source", &[DemuxerState::Idle])?;
        if uri.is_empty() {
            log::error!("set_data_source: 数据源为空");
            return Err(MdError::InvalidArgument("数据源为空".into()));
        }
        log::debug!("set_data_source: {}", uri);
        inner.uri = Some(uri.to_string());
        Ok(())
    }

    /// 识别容器并发现轨道, 成功后进入 READY
    pub fn prepare(&self) -> MdResult<()> {
        let mut inner = self.write();
        inner.ensure("prepare", &[DemuxerState::Idle])?;
        let uri = inner.uri.clone().ok_or_else(|| {
            log::error!("prepare: 未设置数据源");
            MdError::InvalidPath("未设置数据源".into())
        })?;
        inner.port.prepare(&uri)?;
        inner.transition("prepare", DemuxerState::Ready);
        Ok(())
    }

    /// 轨道数, 仅在 READY 状态下可用
    pub fn track_count(&self) -> MdResult<usize> {
        let inner = self.read();
        inner.ensure("track_count", &[DemuxerState::Ready])?;
        inner.port.track_count()
    }

    pub fn select_track(&self, index: usize) -> MdResult<()> {
        let inner = self.read();
        inner.ensure("select_track", &[DemuxerState::Ready, DemuxerState::Demuxing])?;
        inner.port.select_track(index)
    }

    pub fn unselect_track(&self, index: usize) -> MdResult<()> {
        let inner = self.read();
        inner.ensure("unselect_track", &[DemuxerState::Ready, DemuxerState::Demuxing])?;
        inner.port.unselect_track(index)
    }

    /// 开始输出样本, 成功后进入 DEMUXING
    pub fn start(&self) -> MdResult<()> {
        let mut inner = self.write();
        inner.ensure("start", &[DemuxerState::Ready])?;
        inner.port.start()?;
        inner.transition("start", DemuxerState::Demuxing);
        Ok(())
    }

    /// 轨道格式; 返回的是独立副本, 修改不影响会话内部
    pub fn track_info(&self, index: usize) -> MdResult<MediaFormat> {
        let inner = self.read();
        inner.ensure("track_info", &[DemuxerState::Ready, DemuxerState::Demuxing])?;
        inner.port.track_info(index)
    }

    /// 读取选中轨道的下一个样本
    ///
    /// 没有样本时阻塞; 到达流末尾时返回 `Ok(None)`, 每次结束只触发一次结束回调.
    pub fn read_sample(&self, index: usize) -> MdResult<Option<MediaPacket>> {
        let inner = self.read();
        inner.ensure("read_sample", &[DemuxerState::Demuxing])?;
        inner.port.read_sample(index)
    }

    /// 相对当前位置定位, `offset_us` 可为负
    pub fn seek(&self, offset_us: i64) -> MdResult<()> {
        let inner = self.read();
        inner.ensure("seek", &[DemuxerState::Demuxing])?;
        inner.port.seek(offset_us)
    }

    /// 停止输出样本, 成功后回到 READY
    pub fn stop(&self) -> MdResult<()> {
        let mut inner = self.write();
        inner.ensure("stop", &[DemuxerState::Demuxing])?;
        inner.port.stop()?;
        inner.transition("stop", DemuxerState::Ready);
        Ok(())
    }

    /// 释放解析图与轨道, 成功后回到 IDLE
    pub fn unprepare(&self) -> MdResult<()> {
        let mut inner = self.write();
        inner.ensure("unprepare", &[DemuxerState::Ready])?;
        inner.port.unprepare()?;
        inner.transition("unprepare", DemuxerState::Idle);
        Ok(())
    }

    /// 销毁会话, 成功后进入 NONE, 之后除 `state` 外的操作都会失败
    pub fn destroy(&self) -> MdResult<()> {
        let mut inner = self.write();
        inner.ensure("destroy", &[DemuxerState::Idle])?;
        inner.port.destroy()?;
        inner.uri = None;
        inner.transition("destroy", DemuxerState::None);
        Ok(())
    }

    /// 注册错误回调, 在后台线程上调用; 回调中不应再调用本会话
    pub fn set_error_cb<F>(&self, callback: F) -> MdResult<()>
    where
        F: Fn(&MdError) + Send + Sync + 'static,
    {
        let mut inner = self.write();
        inner.ensure("set_error_cb", &[DemuxerState::Idle])?;
        inner.port.set_error_cb(Arc::new(callback))
    }

    pub fn unset_error_cb(&self) -> MdResult<()> {
        let mut inner = self.write();
        inner.ensure("unset_error_cb", &[DemuxerState::Idle])?;
        inner.port.unset_error_cb()
    }

    /// 注册结束回调, 在调用 `read_sample` 的线程上调用
    pub fn set_eos_cb<F>(&self, callback: F) -> MdResult<()>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let mut inner = self.write();
        inner.ensure("set_eos_cb", &[DemuxerState::Idle])?;
        inner.port.set_eos_cb(Arc::new(callback))
    }

    pub fn unset_eos_cb(&self) -> MdResult<()> {
        let mut inner = self.write();
        inner.ensure("unset_eos_cb", &[DemuxerState::Idle])?;
        inner.port.unset_eos_cb()
    }
}

impl Drop for Demuxer {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if inner.state == DemuxerState::None {
            return;
        }
        log::debug!("会话在 {} 状态下被释放, 回收后端资源", inner.state);
        if inner.state == DemuxerState::Demuxing {
            inner.port.stop().ok();
        }
        if matches!(inner.state, DemuxerState::Ready | DemuxerState::Demuxing) {
            inner.port.unprepare().ok();
        }
        inner.port.destroy().ok();
        inner.state = DemuxerState::None;
    }
}

impl fmt::Debug for Demuxer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Demuxer")
            .field("port", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Demuxer {
        Demuxer::with_config(DemuxerConfig::default()).unwrap()
    }

    #[test]
    fn test_创建后为_idle() {
        let demuxer = session();
        assert_eq!(demuxer.state(), DemuxerState::Idle);
        assert_eq!(demuxer.port_kind(), PortKind::Pipeline);
    }

    #[test]
    fn test_idle_状态下拒绝的操作() {
        let demuxer = session();
        let invalid = |r: MdResult<()>| matches!(r, Err(MdError::InvalidState(_)));
        assert!(matches!(demuxer.track_count(), Err(MdError::InvalidState(_))));
        assert!(invalid(demuxer.select_track(0)));
        assert!(invalid(demuxer.unselect_track(0)));
        assert!(invalid(demuxer.start()));
        assert!(matches!(demuxer.track_info(0), Err(MdError::InvalidState(_))));
        assert!(matches!(demuxer.read_sample(0), Err(MdError::InvalidState(_))));
        assert!(invalid(demuxer.seek(0)));
        assert!(invalid(demuxer.stop()));
        assert!(invalid(demuxer.unprepare()));
        assert_eq!(demuxer.state(), DemuxerState::Idle);
    }

    #[test]
    fn test_数据源校验() {
        let demuxer = session();
        assert!(matches!(demuxer.prepare(), Err(MdError::InvalidPath(_))));
        assert!(matches!(demuxer.set_data_source(""), Err(MdError::InvalidArgument(_))));
        demuxer.set_data_source("/no/such/file.mp4").unwrap();
        assert!(matches!(demuxer.prepare(), Err(MdError::FileNotFound(_))));
        assert_eq!(demuxer.state(), DemuxerState::Idle);
    }

    #[test]
    fn test_销毁后只能查询状态() {
        let demuxer = session();
        demuxer.destroy().unwrap();
        assert_eq!(demuxer.state(), DemuxerState::None);
        assert!(matches!(demuxer.set_data_source("a.mp4"), Err(MdError::InvalidState(_))));
        assert!(matches!(demuxer.destroy(), Err(MdError::InvalidState(_))));
        assert!(matches!(demuxer.set_eos_cb(|_| {}), Err(MdError::InvalidState(_))));
    }

    #[test]
    fn test_重复注册回调保留第一个() {
        let demuxer = session();
        demuxer.set_eos_cb(|_| {}).unwrap();
        assert!(matches!(demuxer.set_eos_cb(|_| {}), Err(MdError::InvalidArgument(_))));
        demuxer.unset_eos_cb().unwrap();
        demuxer.set_eos_cb(|_| {}).unwrap();
    }

    #[test]
    fn test_不支持的后端() {
        let config = DemuxerConfig {
            port: PortKind::Ffmpeg,
            ..DemuxerConfig::default()
        };
        let demuxer = Demuxer::with_config(config).unwrap();
        demuxer.set_data_source("/tmp/whatever.mp4").unwrap();
        assert!(matches!(demuxer.prepare(), Err(MdError::NotSupported(_))));
        assert_eq!(demuxer.state(), DemuxerState::Idle);
        assert!(matches!(demuxer.set_error_cb(|_| {}), Err(MdError::NotSupported(_))));
        assert!(matches!(demuxer.destroy(), Err(MdError::NotSupported(_))));
        assert_eq!(demuxer.state(), DemuxerState::Idle);
    }

    #[test]
    fn test_会话可跨线程共享() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Demuxer>();
    }
}
