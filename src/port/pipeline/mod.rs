//! 解析图后端.
//!
//! 准备阶段构建解析图并等待轨道发现完成, 之后每条轨道对应一个接收器:
//! 选中的轨道容量为配置值且满时阻塞, 未选中的轨道容量为 0 且直接丢弃新样本.
//! 每条轨道由独立的读取通道填充, 一条轨道的接收器满时不影响其他轨道.

pub mod graph;
pub mod marshal;
pub mod source;
pub mod track;

use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use md_core::{ClockTime, MdError, MdResult};
use md_format::{ParserRegistry, PullResult};
use md_media::{MediaFormat, MediaPacket};

use self::graph::{Graph, GraphState};
use self::source::{Source, SourceKind};
use self::track::TrackDescriptor;
use super::{DemuxerPort, EosCallback, ErrorCallback};
use crate::config::DemuxerConfig;

/// 已注册的回调, 与总线线程共享
#[derive(Default)]
struct Callbacks {
    error: Mutex<Option<ErrorCallback>>,
    eos: Mutex<Option<EosCallback>>,
}

impl Callbacks {
    fn error_slot(&self) -> MutexGuard<'_, Option<ErrorCallback>> {
        self.error.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn eos_slot(&self) -> MutexGuard<'_, Option<EosCallback>> {
        self.eos.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify_error(&self, err: &MdError) {
        let callback = self.error_slot().clone();
        match callback {
            Some(cb) => cb(err),
            None => log::warn!("未注册错误回调, 丢弃错误: {}", err),
        }
    }

    fn notify_eos(&self, index: usize) {
        let callback = self.eos_slot().clone();
        if let Some(cb) = callback {
            cb(index);
        }
    }
}

/// 解析图后端
pub struct PipelinePort {
    registry: Arc<ParserRegistry>,
    discovery_timeout: Duration,
    sink_capacity: usize,
    callbacks: Arc<Callbacks>,
    source: Option<Source>,
    graph: Option<Graph>,
    tracks: Vec<Arc<TrackDescriptor>>,
    /// 最近读出样本的时间, seek 以此为基准
    position: Mutex<ClockTime>,
}

impl PipelinePort {
    pub fn new(config: &DemuxerConfig) -> Self {
        Self {
            registry: Arc::new(md_format::default_registry()),
            discovery_timeout: config.discovery_timeout(),
            sink_capacity: config.sink_capacity,
            callbacks: Arc::new(Callbacks::default()),
            source: None,
            graph: None,
            tracks: Vec::new(),
            position: Mutex::new(ClockTime::ZERO),
        }
    }

    /// 创建实例 (工厂函数)
    pub fn create(config: &DemuxerConfig) -> MdResult<Box<dyn DemuxerPort>> {
        Ok(Box::new(Self::new(config)))
    }

    /// 当前数据源的类型
    pub fn source_kind(&self) -> Option<SourceKind> {
        self.source.as_ref().map(|s| s.kind)
    }

    /// 解析图拓扑, 未准备时为 None
    pub fn topology(&self) -> Option<String> {
        self.graph.as_ref().map(Graph::topology)
    }

    fn graph(&self) -> MdResult<&Graph> {
        self.graph
            .as_ref()
            .ok_or_else(|| MdError::InvalidState("解析图尚未构建".into()))
    }

    fn track(&self, index: usize) -> MdResult<&Arc<TrackDescriptor>> {
        self.graph()?;
        self.tracks.get(index).ok_or_else(|| {
            MdError::InvalidArgument(format!(
                "轨道序号 {} 超出范围 (共 {} 条)",
                index,
                self.tracks.len()
            ))
        })
    }

    fn position(&self) -> MutexGuard<'_, ClockTime> {
        self.position.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 释放解析图与轨道
    fn teardown(&mut self) {
        if let Some(mut graph) = self.graph.take() {
            graph.shutdown();
        }
        self.tracks.clear();
        *self.position() = ClockTime::ZERO;
    }
}

impl DemuxerPort for PipelinePort {
    fn name(&self) -> &'static str {
        "pipeline"
    }

    fn prepare(&mut self, uri: &str) -> MdResult<()> {
        if self.graph.is_some() {
            return Err(MdError::InvalidState("解析图已构建".into()));
        }
        let source = source::classify(uri)?;
        log::info!("数据源: {} ({})", source.uri, source.kind);
        self.source = Some(source.clone());

        let callbacks = Arc::clone(&self.callbacks);
        let (graph, discovery) = Graph::launch(source, Arc::clone(&self.registry), move |err| {
            callbacks.notify_error(err)
        })?;
        self.graph = Some(graph);

        let result = match discovery.recv_timeout(self.discovery_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(MdError::Internal(format!(
                "等待轨道发现超时 ({} ms)",
                self.discovery_timeout.as_millis()
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(MdError::Internal("流线程在发现完成前退出".into()))
            }
        };
        match result {
            Ok(tracks) => {
                log::info!("发现 {} 条轨道: {}", tracks.len(), self.topology().unwrap_or_default());
                self.tracks = tracks;
                Ok(())
            }
            Err(err) => {
                log::error!("准备失败: {}", err);
                self.teardown();
                self.source = None;
                Err(err)
            }
        }
    }

    fn track_count(&self) -> MdResult<usize> {
        self.graph()?;
        Ok(self.tracks.len())
    }

    fn select_track(&self, index: usize) -> MdResult<()> {
        let track = self.track(index)?;
        let moved = track.was_selected_once() || track.sink.is_eos();
        let newly_selected = track.select(self.sink_capacity);
        log::info!("选中轨道 {} ({})", index, track.name);

        // 未选中期间读取通道不随 seek 移动, 重新选中时对齐到当前读取位置
        let position = *self.position();
        if newly_selected && (moved || position > ClockTime::ZERO) {
            log::debug!("轨道 {} 对齐到 {}", index, position);
            self.graph()?.seek(position, &[index], self.discovery_timeout)?;
        }
        self.graph()?.wake();
        Ok(())
    }

    fn unselect_track(&self, index: usize) -> MdResult<()> {
        let track = self.track(index)?;
        track.unselect();
        log::info!("取消选中轨道 {} ({})", index, track.name);
        Ok(())
    }

    fn start(&mut self) -> MdResult<()> {
        self.graph()?.set_state(GraphState::Playing)
    }

    fn track_info(&self, index: usize) -> MdResult<MediaFormat> {
        Ok(self.track(index)?.format().clone())
    }

    fn read_sample(&self, index: usize) -> MdResult<Option<MediaPacket>> {
        let track = self.track(index)?;
        if !track.is_selected() {
            return Err(MdError::InvalidOperation(format!(
                "轨道 {} ({}) 未选中",
                index, track.name
            )));
        }
        match track.sink.pull() {
            PullResult::Sample(buffer) => {
                if let Some(pts) = buffer.pts {
                    *self.position() = pts;
                }
                Ok(Some(marshal::buffer_to_packet(track, buffer)))
            }
            PullResult::Eos => {
                if track.sink.take_eos_notification() {
                    log::info!("轨道 {} ({}) 到达流末尾", index, track.name);
                    self.callbacks.notify_eos(index);
                }
                Ok(None)
            }
            PullResult::Shutdown => Err(MdError::InvalidState(format!(
                "轨道 {} 的接收器已关闭",
                index
            ))),
        }
    }

    fn seek(&self, offset_us: i64) -> MdResult<()> {
        let graph = self.graph()?;
        let target = self.position().offset_useconds(offset_us);
        let lanes: Vec<usize> = self
            .tracks
            .iter()
            .filter(|t| t.is_selected())
            .map(|t| t.index)
            .collect();
        log::info!("seek: 偏移 {} us -> {}", offset_us, target);
        graph.seek(target, &lanes, self.discovery_timeout)?;
        *self.position() = target;
        Ok(())
    }

    fn stop(&mut self) -> MdResult<()> {
        self.graph()?.set_state(GraphState::Paused)
    }

    fn unprepare(&mut self) -> MdResult<()> {
        self.graph()?;
        self.teardown();
        self.source = None;
        Ok(())
    }

    fn destroy(&mut self) -> MdResult<()> {
        self.teardown();
        self.source = None;
        self.callbacks.error_slot().take();
        self.callbacks.eos_slot().take();
        Ok(())
    }

    fn set_error_cb(&mut self, callback: ErrorCallback) -> MdResult<()> {
        let mut slot = self.callbacks.error_slot();
        if slot.is_some() {
            return Err(MdError::InvalidArgument("错误回调已注册".into()));
        }
        *slot = Some(callback);
        Ok(())
    }

    fn unset_error_cb(&mut self) -> MdResult<()> {
        self.callbacks.error_slot().take();
        Ok(())
    }

    fn set_eos_cb(&mut self, callback: EosCallback) -> MdResult<()> {
        let mut slot = self.callbacks.eos_slot();
        if slot.is_some() {
            return Err(MdError::InvalidArgument("结束回调已注册".into()));
        }
        *slot = Some(callback);
        Ok(())
    }

    fn unset_eos_cb(&mut self) -> MdResult<()> {
        self.callbacks.eos_slot().take();
        Ok(())
    }
}

impl Drop for PipelinePort {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use md_media::MediaMime;

    use super::*;

    /// AMR 窄带文件, 每帧 32 字节 (12.2 kbit/s)
    fn amr_file(frames: u8) -> tempfile::NamedTempFile {
        let mut data = b"#!AMR\n".to_vec();
        for i in 0..frames {
            data.push(7 << 3 | 0x04);
            data.extend(std::iter::repeat_n(i, 31));
        }
        let mut file = tempfile::Builder::new().suffix(".amr").tempfile().unwrap();
        file.write_all(&data).unwrap();
        file
    }

    fn prepared(file: &tempfile::NamedTempFile) -> PipelinePort {
        let mut port = PipelinePort::new(&DemuxerConfig::default());
        port.prepare(file.path().to_str().unwrap()).unwrap();
        port
    }

    #[test]
    fn test_准备后只有一条音频轨道() {
        let file = amr_file(4);
        let mut port = prepared(&file);
        assert_eq!(port.track_count().unwrap(), 1);
        assert_eq!(port.source_kind(), Some(SourceKind::File));
        assert_eq!(
            port.topology().as_deref(),
            Some("filesrc ! typefind ! amrparse ! [audio]")
        );
        let format = port.track_info(0).unwrap();
        assert_eq!(format.mime(), Some(MediaMime::AmrNb));
        assert_eq!(format.audio_format().map(|a| a.sample_rate), Some(8000));
        port.unprepare().unwrap();
        assert_eq!(port.topology(), None);
    }

    #[test]
    fn test_越界与未选中() {
        let file = amr_file(2);
        let port = prepared(&file);
        assert!(matches!(port.track_info(1), Err(MdError::InvalidArgument(_))));
        assert!(matches!(port.select_track(5), Err(MdError::InvalidArgument(_))));
        assert!(matches!(port.read_sample(0), Err(MdError::InvalidOperation(_))));
    }

    #[test]
    fn test_读取到结束只通知一次() {
        let file = amr_file(3);
        let mut port = prepared(&file);
        let eos_count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&eos_count);
        port.set_eos_cb(Arc::new(move |index| {
            assert_eq!(index, 0);
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        port.select_track(0).unwrap();
        port.start().unwrap();
        let mut pts = Vec::new();
        while let Some(packet) = port.read_sample(0).unwrap() {
            pts.push(packet.pts);
        }
        assert_eq!(pts, vec![Some(0), Some(20_000), Some(40_000)]);
        assert!(port.read_sample(0).unwrap().is_none());
        assert_eq!(eos_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_重复注册回调() {
        let mut port = PipelinePort::new(&DemuxerConfig::default());
        port.set_error_cb(Arc::new(|_| {})).unwrap();
        assert!(matches!(
            port.set_error_cb(Arc::new(|_| {})),
            Err(MdError::InvalidArgument(_))
        ));
        port.unset_error_cb().unwrap();
        port.set_error_cb(Arc::new(|_| {})).unwrap();
    }

    #[test]
    fn test_未构建时的操作() {
        let port = PipelinePort::new(&DemuxerConfig::default());
        assert!(matches!(port.track_count(), Err(MdError::InvalidState(_))));
        assert!(matches!(port.track_info(0), Err(MdError::InvalidState(_))));
    }

    #[test]
    fn test_不支持的网络源() {
        let mut port = PipelinePort::new(&DemuxerConfig::default());
        let result = port.prepare("rtsp://127.0.0.1/stream");
        assert!(matches!(result, Err(MdError::NotSupported(_))));
        assert_eq!(port.topology(), None);
        assert_eq!(port.source_kind(), None);
    }
}
