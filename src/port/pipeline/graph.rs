//! 解析图.
//!
//! 拓扑: `源 ! typefind ! 解析器 ! [每个轨道一个接收器]`, 识别容器之前末端为 `fakesink`.
//!
//! 后台线程:
//! - 流线程: 打开数据源, 探测格式, 创建解析器并完成轨道发现, 之后作为 0 号轨道的读取通道
//! - 读取通道: 每条轨道一个, 各自持有独立的字节源与解析器, 只推送本轨道的样本.
//!   某条轨道的接收器满时只有该通道等待, 其他轨道照常输出
//! - 总线线程: 接收状态切换、错误与结束消息, 记录日志并转发错误回调
//!
//! 发现结果通过一次性通道交给调用方, 调用方以超时方式等待.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use md_core::{ClockTime, MdError, MdResult};
use md_format::{
    AppSink, Buffer, FormatId, IoContext, PadInfo, PadListener, Parser, ParserRegistry, PushResult,
};

use super::source::{Source, SourceKind};
use super::track::TrackDescriptor;

/// 发现结果: 按发现顺序排列的轨道
pub type DiscoveryResult = MdResult<Vec<Arc<TrackDescriptor>>>;

/// 图状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Null,
    Paused,
    Playing,
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "NULL",
            Self::Paused => "PAUSED",
            Self::Playing => "PLAYING",
        };
        write!(f, "{name}")
    }
}

/// 总线消息
#[derive(Debug)]
enum BusMessage {
    StateChanged { from: GraphState, to: GraphState },
    Discovered { parser: &'static str, tracks: usize },
    Error(MdError),
    Eos { track: String },
}

/// 等待读取通道处理的 seek 请求
///
/// 调用方先让对应接收器进入刷新状态, 通道定位完成后结束刷新并应答.
struct SeekRequest {
    target: ClockTime,
    ack: mpsc::Sender<MdResult<()>>,
}

struct Control {
    state: GraphState,
    /// 每条轨道待处理的 seek, 发现完成时按轨道数初始化
    seeks: Vec<Option<SeekRequest>>,
    shutdown: bool,
}

/// 后台线程与控制方共享的状态
struct Shared {
    control: Mutex<Control>,
    cond: Condvar,
    /// 按轨道序号排列的接收器
    sinks: Mutex<Vec<Arc<AppSink>>>,
    /// 0 号以外的读取通道
    lanes: Mutex<Vec<JoinHandle<()>>>,
    topology: Mutex<Vec<String>>,
    discovered: AtomicBool,
}

impl Shared {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sinks(&self) -> MutexGuard<'_, Vec<Arc<AppSink>>> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lanes(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn topology(&self) -> MutexGuard<'_, Vec<String>> {
        self.topology.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 运行中的解析图
pub struct Graph {
    shared: Arc<Shared>,
    bus_tx: Option<mpsc::Sender<BusMessage>>,
    streaming: Option<JoinHandle<()>>,
    bus: Option<JoinHandle<()>>,
}

impl Graph {
    /// 构建解析图并启动后台线程, 图进入 PAUSED
    ///
    /// 返回的接收端在发现完成 (或失败) 时收到唯一一条结果.
    pub fn launch<F>(
        source: Source,
        registry: Arc<ParserRegistry>,
        on_error: F,
    ) -> MdResult<(Self, mpsc::Receiver<DiscoveryResult>)>
    where
        F: Fn(&MdError) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            control: Mutex::new(Control {
                state: GraphState::Paused,
                seeks: Vec::new(),
                shutdown: false,
            }),
            cond: Condvar::new(),
            sinks: Mutex::new(Vec::new()),
            lanes: Mutex::new(Vec::new()),
            topology: Mutex::new(vec![
                source.kind.element_name().to_string(),
                "typefind".to_string(),
                "fakesink".to_string(),
            ]),
            discovered: AtomicBool::new(false),
        });

        let (bus_tx, bus_rx) = mpsc::channel();
        let bus = thread::Builder::new()
            .name("md-bus".into())
            .spawn(move || bus_loop(bus_rx, on_error))?;

        let (discovery_tx, discovery_rx) = mpsc::channel();
        let streaming = {
            let worker = StreamingThread {
                shared: Arc::clone(&shared),
                bus: bus_tx.clone(),
                registry,
            };
            thread::Builder::new()
                .name("md-streaming".into())
                .spawn(move || worker.run(source, discovery_tx))?
        };

        bus_tx
            .send(BusMessage::StateChanged {
                from: GraphState::Null,
                to: GraphState::Paused,
            })
            .ok();

        Ok((
            Self {
                shared,
                bus_tx: Some(bus_tx),
                streaming: Some(streaming),
                bus: Some(bus),
            },
            discovery_rx,
        ))
    }

    pub fn state(&self) -> GraphState {
        self.shared.control().state
    }

    /// 切换图状态
    ///
    /// 进入 PLAYING 时所有接收器转为活动状态, 离开 PLAYING 时转为非活动,
    /// 非活动接收器上的推送会等待.
    pub fn set_state(&self, state: GraphState) -> MdResult<()> {
        let from = {
            let mut ctl = self.shared.control();
            if ctl.shutdown {
                return Err(MdError::Internal("解析图已关闭".into()));
            }
            let from = ctl.state;
            ctl.state = state;
            for sink in self.shared.sinks().iter() {
                sink.set_active(state == GraphState::Playing);
            }
            self.shared.cond.notify_all();
            from
        };
        if from != state {
            if let Some(bus) = &self.bus_tx {
                bus.send(BusMessage::StateChanged { from, to: state }).ok();
            }
        }
        Ok(())
    }

    /// 唤醒读取通道重新检查轨道的选中状态
    pub fn wake(&self) {
        let _ctl = self.shared.control();
        self.shared.cond.notify_all();
    }

    /// 把 `tracks` 对应的读取通道定位到 `target`
    ///
    /// 对应接收器先被清空并进入刷新状态, 各通道定位完成后结束刷新.
    /// 任一通道失败时返回第一个错误.
    pub fn seek(&self, target: ClockTime, tracks: &[usize], timeout: Duration) -> MdResult<()> {
        let (ack_tx, ack_rx) = mpsc::channel();
        {
            let mut ctl = self.shared.control();
            if ctl.shutdown {
                return Err(MdError::SeekFailed("解析图已关闭".into()));
            }
            let sinks = self.shared.sinks();
            let known = ctl.seeks.len().min(sinks.len());
            if let Some(&index) = tracks.iter().find(|&&i| i >= known) {
                return Err(MdError::InvalidArgument(format!("轨道 {} 不存在", index)));
            }
            for &index in tracks {
                sinks[index].flush_start();
                ctl.seeks[index] = Some(SeekRequest {
                    target,
                    ack: ack_tx.clone(),
                });
            }
            self.shared.cond.notify_all();
        }
        drop(ack_tx);

        let deadline = Instant::now() + timeout;
        let mut first_error = None;
        for _ in tracks {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match ack_rx.recv_timeout(remaining) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    first_error.get_or_insert(err);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    return Err(MdError::SeekFailed("等待读取通道响应超时".into()));
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(MdError::SeekFailed("读取通道已退出".into()));
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// 当前拓扑的文本形式, 如 `filesrc ! typefind ! qtdemux ! [video_0, audio_0]`
    pub fn topology(&self) -> String {
        self.shared.topology().join(" ! ")
    }

    /// 关闭图: 停止所有后台线程, 释放接收器
    pub fn shutdown(&mut self) {
        {
            let mut ctl = self.shared.control();
            if ctl.shutdown {
                return;
            }
            ctl.shutdown = true;
            ctl.state = GraphState::Null;
            ctl.seeks.iter_mut().for_each(|slot| *slot = None);
            self.shared.cond.notify_all();
        }
        for sink in self.shared.sinks().iter() {
            sink.shutdown();
        }

        let Some(streaming) = self.streaming.take() else {
            return;
        };
        // 发现阶段可能阻塞在网络读取上, 此时不等待流线程
        if self.shared.discovered.load(Ordering::Acquire) || streaming.is_finished() {
            if streaming.join().is_err() {
                log::error!("流线程异常退出");
            }
            let lanes: Vec<_> = self.shared.lanes().drain(..).collect();
            for lane in lanes {
                if lane.join().is_err() {
                    log::error!("读取通道异常退出");
                }
            }
            self.bus_tx.take();
            if let Some(bus) = self.bus.take() {
                if bus.join().is_err() {
                    log::error!("总线线程异常退出");
                }
            }
        } else {
            log::warn!("流线程仍在发现阶段, 不再等待其退出");
            self.bus_tx.take();
            self.bus.take();
        }
        log::debug!("解析图已关闭");
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn bus_loop<F>(rx: mpsc::Receiver<BusMessage>, on_error: F)
where
    F: Fn(&MdError),
{
    for message in rx {
        match message {
            BusMessage::StateChanged { from, to } => log::debug!("图状态: {} -> {}", from, to),
            BusMessage::Discovered { parser, tracks } => {
                log::info!("{} 发现 {} 条轨道", parser, tracks)
            }
            BusMessage::Error(err) => {
                log::error!("流线程错误: {}", err);
                on_error(&err);
            }
            BusMessage::Eos { track } => log::info!("轨道 {} 已到达流末尾", track),
        }
    }
    log::debug!("总线线程退出");
}

struct StreamingThread {
    shared: Arc<Shared>,
    bus: mpsc::Sender<BusMessage>,
    registry: Arc<ParserRegistry>,
}

impl StreamingThread {
    fn run(self, source: Source, discovery_tx: mpsc::Sender<DiscoveryResult>) {
        let mut announce = Some(discovery_tx);
        let (reader, format_id, tracks) = match self.discover(&source, &mut announce) {
            Ok(found) => found,
            Err(err) => {
                log::error!("轨道发现失败: {}", err);
                match announce.take() {
                    Some(tx) => {
                        tx.send(Err(err)).ok();
                    }
                    None => {
                        // 轨道已交给调用方, 让读取方看到流末尾而不是一直等待
                        for sink in self.shared.sinks().iter() {
                            sink.end_of_stream();
                        }
                        self.bus.send(BusMessage::Error(err)).ok();
                    }
                }
                return;
            }
        };

        for track in tracks.iter().skip(1) {
            if let Err(err) = self.spawn_lane(&source, format_id, track) {
                log::error!("无法启动轨道 {} 的读取通道: {}", track.name, err);
                track.sink.end_of_stream();
                self.bus.send(BusMessage::Error(err.into())).ok();
            }
        }
        if let Some(first) = tracks.first() {
            Lane::new(&self.shared, &self.bus, first).run(Some(reader));
        }
        log::debug!("流线程退出");
    }

    /// 打开数据源, 探测格式并完成轨道发现
    fn discover(
        &self,
        source: &Source,
        announce: &mut Option<mpsc::Sender<DiscoveryResult>>,
    ) -> MdResult<(LaneReader, FormatId, Vec<Arc<TrackDescriptor>>)> {
        let mut io = open_source(source)?;
        let found = self
            .registry
            .probe_input(&mut io, Some(source.filename()))?;
        log::info!(
            "typefind: {} (格式 {}, 置信度 {})",
            found.caps,
            found.format_id,
            found.score
        );

        let mut parser = self.registry.create(found.format_id)?;
        {
            let mut topology = self.shared.topology();
            topology.pop();
            topology.push(parser.name().to_string());
        }

        let tracks = match &mut parser {
            Parser::Container(container) => {
                let mut pads = PadCollector {
                    graph: self,
                    parser: container.name(),
                    tracks: Vec::new(),
                    announce,
                };
                container.open(&mut io, &mut pads)?;
                if pads.announce.is_some() {
                    return Err(MdError::Internal(format!(
                        "{} 未完成轨道宣告",
                        container.name()
                    )));
                }
                pads.tracks
            }
            Parser::Frame(frame) => {
                // 无容器音频流: 只有一条轨道, 由图自行宣告
                let caps = frame.open(&mut io)?;
                let track = Arc::new(TrackDescriptor::new(0, "audio", caps));
                let tracks = vec![track];
                self.complete_discovery(frame.name(), &tracks, announce);
                tracks
            }
        };
        Ok((LaneReader { io, parser }, found.format_id, tracks))
    }

    /// 发现完成: 登记接收器, 更新拓扑, 通知等待方
    fn complete_discovery(
        &self,
        parser: &'static str,
        tracks: &[Arc<TrackDescriptor>],
        announce: &mut Option<mpsc::Sender<DiscoveryResult>>,
    ) {
        {
            let mut ctl = self.shared.control();
            ctl.seeks = tracks.iter().map(|_| None).collect();
            let active = ctl.state == GraphState::Playing;
            let mut sinks = self.shared.sinks();
            for track in tracks {
                track.sink.set_active(active);
                sinks.push(Arc::clone(&track.sink));
            }
        }
        let names: Vec<&str> = tracks.iter().map(|t| t.name.as_str()).collect();
        self.shared.topology().push(format!("[{}]", names.join(", ")));
        self.shared.discovered.store(true, Ordering::Release);
        self.bus
            .send(BusMessage::Discovered {
                parser,
                tracks: tracks.len(),
            })
            .ok();
        if let Some(tx) = announce.take() {
            tx.send(Ok(tracks.to_vec())).ok();
        }
    }

    /// 为一条轨道启动独立的读取通道, 字节源与解析器在通道线程内打开
    fn spawn_lane(
        &self,
        source: &Source,
        format_id: FormatId,
        track: &Arc<TrackDescriptor>,
    ) -> std::io::Result<()> {
        let shared = Arc::clone(&self.shared);
        let bus = self.bus.clone();
        let registry = Arc::clone(&self.registry);
        let source = source.clone();
        let track = Arc::clone(track);
        let handle = thread::Builder::new()
            .name(format!("md-lane-{}", track.index))
            .spawn(move || {
                let lane = Lane::new(&shared, &bus, &track);
                let reader = match LaneReader::open(&source, &registry, format_id) {
                    Ok(reader) => Some(reader),
                    Err(err) => {
                        log::error!("轨道 {} 打开读取通道失败: {}", track.name, err);
                        bus.send(BusMessage::Error(err)).ok();
                        None
                    }
                };
                lane.run(reader);
            })?;
        self.shared.lanes().push(handle);
        Ok(())
    }
}

/// 收集容器解析器宣告的 pad
struct PadCollector<'a> {
    graph: &'a StreamingThread,
    parser: &'static str,
    tracks: Vec<Arc<TrackDescriptor>>,
    announce: &'a mut Option<mpsc::Sender<DiscoveryResult>>,
}

impl PadListener for PadCollector<'_> {
    fn pad_added(&mut self, pad: PadInfo) -> MdResult<()> {
        if self.announce.is_none() {
            return Err(MdError::Internal(format!(
                "{}: 发现已完成后又宣告了 pad {}",
                self.parser, pad.name
            )));
        }
        let track = TrackDescriptor::new(self.tracks.len(), pad.name, pad.caps);
        self.tracks.push(Arc::new(track));
        Ok(())
    }

    fn no_more_pads(&mut self) {
        self.graph
            .complete_discovery(self.parser, &self.tracks, self.announce);
    }
}

/// 读取通道重新打开容器时, pad 已在发现阶段登记过
struct KnownPads;

impl PadListener for KnownPads {
    fn pad_added(&mut self, _pad: PadInfo) -> MdResult<()> {
        Ok(())
    }

    fn no_more_pads(&mut self) {}
}

/// 读取通道独占的字节源与解析器
struct LaneReader {
    io: IoContext,
    parser: Parser,
}

impl LaneReader {
    fn open(source: &Source, registry: &ParserRegistry, format_id: FormatId) -> MdResult<Self> {
        let mut io = open_source(source)?;
        let mut parser = registry.create(format_id)?;
        match &mut parser {
            Parser::Container(container) => container.open(&mut io, &mut KnownPads)?,
            Parser::Frame(frame) => {
                frame.open(&mut io)?;
            }
        }
        Ok(Self { io, parser })
    }

    fn next_buffer(&mut self) -> MdResult<(usize, Buffer)> {
        self.parser.next_buffer(&mut self.io)
    }

    fn seek(&mut self, target: ClockTime) -> MdResult<()> {
        self.parser
            .seek(&mut self.io, target)
            .map_err(|e| match e {
                MdError::SeekFailed(msg) => MdError::SeekFailed(msg),
                other => MdError::SeekFailed(format!("{}: {}", self.parser.name(), other)),
            })
    }
}

/// 读取通道下一步要做的事
enum Step {
    Push,
    Seek(SeekRequest),
    Shutdown,
}

/// 单条轨道的读取通道
///
/// 只在 PLAYING 且轨道选中时读取, 其他 pad 的样本直接跳过.
struct Lane<'a> {
    shared: &'a Shared,
    bus: &'a mpsc::Sender<BusMessage>,
    track: &'a TrackDescriptor,
}

impl<'a> Lane<'a> {
    fn new(
        shared: &'a Shared,
        bus: &'a mpsc::Sender<BusMessage>,
        track: &'a TrackDescriptor,
    ) -> Self {
        Self { shared, bus, track }
    }

    fn run(&self, mut reader: Option<LaneReader>) {
        let index = self.track.index;
        let sink = &self.track.sink;
        let mut at_eos = reader.is_none();
        if at_eos {
            sink.end_of_stream();
        }
        loop {
            let step = {
                let mut ctl = self.shared.control();
                loop {
                    if ctl.shutdown {
                        break Step::Shutdown;
                    }
                    if let Some(request) = ctl.seeks.get_mut(index).and_then(Option::take) {
                        break Step::Seek(request);
                    }
                    if ctl.state == GraphState::Playing && self.track.is_selected() && !at_eos {
                        break Step::Push;
                    }
                    ctl = self
                        .shared
                        .cond
                        .wait(ctl)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            };

            match step {
                Step::Shutdown => return,
                Step::Seek(request) => {
                    let result = match reader.as_mut() {
                        Some(reader) => reader.seek(request.target),
                        None => Err(MdError::SeekFailed(format!(
                            "轨道 {} 没有可用的读取通道",
                            self.track.name
                        ))),
                    };
                    sink.flush_stop();
                    match &result {
                        Ok(()) => {
                            log::debug!("轨道 {} seek 完成: {}", self.track.name, request.target);
                            at_eos = false;
                        }
                        Err(err) => {
                            log::error!(
                                "轨道 {} seek 到 {} 失败: {}",
                                self.track.name,
                                request.target,
                                err
                            );
                            if at_eos {
                                sink.end_of_stream();
                            }
                        }
                    }
                    request.ack.send(result).ok();
                }
                Step::Push => {
                    let Some(reader) = reader.as_mut() else {
                        at_eos = true;
                        continue;
                    };
                    match reader.next_buffer() {
                        Ok((pad, buffer)) => {
                            if pad == index && sink.push(buffer) == PushResult::Shutdown {
                                return;
                            }
                        }
                        Err(err) => {
                            at_eos = true;
                            sink.end_of_stream();
                            let message = match err {
                                MdError::Eof => BusMessage::Eos {
                                    track: self.track.name.clone(),
                                },
                                other => BusMessage::Error(other),
                            };
                            self.bus.send(message).ok();
                        }
                    }
                }
            }
        }
    }
}

/// 打开数据源字节流
fn open_source(source: &Source) -> MdResult<IoContext> {
    match source.kind {
        SourceKind::File => {
            let path = source
                .local_path()
                .ok_or_else(|| MdError::InvalidPath(source.uri.clone()))?;
            Ok(IoContext::open_read(path)?)
        }
        #[cfg(feature = "http")]
        SourceKind::Http => IoContext::open_url(&source.uri),
        kind => Err(MdError::NotSupported(format!(
            "{} 类型的数据源 ({})",
            kind, source.uri
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use md_format::{Caps, ContainerParser, PullResult, TypeFind, typefind::ProbeScore};

    use super::*;

    /// 三个 ADTS 帧 (AAC LC, 44100 Hz, 双声道)
    fn adts_file(frames: usize) -> tempfile::NamedTempFile {
        let mut data = Vec::new();
        for i in 0..frames {
            let len = 7 + 16;
            data.extend_from_slice(&[
                0xFF,
                0xF1,
                0x50,
                0x80 | ((len >> 11) as u8 & 0x03),
                (len >> 3) as u8,
                ((len as u8 & 0x07) << 5) | 0x1F,
                0xFC,
            ]);
            data.extend(std::iter::repeat_n(i as u8, 16));
        }
        let mut file = tempfile::Builder::new().suffix(".aac").tempfile().unwrap();
        file.write_all(&data).unwrap();
        file
    }

    fn launch(path: &std::path::Path) -> (Graph, Vec<Arc<TrackDescriptor>>) {
        let source = super::super::source::classify(path.to_str().unwrap()).unwrap();
        let registry = Arc::new(md_format::default_registry());
        let (graph, rx) = Graph::launch(source, registry, |_| {}).unwrap();
        let tracks = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        (graph, tracks)
    }

    /// 宣告一个 pad 之后头部解析失败的容器
    struct HalfOpen;

    impl ContainerParser for HalfOpen {
        fn name(&self) -> &'static str {
            "halfopen"
        }

        fn open(&mut self, _io: &mut IoContext, pads: &mut dyn PadListener) -> MdResult<()> {
            pads.pad_added(PadInfo {
                name: "audio_0".into(),
                caps: Caps::new("audio/mpeg").with_int("mpegversion", 4),
            })?;
            pads.no_more_pads();
            Err(MdError::Internal("样本表损坏".into()))
        }

        fn next_buffer(&mut self, _io: &mut IoContext) -> MdResult<(usize, Buffer)> {
            Err(MdError::Eof)
        }

        fn seek(&mut self, _io: &mut IoContext, _target: ClockTime) -> MdResult<()> {
            Ok(())
        }
    }

    fn half_open() -> MdResult<Box<dyn ContainerParser>> {
        Ok(Box::new(HalfOpen))
    }

    struct HalfOpenFind;

    impl TypeFind for HalfOpenFind {
        fn probe(&self, data: &[u8], _filename: Option<&str>) -> Option<ProbeScore> {
            data.starts_with(b"HALF").then_some(100)
        }

        fn format_id(&self) -> FormatId {
            FormatId::Mp4
        }

        fn caps(&self, _data: &[u8]) -> Caps {
            Caps::new("video/quicktime")
        }
    }

    #[test]
    fn test_发现阶段不推送样本() {
        let file = adts_file(3);
        let (mut graph, tracks) = launch(file.path());
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].name, "audio");
        assert_eq!(graph.state(), GraphState::Paused);
        assert_eq!(graph.topology(), "filesrc ! typefind ! aacparse ! [audio]");

        tracks[0].select(100);
        graph.wake();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(tracks[0].sink.queued(), 0);
        graph.shutdown();
    }

    #[test]
    fn test_播放后推送并到达结束() {
        let file = adts_file(3);
        let (mut graph, tracks) = launch(file.path());
        tracks[0].select(100);
        graph.set_state(GraphState::Playing).unwrap();
        assert!(tracks[0].sink.is_active());

        let mut frames = 0;
        while let PullResult::Sample(_) = tracks[0].sink.pull() {
            frames += 1;
        }
        assert_eq!(frames, 3);
        assert!(tracks[0].sink.take_eos_notification());

        graph.set_state(GraphState::Paused).unwrap();
        assert!(!tracks[0].sink.is_active());
        graph.shutdown();
    }

    #[test]
    fn test_seek_后重新输出() {
        let file = adts_file(5);
        let (mut graph, tracks) = launch(file.path());
        tracks[0].select(100);
        graph.set_state(GraphState::Playing).unwrap();
        while let PullResult::Sample(_) = tracks[0].sink.pull() {}

        graph
            .seek(ClockTime::ZERO, &[0], Duration::from_secs(5))
            .unwrap();
        match tracks[0].sink.pull() {
            PullResult::Sample(buffer) => {
                assert_eq!(buffer.data[0], 0);
                assert_eq!(buffer.pts, Some(ClockTime::ZERO));
            }
            other => panic!("seek 后应重新得到样本: {other:?}"),
        }
        graph.shutdown();
    }

    #[test]
    fn test_seek_不存在的轨道() {
        let file = adts_file(2);
        let (mut graph, _tracks) = launch(file.path());
        assert!(matches!(
            graph.seek(ClockTime::ZERO, &[3], Duration::from_secs(1)),
            Err(MdError::InvalidArgument(_))
        ));
        graph.shutdown();
    }

    #[test]
    fn test_宣告轨道后解析失败仍结束流() {
        let mut file = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
        file.write_all(b"HALF").unwrap();
        file.write_all(&[0u8; 64]).unwrap();
        let source = super::super::source::classify(file.path().to_str().unwrap()).unwrap();

        let mut registry = ParserRegistry::new();
        registry.register_probe(Box::new(HalfOpenFind));
        registry.register_container(FormatId::Mp4, "halfopen", half_open);
        let (error_tx, error_rx) = mpsc::channel();
        let (mut graph, rx) = Graph::launch(source, Arc::new(registry), move |err| {
            error_tx.send(err.to_string()).ok();
        })
        .unwrap();

        let tracks = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(tracks.len(), 1);
        let message = error_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(message.contains("样本表损坏"), "{message}");

        // 读取方不会一直等待
        tracks[0].select(10);
        assert!(matches!(tracks[0].sink.pull(), PullResult::Eos));
        graph.shutdown();
    }

    #[test]
    fn test_无法识别的数据() {
        let mut file = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
        file.write_all(&[0x42; 512]).unwrap();
        let source = super::super::source::classify(file.path().to_str().unwrap()).unwrap();
        let registry = Arc::new(md_format::default_registry());
        let (mut graph, rx) = Graph::launch(source, registry, |_| {}).unwrap();
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(result, Err(MdError::NotSupported(_))));
        assert_eq!(graph.topology(), "filesrc ! typefind ! fakesink");
        graph.shutdown();
    }

    #[test]
    fn test_不支持的数据源类型() {
        let source = Source {
            kind: SourceKind::Rtsp,
            uri: "rtsp://host/stream".into(),
        };
        assert!(matches!(
            open_source(&source),
            Err(MdError::NotSupported(_))
        ));
    }
}
