//! 单轨道样本接收器.
//!
//! 每个基本流对应一个 [`AppSink`]: 读取通道推入样本, 调用方拉取样本.
//! 容量与丢弃策略可在运行期调整:
//! - 选中轨道: 容量 N, 满时阻塞推送方 (反压)
//! - 未选中轨道: 容量 0, 新样本直接丢弃
//!
//! 非活动 (图未处于播放状态) 的接收器不接收样本, 推送方等待其转为活动.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::buffer::Buffer;

/// 推送结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    /// 已入队
    Queued,
    /// 按丢弃策略丢弃
    Dropped,
    /// 正在刷新 (seek 中), 样本被拒绝
    Flushing,
    /// 接收器已关闭
    Shutdown,
}

/// 拉取结果
#[derive(Debug)]
pub enum PullResult {
    /// 取到一个样本
    Sample(Buffer),
    /// 队列为空且流已结束
    Eos,
    /// 接收器已关闭
    Shutdown,
}

#[derive(Debug)]
struct SinkState {
    queue: VecDeque<Buffer>,
    /// 最大缓冲数, 0 且不丢弃表示不限
    max_buffers: usize,
    /// 满时是否丢弃
    drop: bool,
    /// 为 false 时推送方等待
    active: bool,
    eos: bool,
    /// 本次结束事件是否已通知过调用方
    eos_notified: bool,
    flushing: bool,
    shutdown: bool,
    dropped: u64,
}

impl SinkState {
    fn is_full(&self) -> bool {
        self.max_buffers > 0 && self.queue.len() >= self.max_buffers
    }
}

/// 有界样本接收器
#[derive(Debug)]
pub struct AppSink {
    name: String,
    state: Mutex<SinkState>,
    cond: Condvar,
}

impl AppSink {
    /// 创建接收器, 初始为未选中配置 (容量 0, 丢弃)
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(SinkState {
                queue: VecDeque::new(),
                max_buffers: 0,
                drop: true,
                active: false,
                eos: false,
                eos_notified: false,
                flushing: false,
                shutdown: false,
                dropped: 0,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 调整容量与丢弃策略
    ///
    /// 容量降为 0 并开启丢弃时, 已缓冲的样本一并释放.
    pub fn configure(&self, max_buffers: usize, drop: bool) {
        let mut st = self.lock();
        st.max_buffers = max_buffers;
        st.drop = drop;
        if max_buffers == 0 && drop {
            st.queue.clear();
        }
        log::debug!(
            "接收器 {}: max_buffers={} drop={}",
            self.name,
            max_buffers,
            drop
        );
        self.cond.notify_all();
    }

    pub fn max_buffers(&self) -> usize {
        self.lock().max_buffers
    }

    pub fn is_drop(&self) -> bool {
        self.lock().drop
    }

    /// 切换到流动/暂停状态, 转为活动时唤醒等待的推送方
    pub fn set_active(&self, active: bool) {
        let mut st = self.lock();
        st.active = active;
        self.cond.notify_all();
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// 推入样本 (读取通道调用)
    ///
    /// 非活动时阻塞; 不丢弃且已满时阻塞, 直到有空间. 刷新或关闭会打断等待.
    pub fn push(&self, buffer: Buffer) -> PushResult {
        let mut st = self.lock();
        loop {
            if st.shutdown {
                return PushResult::Shutdown;
            }
            if st.flushing {
                return PushResult::Flushing;
            }
            if !st.active {
                st = self.cond.wait(st).unwrap_or_else(PoisonError::into_inner);
                continue;
            }
            if st.drop && st.max_buffers == 0 {
                st.dropped += 1;
                return PushResult::Dropped;
            }
            if !st.is_full() {
                st.queue.push_back(buffer);
                self.cond.notify_all();
                return PushResult::Queued;
            }
            if st.drop {
                // 丢弃最旧的样本, 为新样本腾出位置
                st.queue.pop_front();
                st.queue.push_back(buffer);
                st.dropped += 1;
                self.cond.notify_all();
                return PushResult::Dropped;
            }
            st = self.cond.wait(st).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// 拉取样本 (调用方线程)
    ///
    /// 队列为空且未结束时阻塞; 刷新期间继续等待新位置的数据.
    pub fn pull(&self) -> PullResult {
        let mut st = self.lock();
        loop {
            if st.shutdown {
                return PullResult::Shutdown;
            }
            if let Some(buffer) = st.queue.pop_front() {
                self.cond.notify_all();
                return PullResult::Sample(buffer);
            }
            if st.eos && !st.flushing {
                return PullResult::Eos;
            }
            st = self.cond.wait(st).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// 标记流结束
    pub fn end_of_stream(&self) {
        let mut st = self.lock();
        st.eos = true;
        self.cond.notify_all();
    }

    /// 队列已空且流已结束
    pub fn is_eos(&self) -> bool {
        let st = self.lock();
        st.eos && st.queue.is_empty()
    }

    /// 领取结束通知; 每个结束事件只有第一次调用返回 true
    pub fn take_eos_notification(&self) -> bool {
        let mut st = self.lock();
        if st.eos && st.queue.is_empty() && !st.eos_notified {
            st.eos_notified = true;
            return true;
        }
        false
    }

    /// 开始刷新: 清空队列、清除结束标记, 唤醒阻塞的推送方
    pub fn flush_start(&self) {
        let mut st = self.lock();
        st.flushing = true;
        st.queue.clear();
        st.eos = false;
        self.cond.notify_all();
    }

    /// 结束刷新, 重新接受样本
    pub fn flush_stop(&self) {
        let mut st = self.lock();
        st.flushing = false;
        st.queue.clear();
        st.eos = false;
        st.eos_notified = false;
        self.cond.notify_all();
    }

    /// 关闭接收器, 唤醒所有等待者
    pub fn shutdown(&self) {
        let mut st = self.lock();
        st.shutdown = true;
        st.queue.clear();
        self.cond.notify_all();
    }

    /// 当前缓冲的样本数
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// 累计丢弃的样本数
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}
