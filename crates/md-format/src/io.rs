//! 字节源抽象.
//!
//! 为类型探测与解析器提供统一的只读接口, 支持文件、内存缓冲区与 HTTP 流.

use std::io::{self, Read, Seek};
#[cfg(feature = "http")]
use std::sync::{Mutex, MutexGuard, PoisonError};

use md_core::{MdError, MdResult};

/// 字节源上下文
///
/// 在后端之上维护一个读缓冲区, 提供按字节序读取整数等便捷方法.
pub struct IoContext {
    /// 底层字节源
    inner: Box<dyn IoBackend>,
    /// 读缓冲区
    buffer: Vec<u8>,
    /// 缓冲区中的有效数据长度
    buf_len: usize,
    /// 缓冲区当前读取位置
    buf_pos: usize,
}

/// 字节源后端 trait
pub trait IoBackend: Send {
    /// 读取数据到缓冲区, 返回 0 表示结束
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// 定位 (seek)
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64>;
    /// 获取当前位置
    fn position(&mut self) -> io::Result<u64>;
    /// 获取总大小 (如果可知)
    fn size(&self) -> Option<u64>;
    /// 是否支持 seek
    fn is_seekable(&self) -> bool;
}

/// 默认缓冲区大小 (32 KB)
const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

impl IoContext {
    /// 从后端创建上下文
    pub fn new(backend: Box<dyn IoBackend>) -> Self {
        Self {
            inner: backend,
            buffer: vec![0u8; DEFAULT_BUFFER_SIZE],
            buf_len: 0,
            buf_pos: 0,
        }
    }

    /// 打开本地文件
    pub fn open_read(path: &str) -> MdResult<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(Box::new(FileBackend::new(file))))
    }

    /// 打开 HTTP/HTTPS 地址
    ///
    /// 后台线程流式下载, 读取方按需等待数据到位.
    #[cfg(feature = "http")]
    pub fn open_url(url: &str) -> MdResult<Self> {
        log::info!("正在连接: {}", url);
        let backend = HttpBackend::open(url)?;
        Ok(Self::new(Box::new(backend)))
    }

    /// 从内存数据创建
    pub fn from_memory(data: Vec<u8>) -> Self {
        Self::new(Box::new(MemoryBackend::from_data(data)))
    }

    /// 读取指定字节数, 数据不足时返回 `Eof`
    pub fn read_exact(&mut self, buf: &mut [u8]) -> MdResult<()> {
        let mut total_read = 0;
        while total_read < buf.len() {
            let buffered = self.buf_len - self.buf_pos;
            if buffered > 0 {
                let to_copy = buffered.min(buf.len() - total_read);
                buf[total_read..total_read + to_copy]
                    .copy_from_slice(&self.buffer[self.buf_pos..self.buf_pos + to_copy]);
                self.buf_pos += to_copy;
                total_read += to_copy;
            } else {
                self.buf_pos = 0;
                self.buf_len = self.inner.read(&mut self.buffer)?;
                if self.buf_len == 0 {
                    return Err(MdError::Eof);
                }
            }
        }
        Ok(())
    }

    /// 尽量读取最多 `max` 字节, 到达末尾时返回较短的数据
    pub fn read_up_to(&mut self, max: usize) -> MdResult<Vec<u8>> {
        let mut out = Vec::with_capacity(max.min(DEFAULT_BUFFER_SIZE));
        while out.len() < max {
            if self.buf_pos == self.buf_len {
                self.buf_pos = 0;
                self.buf_len = self.inner.read(&mut self.buffer)?;
                if self.buf_len == 0 {
                    break;
                }
            }
            let to_copy = (self.buf_len - self.buf_pos).min(max - out.len());
            out.extend_from_slice(&self.buffer[self.buf_pos..self.buf_pos + to_copy]);
            self.buf_pos += to_copy;
        }
        Ok(out)
    }

    pub fn read_u8(&mut self) -> MdResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16_be(&mut self) -> MdResult<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// 读取 u24 大端 (3 字节无符号整数)
    pub fn read_u24_be(&mut self) -> MdResult<u32> {
        let mut buf = [0u8; 3];
        self.read_exact(&mut buf)?;
        Ok((u32::from(buf[0]) << 16) | (u32::from(buf[1]) << 8) | u32::from(buf[2]))
    }

    pub fn read_u32_be(&mut self) -> MdResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    pub fn read_u64_be(&mut self) -> MdResult<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    /// 读取 4 字节标签 (FourCC)
    pub fn read_tag(&mut self) -> MdResult<[u8; 4]> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// 读取指定数量的字节
    pub fn read_bytes(&mut self, count: usize) -> MdResult<Vec<u8>> {
        let mut buf = vec![0u8; count];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// 跳过指定字节数
    pub fn skip(&mut self, count: usize) -> MdResult<()> {
        let buffered = self.buf_len - self.buf_pos;
        if count <= buffered {
            self.buf_pos += count;
            return Ok(());
        }

        let remaining = count - buffered;
        self.buf_pos = self.buf_len;

        if self.inner.is_seekable() {
            self.inner.seek(io::SeekFrom::Current(remaining as i64))?;
        } else {
            // 不可 seek 的源只能逐块丢弃
            let mut left = remaining;
            while left > 0 {
                let to_read = left.min(self.buffer.len());
                self.buf_len = self.inner.read(&mut self.buffer[..to_read])?;
                if self.buf_len == 0 {
                    return Err(MdError::Eof);
                }
                left -= self.buf_len;
            }
            self.buf_pos = 0;
            self.buf_len = 0;
        }
        Ok(())
    }

    /// 定位到绝对位置, 会清空读缓冲区
    pub fn seek_to(&mut self, offset: u64) -> MdResult<u64> {
        self.buf_pos = 0;
        self.buf_len = 0;
        Ok(self.inner.seek(io::SeekFrom::Start(offset))?)
    }

    /// 获取当前位置 (扣除缓冲区中尚未消耗的数据)
    pub fn position(&mut self) -> MdResult<u64> {
        let raw_pos = self.inner.position()?;
        let buffered = (self.buf_len - self.buf_pos) as u64;
        Ok(raw_pos - buffered)
    }

    pub fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }

    pub fn size(&self) -> Option<u64> {
        self.inner.size()
    }
}

/// 文件字节源
struct FileBackend {
    file: std::fs::File,
    size: Option<u64>,
}

impl FileBackend {
    fn new(file: std::fs::File) -> Self {
        let size = file.metadata().ok().map(|m| m.len());
        Self { file, size }
    }
}

impl IoBackend for FileBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// 内存字节源, 用于测试和内存中处理
pub struct MemoryBackend {
    data: Vec<u8>,
    pos: usize,
}

impl MemoryBackend {
    pub fn from_data(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl IoBackend for MemoryBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.data.len().saturating_sub(self.pos);
        let to_read = buf.len().min(available);
        if to_read == 0 {
            return Ok(0);
        }
        buf[..to_read].copy_from_slice(&self.data[self.pos..self.pos + to_read]);
        self.pos += to_read;
        Ok(to_read)
    }

    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            io::SeekFrom::Start(offset) => offset as i64,
            io::SeekFrom::End(offset) => self.data.len() as i64 + offset,
            io::SeekFrom::Current(offset) => self.pos as i64 + offset,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek 位置不能为负",
            ));
        }
        self.pos = new_pos as usize;
        Ok(self.pos as u64)
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.pos as u64)
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// 加锁, 忽略中毒状态
#[cfg(feature = "http")]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ========================
// HTTP 流式字节源
// ========================

/// HTTP 下载共享缓冲区
#[cfg(feature = "http")]
struct HttpStreamBuffer {
    /// 已下载的数据
    data: Vec<u8>,
    /// 总大小 (来自 Content-Length)
    total_size: Option<u64>,
    /// 下载是否已结束
    finished: bool,
    /// 下载错误信息
    error: Option<String>,
    /// 连接是否已建立
    connected: bool,
    /// 是否请求中止下载
    aborted: bool,
}

#[cfg(feature = "http")]
type HttpShared = std::sync::Arc<(Mutex<HttpStreamBuffer>, std::sync::Condvar)>;

/// HTTP 流式字节源
///
/// 后台线程持续下载, 已下载区域可自由 seek, 前向 seek 等待数据到位.
#[cfg(feature = "http")]
struct HttpBackend {
    shared: HttpShared,
    pos: usize,
    total_size: Option<u64>,
}

#[cfg(feature = "http")]
impl HttpBackend {
    fn open(url: &str) -> io::Result<Self> {
        let shared: HttpShared = std::sync::Arc::new((
            Mutex::new(HttpStreamBuffer {
                data: Vec::new(),
                total_size: None,
                finished: false,
                error: None,
                connected: false,
                aborted: false,
            }),
            std::sync::Condvar::new(),
        ));

        let worker_shared = std::sync::Arc::clone(&shared);
        let url_owned = url.to_string();
        std::thread::Builder::new()
            .name("md-http".into())
            .spawn(move || http_download_worker(&url_owned, &worker_shared))?;

        let (mutex, cvar) = &*shared;
        let mut sb = lock(mutex);
        while !sb.connected && !sb.finished {
            sb = cvar.wait(sb).unwrap_or_else(PoisonError::into_inner);
        }
        if let Some(ref err) = sb.error {
            return Err(io::Error::other(err.clone()));
        }
        let total_size = sb.total_size;
        drop(sb);

        Ok(Self {
            shared,
            pos: 0,
            total_size,
        })
    }
}

#[cfg(feature = "http")]
impl Drop for HttpBackend {
    fn drop(&mut self) {
        let (mutex, cvar) = &*self.shared;
        lock(mutex).aborted = true;
        cvar.notify_all();
    }
}

#[cfg(feature = "http")]
impl IoBackend for HttpBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let (mutex, cvar) = &*self.shared;
        let mut sb = lock(mutex);
        loop {
            if self.pos < sb.data.len() {
                let to_read = buf.len().min(sb.data.len() - self.pos);
                buf[..to_read].copy_from_slice(&sb.data[self.pos..self.pos + to_read]);
                self.pos += to_read;
                return Ok(to_read);
            }
            if sb.finished {
                if let Some(ref err) = sb.error {
                    return Err(io::Error::other(err.clone()));
                }
                return Ok(0);
            }
            sb = cvar.wait(sb).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            io::SeekFrom::Start(offset) => offset as i64,
            io::SeekFrom::End(offset) => {
                let size = self.total_size.ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::Unsupported,
                        "HTTP: 文件大小未知, 无法从末尾 seek",
                    )
                })?;
                size as i64 + offset
            }
            io::SeekFrom::Current(offset) => self.pos as i64 + offset,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek 位置不能为负",
            ));
        }
        self.pos = new_pos as usize;
        Ok(self.pos as u64)
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.pos as u64)
    }

    fn size(&self) -> Option<u64> {
        self.total_size
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// HTTP 后台下载线程
#[cfg(feature = "http")]
fn http_download_worker(url: &str, shared: &HttpShared) {
    let (mutex, cvar) = &**shared;

    let mut response = match ureq::get(url).call() {
        Ok(resp) => resp,
        Err(e) => {
            let mut sb = lock(mutex);
            sb.error = Some(format!("HTTP 请求失败: {}", e));
            sb.finished = true;
            sb.connected = true;
            cvar.notify_all();
            return;
        }
    };

    let content_length = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    {
        let mut sb = lock(mutex);
        sb.total_size = content_length;
        sb.connected = true;
        cvar.notify_all();
    }
    log::info!("HTTP 连接成功, 内容大小: {:?}", content_length);

    const CHUNK_SIZE: usize = 32 * 1024;
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut reader = response.body_mut().as_reader();
    loop {
        if lock(mutex).aborted {
            log::debug!("HTTP 下载被中止");
            return;
        }
        let result = reader.read(&mut chunk);
        let mut sb = lock(mutex);
        match result {
            Ok(0) => {
                log::info!("HTTP 下载完成, 共 {} 字节", sb.data.len());
                sb.finished = true;
                cvar.notify_all();
                return;
            }
            Ok(n) => {
                sb.data.extend_from_slice(&chunk[..n]);
                cvar.notify_all();
            }
            Err(e) => {
                log::error!("HTTP 下载错误: {}", e);
                sb.error = Some(format!("网络读取错误: {}", e));
                sb.finished = true;
                cvar.notify_all();
                return;
            }
        }
    }
}
