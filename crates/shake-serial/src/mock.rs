//! Mock 串口设备（无硬件依赖）
//!
//! [`MockDevice`] 模拟一块微控制器：测试代码可以注入设备发出的行、
//! 为主机写入的每条命令安排应答、模拟拔线和重新插上。
//! [`MockConnector`] 把它接入驱动层，与真实串口走同一条路径。

use crate::{LinkPair, RxLink, SerialConnector, SerialError, TxLink};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// 应答回调：输入主机写入的一行（不含换行符），返回设备要回复的行
type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

struct DeviceInner {
    /// 设备 → 主机的待读字节
    incoming: VecDeque<u8>,
    /// 主机 → 设备的已写入行
    written: Vec<String>,
    responder: Option<Responder>,
    /// 每次断线加一，旧连接的句柄随之失效
    generation: u64,
    available: bool,
    pending_connect_failures: u32,
    connect_count: u32,
    write_fault: bool,
    greeting: Option<String>,
}

struct DeviceShared {
    inner: Mutex<DeviceInner>,
    readable: Condvar,
}

/// 模拟设备（克隆后共享同一状态）
#[derive(Clone)]
pub struct MockDevice {
    shared: Arc<DeviceShared>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// 创建已插入、无应答回调的设备
    pub fn new() -> Self {
        Self {
            shared: Arc::new(DeviceShared {
                inner: Mutex::new(DeviceInner {
                    incoming: VecDeque::new(),
                    written: Vec::new(),
                    responder: None,
                    generation: 0,
                    available: true,
                    pending_connect_failures: 0,
                    connect_count: 0,
                    write_fault: false,
                    greeting: None,
                }),
                readable: Condvar::new(),
            }),
        }
    }

    /// 设备发出一行（自动追加 `\n`）
    pub fn push_line(&self, line: &str) {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.push_bytes(&bytes);
    }

    /// 设备发出原始字节
    pub fn push_bytes(&self, bytes: &[u8]) {
        let mut inner = self.shared.inner.lock();
        inner.incoming.extend(bytes.iter().copied());
        self.shared.readable.notify_all();
    }

    /// 设置应答回调
    ///
    /// 回调在设备锁内执行，不能再调用同一个 `MockDevice` 的方法。
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        self.shared.inner.lock().responder = Some(Box::new(responder));
    }

    /// 每次连接成功后设备主动发送的一行（如握手 `OK`）
    pub fn greet_on_connect(&self, greeting: Option<String>) {
        self.shared.inner.lock().greeting = greeting;
    }

    /// 主机已写入的所有行（按顺序，不含换行符）
    pub fn written_lines(&self) -> Vec<String> {
        self.shared.inner.lock().written.clone()
    }

    /// 清空写入记录
    pub fn clear_written(&self) {
        self.shared.inner.lock().written.clear();
    }

    /// 模拟拔线：现有句柄全部失效，之后的连接尝试失败直到 [`plug_in`](Self::plug_in)
    pub fn disconnect(&self) {
        let mut inner = self.shared.inner.lock();
        inner.generation += 1;
        inner.available = false;
        inner.incoming.clear();
        self.shared.readable.notify_all();
    }

    /// 模拟瞬时故障：现有句柄失效，但设备仍可立即重新连接
    pub fn interrupt(&self) {
        let mut inner = self.shared.inner.lock();
        inner.generation += 1;
        inner.incoming.clear();
        self.shared.readable.notify_all();
    }

    /// 重新插上
    pub fn plug_in(&self) {
        self.shared.inner.lock().available = true;
    }

    /// 接下来 `n` 次连接尝试失败
    pub fn fail_connects(&self, n: u32) {
        self.shared.inner.lock().pending_connect_failures = n;
    }

    /// 成功连接次数
    pub fn connect_count(&self) -> u32 {
        self.shared.inner.lock().connect_count
    }

    /// 让写入返回 IO 错误
    pub fn fail_writes(&self, fail: bool) {
        self.shared.inner.lock().write_fault = fail;
    }

    fn open_link(&self, read_timeout: Duration) -> Result<LinkPair, SerialError> {
        let mut inner = self.shared.inner.lock();
        if !inner.available {
            return Err(SerialError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "mock device unplugged",
            )));
        }
        if inner.pending_connect_failures > 0 {
            inner.pending_connect_failures -= 1;
            return Err(SerialError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "mock device busy",
            )));
        }
        inner.connect_count += 1;
        if let Some(greeting) = inner.greeting.clone() {
            inner.incoming.extend(greeting.as_bytes().iter().copied());
            inner.incoming.push_back(b'\n');
            self.shared.readable.notify_all();
        }
        let generation = inner.generation;
        Ok((
            Box::new(MockRx {
                device: self.clone(),
                generation,
                read_timeout,
            }),
            Box::new(MockTx {
                device: self.clone(),
                generation,
            }),
        ))
    }
}

struct MockRx {
    device: MockDevice,
    generation: u64,
    read_timeout: Duration,
}

impl RxLink for MockRx {
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        let shared = &self.device.shared;
        let mut inner = shared.inner.lock();
        loop {
            if inner.generation != self.generation {
                return Err(SerialError::Disconnected);
            }
            if !inner.incoming.is_empty() {
                let n = buf.len().min(inner.incoming.len());
                for (slot, byte) in buf.iter_mut().zip(inner.incoming.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            if shared.readable.wait_for(&mut inner, self.read_timeout).timed_out()
                && inner.incoming.is_empty()
                && inner.generation == self.generation
            {
                return Err(SerialError::Timeout);
            }
        }
    }
}

struct MockTx {
    device: MockDevice,
    generation: u64,
}

impl TxLink for MockTx {
    fn send(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        let shared = &self.device.shared;
        let mut inner = shared.inner.lock();
        if inner.generation != self.generation {
            return Err(SerialError::Disconnected);
        }
        if inner.write_fault {
            return Err(SerialError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock write fault",
            )));
        }

        let line = String::from_utf8_lossy(bytes)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        inner.written.push(line.clone());

        let replies = match inner.responder.as_mut() {
            Some(responder) => responder(&line),
            None => Vec::new(),
        };
        for reply in replies {
            inner.incoming.extend(reply.as_bytes().iter().copied());
            inner.incoming.push_back(b'\n');
        }
        shared.readable.notify_all();
        Ok(())
    }
}

/// Mock 连接器
#[derive(Clone)]
pub struct MockConnector {
    device: MockDevice,
    read_timeout: Duration,
}

impl MockConnector {
    /// 默认读超时 20ms
    pub fn new(device: MockDevice) -> Self {
        Self {
            device,
            read_timeout: Duration::from_millis(20),
        }
    }

    /// 设置读超时
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// 被模拟的设备
    pub fn device(&self) -> &MockDevice {
        &self.device
    }
}

impl SerialConnector for MockConnector {
    fn connect(&self) -> Result<LinkPair, SerialError> {
        self.device.open_link(self.read_timeout)
    }

    fn describe(&self) -> String {
        "mock serial device".to_string()
    }
}
