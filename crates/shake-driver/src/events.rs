//! 事件总线
//!
//! 读线程（状态、限位、错误）、重连状态机和上层控制器都向同一条无界 FIFO 推送事件，
//! 由一个消费者（外部推送流）取走。消费者等待超时时合成一个 `heartbeat` 事件，
//! 携带当前连接状态，使推送流在没有硬件事件时也不会沉默。

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 默认心跳间隔（消费者等待超时）
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(500);

/// 限位事件的负载文本
pub const LIMIT_PAYLOAD: &str = "Limit switch triggered";

/// 对外可见的连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

impl LinkStatus {
    pub fn from_connected(connected: bool) -> Self {
        if connected {
            Self::Connected
        } else {
            Self::Disconnected
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// 连接状态变化
    Status(LinkStatus),
    /// 错误描述
    Error(String),
    /// 限位开关触发
    LimitTriggered,
    /// 消费者合成的保活事件
    Heartbeat(LinkStatus),
}

impl Event {
    /// 事件类型名
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Status(_) => "status",
            Event::Error(_) => "error",
            Event::LimitTriggered => "limit_triggered",
            Event::Heartbeat(_) => "heartbeat",
        }
    }

    /// 事件负载（短字符串）
    pub fn payload(&self) -> &str {
        match self {
            Event::Status(status) | Event::Heartbeat(status) => status.as_str(),
            Event::Error(message) => message,
            Event::LimitTriggered => LIMIT_PAYLOAD,
        }
    }

    /// 渲染为 server-sent-event 文本块
    ///
    /// ```
    /// use shake_driver::events::{Event, LinkStatus};
    ///
    /// assert_eq!(
    ///     Event::Status(LinkStatus::Connected).to_sse(),
    ///     "event: status\ndata: connected\n\n"
    /// );
    /// ```
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.kind(), self.payload())
    }
}

/// 事件总线（克隆后共享同一队列）
#[derive(Clone)]
pub struct EventBus {
    tx: Sender<Event>,
    rx: Receiver<Event>,
    last_status: Arc<Mutex<Option<LinkStatus>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            last_status: Arc::new(Mutex::new(None)),
        }
    }

    /// 推送任意事件（不去重）
    pub fn push(&self, event: Event) {
        // 总线自己持有接收端，发送不会失败
        let _ = self.tx.send(event);
    }

    /// 报告连接状态
    ///
    /// 与上一次报告的状态相同时整体忽略（包括 `error`），否则推送 `status`，
    /// 有错误描述时紧跟一个 `error`。返回是否推送。
    pub fn report_status(&self, status: LinkStatus, error: Option<String>) -> bool {
        let mut last = self.last_status.lock();
        if *last == Some(status) {
            return false;
        }
        *last = Some(status);
        self.push(Event::Status(status));
        if let Some(message) = error {
            self.push(Event::Error(message));
        }
        info!("Status updated to: {}", status);
        true
    }

    /// 最近一次报告的状态
    pub fn last_status(&self) -> Option<LinkStatus> {
        *self.last_status.lock()
    }

    /// 非阻塞取出当前排队的所有事件
    pub fn drain(&self) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return events,
            }
        }
    }

    /// 创建消费者
    ///
    /// `probe` 在等待超时时调用，用于填充 `heartbeat` 的连接状态。
    pub fn subscribe<F>(&self, heartbeat_timeout: Duration, probe: F) -> EventStream
    where
        F: Fn() -> LinkStatus + Send + Sync + 'static,
    {
        EventStream {
            rx: self.rx.clone(),
            heartbeat_timeout,
            probe: Arc::new(probe),
        }
    }
}

/// 事件消费者
///
/// 作为迭代器使用时永不结束（每个等待超时产出一个 `heartbeat`）。
pub struct EventStream {
    rx: Receiver<Event>,
    heartbeat_timeout: Duration,
    probe: Arc<dyn Fn() -> LinkStatus + Send + Sync>,
}

impl EventStream {
    /// 取下一个事件；超时则合成 `heartbeat`
    pub fn next_event(&self) -> Event {
        match self.rx.recv_timeout(self.heartbeat_timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                Event::Heartbeat((self.probe)())
            },
        }
    }
}

impl Iterator for EventStream {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        Some(self.next_event())
    }
}
