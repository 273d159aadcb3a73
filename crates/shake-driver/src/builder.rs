//! Builder 模式实现
//!
//! 提供链式构造 `Transport` 实例的便捷方式。

use crate::error::DriverError;
use crate::events::EventBus;
use crate::mailbox::ResponseSlot;
use crate::pipeline::{LinkContext, ReconnectPolicy};
use crate::state::AtomicLinkState;
use crate::transport::Transport;
use parking_lot::Mutex;
use shake_protocol::DEFAULT_ACK;
use shake_serial::{SerialConnector, SerialPortConnector};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::{Span, info_span};

/// 默认命令应答超时
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use shake_driver::{ReconnectPolicy, TransportBuilder};
/// use std::time::Duration;
///
/// let transport = TransportBuilder::new()
///     .port("/dev/ttyACM0", 115_200)
///     .ack("OK")
///     .reconnect(ReconnectPolicy {
///         max_attempts: 5,
///         delay: Duration::from_secs(5),
///     })
///     .build()
///     .unwrap();
///
/// if transport.open(Duration::from_secs(60)) {
///     let reply = transport.send("STOP", Duration::from_secs(5));
/// }
/// ```
pub struct TransportBuilder {
    connector: Option<Arc<dyn SerialConnector>>,
    ack: String,
    command_timeout: Duration,
    reconnect: ReconnectPolicy,
    span: Option<Span>,
    event_bus: Option<EventBus>,
}

impl TransportBuilder {
    pub fn new() -> Self {
        Self {
            connector: None,
            ack: DEFAULT_ACK.to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            span: None,
            event_bus: None,
        }
    }

    /// 使用真实串口
    pub fn port(self, path: impl Into<String>, baud_rate: u32) -> Self {
        self.connector(Arc::new(SerialPortConnector::new(path, baud_rate)))
    }

    /// 使用任意连接器（测试时传入 mock）
    pub fn connector(mut self, connector: Arc<dyn SerialConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// 握手应答（默认 `OK`，大小写不敏感）
    pub fn ack(mut self, ack: impl Into<String>) -> Self {
        self.ack = ack.into();
        self
    }

    /// 默认命令应答超时（`open` 内发送 `CONF` 时使用）
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// 重连策略
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// 日志 span
    ///
    /// Transport（包括读线程）的所有日志都挂在这个 span 下。
    /// 未设置时使用以设备描述命名的 `serial_link` span。
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// 共享的事件总线（未设置时新建）
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// 打开设备并启动读线程
    ///
    /// 成功后链路处于 `Connecting`，需要调用 [`Transport::open`] 完成握手。
    pub fn build(self) -> Result<Transport, DriverError> {
        let connector = self
            .connector
            .ok_or_else(|| DriverError::InvalidInput("no serial port configured".into()))?;
        let span = self
            .span
            .unwrap_or_else(|| info_span!("serial_link", device = %connector.describe()));

        let ctx = LinkContext {
            state: Arc::new(AtomicLinkState::default()),
            slot: ResponseSlot::new(),
            writer: Mutex::new(None),
            bus: self.event_bus.unwrap_or_default(),
            connector,
            reconnect: self.reconnect,
            ack: self.ack,
            ack_seen: AtomicBool::new(false),
            span,
        };
        Transport::start(ctx, self.command_timeout)
    }
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
