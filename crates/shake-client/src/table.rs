//! 振动台控制器
//!
//! `ShakeTable` 是面向外部（HTTP 层、CLI）的唯一入口：
//! - 命令方法（打开/关闭连接、批量运动、手动往复、停止、复位）都返回 [`CommandResult`]
//! - [`events`](ShakeTable::events) 提供状态/错误/限位/心跳事件流
//!
//! 所有设备访问都在同一把锁内完成，协议同一时刻只有一条命令在等待应答，
//! 并发的调用会排队而不是交错。

use crate::result::CommandResult;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use shake_driver::{
    AtomicLinkState, Event, EventBus, EventStream, LinkState, LinkStatus, ReconnectPolicy,
    Transport, TransportBuilder,
};
use shake_protocol::{Command, MotionProfile, MotionRequest};
use shake_serial::SerialConnector;
use shake_tools::TableConfig;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{Span, error, info, info_span, warn};

/// 未连接时所有命令的统一错误
pub const NOT_CONNECTED_MESSAGE: &str = "Connection not established. Ensure table is connected.";

/// 振动台控制器
pub struct ShakeTable {
    config: TableConfig,
    connector: Arc<dyn SerialConnector>,
    /// 当前链路；锁同时串行化所有设备访问
    transport: Mutex<Option<Transport>>,
    bus: EventBus,
    /// 当前链路状态句柄，心跳探测无需获取 `transport` 锁
    link: Arc<ArcSwapOption<AtomicLinkState>>,
    span: Span,
}

impl ShakeTable {
    pub(crate) fn new(
        config: TableConfig,
        connector: Arc<dyn SerialConnector>,
        bus: EventBus,
        span: Span,
    ) -> Self {
        Self {
            config,
            connector,
            transport: Mutex::new(None),
            bus,
            link: Arc::new(ArcSwapOption::empty()),
            span,
        }
    }

    /// 打开连接
    ///
    /// 已有连接会先关闭。握手成功返回 `"Connection established."`。
    pub fn open_connection(&self) -> CommandResult {
        let _enter = self.span.enter();
        let mut slot = self.transport.lock();
        if let Some(previous) = slot.take() {
            info!("Closing previous connection before reopening");
            previous.close();
        }
        self.link.store(None);

        let built = TransportBuilder::new()
            .connector(self.connector.clone())
            .ack(self.config.link.ack.clone())
            .command_timeout(self.config.command_timeout())
            .reconnect(ReconnectPolicy {
                max_attempts: self.config.link.max_reconnect_attempts,
                delay: self.config.reconnect_delay(),
            })
            .span(info_span!(parent: &self.span, "serial_link", device = %self.connector.describe()))
            .event_bus(self.bus.clone())
            .build();

        let transport = match built {
            Ok(transport) => transport,
            Err(e) => {
                let message = format!("Failed to open connection: {}", e);
                error!("{}", message);
                self.bus
                    .report_status(LinkStatus::Disconnected, Some(message.clone()));
                return CommandResult::error(message);
            },
        };

        if transport.open(self.config.connection_timeout()) {
            self.bus.report_status(LinkStatus::Connected, None);
            self.link.store(Some(transport.state_handle()));
            *slot = Some(transport);
            CommandResult::success("Connection established.")
        } else {
            self.bus.report_status(
                LinkStatus::Disconnected,
                Some("Failed to establish connection".to_string()),
            );
            transport.close();
            CommandResult::error("Failed to establish connection.")
        }
    }

    /// 关闭连接
    pub fn close_connection(&self) -> CommandResult {
        let _enter = self.span.enter();
        let mut slot = self.transport.lock();
        self.link.store(None);
        match slot.take() {
            Some(transport) => {
                transport.close();
                info!("Connection closed.");
                CommandResult::success("Connection closed.")
            },
            None => CommandResult::success("No connection to close."),
        }
    }

    /// 发送批量运动命令
    ///
    /// 先发 `BATCH_SIZE n`，再按顺序逐条发送，相邻命令间隔固定时间。
    /// 任一命令没有应答时立即中止，后续命令不再发送。
    pub fn send_movement_batch<S: AsRef<str>>(&self, commands: &[S]) -> CommandResult {
        let _enter = self.span.enter();
        let slot = self.transport.lock();
        let transport = match connected(&slot) {
            Some(transport) => transport,
            None => return CommandResult::error(NOT_CONNECTED_MESSAGE),
        };

        let total = commands.len();
        let header = Command::BatchSize(total).to_string();
        info!("Sending batch size: {}", header);
        if let Err(e) = transport.send_default(&header) {
            let message = format!("Failed to send batch header: {}", header);
            error!("{} ({})", message, e);
            return CommandResult::error(message);
        }

        let interval = self.config.command_interval();
        for (i, command) in commands.iter().enumerate() {
            let command = command.as_ref().trim();
            if let Err(e) = transport.send_default(command) {
                let message = format!("Failed to send command {}/{}: {}", i + 1, total, command);
                error!("{} ({})", message, e);
                return CommandResult::error(message);
            }
            if i + 1 < total {
                spin_sleep::sleep(interval);
            }
        }

        info!("Successfully sent batch of {} commands", total);
        CommandResult::success(format!("Batch of {} commands sent.", total))
    }

    /// 手动往复运动
    ///
    /// 位移（mm）按 `steps_per_mm` 换算为步数，最大加速度按同一系数换算为 steps/s²。
    /// 加速度不足时直接返回计算错误，不触碰串口。
    pub fn run_manual_routine(&self, frequency_hz: f64, displacement_mm: f64) -> CommandResult {
        let _enter = self.span.enter();
        let slot = self.transport.lock();
        let transport = match connected(&slot) {
            Some(transport) => transport,
            None => return CommandResult::error(NOT_CONNECTED_MESSAGE),
        };

        let request = MotionRequest::from_millimeters(
            frequency_hz,
            displacement_mm,
            self.config.table.steps_per_mm,
        );
        let profile = match MotionProfile::compute(request, self.config.max_acceleration_steps()) {
            Ok(profile) => profile,
            Err(e) => {
                let message = e.to_string();
                error!("{}", message);
                return CommandResult::error(message);
            },
        };

        let command = profile.manual_command();
        info!("Manual command: {}", command);
        match transport.send_default(&command.to_string()) {
            Ok(response) => {
                info!("Manual routine response: {}", response);
                CommandResult::success(format!("Manual routine started. Response: {}", response))
            },
            Err(e) => send_failure(&command, e),
        }
    }

    /// 停止
    pub fn stop_table(&self) -> CommandResult {
        self.simple_command(Command::Stop, "Stop")
    }

    /// 复位
    pub fn reset_table(&self) -> CommandResult {
        self.simple_command(Command::Reset, "Reset")
    }

    fn simple_command(&self, command: Command, label: &str) -> CommandResult {
        let _enter = self.span.enter();
        let slot = self.transport.lock();
        let transport = match connected(&slot) {
            Some(transport) => transport,
            None => return CommandResult::error(NOT_CONNECTED_MESSAGE),
        };

        match transport.send_default(&command.to_string()) {
            Ok(response) => {
                info!("{} command sent. Response: {}", label, response);
                CommandResult::success(format!("{} command sent. Response: {}", label, response))
            },
            Err(e) => send_failure(&command, e),
        }
    }

    /// 向事件流推送一条操作员告警（`error` 事件）
    pub fn raise_alert(&self, message: impl Into<String>) {
        let message = message.into();
        let _enter = self.span.enter();
        warn!("Alert: {}", message);
        self.bus.push(Event::Error(message));
    }

    /// 对外可见的连接标志（不等待正在进行的命令）
    pub fn is_connected(&self) -> bool {
        probe(&self.link) == LinkStatus::Connected
    }

    /// 当前链路状态
    pub fn link_state(&self) -> LinkState {
        self.link
            .load_full()
            .map_or(LinkState::Disconnected, |state| state.get(Ordering::Acquire))
    }

    /// 事件流（超时间隔取自配置，超时合成心跳）
    pub fn events(&self) -> EventStream {
        let link = self.link.clone();
        self.bus
            .subscribe(self.config.heartbeat_timeout(), move || probe(&link))
    }

    /// 事件总线（供外部生产者使用）
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }
}

/// 连接可用（未断开）时返回 Transport
///
/// `Reconnecting` 也返回：`send` 自己会等待重连或超时。
fn connected(slot: &Option<Transport>) -> Option<&Transport> {
    slot.as_ref()
        .filter(|transport| transport.state() != LinkState::Disconnected)
}

fn probe(link: &ArcSwapOption<AtomicLinkState>) -> LinkStatus {
    LinkStatus::from_connected(
        link.load_full()
            .is_some_and(|state| state.get(Ordering::Acquire).is_connected()),
    )
}

fn send_failure(command: &Command, cause: shake_driver::DriverError) -> CommandResult {
    let message = format!("Failed to send command: {} ({})", command, cause);
    error!("{}", message);
    CommandResult::error(message)
}
