//! 串口传输层
//!
//! `Transport` 拥有一条到微控制器的串口链路：
//! - 构造时打开设备并启动读线程（`Disconnected → Connecting`）
//! - [`open`](Transport::open) 等待设备的握手应答，回复 `CONF`（`Connecting → Connected`）
//! - [`send`](Transport::send) 写入一行命令并阻塞等待下一条应答（半双工）
//! - [`close`](Transport::close) 停止读线程并释放句柄（幂等，Drop 时自动调用）

use crate::error::DriverError;
use crate::events::{EventBus, LinkStatus};
use crate::pipeline::{LinkContext, reader_loop};
use crate::state::{AtomicLinkState, LinkState};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use shake_protocol::{Command, encode_line};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 带超时的线程 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        let (tx, rx) = crossbeam_channel::bounded(1);

        // 看门狗线程代为 join，调用方只等待有限时间
        spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(Box::new(
                std::io::Error::new(std::io::ErrorKind::TimedOut, "Thread join timeout"),
            )),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(Box::new(
                std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "Thread panicked during join",
                ),
            )),
        }
    }
}

const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 握手等待时检查应答标志的间隔
const HANDSHAKE_POLL: Duration = Duration::from_millis(5);

/// 重连期间 `send` 轮询链路状态的间隔
const RECONNECT_POLL: Duration = Duration::from_millis(10);

/// 串口传输层
pub struct Transport {
    ctx: Arc<LinkContext>,
    command_timeout: Duration,
    /// 半双工：同一时刻只允许一个 `send` 等待应答
    in_flight: Mutex<()>,
    /// 丢弃即通知读线程退出
    shutdown_tx: Mutex<Option<Sender<()>>>,
    reader_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Transport {
    /// 打开设备并启动读线程（由 `TransportBuilder::build` 调用）
    pub(crate) fn start(ctx: LinkContext, command_timeout: Duration) -> Result<Self, DriverError> {
        let span = ctx.span.clone();
        let _enter = span.enter();

        ctx.state.set(LinkState::Connecting, Ordering::Release);
        let (rx, tx) = match ctx.connector.connect() {
            Ok(pair) => pair,
            Err(e) => {
                ctx.state.set(LinkState::Disconnected, Ordering::Release);
                error!(
                    "Could not open serial port {}: {}",
                    ctx.connector.describe(),
                    e
                );
                return Err(e.into());
            },
        };
        *ctx.writer.lock() = Some(tx);

        let ctx = Arc::new(ctx);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let reader_ctx = ctx.clone();
        let reader_thread = std::thread::Builder::new()
            .name("shake-reader".into())
            .spawn(move || reader_loop(rx, reader_ctx, shutdown_rx))
            .map_err(|e| {
                ctx.state.set(LinkState::Disconnected, Ordering::Release);
                DriverError::IoThread(e.to_string())
            })?;

        debug!("Reader thread started for {}", ctx.connector.describe());

        Ok(Self {
            ctx,
            command_timeout,
            in_flight: Mutex::new(()),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            reader_thread: Mutex::new(Some(reader_thread)),
        })
    }

    /// 等待握手
    ///
    /// 最多等待 `timeout` 直到设备发出握手应答，然后回复 `CONF` 并进入 `Connected`。
    /// 超时不会返回错误：链路标记为 `Disconnected`，调用方检查返回值或 [`is_connected`](Self::is_connected)。
    pub fn open(&self, timeout: Duration) -> bool {
        let _enter = self.ctx.span.enter();
        info!(
            "Waiting for '{}' from device on {} ...",
            self.ctx.ack,
            self.ctx.connector.describe()
        );

        // 读线程在 Connecting 期间看到握手应答时置位，之后到达的其他消息不会覆盖它
        let deadline = Instant::now() + timeout;
        let mut acknowledged = false;
        loop {
            if self.ctx.ack_seen.load(Ordering::Acquire) {
                acknowledged = true;
                break;
            }
            let now = Instant::now();
            if now >= deadline || self.state() == LinkState::Disconnected {
                break;
            }
            spin_sleep::sleep((deadline - now).min(HANDSHAKE_POLL));
        }

        if !acknowledged {
            error!("*** Unable to establish connection within {:?}", timeout);
            self.ctx.state.set(LinkState::Disconnected, Ordering::Release);
            return false;
        }

        info!("Handshake received, sending CONF");
        if let Err(e) = self.send(&Command::Conf.to_string(), self.command_timeout) {
            warn!("No reply to CONF: {}", e);
        }

        // 握手期间读线程检测到故障时状态已是 Disconnected
        if self
            .ctx
            .state
            .compare_exchange(
                LinkState::Connecting,
                LinkState::Connected,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            error!("*** Link dropped during handshake");
            return false;
        }

        info!("Connection established");
        self.ctx.bus.report_status(LinkStatus::Connected, None);
        true
    }

    /// 发送一行命令并等待应答
    ///
    /// 自动补齐行结束符。发送前清空应答槽，旧命令迟到的应答不会被当作本命令的应答。
    ///
    /// # 错误
    /// - `DriverError::NotConnected`: 链路未建立或重连已耗尽
    /// - `DriverError::Busy`: 另一个 `send` 正在等待应答
    /// - `DriverError::Timeout`: `timeout` 内没有应答（连接状态不变），或重连未在 `timeout` 内完成
    /// - `DriverError::Serial`: 写入失败（对外报告断开，读线程随后重连）
    pub fn send(&self, message: &str, timeout: Duration) -> Result<String, DriverError> {
        let _enter = self.ctx.span.enter();
        let _in_flight = self.in_flight.try_lock().ok_or(DriverError::Busy)?;
        let command = message.trim_end();

        self.wait_writable(timeout)?;
        self.ctx.slot.clear();

        let write_result = match self.ctx.writer.lock().as_mut() {
            Some(tx) => tx.send(&encode_line(command)),
            None => return Err(DriverError::NotConnected),
        };
        if let Err(e) = write_result {
            let text = format!("Failed to send message: {}", e);
            error!("{}", text);
            self.ctx.writer.lock().take();
            self.write_fault(text);
            return Err(e.into());
        }
        debug!("Sent '{}'", command);

        match self.ctx.slot.take_timeout(timeout) {
            Some(reply) => {
                debug!("Response to '{}': '{}'", command, reply);
                Ok(reply)
            },
            None => {
                warn!("Timeout waiting for response to message: {}", command);
                Err(DriverError::Timeout)
            },
        }
    }

    /// 写失败：已连接的链路交给读线程重连，握手期间的失败直接断开
    fn write_fault(&self, text: String) {
        match self.ctx.state.compare_exchange(
            LinkState::Connected,
            LinkState::Reconnecting,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.ctx
                    .bus
                    .report_status(LinkStatus::Disconnected, Some(text));
            },
            Err(LinkState::Reconnecting) => {},
            Err(_) => {
                self.ctx.state.set(LinkState::Disconnected, Ordering::Release);
            },
        }
    }

    /// 使用默认命令超时发送
    pub fn send_default(&self, message: &str) -> Result<String, DriverError> {
        self.send(message, self.command_timeout)
    }

    /// 重连期间等待链路恢复
    fn wait_writable(&self, timeout: Duration) -> Result<(), DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.state() {
                LinkState::Disconnected => return Err(DriverError::NotConnected),
                LinkState::Connecting | LinkState::Connected => return Ok(()),
                LinkState::Reconnecting => {
                    if Instant::now() >= deadline {
                        warn!("Link still reconnecting after {:?}", timeout);
                        return Err(DriverError::Timeout);
                    }
                    spin_sleep::sleep(RECONNECT_POLL);
                },
            }
        }
    }

    /// 关闭链路（幂等）
    ///
    /// 只有关闭前处于 `Connected` 时才报告 `status(disconnected)`。
    pub fn close(&self) {
        let _enter = self.ctx.span.enter();
        let previous = self.ctx.state.set(LinkState::Disconnected, Ordering::AcqRel);
        self.ctx.writer.lock().take();

        // 丢弃发送端，读线程在下一个读超时内退出
        drop(self.shutdown_tx.lock().take());

        if let Some(handle) = self.reader_thread.lock().take() {
            if let Err(_e) = handle.join_timeout(JOIN_TIMEOUT) {
                error!(
                    "Reader thread panicked or failed to shut down within {:?}",
                    JOIN_TIMEOUT
                );
            }
            info!("Serial connection closed.");
        }

        if previous == LinkState::Connected {
            self.ctx.bus.report_status(LinkStatus::Disconnected, None);
        }
    }

    /// 当前链路状态
    pub fn state(&self) -> LinkState {
        self.ctx.state.get(Ordering::Acquire)
    }

    /// 对外可见的连接标志
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// 共享的状态句柄（用于心跳探测，不持有 Transport 本身）
    pub fn state_handle(&self) -> Arc<AtomicLinkState> {
        self.ctx.state.clone()
    }

    /// 事件总线
    pub fn event_bus(&self) -> &EventBus {
        &self.ctx.bus
    }

    /// 默认命令超时
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// 设备描述
    pub fn describe(&self) -> String {
        self.ctx.connector.describe()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}
