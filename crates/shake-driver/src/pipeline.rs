//! 读线程循环
//!
//! 读线程独占串口读半边：字节 → [`LineFramer`] → 分类后分发到应答槽或事件总线。
//! 检测到串口故障时在本线程内执行有界重连，成功后换上新的句柄继续读取。

use crate::events::{Event, EventBus, LinkStatus};
use crate::mailbox::ResponseSlot;
use crate::state::{AtomicLinkState, LinkState};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::Mutex;
use shake_protocol::{Command, DecodedMessage, LineFramer};
use shake_serial::{RxLink, SerialConnector, SerialError, TxLink};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{Span, debug, error, info, trace, warn};

/// 重连策略
///
/// # Example
///
/// ```
/// use shake_driver::ReconnectPolicy;
/// use std::time::Duration;
///
/// let policy = ReconnectPolicy {
///     max_attempts: 3,
///     delay: Duration::from_secs(1),
/// };
/// assert_eq!(ReconnectPolicy::default().max_attempts, 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// 最大尝试次数
    pub max_attempts: u32,
    /// 两次尝试之间的等待
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

/// 读线程与调用线程共享的链路上下文
pub(crate) struct LinkContext {
    pub state: Arc<AtomicLinkState>,
    pub slot: ResponseSlot,
    /// 写半边；重连期间为 `None`
    pub writer: Mutex<Option<Box<dyn TxLink>>>,
    pub bus: EventBus,
    pub connector: Arc<dyn SerialConnector>,
    pub reconnect: ReconnectPolicy,
    pub ack: String,
    /// `Connecting` 期间收到过握手应答
    pub ack_seen: AtomicBool,
    pub span: Span,
}

const READ_BUF_LEN: usize = 64;

/// 读线程主循环
///
/// `shutdown` 的发送端被丢弃时退出。
pub(crate) fn reader_loop(
    mut rx: Box<dyn RxLink>,
    ctx: Arc<LinkContext>,
    shutdown: Receiver<()>,
) {
    let _enter = ctx.span.enter();
    let mut framer = LineFramer::new();
    let mut buf = [0u8; READ_BUF_LEN];

    loop {
        if shutdown_requested(&shutdown) {
            trace!("Reader thread: shutdown requested");
            break;
        }

        match rx.receive(&mut buf) {
            Ok(n) => {
                for text in framer.push(&buf[..n]) {
                    dispatch(&ctx, text);
                }
            },
            Err(e) if e.is_timeout() => {},
            Err(e) => {
                if shutdown_requested(&shutdown) {
                    break;
                }
                match handle_fault(&ctx, &shutdown, e) {
                    Some(new_rx) => {
                        rx = new_rx;
                        framer.clear();
                    },
                    None => break,
                }
                continue;
            },
        }

        // `send` 写失败时把链路置为 Reconnecting，由读线程负责重连
        if ctx.state.get(Ordering::Acquire) == LinkState::Reconnecting {
            warn!("Write path failed, reconnecting");
            match reconnect(&ctx, &shutdown) {
                Some(new_rx) => {
                    rx = new_rx;
                    framer.clear();
                },
                None => break,
            }
        }
    }

    trace!("Reader thread exited");
}

fn shutdown_requested(shutdown: &Receiver<()>) -> bool {
    matches!(shutdown.try_recv(), Err(TryRecvError::Disconnected))
}

/// 限位通知直接进事件总线，其余消息进应答槽
fn dispatch(ctx: &LinkContext, text: String) {
    debug!("Decoded message: '{}'", text);
    match DecodedMessage::classify(text, &ctx.ack) {
        DecodedMessage::LimitTriggered => {
            info!("Limit trigger detected");
            ctx.bus.push(Event::LimitTriggered);
        },
        DecodedMessage::Ack(text) => {
            if ctx.state.get(Ordering::Acquire) == LinkState::Connecting {
                ctx.ack_seen.store(true, Ordering::Release);
            }
            ctx.slot.put(text);
        },
        DecodedMessage::Response(text) => ctx.slot.put(text),
    }
}

/// 处理读故障，返回重连后的读半边；`None` 表示读线程应退出
fn handle_fault(
    ctx: &LinkContext,
    shutdown: &Receiver<()>,
    err: SerialError,
) -> Option<Box<dyn RxLink>> {
    let message = format!("Serial connection issue: {}", err);
    error!("{}", message);
    ctx.writer.lock().take();

    match ctx.state.compare_exchange(
        LinkState::Connected,
        LinkState::Reconnecting,
        Ordering::AcqRel,
        Ordering::Acquire,
    ) {
        Ok(_) => {
            ctx.bus.report_status(LinkStatus::Disconnected, Some(message));
        },
        // 写失败已经报告过断开
        Err(LinkState::Reconnecting) => {},
        Err(_) => {
            // 握手完成前的故障不重连
            ctx.state.set(LinkState::Disconnected, Ordering::Release);
            return None;
        },
    }

    reconnect(ctx, shutdown)
}

fn reconnect(ctx: &LinkContext, shutdown: &Receiver<()>) -> Option<Box<dyn RxLink>> {
    let policy = ctx.reconnect;

    for attempt in 1..=policy.max_attempts {
        info!(
            "Attempting to reconnect to {} ({}/{})",
            ctx.connector.describe(),
            attempt,
            policy.max_attempts
        );
        match reopen(ctx) {
            Ok(rx) => {
                if ctx
                    .state
                    .compare_exchange(
                        LinkState::Reconnecting,
                        LinkState::Connected,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_err()
                {
                    // 重连期间被 close()
                    ctx.writer.lock().take();
                    return None;
                }
                info!("Successfully reconnected to the microcontroller");
                ctx.bus.report_status(LinkStatus::Connected, None);
                return Some(rx);
            },
            Err(e) => warn!(
                "Reconnection attempt {}/{} failed: {}",
                attempt, policy.max_attempts, e
            ),
        }

        if attempt < policy.max_attempts {
            match shutdown.recv_timeout(policy.delay) {
                Err(RecvTimeoutError::Timeout) => {},
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    let message = format!(
        "Reconnection failed after {} attempts",
        policy.max_attempts
    );
    error!("*** {}", message);
    ctx.state.set(LinkState::Disconnected, Ordering::Release);
    ctx.bus.push(Event::Error(message));
    None
}

/// 重新打开设备并补发握手确认
///
/// 读线程本身就是应答的接收者，所以这里不等待 `CONF` 的应答。
fn reopen(ctx: &LinkContext) -> Result<Box<dyn RxLink>, SerialError> {
    let (rx, mut tx) = ctx.connector.connect()?;
    ctx.slot.clear();
    tx.send(&Command::Conf.encode())?;
    *ctx.writer.lock() = Some(tx);
    Ok(rx)
}
