//! 单槽应答邮箱
//!
//! 读线程是唯一的生产者，`Transport::send` 是唯一的消费者。
//! 新消息覆盖未取走的旧消息（半双工协议下不会有两条未消费的应答）。

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// 应答槽
#[derive(Debug, Default)]
pub struct ResponseSlot {
    slot: Mutex<Option<String>>,
    ready: Condvar,
}

impl ResponseSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 放入消息（覆盖旧消息）并唤醒等待者
    pub fn put(&self, message: String) {
        let mut slot = self.slot.lock();
        if let Some(stale) = slot.replace(message) {
            debug!("Overwriting unconsumed response '{}'", stale);
        }
        self.ready.notify_one();
    }

    /// 取出消息，最多等待 `timeout`
    pub fn take_timeout(&self, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        loop {
            if let Some(message) = slot.take() {
                return Some(message);
            }
            if self.ready.wait_until(&mut slot, deadline).timed_out() {
                return slot.take();
            }
        }
    }

    /// 丢弃未消费的消息
    pub fn clear(&self) {
        self.slot.lock().take();
    }
}
