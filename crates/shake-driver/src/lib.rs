//! 驱动层模块
//!
//! 本模块提供振动台微控制器的串口链路管理，包括：
//! - 读线程管理（字节分帧、消息分发）
//! - 半双工请求/应答（单槽邮箱 + 超时）
//! - 有界重连状态机
//! - 事件总线（状态、错误、限位、心跳）
//!
//! 大多数用户应该使用 `shake-client` 提供的 `ShakeTable`。

mod builder;
mod error;
pub mod events;
pub mod mailbox;
pub mod pipeline;
pub mod state;
mod transport;

pub use builder::{DEFAULT_COMMAND_TIMEOUT, TransportBuilder};
pub use error::DriverError;
pub use events::{DEFAULT_HEARTBEAT_TIMEOUT, Event, EventBus, EventStream, LinkStatus};
pub use mailbox::ResponseSlot;
pub use pipeline::ReconnectPolicy;
pub use state::{AtomicLinkState, LinkState};
pub use transport::Transport;
