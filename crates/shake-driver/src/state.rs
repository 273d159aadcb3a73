//! 链路状态定义
//!
//! ```text
//! Disconnected → Connecting → Connected ⇄ Reconnecting
//!       ↑             │            │            │
//!       └─────────────┴────────────┴────────────┘
//! ```
//!
//! `Reconnecting` 只能从 `Connected` 进入（读线程检测到串口故障）。

use std::sync::atomic::{AtomicU8, Ordering};

/// 链路状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LinkState {
    /// 未连接（初始状态，或重连耗尽后的终态）
    #[default]
    Disconnected = 0,
    /// 串口已打开，等待握手
    Connecting = 1,
    /// 握手完成
    Connected = 2,
    /// 读线程正在重连
    Reconnecting = 3,
}

impl LinkState {
    /// 从 u8 转换
    ///
    /// 如果值无效，返回 Disconnected。
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            _ => Self::Disconnected,
        }
    }

    /// 转换为 u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 对外可见的“已连接”标志
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// 小写名称（用于日志）
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// 链路状态（原子版本，读线程与调用线程共享）
///
/// # 示例
///
/// ```rust
/// use shake_driver::state::{AtomicLinkState, LinkState};
/// use std::sync::atomic::Ordering;
///
/// let state = AtomicLinkState::new(LinkState::Connecting);
/// assert!(state
///     .compare_exchange(LinkState::Connecting, LinkState::Connected, Ordering::AcqRel, Ordering::Acquire)
///     .is_ok());
/// assert_eq!(state.get(Ordering::Acquire), LinkState::Connected);
/// ```
#[derive(Debug)]
pub struct AtomicLinkState {
    inner: AtomicU8,
}

impl AtomicLinkState {
    /// 创建新的原子状态
    pub fn new(state: LinkState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    /// 获取当前状态
    pub fn get(&self, ordering: Ordering) -> LinkState {
        LinkState::from_u8(self.inner.load(ordering))
    }

    /// 设置状态，返回旧状态
    pub fn set(&self, state: LinkState, ordering: Ordering) -> LinkState {
        LinkState::from_u8(self.inner.swap(state.as_u8(), ordering))
    }

    /// 比较并交换（Compare-and-Swap）
    ///
    /// 只有当前状态等于 `current` 时才切换到 `new`。
    pub fn compare_exchange(
        &self,
        current: LinkState,
        new: LinkState,
        success: Ordering,
        failure: Ordering,
    ) -> Result<LinkState, LinkState> {
        self.inner
            .compare_exchange(current.as_u8(), new.as_u8(), success, failure)
            .map(LinkState::from_u8)
            .map_err(LinkState::from_u8)
    }
}

impl Default for AtomicLinkState {
    fn default() -> Self {
        Self::new(LinkState::default())
    }
}
