//! # Shake Table Serial Adapter Layer
//!
//! 串口硬件抽象层。驱动层只依赖这里的 trait：
//!
//! - [`RxLink`]: 读半边，由读线程独占
//! - [`TxLink`]: 写半边，由调用线程在 `send` 中使用
//! - [`SerialConnector`]: 打开（或重新打开）设备，返回一对读写句柄
//!
//! 真实设备由 [`SerialPortConnector`]（基于 `serialport`）实现；
//! 启用 `mock` feature 后可使用 [`mock::MockConnector`] 在无硬件环境下测试。

use thiserror::Error;

pub mod port;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use port::{PortInfo, SerialPortConnector, available_ports};

/// 串口适配层统一错误类型
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Port Error: {0}")]
    Port(#[from] serialport::Error),
    /// 读超时（正常情况，不是故障）
    #[error("Read timeout")]
    Timeout,
    /// 设备已断开
    #[error("Device disconnected")]
    Disconnected,
}

impl SerialError {
    /// 是否为读超时
    pub fn is_timeout(&self) -> bool {
        match self {
            SerialError::Timeout => true,
            SerialError::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

/// 读半边
pub trait RxLink: Send {
    /// 读取可用字节
    ///
    /// 在打开时配置的读超时内没有数据则返回 `SerialError::Timeout`；
    /// 其他错误都视为链路故障。
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, SerialError>;
}

/// 写半边
pub trait TxLink: Send {
    /// 写入全部字节（一次调用完成一条完整命令）
    fn send(&mut self, bytes: &[u8]) -> Result<(), SerialError>;
}

/// 一次成功连接得到的读写句柄
pub type LinkPair = (Box<dyn RxLink>, Box<dyn TxLink>);

/// 设备连接器
///
/// 首次连接和重连都通过它获取新的句柄，因此必须可以重复调用。
pub trait SerialConnector: Send + Sync {
    /// 打开设备
    fn connect(&self) -> Result<LinkPair, SerialError>;

    /// 设备描述（用于日志）
    fn describe(&self) -> String;
}
