//! 驱动层错误类型定义

use shake_serial::SerialError;
use thiserror::Error;

/// 驱动层错误类型
///
/// `Transport::send` 返回的 `Err` 就是“无应答”结果，调用方据此决定是否重试。
#[derive(Error, Debug)]
pub enum DriverError {
    /// 串口错误
    #[error("Serial error: {0}")]
    Serial(#[from] SerialError),

    /// 等待应答超时
    #[error("Operation timeout")]
    Timeout,

    /// 链路未建立（或重连已耗尽）
    #[error("Connection not established")]
    NotConnected,

    /// 已有一条命令在等待应答（协议为半双工）
    #[error("Another command is awaiting its response")]
    Busy,

    /// IO 线程错误
    #[error("IO thread error: {0}")]
    IoThread(String),

    /// 无效输入（如未配置串口）
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
