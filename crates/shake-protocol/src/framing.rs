//! 行分帧与消息分类
//!
//! 串口读取是逐字节的，`LineFramer` 负责把字节累积成以 `\n` 结尾的消息：
//! - `\r` 直接丢弃（兼容 `\r\n` 行尾）
//! - 收到 `\n` 时解码（UTF-8 lossy）、去除首尾空白、转大写
//! - 空行不产生消息
//! - 超过 [`MAX_FRAME_LEN`] 仍未见到 `\n` 的行整行丢弃

use crate::LIMIT_TRIGGERED;
use tracing::{trace, warn};

/// 单行最大长度（字节，不含行结束符）
pub const MAX_FRAME_LEN: usize = 256;

/// 解码后的设备消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedMessage {
    /// 握手应答（与配置的 ACK 相同）
    Ack(String),
    /// 限位开关触发（异步通知，不是任何请求的应答）
    LimitTriggered,
    /// 普通命令应答
    Response(String),
}

impl DecodedMessage {
    /// 按内容分类
    ///
    /// `text` 必须已经过 [`LineFramer`] 规范化（大写、去空白）；`ack` 会被转为大写后比较。
    pub fn classify(text: String, ack: &str) -> Self {
        if text == LIMIT_TRIGGERED {
            Self::LimitTriggered
        } else if text == ack.trim().to_uppercase() {
            Self::Ack(text)
        } else {
            Self::Response(text)
        }
    }

    /// 是否需要进入应答槽（限位通知直接走事件总线）
    pub fn is_reply(&self) -> bool {
        !matches!(self, Self::LimitTriggered)
    }

    /// 取回消息文本
    pub fn into_text(self) -> String {
        match self {
            Self::Ack(text) | Self::Response(text) => text,
            Self::LimitTriggered => LIMIT_TRIGGERED.to_string(),
        }
    }
}

/// 行分帧器
///
/// 只由读线程持有，不需要同步。
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
    /// 当前行已超长，丢弃到下一个 `\n` 为止
    overflowed: bool,
}

impl LineFramer {
    /// 创建空的分帧器
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(64),
            overflowed: false,
        }
    }

    /// 输入一个字节，行结束时返回规范化后的消息
    pub fn push_byte(&mut self, byte: u8) -> Option<String> {
        match byte {
            b'\n' => {
                if self.overflowed {
                    self.overflowed = false;
                    self.buf.clear();
                    return None;
                }
                let message = String::from_utf8_lossy(&self.buf).trim().to_uppercase();
                self.buf.clear();
                if message.is_empty() {
                    trace!("Dropping empty line");
                    None
                } else {
                    Some(message)
                }
            },
            b'\r' => None,
            _ if self.overflowed => None,
            _ if self.buf.len() >= MAX_FRAME_LEN => {
                warn!(
                    "Line exceeds {} bytes without terminator, discarding",
                    MAX_FRAME_LEN
                );
                self.overflowed = true;
                self.buf.clear();
                None
            },
            _ => {
                self.buf.push(byte);
                None
            },
        }
    }

    /// 输入一段字节，返回其中完成的所有消息（按到达顺序）
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        bytes.iter().filter_map(|&b| self.push_byte(b)).collect()
    }

    /// 当前累积但尚未结束的字节数
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// 丢弃未完成的行（重连后调用，旧连接的残帧不可信）
    pub fn clear(&mut self) {
        self.buf.clear();
        self.overflowed = false;
    }
}
