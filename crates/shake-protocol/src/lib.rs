//! # Shake Table Protocol
//!
//! 振动台微控制器串口行协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `framing`: 字节流 → 行消息（换行分帧、去空白、转大写）
//! - `motion`: 运动曲线计算（频率 + 位移 → 步进电机指令）
//!
//! ## 线路格式
//!
//! 每条消息以 `\n` 结尾，7-bit ASCII，接收端大小写不敏感（解码后统一转大写）。
//!
//! ```text
//! device → host   OK                      握手应答（主动发送）
//! host   → device CONF                    握手确认
//! host   → device BATCH_SIZE <n>
//! host   → device MOVE <speed> <accel> <steps> <dir>
//! host   → device MANUAL <fwd...> 0 <bwd...> 1
//! host   → device STOP | RESET
//! device → host   LIMIT TRIGGERED         限位开关（异步通知，不是应答）
//! ```

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod framing;
pub mod motion;

// 重新导出常用类型
pub use framing::{DecodedMessage, LineFramer, MAX_FRAME_LEN};
pub use motion::{MotionError, MotionProfile, MotionRequest, compute_slew_speed};

/// 行结束符
pub const LINE_TERMINATOR: u8 = b'\n';

/// 限位开关触发时设备主动发送的哨兵消息（已转大写）
pub const LIMIT_TRIGGERED: &str = "LIMIT TRIGGERED";

/// 默认握手应答
pub const DEFAULT_ACK: &str = "OK";

/// 协议层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 未知命令关键字
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// 参数个数或格式错误
    #[error("Invalid argument for {command}: {reason}")]
    InvalidArgument {
        command: &'static str,
        reason: String,
    },

    /// 方向字段只能是 0 或 1
    #[error("Invalid direction: {0} (expected 0 or 1)")]
    InvalidDirection(u8),
}

/// 运动方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Direction {
    /// 正向（线路值 0）
    Forward = 0,
    /// 反向（线路值 1）
    Backward = 1,
}

impl TryFrom<u8> for Direction {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Forward),
            1 => Ok(Self::Backward),
            other => Err(ProtocolError::InvalidDirection(other)),
        }
    }
}

/// 单次梯形运动参数
///
/// 所有数值都已截断为整数（线路上只传整数）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MoveSpec {
    /// 匀速段速度（steps/s）
    pub speed: u64,
    /// 加速度（steps/s²）
    pub accel: u64,
    /// 位移（steps）
    pub steps: u64,
    /// 方向
    pub direction: Direction,
}

impl fmt::Display for MoveSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.speed, self.accel, self.steps, self.direction as u8
        )
    }
}

/// 主机 → 设备命令
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// 握手确认
    Conf,
    /// 批量运动头（后续 n 条命令）
    BatchSize(usize),
    /// 单次运动
    Move(MoveSpec),
    /// 手动往复运动（正向 + 反向）
    Manual { forward: MoveSpec, backward: MoveSpec },
    /// 停止
    Stop,
    /// 复位（回中）
    Reset,
}

impl Command {
    /// 编码为线路字节（含行结束符）
    pub fn encode(&self) -> Vec<u8> {
        encode_line(&self.to_string())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Conf => f.write_str("CONF"),
            Command::BatchSize(n) => write!(f, "BATCH_SIZE {}", n),
            Command::Move(spec) => write!(f, "MOVE {}", spec),
            Command::Manual { forward, backward } => write!(f, "MANUAL {} {}", forward, backward),
            Command::Stop => f.write_str("STOP"),
            Command::Reset => f.write_str("RESET"),
        }
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    /// 解析一行命令文本（大小写不敏感）
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let upper = line.trim().to_uppercase();
        let mut tokens = upper.split_whitespace();
        let keyword = tokens.next().unwrap_or_default();
        let args: Vec<&str> = tokens.collect();

        match keyword {
            "CONF" => expect_no_args("CONF", &args).map(|_| Command::Conf),
            "STOP" => expect_no_args("STOP", &args).map(|_| Command::Stop),
            "RESET" => expect_no_args("RESET", &args).map(|_| Command::Reset),
            "BATCH_SIZE" => match args.as_slice() {
                [n] => parse_number::<usize>("BATCH_SIZE", n).map(Command::BatchSize),
                _ => Err(ProtocolError::InvalidArgument {
                    command: "BATCH_SIZE",
                    reason: format!("expected 1 argument, got {}", args.len()),
                }),
            },
            "MOVE" => match args.as_slice() {
                [speed, accel, steps, dir] => {
                    parse_move("MOVE", speed, accel, steps, dir).map(Command::Move)
                },
                _ => Err(ProtocolError::InvalidArgument {
                    command: "MOVE",
                    reason: format!("expected 4 arguments, got {}", args.len()),
                }),
            },
            "MANUAL" => match args.as_slice() {
                [fs, fa, fst, fd, bs, ba, bst, bd] => Ok(Command::Manual {
                    forward: parse_move("MANUAL", fs, fa, fst, fd)?,
                    backward: parse_move("MANUAL", bs, ba, bst, bd)?,
                }),
                _ => Err(ProtocolError::InvalidArgument {
                    command: "MANUAL",
                    reason: format!("expected 8 arguments, got {}", args.len()),
                }),
            },
            _ => Err(ProtocolError::UnknownCommand(line.trim().to_string())),
        }
    }
}

/// 为任意命令文本补齐行结束符
///
/// 调用方传入的文本可能已经带有 `\n` 或 `\r\n`，这里统一去掉后再追加一个 `\n`。
pub fn encode_line(text: &str) -> Vec<u8> {
    let body = text.trim_end_matches(['\r', '\n']);
    let mut bytes = Vec::with_capacity(body.len() + 1);
    bytes.extend_from_slice(body.as_bytes());
    bytes.push(LINE_TERMINATOR);
    bytes
}

fn expect_no_args(command: &'static str, args: &[&str]) -> Result<(), ProtocolError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(ProtocolError::InvalidArgument {
            command,
            reason: format!("expected no arguments, got {}", args.len()),
        })
    }
}

fn parse_number<T: FromStr>(command: &'static str, token: &str) -> Result<T, ProtocolError> {
    token.parse::<T>().map_err(|_| ProtocolError::InvalidArgument {
        command,
        reason: format!("'{}' is not a non-negative integer", token),
    })
}

fn parse_move(
    command: &'static str,
    speed: &str,
    accel: &str,
    steps: &str,
    dir: &str,
) -> Result<MoveSpec, ProtocolError> {
    Ok(MoveSpec {
        speed: parse_number(command, speed)?,
        accel: parse_number(command, accel)?,
        steps: parse_number(command, steps)?,
        direction: Direction::try_from(parse_number::<u8>(command, dir)?)?,
    })
}
