//! 运动曲线计算
//!
//! 把期望的振动频率和位移换算为步进电机可执行的梯形速度曲线。
//!
//! # 模型
//!
//! 一个振动周期 = 两次对称运动（正向 + 反向），因此单次运动频率 `move_freq = 2 * freq`，
//! 单次运动时间 `T = 1 / move_freq`。梯形曲线（加速 → 匀速 → 减速）在时间 `T` 内
//! 恰好走完位移 `D` 时，匀速段速度 `v` 满足：
//!
//! ```text
//! v² - a·T·v + a·D = 0
//! v = a·T/2 - sqrt((a·T/2)² - D·a)      （取较小根，物理可实现）
//! ```
//!
//! 可行性要求 `a ≥ 16 · D · move_freq²`，否则电机无法在给定时间内完成运动。

use crate::{Command, Direction, MoveSpec};
use thiserror::Error;

/// 最小加速度系数：`a_min = MIN_ACCEL_FACTOR · D · move_freq²`
pub const MIN_ACCEL_FACTOR: f64 = 16.0;

/// 运动计算错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MotionError {
    /// 所需加速度超过台面上限
    #[error(
        "Motion not possible: requires minimum acceleration of {required:.2} steps/s², but max is {max} steps/s²"
    )]
    Infeasible { required: f64, max: f64 },

    /// 输入非法（非正数、NaN、无穷大）
    #[error("Invalid motion input: {0}")]
    InvalidInput(String),
}

/// 手动往复运动请求（已换算为步数）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionRequest {
    /// 振动频率（Hz，完整往复周期/秒）
    pub frequency_hz: f64,
    /// 单向位移（steps）
    pub displacement_steps: u64,
}

impl MotionRequest {
    /// 由物理量构造：位移（mm）按 `steps_per_mm` 换算后截断为整数步
    pub fn from_millimeters(frequency_hz: f64, displacement_mm: f64, steps_per_mm: f64) -> Self {
        Self {
            frequency_hz,
            // `as` 对负数和 NaN 饱和到 0，后续校验会拒绝
            displacement_steps: (displacement_mm * steps_per_mm) as u64,
        }
    }
}

/// 可行的运动曲线
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionProfile {
    /// 匀速段速度（steps/s）
    pub slew_speed_steps_per_sec: f64,
    /// 使用的加速度（steps/s²）
    pub max_accel_steps_per_sec2: f64,
    /// 单向位移（steps）
    pub displacement_steps: u64,
}

impl MotionProfile {
    /// 计算运动曲线
    ///
    /// # 错误
    /// - `MotionError::InvalidInput`: 频率/加速度/位移非正
    /// - `MotionError::Infeasible`: 加速度不足
    pub fn compute(request: MotionRequest, max_accel_steps_per_sec2: f64) -> Result<Self, MotionError> {
        let slew = compute_slew_speed(
            request.frequency_hz,
            max_accel_steps_per_sec2,
            request.displacement_steps as f64,
        )?;
        Ok(Self {
            slew_speed_steps_per_sec: slew,
            max_accel_steps_per_sec2,
            displacement_steps: request.displacement_steps,
        })
    }

    /// 指定方向的单次运动（数值截断为整数）
    pub fn move_spec(&self, direction: Direction) -> MoveSpec {
        MoveSpec {
            speed: self.slew_speed_steps_per_sec as u64,
            accel: self.max_accel_steps_per_sec2 as u64,
            steps: self.displacement_steps,
            direction,
        }
    }

    /// 构造 `MANUAL` 命令：先正向后反向
    pub fn manual_command(&self) -> Command {
        Command::Manual {
            forward: self.move_spec(Direction::Forward),
            backward: self.move_spec(Direction::Backward),
        }
    }
}

/// 计算匀速段速度（steps/s）
///
/// # 参数
/// - `freq_hz`: 振动频率（完整周期/秒）
/// - `max_accel`: 最大加速度（steps/s²）
/// - `displacement_steps`: 单向位移（steps）
///
/// # 错误
/// - `MotionError::Infeasible`: `max_accel < 16 · D · (2·freq)²`，消息包含所需最小加速度（两位小数）和配置上限
pub fn compute_slew_speed(
    freq_hz: f64,
    max_accel: f64,
    displacement_steps: f64,
) -> Result<f64, MotionError> {
    check_positive("frequency", freq_hz)?;
    check_positive("max acceleration", max_accel)?;
    check_positive("displacement", displacement_steps)?;

    let move_freq = 2.0 * freq_hz;
    let min_accel_required = MIN_ACCEL_FACTOR * displacement_steps * move_freq * move_freq;
    if max_accel < min_accel_required {
        return Err(MotionError::Infeasible {
            required: min_accel_required,
            max: max_accel,
        });
    }

    let move_period = 1.0 / move_freq;
    let term1 = max_accel * move_period / 2.0;
    let term2 = (term1 * term1 - displacement_steps * max_accel).sqrt();

    // term1 - term2 的有理化形式，避免 term1 ≫ D·a 时相减抵消成 0
    Ok(displacement_steps * max_accel / (term1 + term2))
}

fn check_positive(name: &str, value: f64) -> Result<(), MotionError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(MotionError::InvalidInput(format!(
            "{} must be a positive finite number, got {}",
            name, value
        )))
    }
}
