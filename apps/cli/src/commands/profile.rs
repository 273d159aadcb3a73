//! 运动曲线计算（离线）
//!
//! 按当前配置的 `steps_per_mm` 和最大加速度检查一次手动往复运动是否可行，
//! 并打印将要发送的 `MANUAL` 命令。

use anyhow::Result;
use clap::Args;
use shake_protocol::{Command, MotionProfile, MotionRequest};
use shake_tools::TableConfig;

/// 运动曲线参数
#[derive(Args, Debug)]
pub struct ProfileCommand {
    /// 振动频率（Hz）
    #[arg(short, long)]
    pub frequency: f64,

    /// 单向位移（mm）
    #[arg(short, long)]
    pub displacement: f64,
}

impl ProfileCommand {
    pub fn execute(&self, config: &TableConfig) -> Result<()> {
        let command = self.manual_command(config)?;
        println!("{}", command);
        Ok(())
    }

    /// 计算 `MANUAL` 命令；不可行时返回计算错误
    pub fn manual_command(&self, config: &TableConfig) -> Result<Command> {
        let request = MotionRequest::from_millimeters(
            self.frequency,
            self.displacement,
            config.table.steps_per_mm,
        );
        let profile = MotionProfile::compute(request, config.max_acceleration_steps())?;
        eprintln!(
            "slew speed: {:.2} steps/s, acceleration: {} steps/s², displacement: {} steps",
            profile.slew_speed_steps_per_sec,
            profile.max_accel_steps_per_sec2,
            profile.displacement_steps
        );
        Ok(profile.manual_command())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infeasible_profile() {
        let cmd = ProfileCommand {
            frequency: 2.0,
            displacement: 50.0,
        };
        let err = cmd.manual_command(&TableConfig::default()).unwrap_err();
        assert!(err.to_string().contains("1024000.00"));
    }

    #[test]
    fn test_feasible_profile() {
        let mut config = TableConfig::default();
        config.table.max_acceleration_mm = 25_000.0;
        let cmd = ProfileCommand {
            frequency: 1.0,
            displacement: 50.0,
        };
        assert_eq!(
            cmd.manual_command(&config).unwrap().to_string(),
            "MANUAL 8065 2000000 4000 0 8065 2000000 4000 1"
        );
    }
}
