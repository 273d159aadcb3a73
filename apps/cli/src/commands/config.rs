//! 配置管理命令

use anyhow::Result;
use clap::Subcommand;

use crate::utils::ConnectionArgs;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 打印生效的配置（TOML）
    Show,

    /// 检查配置
    Check,
}

impl ConfigCommand {
    pub fn execute(self, args: &ConnectionArgs) -> Result<()> {
        match self {
            ConfigCommand::Show => {
                let config = args.resolve_config()?;
                print!("{}", config.to_toml_string()?);
                Ok(())
            },
            ConfigCommand::Check => {
                let config = args.resolve_config()?;
                println!("✅ 配置有效");
                println!("  串口: {} @ {} baud", config.serial.port, config.serial.baud_rate);
                println!(
                    "  最大加速度: {} mm/s² ({} steps/s²)",
                    config.table.max_acceleration_mm,
                    config.max_acceleration_steps()
                );
                Ok(())
            },
        }
    }
}
