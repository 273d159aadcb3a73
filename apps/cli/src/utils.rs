//! 公共参数与输出工具

use anyhow::{Context, Result, bail};
use clap::Args;
use shake_client::CommandResult;
use shake_tools::TableConfig;
use std::path::PathBuf;

/// 所有命令共享的连接参数（命令行 > 环境变量 > 配置文件 > 默认值）
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// 配置文件（TOML）
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// 串口（覆盖配置）
    #[arg(short, long, global = true)]
    pub port: Option<String>,

    /// 波特率（覆盖配置）
    #[arg(short, long, global = true)]
    pub baud: Option<u32>,

    /// 以 JSON 输出命令结果
    #[arg(long, global = true)]
    pub json: bool,
}

impl ConnectionArgs {
    /// 解析最终配置
    pub fn resolve_config(&self) -> Result<TableConfig> {
        let mut config =
            TableConfig::resolve(self.config.as_deref()).context("Failed to load configuration")?;
        if let Some(port) = &self.port {
            config.serial.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

/// 打印命令结果；失败结果转为错误（进程退出码非零）
pub fn print_result(result: &CommandResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(result)?);
    } else if result.is_success() {
        println!("✅ {}", result.message);
    }

    if result.is_success() {
        Ok(())
    } else {
        bail!("{}", result.message)
    }
}
