//! # Shake CLI
//!
//! Command-line interface for the stepper shake table.
//!
//! 每个命令独立执行（读取配置 → 连接 → 执行 → 断开）：
//!
//! ```bash
//! # 列出串口
//! shake-cli ports
//!
//! # 离线检查运动是否可行
//! shake-cli profile --frequency 2 --displacement 10
//!
//! # 执行操作
//! shake-cli --port /dev/ttyACM0 manual --frequency 1 --displacement 10
//! shake-cli batch moves.txt
//! shake-cli stop
//!
//! # 打印事件流（server-sent-event 格式），Ctrl+C 退出
//! shake-cli monitor
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod modes;
mod utils;

use commands::{
    BatchCommand, ConfigCommand, ManualCommand, MonitorCommand, PortsCommand, ProfileCommand,
};
use modes::oneshot::OneShotMode;
use utils::ConnectionArgs;

const DEFAULT_LOG_FILTER: &str = "shake_cli=info,shake_driver=info,shake_client=info";

/// Shake CLI - 振动台命令行工具
#[derive(Parser, Debug)]
#[command(name = "shake-cli")]
#[command(about = "Command-line interface for the stepper shake table", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 列出可用串口
    Ports(PortsCommand),

    /// 计算运动曲线（不连接设备）
    Profile(ProfileCommand),

    /// 手动往复运动
    Manual(ManualCommand),

    /// 发送批量运动命令（文件每行一条）
    Batch(BatchCommand),

    /// 停止
    Stop,

    /// 复位
    Reset,

    /// 打印事件流
    Monitor(MonitorCommand),

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    // 日志输出到 stderr，stdout 只输出命令结果
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ports(cmd) => cmd.execute(),

        Commands::Profile(cmd) => cmd.execute(&cli.connection.resolve_config()?),

        Commands::Config(cmd) => cmd.execute(&cli.connection),

        Commands::Manual(cmd) => {
            let mode = OneShotMode::connect(&cli.connection)?;
            cmd.execute(&mode)
        },

        Commands::Batch(cmd) => {
            let commands = cmd.read_commands()?;
            let mode = OneShotMode::connect(&cli.connection)?;
            mode.report(mode.table().send_movement_batch(&commands))
        },

        Commands::Stop => {
            let mode = OneShotMode::connect(&cli.connection)?;
            mode.report(mode.table().stop_table())
        },

        Commands::Reset => {
            let mode = OneShotMode::connect(&cli.connection)?;
            mode.report(mode.table().reset_table())
        },

        Commands::Monitor(cmd) => {
            let mode = OneShotMode::connect(&cli.connection)?;
            mode.monitor(cmd.heartbeat)
        },
    }
}
