//! 事件流监控

use clap::Args;

/// 监控参数
#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 同时打印心跳事件
    #[arg(long)]
    pub heartbeat: bool,
}
