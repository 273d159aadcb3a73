//! 手动往复运动

use anyhow::Result;
use clap::Args;

use crate::modes::oneshot::OneShotMode;

/// 手动往复运动参数
#[derive(Args, Debug)]
pub struct ManualCommand {
    /// 振动频率（Hz，完整往复周期/秒）
    #[arg(short, long)]
    pub frequency: f64,

    /// 单向位移（mm）
    #[arg(short, long)]
    pub displacement: f64,
}

impl ManualCommand {
    pub fn execute(&self, mode: &OneShotMode) -> Result<()> {
        mode.report(
            mode.table()
                .run_manual_routine(self.frequency, self.displacement),
        )
    }
}
