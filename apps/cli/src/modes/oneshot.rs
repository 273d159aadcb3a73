//! One-shot 模式
//!
//! 每个命令独立执行：
//! 1. 读取配置
//! 2. 打开串口并握手
//! 3. 执行操作
//! 4. 断开连接（Drop 时）

use anyhow::{Context, Result, bail};
use shake_client::{CommandResult, Event, ShakeTable, ShakeTableBuilder};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::utils::{self, ConnectionArgs};

/// One-shot 模式
pub struct OneShotMode {
    table: ShakeTable,
    json: bool,
}

impl OneShotMode {
    /// 读取配置并连接振动台
    pub fn connect(args: &ConnectionArgs) -> Result<Self> {
        let config = args.resolve_config()?;
        eprintln!("⏳ 连接到振动台 {} ...", config.serial.port);

        let table = ShakeTableBuilder::new(config).build();
        let result = table.open_connection();
        if !result.is_success() {
            bail!("{}", result.message);
        }
        eprintln!("✅ 已连接");

        Ok(Self {
            table,
            json: args.json,
        })
    }

    pub fn table(&self) -> &ShakeTable {
        &self.table
    }

    /// 输出命令结果
    pub fn report(&self, result: CommandResult) -> Result<()> {
        utils::print_result(&result, self.json)
    }

    /// 打印事件流直到 Ctrl+C
    pub fn monitor(&self, show_heartbeat: bool) -> Result<()> {
        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        })
        .context("Failed to install Ctrl+C handler")?;

        eprintln!("📊 监控中，按 Ctrl+C 停止\n");
        let events = self.table.events();
        let mut stdout = std::io::stdout();
        while running.load(Ordering::SeqCst) {
            let event = events.next_event();
            if matches!(event, Event::Heartbeat(_)) && !show_heartbeat {
                continue;
            }
            stdout.write_all(event.to_sse().as_bytes())?;
            stdout.flush()?;
        }

        info!("Monitor stopped");
        Ok(())
    }
}

impl Drop for OneShotMode {
    fn drop(&mut self) {
        self.table.close_connection();
    }
}
