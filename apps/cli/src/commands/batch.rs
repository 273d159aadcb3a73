//! 批量运动命令
//!
//! 文件格式：每行一条命令，空行和 `#` 开头的注释行忽略。
//!
//! ```text
//! # 两次往复
//! MOVE 8000 640000 400 0
//! MOVE 8000 640000 400 1
//! MOVE 8000 640000 400 0
//! MOVE 8000 640000 400 1
//! ```

use anyhow::{Context, Result, bail};
use clap::Args;
use shake_protocol::Command;
use std::fs;
use std::path::PathBuf;

/// 批量运动参数
#[derive(Args, Debug)]
pub struct BatchCommand {
    /// 命令文件
    pub file: PathBuf,

    /// 发送前不校验命令格式
    #[arg(long)]
    pub no_validate: bool,
}

impl BatchCommand {
    /// 读取命令列表
    pub fn read_commands(&self) -> Result<Vec<String>> {
        let content = fs::read_to_string(&self.file)
            .with_context(|| format!("Failed to read {}", self.file.display()))?;
        parse_commands(&content, !self.no_validate)
    }
}

fn parse_commands(content: &str, validate: bool) -> Result<Vec<String>> {
    let mut commands = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if validate && let Err(e) = line.parse::<Command>() {
            bail!("line {}: {}", line_no + 1, e);
        }
        commands.push(line.to_string());
    }
    Ok(commands)
}
