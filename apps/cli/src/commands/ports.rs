//! 串口列表

use anyhow::{Context, Result};
use clap::Args;
use shake_serial::available_ports;

/// 串口列表参数
#[derive(Args, Debug)]
pub struct PortsCommand {
    /// 只显示 USB 串口
    #[arg(long)]
    pub usb_only: bool,
}

impl PortsCommand {
    pub fn execute(&self) -> Result<()> {
        let ports = available_ports().context("Failed to enumerate serial ports")?;
        let ports: Vec<_> = ports
            .into_iter()
            .filter(|p| p.is_usb || !self.usb_only)
            .collect();

        if ports.is_empty() {
            println!("(未找到串口)");
            return Ok(());
        }

        for port in ports {
            match port.manufacturer {
                Some(manufacturer) => println!("{}\t{}", port.name, manufacturer),
                None => println!("{}", port.name),
            }
        }
        Ok(())
    }
}
