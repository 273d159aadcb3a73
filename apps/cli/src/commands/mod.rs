//! 命令定义和实现

pub mod batch;
pub mod config;
pub mod manual;
pub mod monitor;
pub mod ports;
pub mod profile;

pub use batch::BatchCommand;
pub use config::ConfigCommand;
pub use manual::ManualCommand;
pub use monitor::MonitorCommand;
pub use ports::PortsCommand;
pub use profile::ProfileCommand;
