//! # Shake Tools
//!
//! 振动台应用共享的配置结构
//!
//! ## 模块
//!
//! - `config`: 串口、握手、重连、台面物理参数（默认值 → TOML → 环境变量）

pub mod config;

pub use config::{
    BatchSettings, ConfigError, LinkSettings, SerialSettings, StreamSettings, TableConfig,
    TableSettings,
};
