//! # 振动台配置
//!
//! 加载顺序：内置默认值 → 可选的 TOML 文件 → 环境变量覆盖。
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyACM0"
//! baud_rate = 115200
//!
//! [link]
//! max_reconnect_attempts = 3
//!
//! [table]
//! steps_per_mm = 80.0
//! max_acceleration_mm = 8000.0
//! ```
//!
//! 文件中省略的字段使用默认值。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// 环境变量值无法解析
    #[error("Invalid value for environment variable {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },

    /// 配置值不合法
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// 振动台配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TableConfig {
    /// 串口设置
    pub serial: SerialSettings,
    /// 握手与重连
    pub link: LinkSettings,
    /// 台面物理参数
    pub table: TableSettings,
    /// 批量发送
    pub batch: BatchSettings,
    /// 事件流
    pub stream: StreamSettings,
}

/// 串口设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// 设备路径
    pub port: String,
    pub baud_rate: u32,
    /// 读超时（ms），也决定读线程响应关闭的速度
    pub read_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/tty.usbmodem21301".to_string(),
            baud_rate: 205_200,
            read_timeout_ms: 100,
        }
    }
}

/// 握手与重连
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// 握手应答
    pub ack: String,
    /// 等待握手的最长时间（秒）
    pub connection_timeout_secs: u64,
    /// 单条命令等待应答的超时（ms）
    pub command_timeout_ms: u64,
    pub max_reconnect_attempts: u32,
    /// 两次重连尝试之间的等待（ms）
    pub reconnect_delay_ms: u64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            ack: "OK".to_string(),
            connection_timeout_secs: 60,
            command_timeout_ms: 5000,
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 5000,
        }
    }
}

/// 台面物理参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSettings {
    /// 每毫米步数
    pub steps_per_mm: f64,
    /// 最大加速度（mm/s²），需要按电机实际情况调校以免失步
    pub max_acceleration_mm: f64,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            steps_per_mm: 80.0,
            max_acceleration_mm: 8000.0,
        }
    }
}

/// 批量发送
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// 相邻命令之间的间隔（ms），防止微控制器接收缓冲溢出
    pub command_interval_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            command_interval_ms: 10,
        }
    }
}

/// 事件流
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// 无事件时多久合成一次心跳（ms）
    pub heartbeat_timeout_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            heartbeat_timeout_ms: 500,
        }
    }
}

impl TableConfig {
    /// 从 TOML 文件加载（缺省字段取默认值）
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: TableConfig = toml::from_str(&content)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// 完整加载流程：默认值 / 文件 → 环境变量 → 校验
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// 应用进程环境变量覆盖
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// 使用自定义查找函数应用环境变量覆盖
    ///
    /// | 变量 | 字段 |
    /// |---|---|
    /// | `COM_PORT` | `serial.port` |
    /// | `BAUD_RATE` | `serial.baud_rate` |
    /// | `ACK` | `link.ack` |
    /// | `CONNECTION_TIMEOUT` | `link.connection_timeout_secs` |
    /// | `MAX_RECONNECT_ATTEMPTS` | `link.max_reconnect_attempts` |
    /// | `STEPS_PER_MM` | `table.steps_per_mm` |
    /// | `MAX_ACCELERATION`（旧名 `MAX_ACCELERATIONS`） | `table.max_acceleration_mm` |
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("COM_PORT") {
            self.serial.port = port.trim().to_string();
        }
        if let Some(value) = lookup("BAUD_RATE") {
            self.serial.baud_rate = parse_env("BAUD_RATE", &value)?;
        }
        if let Some(ack) = lookup("ACK") {
            self.link.ack = ack.trim().to_string();
        }
        if let Some(value) = lookup("CONNECTION_TIMEOUT") {
            self.link.connection_timeout_secs = parse_env("CONNECTION_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("MAX_RECONNECT_ATTEMPTS") {
            self.link.max_reconnect_attempts = parse_env("MAX_RECONNECT_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("STEPS_PER_MM") {
            self.table.steps_per_mm = parse_env("STEPS_PER_MM", &value)?;
        }
        if let Some(value) = lookup("MAX_ACCELERATION") {
            self.table.max_acceleration_mm = parse_env("MAX_ACCELERATION", &value)?;
        } else if let Some(value) = lookup("MAX_ACCELERATIONS") {
            self.table.max_acceleration_mm = parse_env("MAX_ACCELERATIONS", &value)?;
        }
        Ok(())
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.is_empty() {
            return Err(ConfigError::Invalid("serial port must not be empty".into()));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud rate must be non-zero".into()));
        }
        if self.link.ack.trim().is_empty() {
            return Err(ConfigError::Invalid("ack token must not be empty".into()));
        }
        if self.link.max_reconnect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max reconnect attempts must be at least 1".into(),
            ));
        }
        if !(self.table.steps_per_mm.is_finite() && self.table.steps_per_mm > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "steps per mm must be positive, got {}",
                self.table.steps_per_mm
            )));
        }
        if !(self.table.max_acceleration_mm.is_finite() && self.table.max_acceleration_mm > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "max acceleration must be positive, got {}",
                self.table.max_acceleration_mm
            )));
        }
        Ok(())
    }

    /// 序列化为 TOML 文本
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 最大加速度（steps/s²）
    pub fn max_acceleration_steps(&self) -> f64 {
        self.table.max_acceleration_mm * self.table.steps_per_mm
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.serial.read_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.link.connection_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.link.command_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.link.reconnect_delay_ms)
    }

    pub fn command_interval(&self) -> Duration {
        Duration::from_millis(self.batch.command_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.stream.heartbeat_timeout_ms)
    }
}

fn parse_env<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TableConfig::default();
        assert_eq!(config.serial.port, "/dev/tty.usbmodem21301");
        assert_eq!(config.serial.baud_rate, 205_200);
        assert_eq!(config.link.ack, "OK");
        assert_eq!(config.connection_timeout(), Duration::from_secs(60));
        assert_eq!(config.command_timeout(), Duration::from_secs(5));
        assert_eq!(config.link.max_reconnect_attempts, 5);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.command_interval(), Duration::from_millis(10));
        assert_eq!(config.heartbeat_timeout(), Duration::from_millis(500));
        assert_eq!(config.max_acceleration_steps(), 640_000.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = TableConfig::default();
        config
            .apply_env_with(lookup(&[
                ("COM_PORT", "/dev/ttyACM1"),
                ("BAUD_RATE", " 115200 "),
                ("ACK", "ready"),
                ("MAX_RECONNECT_ATTEMPTS", "2"),
                ("STEPS_PER_MM", "100"),
                ("MAX_ACCELERATIONS", "5000"),
            ]))
            .unwrap();
        assert_eq!(config.serial.port, "/dev/ttyACM1");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.link.ack, "ready");
        assert_eq!(config.link.max_reconnect_attempts, 2);
        assert_eq!(config.table.steps_per_mm, 100.0);
        assert_eq!(config.table.max_acceleration_mm, 5000.0);
    }

    #[test]
    fn test_new_acceleration_name_wins_over_legacy() {
        let mut config = TableConfig::default();
        config
            .apply_env_with(lookup(&[
                ("MAX_ACCELERATION", "9000"),
                ("MAX_ACCELERATIONS", "1000"),
            ]))
            .unwrap();
        assert_eq!(config.table.max_acceleration_mm, 9000.0);
    }

    #[test]
    fn test_invalid_env_value_is_an_error() {
        let mut config = TableConfig::default();
        let err = config
            .apply_env_with(lookup(&[("BAUD_RATE", "fast")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                var: "BAUD_RATE",
                ..
            }
        ));
        assert!(err.to_string().contains("'fast'"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TableConfig::default();
        config.serial.baud_rate = 0;
        assert!(config.validate().is_err());

        let mut config = TableConfig::default();
        config.table.steps_per_mm = 0.0;
        assert!(config.validate().is_err());

        let mut config = TableConfig::default();
        config.table.max_acceleration_mm = -1.0;
        assert!(config.validate().is_err());

        let mut config = TableConfig::default();
        config.link.max_reconnect_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TableConfig = toml::from_str(
            r#"
[serial]
port = "COM3"

[table]
max_acceleration_mm = 4000.0
"#,
        )
        .unwrap();
        assert_eq!(config.serial.port, "COM3");
        assert_eq!(config.serial.baud_rate, 205_200);
        assert_eq!(config.table.max_acceleration_mm, 4000.0);
        assert_eq!(config.table.steps_per_mm, 80.0);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = TableConfig::default();
        let text = config.to_toml_string().unwrap();
        let parsed: TableConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
