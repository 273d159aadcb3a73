//! 基于 `serialport` 的真实串口实现

use crate::{LinkPair, RxLink, SerialConnector, SerialError, TxLink};
use serialport::{SerialPort, SerialPortType};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// 默认读超时
///
/// 读线程每个超时周期检查一次关闭信号，因此这个值也决定了 `close()` 的响应时间。
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// 串口连接器
///
/// # Example
///
/// ```no_run
/// use shake_serial::{SerialConnector, SerialPortConnector};
///
/// let connector = SerialPortConnector::new("/dev/ttyACM0", 115_200);
/// let (rx, tx) = connector.connect().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct SerialPortConnector {
    path: String,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialPortConnector {
    /// 创建连接器（不会立即打开设备）
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// 设置读超时
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// 设备路径
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 波特率
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl SerialConnector for SerialPortConnector {
    fn connect(&self) -> Result<LinkPair, SerialError> {
        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(self.read_timeout)
            .open()?;
        // 读写各持一个句柄，读线程阻塞读取时不影响写入
        let writer = port.try_clone()?;
        debug!("Opened serial port {} @ {} baud", self.path, self.baud_rate);
        Ok((Box::new(PortRx { port }), Box::new(PortTx { port: writer })))
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.path, self.baud_rate)
    }
}

struct PortRx {
    port: Box<dyn SerialPort>,
}

impl RxLink for PortRx {
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        match self.port.read(buf) {
            // 部分平台超时返回 0 字节而不是 TimedOut
            Ok(0) => Err(SerialError::Timeout),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(SerialError::Timeout),
            Err(e) => Err(SerialError::Io(e)),
        }
    }
}

struct PortTx {
    port: Box<dyn SerialPort>,
}

impl TxLink for PortTx {
    fn send(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }
}

/// 可用串口信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// 设备名（如 `/dev/ttyACM0`、`COM3`）
    pub name: String,
    /// USB 厂商（仅 USB 串口）
    pub manufacturer: Option<String>,
    /// 是否为 USB 串口
    pub is_usb: bool,
}

/// 列出系统中的串口（按名称排序）
pub fn available_ports() -> Result<Vec<PortInfo>, SerialError> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()?
        .into_iter()
        .map(|p| match p.port_type {
            SerialPortType::UsbPort(info) => PortInfo {
                name: p.port_name,
                manufacturer: info.manufacturer,
                is_usb: true,
            },
            _ => PortInfo {
                name: p.port_name,
                manufacturer: None,
                is_usb: false,
            },
        })
        .collect();
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ports)
}
