//! Client 层 Builder

use crate::table::ShakeTable;
use shake_driver::EventBus;
use shake_serial::{SerialConnector, SerialPortConnector};
use shake_tools::TableConfig;
use std::sync::Arc;
use tracing::{Span, info_span};

/// ShakeTable Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use shake_client::ShakeTableBuilder;
/// use shake_tools::TableConfig;
///
/// let table = ShakeTableBuilder::new(TableConfig::default()).build();
/// let result = table.open_connection();
/// println!("{}", result);
/// ```
pub struct ShakeTableBuilder {
    config: TableConfig,
    connector: Option<Arc<dyn SerialConnector>>,
    span: Option<Span>,
    event_bus: Option<EventBus>,
}

impl ShakeTableBuilder {
    pub fn new(config: TableConfig) -> Self {
        Self {
            config,
            connector: None,
            span: None,
            event_bus: None,
        }
    }

    /// 自定义连接器（默认按配置打开真实串口）
    pub fn connector(mut self, connector: Arc<dyn SerialConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// 日志 span（默认 `shake_table`，带串口名）
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// 共享的事件总线
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// 构造控制器（不打开串口）
    pub fn build(self) -> ShakeTable {
        let connector = self.connector.unwrap_or_else(|| {
            Arc::new(
                SerialPortConnector::new(&self.config.serial.port, self.config.serial.baud_rate)
                    .read_timeout(self.config.read_timeout()),
            )
        });
        let span = self
            .span
            .unwrap_or_else(|| info_span!("shake_table", port = %self.config.serial.port));
        ShakeTable::new(
            self.config,
            connector,
            self.event_bus.unwrap_or_default(),
            span,
        )
    }
}
