//! 客户端接口模块
//!
//! 提供振动台的用户友好接口：
//! - [`ShakeTable`]：打开/关闭连接、批量运动、手动往复、停止、复位
//! - [`CommandResult`]：所有操作的结构化结果
//! - 事件流（状态、错误、限位、心跳），供推送层消费
//!
//! 如果需要直接收发串口命令，可以使用 `shake-driver` 的 `Transport`。

pub mod builder;
pub mod result;
pub mod table;

// 重新导出常用类型
pub use builder::ShakeTableBuilder;
pub use result::{CommandResult, CommandStatus};
pub use shake_driver::{Event, EventStream, LinkState, LinkStatus};
pub use shake_tools::TableConfig;
pub use table::{NOT_CONNECTED_MESSAGE, ShakeTable};
