//! ShakeTable 集成测试（MockDevice）

use shake_client::{
    CommandResult, Event, LinkState, LinkStatus, NOT_CONNECTED_MESSAGE, ShakeTable,
    ShakeTableBuilder,
};
use shake_serial::mock::{MockConnector, MockDevice};
use shake_tools::TableConfig;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn test_config() -> TableConfig {
    let mut config = TableConfig::default();
    config.link.connection_timeout_secs = 2;
    config.link.command_timeout_ms = 100;
    config.link.max_reconnect_attempts = 2;
    config.link.reconnect_delay_ms = 10;
    config.batch.command_interval_ms = 1;
    config.stream.heartbeat_timeout_ms = 10;
    config
}

/// 握手后对 `MOVE 2 ...` 保持沉默，其余命令应答 `done`
fn device() -> MockDevice {
    let device = MockDevice::new();
    device.greet_on_connect(Some("OK".into()));
    device.set_responder(|line| {
        if line == "CONF" {
            vec!["OK".into()]
        } else if line.starts_with("MOVE 2 ") {
            vec![]
        } else {
            vec!["done".into()]
        }
    });
    device
}

fn table_with(device: &MockDevice, config: TableConfig) -> ShakeTable {
    ShakeTableBuilder::new(config)
        .connector(Arc::new(MockConnector::new(device.clone())))
        .build()
}

fn open_table(device: &MockDevice, config: TableConfig) -> ShakeTable {
    let table = table_with(device, config);
    assert_eq!(
        table.open_connection(),
        CommandResult::success("Connection established.")
    );
    table.event_bus().drain();
    device.clear_written();
    table
}

#[test]
fn test_open_connection_emits_single_status() {
    let device = device();
    let table = table_with(&device, test_config());

    let result = table.open_connection();
    assert_eq!(result, CommandResult::success("Connection established."));
    assert!(table.is_connected());
    assert_eq!(table.link_state(), LinkState::Connected);
    assert_eq!(
        table.event_bus().drain(),
        vec![Event::Status(LinkStatus::Connected)]
    );
}

#[test]
fn test_open_connection_handshake_failure() {
    let device = MockDevice::new();
    let mut config = test_config();
    config.link.connection_timeout_secs = 0;
    let table = table_with(&device, config);

    assert_eq!(
        table.open_connection(),
        CommandResult::error("Failed to establish connection.")
    );
    assert!(!table.is_connected());
    assert_eq!(
        table.event_bus().drain(),
        vec![
            Event::Status(LinkStatus::Disconnected),
            Event::Error("Failed to establish connection".into())
        ]
    );
    assert_eq!(table.stop_table(), CommandResult::error(NOT_CONNECTED_MESSAGE));
}

#[test]
fn test_open_connection_missing_device() {
    let device = device();
    device.disconnect();
    let table = table_with(&device, test_config());

    let result = table.open_connection();
    assert!(!result.is_success());
    assert!(
        result.message.starts_with("Failed to open connection: "),
        "message: {}",
        result.message
    );
    let events = table.event_bus().drain();
    assert_eq!(events[0], Event::Status(LinkStatus::Disconnected));
    assert!(matches!(&events[1], Event::Error(m) if m == &result.message));
}

#[test]
fn test_batch_sends_header_then_commands() {
    let device = device();
    let table = open_table(&device, test_config());

    let result = table.send_movement_batch(&["MOVE 1 1000 80 0", "MOVE 1 1000 80 1", "MOVE 3 1000 80 0"]);
    assert_eq!(result, CommandResult::success("Batch of 3 commands sent."));
    assert_eq!(
        device.written_lines(),
        vec![
            "BATCH_SIZE 3".to_string(),
            "MOVE 1 1000 80 0".into(),
            "MOVE 1 1000 80 1".into(),
            "MOVE 3 1000 80 0".into(),
        ]
    );
}

#[test]
fn test_batch_aborts_on_first_missing_reply() {
    let device = device();
    let table = open_table(&device, test_config());

    let result = table.send_movement_batch(&["MOVE 1 1000 80 0", "MOVE 2 1000 80 1", "MOVE 3 1000 80 0"]);
    assert_eq!(
        result,
        CommandResult::error("Failed to send command 2/3: MOVE 2 1000 80 1")
    );
    assert_eq!(
        device.written_lines(),
        vec![
            "BATCH_SIZE 3".to_string(),
            "MOVE 1 1000 80 0".into(),
            "MOVE 2 1000 80 1".into(),
        ]
    );
    // 超时不影响连接状态
    assert!(table.is_connected());
}

#[test]
fn test_batch_header_failure() {
    let device = device();
    let table = open_table(&device, test_config());
    device.set_responder(|_| vec![]);

    let result = table.send_movement_batch(&["MOVE 1 1000 80 0"]);
    assert_eq!(
        result,
        CommandResult::error("Failed to send batch header: BATCH_SIZE 1")
    );
    assert_eq!(device.written_lines(), vec!["BATCH_SIZE 1".to_string()]);
}

#[test]
fn test_manual_routine_infeasible_never_touches_wire() {
    let device = device();
    let table = open_table(&device, test_config());

    // 50mm × 80 = 4000 steps, 8000mm/s² × 80 = 640000 steps/s²
    let result = table.run_manual_routine(2.0, 50.0);
    assert!(!result.is_success());
    assert_eq!(
        result.message,
        "Motion not possible: requires minimum acceleration of 1024000.00 steps/s², but max is 640000 steps/s²"
    );
    assert!(device.written_lines().is_empty());
}

#[test]
fn test_manual_routine_sends_manual_command() {
    let device = device();
    let mut config = test_config();
    config.table.max_acceleration_mm = 25_000.0;
    let table = open_table(&device, config);

    let result = table.run_manual_routine(1.0, 50.0);
    assert_eq!(
        result,
        CommandResult::success("Manual routine started. Response: DONE")
    );
    assert_eq!(
        device.written_lines(),
        vec!["MANUAL 8065 2000000 4000 0 8065 2000000 4000 1".to_string()]
    );
}

#[test]
fn test_manual_routine_rejects_invalid_input() {
    let device = device();
    let table = open_table(&device, test_config());

    assert!(!table.run_manual_routine(f64::NAN, 10.0).is_success());
    assert!(!table.run_manual_routine(1.0, 0.0).is_success());
    assert!(device.written_lines().is_empty());
}

#[test]
fn test_stop_and_reset() {
    let device = device();
    let table = open_table(&device, test_config());

    assert_eq!(
        table.stop_table(),
        CommandResult::success("Stop command sent. Response: DONE")
    );
    assert_eq!(
        table.reset_table(),
        CommandResult::success("Reset command sent. Response: DONE")
    );
    assert_eq!(
        device.written_lines(),
        vec!["STOP".to_string(), "RESET".into()]
    );
}

#[test]
fn test_stop_without_reply_is_an_error() {
    let device = device();
    let table = open_table(&device, test_config());
    device.set_responder(|_| vec![]);

    assert_eq!(
        table.stop_table(),
        CommandResult::error("Failed to send command: STOP (Operation timeout)")
    );
    assert!(table.is_connected());
}

#[test]
fn test_close_connection() {
    let device = device();
    let table = open_table(&device, test_config());

    assert_eq!(
        table.close_connection(),
        CommandResult::success("Connection closed.")
    );
    assert_eq!(
        table.event_bus().drain(),
        vec![Event::Status(LinkStatus::Disconnected)]
    );
    assert_eq!(table.reset_table(), CommandResult::error(NOT_CONNECTED_MESSAGE));
    assert_eq!(
        table.close_connection(),
        CommandResult::success("No connection to close.")
    );
}

#[test]
fn test_reopen_after_close() {
    let device = device();
    let table = open_table(&device, test_config());
    table.close_connection();

    assert!(table.open_connection().is_success());
    assert_eq!(device.connect_count(), 2);
    assert!(table.is_connected());
}

#[test]
fn test_concurrent_operations_do_not_interleave() {
    let device = device();
    let table = Arc::new(open_table(&device, test_config()));
    let batch: Vec<String> = (0..5).map(|i| format!("MOVE 1 1000 {} 0", i)).collect();

    let batch_thread = {
        let table = table.clone();
        let batch = batch.clone();
        thread::spawn(move || table.send_movement_batch(&batch))
    };
    let stop_thread = {
        let table = table.clone();
        thread::spawn(move || table.stop_table())
    };

    assert!(batch_thread.join().unwrap().is_success());
    assert!(stop_thread.join().unwrap().is_success());

    let written = device.written_lines();
    assert_eq!(written.len(), 7);
    let header = written.iter().position(|l| l == "BATCH_SIZE 5").unwrap();
    assert_eq!(&written[header + 1..header + 6], batch.as_slice());
}

#[test]
fn test_reconnect_exhaustion_blocks_commands() {
    let device = device();
    let table = open_table(&device, test_config());

    device.disconnect();
    let deadline = Instant::now() + Duration::from_secs(3);
    while table.link_state() != LinkState::Disconnected && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(table.link_state(), LinkState::Disconnected);
    assert_eq!(table.stop_table(), CommandResult::error(NOT_CONNECTED_MESSAGE));

    let events = table.event_bus().drain();
    assert!(events.contains(&Event::Status(LinkStatus::Disconnected)));
    assert!(events.contains(&Event::Error("Reconnection failed after 2 attempts".into())));
}

#[test]
fn test_event_stream_heartbeat_follows_link() {
    let device = device();
    let table = open_table(&device, test_config());
    let mut events = table.events();

    assert_eq!(events.next(), Some(Event::Heartbeat(LinkStatus::Connected)));
    table.close_connection();
    assert_eq!(events.next(), Some(Event::Status(LinkStatus::Disconnected)));
    assert_eq!(
        events.next(),
        Some(Event::Heartbeat(LinkStatus::Disconnected))
    );
}
