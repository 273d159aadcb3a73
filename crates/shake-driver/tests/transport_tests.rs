//! Transport 集成测试
//!
//! 读线程真实运行，设备由 `MockDevice` 模拟。

use shake_driver::{
    DriverError, Event, EventBus, LinkState, LinkStatus, ReconnectPolicy, Transport,
    TransportBuilder,
};
use shake_serial::mock::{MockConnector, MockDevice};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SHORT: Duration = Duration::from_millis(150);

fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts,
        delay: Duration::from_millis(10),
    }
}

/// 会握手、对 CONF 应答 OK、对其他命令应答 DONE 的设备
fn echo_device() -> MockDevice {
    let device = MockDevice::new();
    device.greet_on_connect(Some("ok".into()));
    device.set_responder(|line| match line {
        "CONF" => vec!["OK".into()],
        "SILENT" => vec![],
        "STOP" => vec!["limit triggered".into()],
        _ => vec!["done".into()],
    });
    device
}

fn build(device: &MockDevice, bus: &EventBus, policy: ReconnectPolicy) -> Transport {
    TransportBuilder::new()
        .connector(Arc::new(MockConnector::new(device.clone())))
        .event_bus(bus.clone())
        .command_timeout(SHORT)
        .reconnect(policy)
        .build()
        .unwrap()
}

fn connected(device: &MockDevice, bus: &EventBus, policy: ReconnectPolicy) -> Transport {
    let transport = build(device, bus, policy);
    assert!(transport.open(Duration::from_secs(2)));
    bus.drain();
    transport
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn test_open_handshake_sends_conf() {
    let device = echo_device();
    let bus = EventBus::new();
    let transport = build(&device, &bus, fast_policy(1));

    assert!(transport.open(Duration::from_secs(2)));
    assert!(transport.is_connected());
    assert_eq!(device.written_lines(), vec!["CONF".to_string()]);
    assert_eq!(bus.drain(), vec![Event::Status(LinkStatus::Connected)]);
}

#[test]
fn test_open_ignores_other_messages_before_ack() {
    let device = MockDevice::new();
    let bus = EventBus::new();
    let transport = build(&device, &bus, fast_policy(1));

    device.push_line("booting");
    device.push_line("Ok");
    assert!(transport.open(Duration::from_secs(2)));
    assert_eq!(transport.state(), LinkState::Connected);
}

#[test]
fn test_open_finds_ack_followed_by_banner() {
    let device = MockDevice::new();
    let bus = EventBus::new();
    let transport = build(&device, &bus, fast_policy(1));

    device.push_line("OK");
    device.push_line("FIRMWARE 1.2");
    thread::sleep(Duration::from_millis(100));
    assert!(transport.open(Duration::from_millis(500)));
    assert_eq!(transport.state(), LinkState::Connected);
}

#[test]
fn test_open_timeout_marks_disconnected_without_events() {
    let device = MockDevice::new();
    let bus = EventBus::new();
    let transport = build(&device, &bus, fast_policy(1));

    let start = Instant::now();
    assert!(!transport.open(Duration::from_millis(100)));
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert_eq!(transport.state(), LinkState::Disconnected);
    assert!(bus.drain().is_empty());
    assert!(matches!(
        transport.send("RESET", SHORT),
        Err(DriverError::NotConnected)
    ));
}

#[test]
fn test_send_returns_normalized_reply() {
    let device = echo_device();
    let bus = EventBus::new();
    let transport = connected(&device, &bus, fast_policy(1));

    assert_eq!(transport.send("RESET", SHORT).unwrap(), "DONE");
    assert_eq!(transport.send("MOVE 1 2 3 0\n", SHORT).unwrap(), "DONE");
    assert_eq!(
        device.written_lines(),
        vec!["CONF".to_string(), "RESET".into(), "MOVE 1 2 3 0".into()]
    );
}

#[test]
fn test_timeout_leaves_connection_state_alone() {
    let device = echo_device();
    let bus = EventBus::new();
    let transport = connected(&device, &bus, fast_policy(1));

    assert!(matches!(
        transport.send("SILENT", Duration::from_millis(50)),
        Err(DriverError::Timeout)
    ));
    assert!(transport.is_connected());
    assert!(bus.drain().is_empty());
}

#[test]
fn test_limit_notification_is_not_a_reply() {
    let device = echo_device();
    let bus = EventBus::new();
    let transport = connected(&device, &bus, fast_policy(1));

    assert!(matches!(
        transport.send("STOP", Duration::from_millis(100)),
        Err(DriverError::Timeout)
    ));
    assert_eq!(bus.drain(), vec![Event::LimitTriggered]);
}

#[test]
fn test_write_failure_marks_disconnected() {
    let device = echo_device();
    let bus = EventBus::new();
    let transport = connected(&device, &bus, fast_policy(1));

    device.fail_writes(true);
    assert!(matches!(
        transport.send("RESET", SHORT),
        Err(DriverError::Serial(_))
    ));
    assert!(!transport.is_connected());

    // 写入一直失败：重连补发 CONF 也失败，最终耗尽
    assert!(wait_for(|| transport.state() == LinkState::Disconnected));
    let events = bus.drain();
    assert_eq!(events[0], Event::Status(LinkStatus::Disconnected));
    assert!(matches!(&events[1], Event::Error(m) if m.starts_with("Failed to send message")));
    assert_eq!(
        events.last(),
        Some(&Event::Error("Reconnection failed after 1 attempts".into()))
    );
}

#[test]
fn test_write_failure_recovers_through_reconnect() {
    let device = echo_device();
    let bus = EventBus::new();
    let policy = ReconnectPolicy {
        max_attempts: 5,
        delay: Duration::from_millis(50),
    };
    let transport = connected(&device, &bus, policy);
    device.greet_on_connect(None);

    device.fail_writes(true);
    assert!(matches!(
        transport.send("STOP", SHORT),
        Err(DriverError::Serial(_))
    ));
    device.fail_writes(false);

    assert!(wait_for(|| device.connect_count() >= 2
        && transport.state() == LinkState::Connected));
    assert_eq!(bus.last_status(), Some(LinkStatus::Connected));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(transport.send("RESET", SHORT).unwrap(), "DONE");

    // 之后的读故障照常重连
    let before = device.connect_count();
    device.interrupt();
    assert!(wait_for(|| device.connect_count() > before
        && transport.state() == LinkState::Connected));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(transport.send("RESET", SHORT).unwrap(), "DONE");
}

#[test]
fn test_concurrent_send_is_rejected() {
    let device = echo_device();
    let bus = EventBus::new();
    let transport = Arc::new(connected(&device, &bus, fast_policy(1)));

    let waiter = {
        let transport = transport.clone();
        thread::spawn(move || transport.send("SILENT", Duration::from_millis(500)))
    };
    assert!(wait_for(|| device.written_lines().contains(&"SILENT".to_string())));
    assert!(matches!(
        transport.send("RESET", SHORT),
        Err(DriverError::Busy)
    ));
    assert!(matches!(waiter.join().unwrap(), Err(DriverError::Timeout)));
}

#[test]
fn test_close_is_idempotent_and_reports_once() {
    let device = echo_device();
    let bus = EventBus::new();
    let transport = connected(&device, &bus, fast_policy(1));

    transport.close();
    transport.close();
    assert_eq!(transport.state(), LinkState::Disconnected);
    assert_eq!(bus.drain(), vec![Event::Status(LinkStatus::Disconnected)]);
    assert!(matches!(
        transport.send("RESET", SHORT),
        Err(DriverError::NotConnected)
    ));
}

#[test]
fn test_reconnects_after_transient_fault() {
    let device = echo_device();
    let bus = EventBus::new();
    let transport = connected(&device, &bus, fast_policy(3));
    device.greet_on_connect(None);

    device.interrupt();
    assert!(wait_for(|| device.connect_count() == 2
        && bus.last_status() == Some(LinkStatus::Connected)));
    assert!(transport.is_connected());
    assert_eq!(device.written_lines().last(), Some(&"CONF".to_string()));

    let events = bus.drain();
    assert_eq!(events.first(), Some(&Event::Status(LinkStatus::Disconnected)));
    assert_eq!(events.last(), Some(&Event::Status(LinkStatus::Connected)));

    // 让读线程先消化重连握手的应答
    thread::sleep(Duration::from_millis(100));
    assert_eq!(transport.send("RESET", SHORT).unwrap(), "DONE");
}

#[test]
fn test_reconnect_exhaustion_is_terminal() {
    let device = echo_device();
    let bus = EventBus::new();
    let transport = connected(&device, &bus, fast_policy(2));

    device.disconnect();
    assert!(wait_for(|| bus
        .drain()
        .contains(&Event::Error("Reconnection failed after 2 attempts".into()))));
    assert_eq!(transport.state(), LinkState::Disconnected);

    // 设备重新插上也不会自动恢复
    device.plug_in();
    thread::sleep(Duration::from_millis(50));
    assert!(matches!(
        transport.send("RESET", SHORT),
        Err(DriverError::NotConnected)
    ));
}

#[test]
fn test_send_while_reconnecting_times_out() {
    let device = echo_device();
    let bus = EventBus::new();
    let policy = ReconnectPolicy {
        max_attempts: 3,
        delay: Duration::from_secs(10),
    };
    let transport = connected(&device, &bus, policy);

    device.disconnect();
    assert!(wait_for(|| transport.state() == LinkState::Reconnecting));
    assert!(matches!(
        transport.send("RESET", Duration::from_millis(50)),
        Err(DriverError::Timeout)
    ));

    let start = Instant::now();
    transport.close();
    assert!(start.elapsed() < Duration::from_secs(3));
}
