mod common;

use common::MockTransport;
use printlink_communication::{
    CommandOrigin, FlowControlledSender, LinkConfig, SenderConfig, Transport,
};
use std::time::{Duration, Instant};

fn open_mock() -> MockTransport {
    let mut mock = MockTransport::new();
    mock.open(115200).unwrap();
    mock
}

fn sender(rx_buffer_size: usize) -> FlowControlledSender {
    let config = SenderConfig {
        rx_buffer_size,
        rx_buffer_usage_percent: 100,
        ..Default::default()
    };
    let mut sender = FlowControlledSender::new(config, 16);
    sender.reset(Instant::now());
    sender
}

#[test]
fn test_ack_restores_exact_wire_length() {
    let mut mock = open_mock();
    let mut sender = sender(64);
    let now = Instant::now();

    sender
        .enqueue("G1 X10 Y20 F3000", CommandOrigin::External)
        .unwrap();
    let sent = sender.transmit_ready(&mut mock, now).unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].wire_len(), 17);
    assert_eq!(sender.budget().credit(), 64 - 17);

    let acked = sender.on_ack().unwrap();
    assert_eq!(acked.line(), "G1 X10 Y20 F3000");
    assert_eq!(sender.budget().credit(), 64);
    assert_eq!(mock.written(), vec!["G1 X10 Y20 F3000"]);
}

#[test]
fn test_unknown_buffer_is_stop_and_wait() {
    let mut mock = open_mock();
    let mut sender = sender(0);
    let now = Instant::now();

    for line in ["G28", "G1 X1", "G1 X2"] {
        sender.enqueue(line, CommandOrigin::External).unwrap();
    }

    for expected in ["G28", "G1 X1", "G1 X2"] {
        let sent = sender.transmit_ready(&mut mock, now).unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].line(), expected);
        assert!(sender.transmit_ready(&mut mock, now).unwrap().is_empty());
        assert_eq!(sender.queue().awaiting_ack(), 1);
        sender.on_ack();
    }
    assert!(sender.queue().is_empty());
}

#[test]
fn test_oversized_command_sent_when_idle() {
    let mut mock = open_mock();
    let mut sender = sender(8);
    let now = Instant::now();

    sender
        .enqueue("M117 a message longer than the buffer", CommandOrigin::External)
        .unwrap();
    assert_eq!(sender.transmit_ready(&mut mock, now).unwrap().len(), 1);
    assert_eq!(sender.budget().credit(), 0);
    sender.on_ack();
    assert_eq!(sender.budget().credit(), 8);
}

#[test]
fn test_ack_deadline() {
    let mut mock = open_mock();
    let mut sender = sender(0);
    let now = Instant::now();
    let timeout = sender.config().ack_timeout;

    assert!(!sender.ack_timed_out(now + timeout * 2));
    sender.enqueue("G28", CommandOrigin::External).unwrap();
    sender.transmit_ready(&mut mock, now).unwrap();
    assert!(!sender.ack_timed_out(now + timeout - Duration::from_millis(1)));
    assert!(sender.ack_timed_out(now + timeout));

    sender.on_line_received(now + timeout - Duration::from_millis(1));
    assert!(!sender.ack_timed_out(now + timeout));

    sender.on_ack();
    assert!(!sender.ack_timed_out(now + timeout * 10));
}

#[test]
fn test_clear_queue_refills_budget() {
    let mut mock = open_mock();
    let mut sender = sender(32);
    let now = Instant::now();

    sender.enqueue("G1 X1", CommandOrigin::External).unwrap();
    sender.enqueue("G1 X2", CommandOrigin::External).unwrap();
    sender.transmit_ready(&mut mock, now).unwrap();
    assert!(sender.budget().credit() < 32);

    sender.clear_queue();
    assert_eq!(sender.budget().credit(), 32);
    assert!(sender.queue().is_empty());
    assert!(sender.on_ack().is_none());
}

#[test]
fn test_drop_pending_keeps_outstanding_credit() {
    let mut mock = open_mock();
    let mut sender = sender(8);
    let now = Instant::now();

    sender.enqueue("G1 X1", CommandOrigin::External).unwrap();
    sender.enqueue("G1 X2", CommandOrigin::External).unwrap();
    sender.enqueue("G1 X3", CommandOrigin::External).unwrap();
    let sent = sender.transmit_ready(&mut mock, now).unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sender.budget().credit(), 2);

    assert_eq!(sender.drop_pending(), 2);
    assert_eq!(sender.queue().pending_send(), 0);
    assert_eq!(sender.queue().awaiting_ack(), 1);
    assert_eq!(sender.budget().credit(), 2);
    assert!(sender.ack_timed_out(now + sender.config().ack_timeout));

    // A follow-up command waits for the outstanding one
    sender.enqueue("M108", CommandOrigin::Service).unwrap();
    assert!(sender.transmit_ready(&mut mock, now).unwrap().is_empty());
    assert_eq!(sender.on_ack().unwrap().line(), "G1 X1");
    let sent = sender.transmit_ready(&mut mock, now).unwrap();
    assert_eq!(sent[0].line(), "M108");
}

#[test]
fn test_default_ack_timeout_matches_link() {
    let link = LinkConfig::default();
    assert_eq!(SenderConfig::default().ack_timeout, link.ack_timeout);
    assert_eq!(link.ack_timeout, Duration::from_secs(10));
}
