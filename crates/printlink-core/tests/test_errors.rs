use printlink_core::{ConnectionError, Error, LinkError, SessionError};

#[test]
fn test_link_error_messages() {
    let err = LinkError::HandshakeFailed {
        attempts: 6,
        bauds: 3,
    };
    assert_eq!(
        err.to_string(),
        "Handshake failed after 6 attempts across 3 baud rates"
    );
    assert_eq!(
        LinkError::QueueFull { capacity: 16 }.to_string(),
        "Command queue full (16 slots)"
    );
    assert_eq!(
        LinkError::LinkLost { timeout_ms: 10000 }.to_string(),
        "Link lost: no reply for 10000ms"
    );
}

#[test]
fn test_umbrella_conversions() {
    let err: Error = LinkError::LinkLost { timeout_ms: 2500 }.into();
    assert!(err.is_link_lost());
    assert!(!err.is_connection_error());

    let err: Error = ConnectionError::NotOpen.into();
    assert!(err.is_connection_error());
    assert_eq!(err.to_string(), "Transport not open");

    let err: Error = SessionError::InvalidTransition {
        action: "pause",
        current: "Idle".to_string(),
    }
    .into();
    assert!(err.is_invalid_transition());
    assert_eq!(err.to_string(), "Invalid transition: cannot pause while Idle");

    let err: Error = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
    assert_eq!(err.to_string(), "I/O error: slow");
}
