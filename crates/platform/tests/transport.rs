//! Mock bus behaviour relied on by engine tests.

#![cfg(feature = "std")]

use panel_platform::mocks::MockBus;
use panel_platform::{BusTransport, DataType, Descriptor, TransmissionSpeed, TransportError};

fn burst() -> Vec<Descriptor> {
    let mut close = Descriptor::write(DataType::DcsShortWrite, vec![0x11]);
    close.last = true;
    vec![
        Descriptor::write(DataType::GenericLongWrite, vec![0xF0, 0x5A, 0x5A]),
        close,
    ]
}

#[test]
fn send_reports_payload_bytes() {
    let mut bus = MockBus::new();
    assert_eq!(bus.send(&burst(), TransmissionSpeed::HighSpeed), Ok(4));
}

#[test]
fn descriptors_flatten_in_send_order() {
    let mut bus = MockBus::new();
    let _ = bus.send(&burst(), TransmissionSpeed::HighSpeed);
    let _ = bus.send(&burst().split_off(1), TransmissionSpeed::LowPower);
    let payloads: Vec<Vec<u8>> = bus.descriptors().into_iter().map(|d| d.payload).collect();
    assert_eq!(payloads, [vec![0xF0, 0x5A, 0x5A], vec![0x11], vec![0x11]]);
}

#[test]
fn fail_always_until_cleared() {
    let mut bus = MockBus::new();
    bus.fail_always(Some(TransportError::LinkDown));
    assert_eq!(
        bus.send(&burst(), TransmissionSpeed::LowPower),
        Err(TransportError::LinkDown)
    );
    assert_eq!(
        bus.send(&burst(), TransmissionSpeed::LowPower),
        Err(TransportError::LinkDown)
    );
    bus.fail_always(None);
    assert!(bus.send(&burst(), TransmissionSpeed::LowPower).is_ok());
    assert_eq!((bus.sent_count(), bus.failed_count()), (1, 2));
}
