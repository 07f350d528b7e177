//! Full-bus discovery against simulated responders.

mod common;

use common::{make_responder, MockRdmBus};
use dmx_rdm_port::dmx_controller::{DmxController, DmxControllerConfig};
use dmx_rdm_port::unique_identifier::UniqueIdentifier;
use dmx_rdm_port::utils::{discover_devices, discover_with_callback};

#[test]
fn test_single_device_discovery() {
    let expected_uid = UniqueIdentifier::new(0x05E0, 0x00000001).unwrap();
    let bus = MockRdmBus::new(vec![make_responder(0x00000001)]);
    let mut controller = DmxController::new(bus, &DmxControllerConfig::default());

    let mut found = Vec::new();
    let count = discover_with_callback(&mut controller, &mut |uid, index| {
        found.push((uid, index));
    })
    .unwrap();

    assert_eq!(count, 1);
    assert_eq!(found, vec![(expected_uid, 0)]);

    let bus = controller.get_driver();
    assert!(
        bus.frames_sent <= 15,
        "single-device discovery took {} frames",
        bus.frames_sent
    );
    assert!(bus.responders[0].is_muted());
}

#[test]
fn test_two_device_discovery_with_collision() {
    let low_uid = UniqueIdentifier::new(0x05E0, 0x00000001).unwrap();
    let high_uid = UniqueIdentifier::new(0x05E0, 0xFFFFFFFE).unwrap();
    let bus = MockRdmBus::new(vec![
        make_responder(0x00000001),
        make_responder(0xFFFFFFFE),
    ]);
    let mut controller = DmxController::new(bus, &DmxControllerConfig::default());

    let mut found = Vec::new();
    let count = discover_with_callback(&mut controller, &mut |uid, _| found.push(uid)).unwrap();

    assert_eq!(count, 2);
    found.sort();
    assert_eq!(found, vec![low_uid, high_uid]);

    // Nothing is left unmuted after a complete sweep.
    for responder in &controller.get_driver().responders {
        assert!(responder.is_muted(), "{} stayed unmuted", responder.uid());
    }
}

#[test]
fn test_discovery_into_bounded_slice() {
    let bus = MockRdmBus::new(vec![
        make_responder(0x00000010),
        make_responder(0x00000020),
    ]);
    let mut controller = DmxController::new(bus, &DmxControllerConfig::default());

    // A one-element slice reports a single device even though the sweep
    // muted both.
    let mut uids = [UniqueIdentifier::new(1, 1).unwrap(); 1];
    let stored = discover_devices(&mut controller, &mut uids).unwrap();
    assert_eq!(stored, 1);
}

#[test]
fn test_rediscovery_after_unmute_finds_devices_again() {
    let bus = MockRdmBus::new(vec![make_responder(0x00000042)]);
    let mut controller = DmxController::new(bus, &DmxControllerConfig::default());

    let mut first = Vec::new();
    discover_with_callback(&mut controller, &mut |uid, _| first.push(uid)).unwrap();
    assert_eq!(first.len(), 1);

    // Every sweep starts with an un-mute broadcast, so a second run finds
    // the device even though the first one muted it.
    let mut second = Vec::new();
    let second_count =
        discover_with_callback(&mut controller, &mut |uid, _| second.push(uid)).unwrap();
    assert_eq!(second_count, 1);
    assert_eq!(second, first);
}
