//! Parameters marked non-volatile survive a delete/install cycle.

mod common;

use common::{build_request, device_config, NullHandler, PERSONALITIES};
use dmx_rdm_port::command_class::RequestCommandClass;
use dmx_rdm_port::hal::MemoryNvs;
use dmx_rdm_port::pids;
use dmx_rdm_port::responder::{persist_parameter, DeviceConfig, RdmAnswer, ResponderCore};
use dmx_rdm_port::types::ResponseType;
use dmx_rdm_port::unique_identifier::UniqueIdentifier;

fn uid() -> UniqueIdentifier {
    UniqueIdentifier::new(0x05E0, 0xBEEF).unwrap()
}

fn boot_responder(nvs: &mut MemoryNvs, config: &DeviceConfig) -> ResponderCore {
    ResponderCore::new(0, uid(), None, config, 128, nvs).unwrap()
}

/// Dispatches a SET and writes any resulting change through to storage,
/// the way the port driver does after answering.
fn set_and_persist(responder: &mut ResponderCore, nvs: &mut MemoryNvs, pid: u16, data: &[u8]) {
    let request = build_request(uid(), RequestCommandClass::SetCommand, pid, data);
    let outcome = responder.dispatch(&request, &mut NullHandler).unwrap();

    match outcome.answer {
        RdmAnswer::Response(response) => {
            assert_eq!(response.response_type, ResponseType::ResponseTypeAck);
        },
        _ => panic!("set was not acknowledged"),
    }

    let changed = outcome.changed.expect("set must report a change");
    assert!(persist_parameter(responder, nvs, changed));
}

#[test]
fn test_start_address_survives_reboot() {
    let mut nvs = MemoryNvs::new();

    let mut responder = boot_responder(&mut nvs, &device_config());
    assert_eq!(responder.dmx_start_address(), 1);

    set_and_persist(&mut responder, &mut nvs, pids::DMX_START_ADDRESS, &[0x00, 0x64]);
    assert_eq!(responder.dmx_start_address(), 100);
    drop(responder);

    // Reboot with a config that defers to persisted state.
    let mut config = device_config();
    config.dmx_start_address = 0;
    let responder = boot_responder(&mut nvs, &config);
    assert_eq!(responder.dmx_start_address(), 100);

    let get = build_request(uid(), RequestCommandClass::GetCommand, pids::DMX_START_ADDRESS, &[]);
    let mut rebooted = responder;
    let outcome = rebooted.dispatch(&get, &mut NullHandler).unwrap();
    match outcome.answer {
        RdmAnswer::Response(response) => assert_eq!(&response.parameter_data[..], &[0x00, 0x64]),
        _ => panic!("get was not answered"),
    }
}

#[test]
fn test_personality_survives_reboot() {
    let mut nvs = MemoryNvs::new();

    let mut responder = boot_responder(&mut nvs, &device_config());
    set_and_persist(&mut responder, &mut nvs, pids::DMX_PERSONALITY, &[2]);
    assert_eq!(responder.current_personality(), 2);
    assert_eq!(responder.footprint(), PERSONALITIES[1].footprint);
    drop(responder);

    let mut config = device_config();
    config.current_personality = 0;
    let responder = boot_responder(&mut nvs, &config);
    assert_eq!(responder.current_personality(), 2);
    assert_eq!(responder.footprint(), PERSONALITIES[1].footprint);
}

#[test]
fn test_device_label_survives_reboot() {
    let mut nvs = MemoryNvs::new();

    let mut responder = boot_responder(&mut nvs, &device_config());
    set_and_persist(&mut responder, &mut nvs, pids::DEVICE_LABEL, b"stage left");
    drop(responder);

    let mut rebooted = boot_responder(&mut nvs, &device_config());
    let get = build_request(uid(), RequestCommandClass::GetCommand, pids::DEVICE_LABEL, &[]);
    let outcome = rebooted.dispatch(&get, &mut NullHandler).unwrap();
    match outcome.answer {
        RdmAnswer::Response(response) => {
            assert_eq!(&response.parameter_data[..], b"stage left");
        },
        _ => panic!("get was not answered"),
    }
}

#[test]
fn test_volatile_parameters_are_not_persisted() {
    let mut nvs = MemoryNvs::new();

    let mut responder = boot_responder(&mut nvs, &device_config());
    set_and_persist(&mut responder, &mut nvs, pids::IDENTIFY_DEVICE, &[1]);
    assert!(responder.identify());
    drop(responder);

    // Identify is volatile; a reboot clears it.
    let responder = boot_responder(&mut nvs, &device_config());
    assert!(!responder.identify());
}
