#![allow(dead_code)]

use core::convert::Infallible;
use dmx_rdm_port::command_class::RequestCommandClass;
use dmx_rdm_port::dmx_driver::{
    ControllerDriverErrorDef, DiscoveryOption, DmxControllerDriver, DmxError, RdmControllerDriver,
};
use dmx_rdm_port::pids;
use dmx_rdm_port::rdm_data::{RdmData, RdmRequestData, RdmResponseData};
use dmx_rdm_port::responder::{
    DeviceConfig, DmxResponderHandler, Personality, RdmAnswer, ResponderCore,
};
use dmx_rdm_port::types::{DataPack, ResponseType};
use dmx_rdm_port::unique_identifier::{PackageAddress, UniqueIdentifier};
use std::collections::VecDeque;

/// Handler that leaves every unregistered PID to the driver's default NACK.
pub struct NullHandler;

impl DmxResponderHandler for NullHandler {
    type Error = Infallible;
}

pub const PERSONALITIES: &[Personality] = &[
    Personality {
        footprint: 12,
        description: "Twelve channel",
    },
    Personality {
        footprint: 4,
        description: "Four channel",
    },
];

pub fn device_config() -> DeviceConfig {
    DeviceConfig {
        model_id: 0x1234,
        product_category: 0x0508,
        software_version_id: 0x0100_0001,
        software_version_label: "v1.0.1",
        device_label: "test fixture",
        personalities: PERSONALITIES,
        current_personality: 1,
        dmx_start_address: 1,
    }
}

pub fn make_responder(device_id: u32) -> ResponderCore {
    let uid = UniqueIdentifier::new(0x05E0, device_id).unwrap();
    ResponderCore::new(0, uid, None, &device_config(), 128, &mut ()).unwrap()
}

/// A wire-less RS485 bus: requests are dispatched straight into a set of
/// responder cores, replies queue up for the controller. Several
/// simultaneous discovery replies surface as a collision, the way
/// overlapping transmissions do on the real bus.
pub struct MockRdmBus {
    pub responders: Vec<ResponderCore>,
    pending: VecDeque<RdmResponseData>,
    pending_discovery: Vec<UniqueIdentifier>,
    /// Answer the next GET IDENTIFY_DEVICE with ACK_TIMER of this many
    /// 100 ms units instead of dispatching it.
    pub defer_identify: Option<u16>,
    pub frames_sent: usize,
    pub waited_us: u64,
}

impl MockRdmBus {
    pub fn new(responders: Vec<ResponderCore>) -> Self {
        Self {
            responders,
            pending: VecDeque::new(),
            pending_discovery: Vec::new(),
            defer_identify: None,
            frames_sent: 0,
            waited_us: 0,
        }
    }
}

impl ControllerDriverErrorDef for MockRdmBus {
    type DriverError = Infallible;
}

impl DmxControllerDriver for MockRdmBus {
    fn send_dmx_package(&mut self, _package: &[u8]) -> Result<(), DmxError<Self::DriverError>> {
        self.frames_sent += 1;
        Ok(())
    }
}

impl RdmControllerDriver for MockRdmBus {
    fn send_rdm(&mut self, package: RdmData) -> Result<(), DmxError<Self::DriverError>> {
        self.frames_sent += 1;

        let RdmData::Request(request) = package else {
            return Ok(());
        };

        if request.parameter_id == pids::IDENTIFY_DEVICE
            && request.command_class == RequestCommandClass::GetCommand
        {
            if let Some(timer) = self.defer_identify.take() {
                self.pending.push_back(deferral_response(&request, timer));
                return Ok(());
            }
        }

        for responder in &mut self.responders {
            let outcome = responder.dispatch(&request, &mut NullHandler).unwrap();
            match outcome.answer {
                RdmAnswer::Response(response) => self.pending.push_back(response),
                RdmAnswer::DiscoveryResponse(uid) => self.pending_discovery.push(uid),
                RdmAnswer::NoResponse => {},
            }
        }

        Ok(())
    }

    fn receive_rdm(&mut self) -> Result<RdmData, DmxError<Self::DriverError>> {
        match self.pending.pop_front() {
            Some(response) => Ok(RdmData::Response(response)),
            None => Err(DmxError::TimeoutError),
        }
    }

    fn receive_rdm_discovery_response(
        &mut self,
    ) -> Result<DiscoveryOption, DmxError<Self::DriverError>> {
        let replies = std::mem::take(&mut self.pending_discovery);

        Ok(match replies.len() {
            0 => DiscoveryOption::NoDevice,
            1 => DiscoveryOption::Found(replies[0]),
            _ => DiscoveryOption::Collision,
        })
    }

    fn send_rdm_discovery_response(
        &mut self,
        _uid: UniqueIdentifier,
    ) -> Result<(), DmxError<Self::DriverError>> {
        Ok(())
    }

    fn wait_micros(&mut self, micros: u32) {
        self.waited_us += micros as u64;
    }
}

fn deferral_response(request: &RdmRequestData, timer: u16) -> RdmResponseData {
    let PackageAddress::Device(source_uid) = request.destination_uid else {
        panic!("deferred requests must be unicast");
    };

    RdmResponseData {
        destination_uid: PackageAddress::Device(request.source_uid),
        source_uid,
        transaction_number: request.transaction_number,
        response_type: ResponseType::ResponseTypeAckTimer,
        message_count: 0,
        sub_device: request.sub_device,
        command_class: request.command_class.get_response_class(),
        parameter_id: request.parameter_id,
        parameter_data: DataPack::from_slice(&timer.to_be_bytes()).unwrap(),
    }
}

/// Builds a unicast request the way a controller would put it on the wire.
pub fn build_request(
    destination: UniqueIdentifier,
    command_class: RequestCommandClass,
    parameter_id: u16,
    parameter_data: &[u8],
) -> RdmRequestData {
    RdmRequestData {
        destination_uid: PackageAddress::Device(destination),
        source_uid: UniqueIdentifier::new(0x7FF0, 99).unwrap(),
        transaction_number: 1,
        port_id: 1,
        message_count: 0,
        sub_device: 0,
        command_class,
        parameter_id,
        parameter_data: DataPack::from_slice(parameter_data).unwrap(),
    }
}
