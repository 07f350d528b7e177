//! The per-port driver façade.
//!
//! A [`DmxPort`] owns the HAL handles, the shared frame buffer and the
//! responder state of one physical UART. The public API runs in task
//! context and takes `&mut self`; composite operations reuse the
//! primitives directly, so the single, reentrant lock order the layering
//! requires holds by construction. The framing engine sits behind a
//! `critical_section` mutex because the ISR entry points share it with
//! the API; those critical sections are constant-time.
//!
//! Platform glue forwards the UART, timer and sniffer-GPIO interrupts of
//! the port to [`DmxPort::on_uart_interrupt`], [`DmxPort::on_timer_interrupt`]
//! and [`DmxPort::on_sniffer_edge`].

use crate::consts::{
    DMX_MAX_PACKET_SIZE, PD_HEAP_MIN_SIZE, RDM_MAX_DISCOVERY_RESPONSE_SIZE, RDM_MAX_PACKET_SIZE,
    RDM_REQUEST_TIMEOUT_US,
};
use crate::dmx_driver::{
    ControllerDriverErrorDef, DiscoveryOption, DmxControllerDriver, DmxError, RdmControllerDriver,
};
use crate::engine::FramingEngine;
use crate::hal::{DmxHardware, UartEvent, WakeupSignal};
use crate::rdm_data::{
    deserialize_discovery_response, encode_discovery_response, RdmData, RdmDeserializationError,
};
use crate::registry;
use crate::responder::{
    persist_parameter, DeviceConfig, DmxResponderHandler, RdmAnswer, ResponderCore,
};
use crate::sniffer::DmxMetadata;
use crate::types::{DmxPacket, DriverError, PacketError, PacketKind};
use crate::unique_identifier::UniqueIdentifier;
use core::cell::RefCell;
use critical_section::Mutex;

/// Install-time configuration of one port.
pub struct PortConfig {
    pub device: DeviceConfig,
    /// Size of the parameter heap; floored at 53 bytes.
    pub parameter_heap_size: usize,
    /// Transmitted break length in microseconds, clamped to the DMX window.
    pub break_len: u32,
    /// Transmitted mark-after-break length in microseconds, clamped.
    pub mab_len: u32,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            parameter_heap_size: 128,
            break_len: crate::consts::DMX_BREAK_LEN_US,
            mab_len: crate::consts::DMX_MAB_LEN_US,
        }
    }
}

/// Errors surfaced while polling the responder.
#[derive(Debug)]
pub enum PollError<HandlerError> {
    /// The driver rejected the operation.
    Driver(DriverError),
    /// The packet arrived damaged.
    Packet(PacketError),
    /// The packet did not parse as RDM.
    Deserialization(RdmDeserializationError),
    /// A response was received where a request was expected.
    NotMatching,
    /// The application handler failed.
    Handler(HandlerError),
}

impl<HandlerError: core::fmt::Display> core::fmt::Display for PollError<HandlerError> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PollError::Driver(error) => error.fmt(f),
            PollError::Packet(error) => error.fmt(f),
            PollError::Deserialization(error) => error.fmt(f),
            PollError::NotMatching => write!(f, "received a response instead of a request"),
            PollError::Handler(error) => error.fmt(f),
        }
    }
}

#[cfg(feature = "std")]
impl<HandlerError: core::fmt::Display + core::fmt::Debug> std::error::Error
    for PollError<HandlerError>
{
}

pub struct DmxPort<H: DmxHardware> {
    port_num: u8,
    shared: Mutex<RefCell<FramingEngine<H::Uart, H::Timer>>>,
    signal: H::Signal,
    nvs: H::Nvs,
    responder: ResponderCore,
}

impl<H: DmxHardware> DmxPort<H> {
    /// Installs the driver on `port_num`, registering the required RDM
    /// parameters and enabling reception.
    ///
    /// Fails with `InvalidArg` on config violations, `InvalidState` when
    /// the slot is already owned and `NoMem` when the parameter heap or
    /// table cannot hold the required registrations; in every failure case
    /// the slot is left uninstalled.
    pub fn install(
        port_num: u8,
        config: &PortConfig,
        uart: H::Uart,
        timer: H::Timer,
        signal: H::Signal,
        mut nvs: H::Nvs,
    ) -> Result<Self, DriverError> {
        validate_config(config)?;

        if !registry::claim_slot(port_num) {
            return Err(DriverError::InvalidState);
        }

        let uid = registry::bind_device_uid(port_num, H::mac_address());
        // Only multi-port devices report a binding UID in mute replies.
        let binding_uid = (registry::installed_count() > 1)
            .then(registry::device_uid)
            .flatten();

        let heap_size = config.parameter_heap_size.max(PD_HEAP_MIN_SIZE);
        let responder = match ResponderCore::new(
            port_num,
            uid,
            binding_uid,
            &config.device,
            heap_size,
            &mut nvs,
        ) {
            Ok(responder) => responder,
            Err(_) => {
                registry::release_slot(port_num);
                return Err(DriverError::NoMem);
            },
        };

        let engine = FramingEngine::new(uart, timer, config.break_len, config.mab_len);

        #[cfg(feature = "log")]
        log::info!("dmx driver installed on port {} as {}", port_num, uid);

        Ok(Self {
            port_num,
            shared: Mutex::new(RefCell::new(engine)),
            signal,
            nvs,
            responder,
        })
    }

    /// Uninstalls the driver and frees the port slot. Dropping the port
    /// has the same effect.
    pub fn delete(self) {}

    pub fn port_num(&self) -> u8 {
        self.port_num
    }

    /// The RDM UID this port responds to.
    pub fn uid(&self) -> UniqueIdentifier {
        self.responder.uid()
    }

    pub fn responder(&self) -> &ResponderCore {
        &self.responder
    }

    pub fn responder_mut(&mut self) -> &mut ResponderCore {
        &mut self.responder
    }

    fn with_engine<R>(&self, f: impl FnOnce(&mut FramingEngine<H::Uart, H::Timer>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.shared.borrow_ref_mut(cs)))
    }

    // ISR entry points ---------------------------------------------------

    /// Forwards one UART interrupt condition. Callable from ISR context.
    pub fn on_uart_interrupt(&self, event: UartEvent) {
        let wake = self.with_engine(|engine| engine.handle_uart_event(event, H::micros()));
        if wake {
            self.signal.signal();
        }
    }

    /// Forwards the hardware timer alarm. Callable from ISR context.
    pub fn on_timer_interrupt(&self) {
        let wake = self.with_engine(|engine| engine.handle_timer_alarm(H::micros()));
        if wake {
            self.signal.signal();
        }
    }

    /// Forwards a sniffer GPIO edge. Callable from ISR context.
    pub fn on_sniffer_edge(&self) {
        self.with_engine(|engine| engine.handle_sniffer_edge(H::micros()));
    }

    // Configuration ------------------------------------------------------

    /// Applies a break length, clamped to [92, 1_000_000] µs. Returns the
    /// value actually applied.
    pub fn set_break_len(&mut self, break_len: u32) -> u32 {
        self.with_engine(|engine| engine.set_break_len(break_len))
    }

    pub fn break_len(&self) -> u32 {
        self.with_engine(|engine| engine.break_len())
    }

    /// Applies a mark-after-break length, clamped to [12, 1_000_000] µs.
    /// Returns the value actually applied.
    pub fn set_mab_len(&mut self, mab_len: u32) -> u32 {
        self.with_engine(|engine| engine.set_mab_len(mab_len))
    }

    pub fn mab_len(&self) -> u32 {
        self.with_engine(|engine| engine.mab_len())
    }

    /// Applies a baud rate, clamped to [245_000, 255_000] Bd. Returns the
    /// value actually applied.
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> u32 {
        self.with_engine(|engine| engine.set_baud_rate(baud_rate))
    }

    pub fn baud_rate(&self) -> u32 {
        self.with_engine(|engine| engine.baud_rate())
    }

    /// Masks receive interrupts so the ISR stays quiet, e.g. around flash
    /// writes. An in-flight transmission completes first.
    pub fn disable(&mut self) -> Result<(), DriverError> {
        self.with_engine(|engine| {
            if !engine.is_enabled() {
                return Err(DriverError::InvalidState);
            }
            if !engine.disable() {
                return Err(DriverError::InvalidState);
            }
            Ok(())
        })
    }

    /// Re-enables reception. The driver waits for a fresh break before
    /// reading data.
    pub fn enable(&mut self) -> Result<(), DriverError> {
        self.with_engine(|engine| {
            if engine.is_enabled() {
                return Err(DriverError::InvalidState);
            }
            engine.enable();
            Ok(())
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.with_engine(|engine| engine.is_enabled())
    }

    // Sniffer ------------------------------------------------------------

    pub fn sniffer_enable(&mut self) {
        self.with_engine(|engine| engine.sniffer_enable());
    }

    pub fn sniffer_disable(&mut self) {
        self.with_engine(|engine| engine.sniffer_disable());
    }

    /// The oldest unread break/mark timing record, if any.
    pub fn sniffer_read(&mut self) -> Option<DmxMetadata> {
        self.with_engine(|engine| engine.sniffer_pop())
    }

    // Frame interface ----------------------------------------------------

    /// Copies `data` into the frame buffer at `offset`. Slot 0 is the
    /// start code. Returns the bytes written; zero while a transmission is
    /// in progress.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> usize {
        self.with_engine(|engine| engine.write(offset, data))
    }

    /// Copies the frame buffer into `out` starting at `offset`.
    pub fn read(&self, offset: usize, out: &mut [u8]) -> usize {
        self.with_engine(|engine| engine.read(offset, out))
    }

    /// Transmits `size` buffered bytes. Waits for the engine to go idle
    /// first; packets of one port serialize in call order.
    pub fn send(&mut self, size: usize) -> Result<usize, DriverError> {
        if size == 0 || size > DMX_MAX_PACKET_SIZE {
            return Err(DriverError::InvalidArg);
        }
        if !self.is_enabled() {
            return Err(DriverError::InvalidState);
        }
        if !self.wait_sent(RDM_REQUEST_TIMEOUT_US) {
            return Err(DriverError::Timeout);
        }

        self.with_engine(|engine| engine.start_transmit(size));
        Ok(size)
    }

    /// Blocks until the engine finishes transmitting, or `timeout_us`.
    pub fn wait_sent(&self, timeout_us: u32) -> bool {
        let deadline = H::micros() + timeout_us as i64;

        loop {
            if !self.with_engine(|engine| engine.is_sending()) {
                return true;
            }

            self.signal.clear();
            if !self.with_engine(|engine| engine.is_sending()) {
                return true;
            }

            let remaining = deadline - H::micros();
            if remaining <= 0 {
                return false;
            }
            if !self.signal.wait(Some(remaining as u32)) {
                return !self.with_engine(|engine| engine.is_sending());
            }
        }
    }

    /// Waits for one received packet. The returned [`DmxPacket`] carries
    /// the byte count together with any wire-level error, so a partial
    /// buffer can still be inspected. A timeout (and a disable arriving
    /// mid-wait) is reported as a packet with [`PacketError::Timeout`].
    pub fn receive(&mut self, timeout_us: Option<u32>) -> Result<DmxPacket, DriverError> {
        if !self.is_enabled() {
            return Err(DriverError::InvalidState);
        }

        self.with_engine(|engine| engine.arm_receive());

        let deadline = timeout_us.map(|timeout_us| H::micros() + timeout_us as i64);

        loop {
            if let Some(packet) = self.take_ready_packet() {
                return Ok(packet);
            }

            self.signal.clear();
            if let Some(packet) = self.take_ready_packet() {
                return Ok(packet);
            }

            let wait = match deadline {
                None => None,
                Some(deadline) => {
                    let remaining = deadline - H::micros();
                    if remaining <= 0 {
                        return Ok(DmxPacket::timeout());
                    }
                    Some(remaining as u32)
                },
            };

            if !self.signal.wait(wait) {
                return Ok(self.take_ready_packet().unwrap_or_else(DmxPacket::timeout));
            }

            if !self.is_enabled() {
                // Disabled mid-wait: surfaces like a timeout.
                return Ok(DmxPacket::timeout());
            }
        }
    }

    fn take_ready_packet(&self) -> Option<DmxPacket> {
        self.with_engine(|engine| {
            if engine.has_data() {
                engine.take_packet()
            } else {
                None
            }
        })
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<(), DriverError> {
        if !self.wait_sent(RDM_REQUEST_TIMEOUT_US) {
            return Err(DriverError::Timeout);
        }
        if self.write(0, frame) != frame.len() {
            return Err(DriverError::InvalidState);
        }
        self.send(frame.len())?;
        Ok(())
    }

    // Responder ----------------------------------------------------------

    /// Services one incoming packet: receives with `timeout_us`, answers
    /// RDM requests addressed to this port and forwards everything else to
    /// `handler`. Returns false when nothing (or only noise) arrived.
    pub fn poll_rdm<HandlerError>(
        &mut self,
        timeout_us: u32,
        handler: &mut dyn DmxResponderHandler<Error = HandlerError>,
    ) -> Result<bool, PollError<HandlerError>> {
        let packet = self
            .receive(Some(timeout_us))
            .map_err(PollError::Driver)?;

        match packet.error {
            Some(PacketError::Timeout) => return Ok(false),
            Some(error) => return Err(PollError::Packet(error)),
            None => {},
        }

        let mut frame = [0u8; DMX_MAX_PACKET_SIZE];
        let size = packet.size.min(frame.len());
        self.read(0, &mut frame[..size]);

        if packet.kind != PacketKind::Rdm {
            handler
                .handle_dmx(&frame[..size], &mut self.responder)
                .map_err(PollError::Handler)?;
            return Ok(true);
        }

        let request = match RdmData::deserialize(&frame[..size]) {
            Ok(RdmData::Request(request)) => request,
            Ok(RdmData::Response(_)) => return Err(PollError::NotMatching),
            Err(error) => return Err(PollError::Deserialization(error)),
        };
        let command_class = request.command_class;

        let outcome = self
            .responder
            .dispatch(&request, handler)
            .map_err(PollError::Handler)?;

        match outcome.answer {
            RdmAnswer::Response(response) => {
                let serialized = RdmData::Response(response).serialize();
                self.send_frame(&serialized).map_err(PollError::Driver)?;
            },
            RdmAnswer::DiscoveryResponse(uid) => {
                let mut buffer = [0u8; RDM_MAX_DISCOVERY_RESPONSE_SIZE];
                let size = encode_discovery_response(uid, 7, &mut buffer);
                self.send_frame(&buffer[..size]).map_err(PollError::Driver)?;
            },
            RdmAnswer::NoResponse => {},
        }

        if let Some(changed) = outcome.changed {
            if !persist_parameter(&self.responder, &mut self.nvs, changed) {
                #[cfg(feature = "log")]
                log::warn!("unable to persist pid 0x{:04x}", changed.pid);
            }

            if let Some(callback) = self.responder.params.callback(changed.pid) {
                callback(self.port_num, changed.pid, command_class);
            }
        }

        Ok(true)
    }
}

impl<H: DmxHardware> Drop for DmxPort<H> {
    fn drop(&mut self) {
        self.with_engine(|engine| {
            let _ = engine.disable();
        });
        registry::release_slot(self.port_num);
    }
}

fn validate_config(config: &PortConfig) -> Result<(), DriverError> {
    let device = &config.device;

    if device.personalities.len() > 255
        || device.software_version_label.len() > 32
        || device.device_label.len() > 32
    {
        return Err(DriverError::InvalidArg);
    }

    for personality in device.personalities {
        if !(1..=512).contains(&personality.footprint) {
            return Err(DriverError::InvalidArg);
        }
    }

    if device.current_personality as usize > device.personalities.len() {
        return Err(DriverError::InvalidArg);
    }

    let start_address_valid = if device.personalities.is_empty() {
        // Zero-footprint devices must not claim slots.
        device.dmx_start_address == 0
            || device.dmx_start_address == crate::consts::DMX_START_ADDRESS_NONE
    } else {
        device.dmx_start_address == 0 || (1..=512).contains(&device.dmx_start_address)
    };
    if !start_address_valid {
        return Err(DriverError::InvalidArg);
    }

    Ok(())
}

// Controller-side driver implementation ---------------------------------

impl<H: DmxHardware> ControllerDriverErrorDef for DmxPort<H> {
    type DriverError = DriverError;
}

impl<H: DmxHardware> DmxControllerDriver for DmxPort<H> {
    fn send_dmx_package(&mut self, package: &[u8]) -> Result<(), DmxError<Self::DriverError>> {
        if package.len() >= DMX_MAX_PACKET_SIZE {
            return Err(DmxError::UartOverflow);
        }

        let mut frame = [0u8; DMX_MAX_PACKET_SIZE];
        frame[0] = crate::consts::DMX_NULL_START;
        frame[1..=package.len()].copy_from_slice(package);

        self.send_frame(&frame[..package.len() + 1])
            .map_err(DmxError::DriverError)
    }
}

impl<H: DmxHardware> RdmControllerDriver for DmxPort<H> {
    fn send_rdm(&mut self, package: RdmData) -> Result<(), DmxError<Self::DriverError>> {
        let serialized = package.serialize();
        self.send_frame(&serialized).map_err(DmxError::DriverError)
    }

    fn receive_rdm(&mut self) -> Result<RdmData, DmxError<Self::DriverError>> {
        let packet = self
            .receive(Some(RDM_REQUEST_TIMEOUT_US))
            .map_err(DmxError::DriverError)?;

        match packet.error {
            None => {},
            Some(PacketError::Timeout) => return Err(DmxError::TimeoutError),
            Some(PacketError::InvalidCrc) | Some(PacketError::DataCollision) => {
                return Err(DmxError::DeserializationError(
                    RdmDeserializationError::WrongChecksum,
                ))
            },
            Some(_) => return Err(DmxError::TimeoutError),
        }

        if packet.kind != PacketKind::Rdm {
            return Err(DmxError::DeserializationError(
                RdmDeserializationError::WrongStartCode,
            ));
        }

        let mut frame = [0u8; RDM_MAX_PACKET_SIZE];
        let size = packet.size.min(frame.len());
        self.read(0, &mut frame[..size]);

        RdmData::deserialize(&frame[..size]).map_err(DmxError::DeserializationError)
    }

    fn receive_rdm_discovery_response(
        &mut self,
    ) -> Result<DiscoveryOption, DmxError<Self::DriverError>> {
        let packet = self
            .receive(Some(RDM_REQUEST_TIMEOUT_US))
            .map_err(DmxError::DriverError)?;

        match packet.error {
            Some(PacketError::Timeout) => return Ok(DiscoveryOption::NoDevice),
            // Collisions and mangled encodings both mean several responders.
            Some(_) => return Ok(DiscoveryOption::Collision),
            None => {},
        }

        if packet.kind != PacketKind::RdmDiscoveryResponse {
            return Ok(DiscoveryOption::Collision);
        }

        let mut frame = [0u8; RDM_MAX_DISCOVERY_RESPONSE_SIZE];
        let size = packet.size.min(frame.len());
        self.read(0, &mut frame[..size]);

        Ok(match deserialize_discovery_response(&frame[..size]) {
            Ok(uid) => DiscoveryOption::Found(uid),
            Err(_) => DiscoveryOption::Collision,
        })
    }

    fn send_rdm_discovery_response(
        &mut self,
        uid: UniqueIdentifier,
    ) -> Result<(), DmxError<Self::DriverError>> {
        let mut buffer = [0u8; RDM_MAX_DISCOVERY_RESPONSE_SIZE];
        let size = encode_discovery_response(uid, 7, &mut buffer);
        self.send_frame(&buffer[..size]).map_err(DmxError::DriverError)
    }

    fn wait_micros(&mut self, micros: u32) {
        H::delay_micros(micros);
    }
}
