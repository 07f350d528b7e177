//! The line-level framing engine.
//!
//! One instance per port, shared between the public API and the UART,
//! timer and GPIO interrupt handlers. Every method runs inside the port's
//! critical section and completes in constant time: no loops over slots,
//! no allocation, no calls that may sleep.
//!
//! Receive is driven by UART events, transmit by the hardware timer (for
//! the break and mark-after-break) and then by UART transmit events. After
//! sending an RDM request that expects an answer the engine turns the bus
//! around on its own and arms a response-timeout alarm.

use crate::classifier::classify;
use crate::consts::{
    DELIMITER_BYTE, DMX_BAUD_MAX, DMX_BAUD_MIN, DMX_BREAK_LEN_MAX_US, DMX_BREAK_LEN_MIN_US,
    DMX_MAB_LEN_MAX_US, DMX_MAB_LEN_MIN_US, DMX_MAX_PACKET_SIZE, PREAMBLE_BYTE,
    RDM_RESPONSE_TIMEOUT_US, SC_RDM, SC_SUB_MESSAGE,
};
use crate::hal::{DmxTimer, DmxUart, IrqMask, UartEvent};
use crate::pids;
use crate::sniffer::{DmxMetadata, Sniffer};
use crate::types::{DmxPacket, PacketError, PacketKind};
use modular_bitfield::bitfield;
use modular_bitfield::prelude::B1;

/// Driver state bits. `sending` and `idle` are mutually exclusive while the
/// driver is enabled; `in_break`/`in_mab` track the transmit reset sequence.
#[bitfield]
pub(crate) struct DriverFlags {
    pub enabled: bool,
    pub idle: bool,
    pub sending: bool,
    pub sent_last: bool,
    pub in_break: bool,
    pub in_mab: bool,
    pub has_data: bool,
    #[skip]
    __: B1,
}

/// Classification of the packet most recently handed to the transmitter,
/// fixed at [`FramingEngine::start_transmit`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum TxKind {
    /// DMX or an alternate start code. No reply expected.
    Dmx,
    /// RDM addressed at a broadcast, or a response we are emitting.
    RdmNoReply,
    /// RDM request that obliges the target to answer.
    RdmExpectsReply,
    /// DISC_UNIQUE_BRANCH request. The answer arrives without a break.
    DiscoveryBranch,
    /// Our own discovery response, sent without a break.
    DiscoveryResponse,
}

pub(crate) struct FramingEngine<U: DmxUart, T: DmxTimer> {
    pub(crate) uart: U,
    pub(crate) timer: T,

    buffer: [u8; DMX_MAX_PACKET_SIZE],
    /// Index of the slot being sent or received; -1 means waiting for a
    /// break (or, while receiving, the error latch).
    head: i32,
    tx_size: usize,
    /// Rolling estimate of incoming non-RDM packet length, updated on
    /// every break.
    rx_size: usize,

    flags: DriverFlags,
    break_len: u32,
    mab_len: u32,
    last_slot_ts: i64,
    tn: u8,

    tx_kind: TxKind,
    /// Set between bus turnaround and the response (or its timeout alarm).
    awaiting_response: bool,
    /// Metadata of the completed-but-unread packet. At most one; further
    /// packets overwrite the buffer but not the pending metadata.
    pending: Option<DmxPacket>,
    /// Latched once the current frame produced its wakeup, cleared by the
    /// next break. Keeps a consumed completion from being re-reported.
    event_sent: bool,
    sniffer: Option<Sniffer>,
    /// Receive-side break-detect state, consumed by the sniffer.
    rx_in_break: bool,
}

impl<U: DmxUart, T: DmxTimer> FramingEngine<U, T> {
    pub(crate) fn new(uart: U, timer: T, break_len: u32, mab_len: u32) -> Self {
        let mut engine = Self {
            uart,
            timer,
            buffer: [0; DMX_MAX_PACKET_SIZE],
            head: -1,
            tx_size: DMX_MAX_PACKET_SIZE,
            rx_size: DMX_MAX_PACKET_SIZE,
            flags: DriverFlags::new().with_enabled(true).with_idle(true),
            break_len: break_len.clamp(DMX_BREAK_LEN_MIN_US, DMX_BREAK_LEN_MAX_US),
            mab_len: mab_len.clamp(DMX_MAB_LEN_MIN_US, DMX_MAB_LEN_MAX_US),
            last_slot_ts: 0,
            tn: 0,
            tx_kind: TxKind::Dmx,
            awaiting_response: false,
            pending: None,
            event_sent: false,
            sniffer: None,
            rx_in_break: false,
        };

        engine.uart.rxfifo_reset();
        engine.uart.txfifo_reset();
        engine.uart.clear_interrupts(IrqMask::rx_all());
        engine.uart.enable_interrupts(IrqMask::rx_all());
        engine.uart.set_rts(true);

        engine
    }

    // Configuration ------------------------------------------------------

    /// Clamps to the DMX window and returns the applied value.
    pub(crate) fn set_break_len(&mut self, break_len: u32) -> u32 {
        self.break_len = break_len.clamp(DMX_BREAK_LEN_MIN_US, DMX_BREAK_LEN_MAX_US);
        self.break_len
    }

    pub(crate) fn break_len(&self) -> u32 {
        self.break_len
    }

    /// Clamps to the DMX window and returns the applied value.
    pub(crate) fn set_mab_len(&mut self, mab_len: u32) -> u32 {
        self.mab_len = mab_len.clamp(DMX_MAB_LEN_MIN_US, DMX_MAB_LEN_MAX_US);
        self.mab_len
    }

    pub(crate) fn mab_len(&self) -> u32 {
        self.mab_len
    }

    /// Clamps to the DMX window and returns the applied value.
    pub(crate) fn set_baud_rate(&mut self, baud_rate: u32) -> u32 {
        let applied = baud_rate.clamp(DMX_BAUD_MIN, DMX_BAUD_MAX);
        self.uart.set_baud_rate(applied);
        applied
    }

    pub(crate) fn baud_rate(&self) -> u32 {
        self.uart.baud_rate()
    }

    // State accessors ----------------------------------------------------

    pub(crate) fn is_enabled(&self) -> bool {
        self.flags.enabled()
    }

    pub(crate) fn is_sending(&self) -> bool {
        self.flags.sending()
    }

    pub(crate) fn has_data(&self) -> bool {
        self.flags.has_data()
    }

    pub(crate) fn transaction_number(&self) -> u8 {
        self.tn
    }

    pub(crate) fn last_slot_timestamp(&self) -> i64 {
        self.last_slot_ts
    }

    // Buffer access ------------------------------------------------------

    pub(crate) fn write(&mut self, offset: usize, data: &[u8]) -> usize {
        if offset >= DMX_MAX_PACKET_SIZE || self.flags.sending() {
            return 0;
        }
        if self.uart.get_rts() {
            // Flip the bus so incoming data stops overwriting the buffer.
            self.uart.set_rts(false);
        }

        let len = data.len().min(DMX_MAX_PACKET_SIZE - offset);
        self.buffer[offset..offset + len].copy_from_slice(&data[..len]);
        self.tx_size = offset + len;
        len
    }

    pub(crate) fn read(&self, offset: usize, out: &mut [u8]) -> usize {
        if offset >= DMX_MAX_PACKET_SIZE {
            return 0;
        }
        let len = out.len().min(DMX_MAX_PACKET_SIZE - offset);
        out[..len].copy_from_slice(&self.buffer[offset..offset + len]);
        len
    }

    // Lifecycle ----------------------------------------------------------

    /// Masks receive interrupts. An in-flight transmission completes.
    pub(crate) fn disable(&mut self) -> bool {
        if self.flags.sending() {
            return false;
        }
        self.uart.disable_interrupts(IrqMask::rx_all());
        self.uart.clear_interrupts(IrqMask::rx_all());
        self.flags.set_enabled(false);
        true
    }

    pub(crate) fn enable(&mut self) {
        self.head = -1;
        self.flags.set_enabled(true);
        self.flags.set_idle(true);
        self.flags.set_in_break(false);
        self.flags.set_has_data(false);
        self.pending = None;
        self.event_sent = false;
        self.uart.rxfifo_reset();
        self.uart.txfifo_reset();
        self.uart.clear_interrupts(IrqMask::rx_all());
        self.uart.enable_interrupts(IrqMask::rx_all());
    }

    pub(crate) fn sniffer_enable(&mut self) {
        self.sniffer = Some(Sniffer::new());
    }

    pub(crate) fn sniffer_disable(&mut self) {
        self.sniffer = None;
    }

    pub(crate) fn sniffer_pop(&mut self) -> Option<DmxMetadata> {
        self.sniffer.as_mut()?.pop()
    }

    // Receive path -------------------------------------------------------

    /// Prepares the port for a fresh packet when the bus is not already in
    /// receive direction.
    pub(crate) fn arm_receive(&mut self) {
        if !self.uart.get_rts() {
            self.head = -1;
            self.flags.set_has_data(false);
            self.pending = None;
            self.event_sent = false;
            self.uart.rxfifo_reset();
            self.uart.clear_interrupts(IrqMask::rx_all());
            self.uart.enable_interrupts(IrqMask::rx_all());
            self.uart.set_rts(true);
        }
    }

    /// Takes the pending packet metadata, clearing `HAS_DATA`.
    pub(crate) fn take_packet(&mut self) -> Option<DmxPacket> {
        self.flags.set_has_data(false);
        self.pending.take()
    }

    fn post_packet(&mut self, packet: DmxPacket) {
        // At-most-one-pending: a second completion must not clobber the
        // metadata an armed reader is about to observe.
        if self.pending.is_none() {
            self.pending = Some(packet);
        }
        self.flags.set_has_data(true);
        self.event_sent = true;
    }

    fn received_kind(&self, head: usize) -> PacketKind {
        if head == 0 {
            PacketKind::Dmx
        } else {
            match self.buffer[0] {
                SC_RDM => PacketKind::Rdm,
                PREAMBLE_BYTE | DELIMITER_BYTE => PacketKind::RdmDiscoveryResponse,
                _ => PacketKind::Dmx,
            }
        }
    }

    fn start_code(&self, head: usize) -> Option<u8> {
        (head > 0).then(|| self.buffer[0])
    }

    /// One UART interrupt condition. Returns true when a waiting task must
    /// be woken.
    pub(crate) fn handle_uart_event(&mut self, event: UartEvent, now: i64) -> bool {
        match event {
            UartEvent::RxBreak => self.on_rx_break(),
            UartEvent::RxData => self.on_rx_data(now),
            UartEvent::RxFramingError => self.on_rx_fault(PacketError::ImproperSlot),
            UartEvent::RxOverflow => self.on_rx_fault(PacketError::DataOverflow),
            UartEvent::RxClash => self.on_rx_clash(),
            UartEvent::TxData => self.on_tx_data(),
            UartEvent::TxDone => self.on_tx_done(now),
        }
    }

    fn on_rx_break(&mut self) -> bool {
        self.rx_in_break = true;
        let mut wake = false;

        if self.head > 0 && !self.event_sent {
            // A non-RDM packet shorter than the estimate completes here.
            let head = self.head as usize;
            let error = (head > DMX_MAX_PACKET_SIZE).then_some(PacketError::PacketSize);
            self.post_packet(DmxPacket {
                size: head.min(DMX_MAX_PACKET_SIZE),
                start_code: self.start_code(head),
                kind: self.received_kind(head),
                error,
            });
            self.rx_size = head.min(DMX_MAX_PACKET_SIZE);
            wake = true;
        }

        self.head = 0;
        self.event_sent = false;
        self.uart.rxfifo_reset();
        wake
    }

    fn on_rx_data(&mut self, now: i64) -> bool {
        if self.head < 0 {
            // Waiting for a break, or latched in the error state.
            self.uart.rxfifo_reset();
            return false;
        }

        let head = self.head as usize;
        if head < DMX_MAX_PACKET_SIZE {
            let read = {
                let buffer = &mut self.buffer[head..];
                self.uart.read_rxfifo(buffer)
            };
            self.head += read as i32;
        } else {
            // No slots remaining; count the extra bytes for error reporting.
            self.head += self.uart.rxfifo_len() as i32;
            self.uart.rxfifo_reset();
        }
        self.last_slot_ts = now;

        if self.event_sent {
            return false;
        }

        let head = (self.head as usize).min(DMX_MAX_PACKET_SIZE);
        let result = classify(&self.buffer, head, self.rx_size);
        if !result.complete {
            return false;
        }

        self.post_packet(DmxPacket {
            size: head,
            start_code: self.start_code(head),
            kind: result.kind,
            error: result.error,
        });

        if self.awaiting_response {
            self.finish_response_window();
        }

        true
    }

    fn on_rx_fault(&mut self, error: PacketError) -> bool {
        if self.head < 0 {
            self.uart.rxfifo_reset();
            return false;
        }

        // A framing error still delivers its byte on most UARTs; fold the
        // FIFO residue into the reported size.
        let size = self.head as usize + self.uart.rxfifo_len();
        self.uart.rxfifo_reset();

        self.post_packet(DmxPacket {
            size: size.min(DMX_MAX_PACKET_SIZE),
            start_code: self.start_code(size),
            kind: self.received_kind(size),
            error: Some(error),
        });
        self.head = -1; // error latch until the next break
        if self.awaiting_response {
            self.finish_response_window();
        }
        true
    }

    fn on_rx_clash(&mut self) -> bool {
        let size = self.head.max(0) as usize;
        self.uart.rxfifo_reset();

        self.post_packet(DmxPacket {
            size: size.min(DMX_MAX_PACKET_SIZE),
            start_code: self.start_code(size),
            kind: self.received_kind(size),
            error: Some(PacketError::DataCollision),
        });
        self.head = -1;
        if self.awaiting_response {
            self.finish_response_window();
        }
        true
    }

    fn finish_response_window(&mut self) {
        self.awaiting_response = false;
        self.timer.pause();
    }

    // Transmit path ------------------------------------------------------

    /// Arms a transmission of `size` buffered bytes. The caller has checked
    /// the engine is idle.
    pub(crate) fn start_transmit(&mut self, size: usize) {
        self.tx_size = size.min(DMX_MAX_PACKET_SIZE);
        self.flags.set_sending(true);
        self.flags.set_idle(false);
        self.flags.set_sent_last(true);
        self.flags.set_has_data(false);
        self.pending = None;
        self.event_sent = false;
        self.awaiting_response = false;

        if self.uart.get_rts() {
            self.uart.set_rts(false);
        }

        self.tx_kind = self.classify_outbound();
        if matches!(
            self.tx_kind,
            TxKind::RdmExpectsReply | TxKind::DiscoveryBranch
        ) {
            self.tn = self.tn.wrapping_add(1);
        }

        if self.tx_kind == TxKind::DiscoveryResponse {
            // Discovery responses are the one packet without a break.
            let written = self.uart.write_txfifo(&self.buffer[..self.tx_size]);
            self.head = written as i32;
            self.uart.clear_interrupts(IrqMask::tx_all());
            self.uart.enable_interrupts(IrqMask::tx_all());
        } else {
            self.head = -1;
            self.flags.set_in_break(true);
            self.uart.invert_tx(true);
            self.timer.set_alarm(self.break_len);
            self.timer.start();
        }
    }

    fn classify_outbound(&self) -> TxKind {
        match self.buffer[0] {
            PREAMBLE_BYTE | DELIMITER_BYTE => TxKind::DiscoveryResponse,
            SC_RDM if self.tx_size > 23 && self.buffer[1] == SC_SUB_MESSAGE => {
                let command_class = self.buffer[20];
                let pid = u16::from_be_bytes([self.buffer[21], self.buffer[22]]);
                let destination_is_broadcast = self.buffer[5..9].iter().all(|byte| *byte == 0xFF);

                if pid == pids::DISC_UNIQUE_BRANCH && command_class == 0x10 {
                    TxKind::DiscoveryBranch
                } else if matches!(command_class, 0x10 | 0x20 | 0x30) && !destination_is_broadcast {
                    TxKind::RdmExpectsReply
                } else {
                    TxKind::RdmNoReply
                }
            },
            _ => TxKind::Dmx,
        }
    }

    fn on_tx_data(&mut self) -> bool {
        let head = self.head.max(0) as usize;
        if head < self.tx_size {
            let written = {
                let remaining = &self.buffer[head..self.tx_size];
                self.uart.write_txfifo(remaining)
            };
            self.head += written as i32;
        }

        if self.head as usize >= self.tx_size {
            self.uart
                .disable_interrupts(IrqMask::new().with_tx_data(true));
        }
        false
    }

    fn on_tx_done(&mut self, now: i64) -> bool {
        self.last_slot_ts = now;
        self.flags.set_sending(false);
        self.flags.set_idle(true);
        self.uart.disable_interrupts(IrqMask::tx_all());

        if matches!(
            self.tx_kind,
            TxKind::RdmExpectsReply | TxKind::DiscoveryBranch
        ) {
            // Turn the bus around for the response.
            self.head = if self.tx_kind == TxKind::DiscoveryBranch {
                0 // the discovery response arrives without a break
            } else {
                -1
            };
            self.flags.set_has_data(false);
            self.pending = None;
            self.event_sent = false;
            self.uart.rxfifo_reset();
            self.uart.clear_interrupts(IrqMask::rx_all());
            self.uart.enable_interrupts(IrqMask::rx_all());
            self.uart.set_rts(true);

            self.awaiting_response = true;
            self.timer.set_alarm(RDM_RESPONSE_TIMEOUT_US);
            self.timer.start();
        } else {
            self.flags.set_sent_last(false);
        }

        true
    }

    /// The hardware timer alarm: either the response timeout while waiting
    /// for an RDM reply, or the next step of the break / mark-after-break
    /// reset sequence.
    pub(crate) fn handle_timer_alarm(&mut self, _now: i64) -> bool {
        if self.awaiting_response {
            self.awaiting_response = false;
            self.timer.pause();
            self.post_packet(DmxPacket::timeout());
            return true;
        }

        if self.flags.in_break() {
            self.uart.invert_tx(false);
            self.flags.set_in_break(false);
            self.flags.set_in_mab(true);
            self.timer.set_alarm(self.mab_len);
            return false;
        }

        if self.flags.in_mab() {
            self.flags.set_in_mab(false);
            self.timer.pause();
            let written = self.uart.write_txfifo(&self.buffer[..self.tx_size]);
            self.head = written as i32;
            self.uart.clear_interrupts(IrqMask::tx_all());
            self.uart.enable_interrupts(IrqMask::tx_all());
        }

        false
    }

    /// A GPIO edge from the sniffer pin. Purely observational.
    pub(crate) fn handle_sniffer_edge(&mut self, now: i64) {
        let level = self.uart.rx_level();
        let in_break = self.rx_in_break;
        if let Some(sniffer) = self.sniffer.as_mut() {
            if sniffer.record_edge(level, now, in_break) {
                self.rx_in_break = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_class::RequestCommandClass;
    use crate::rdm_data::{BinaryRdmPackage, RdmData, RdmRequestData};
    use crate::types::DataPack;
    use crate::unique_identifier::{PackageAddress, UniqueIdentifier};

    #[derive(Default)]
    struct MockUart {
        rx_fifo: heapless::Deque<u8, 600>,
        tx_log: heapless::Vec<u8, 2048>,
        baud: u32,
        rts: bool,
        inverted: bool,
        rx_level: bool,
    }

    impl MockUart {
        fn feed(&mut self, data: &[u8]) {
            for byte in data {
                self.rx_fifo.push_back(*byte).unwrap();
            }
        }
    }

    impl DmxUart for MockUart {
        fn set_baud_rate(&mut self, baud_rate: u32) {
            self.baud = baud_rate;
        }

        fn baud_rate(&self) -> u32 {
            self.baud
        }

        fn read_rxfifo(&mut self, buffer: &mut [u8]) -> usize {
            let mut read = 0;
            while read < buffer.len() {
                match self.rx_fifo.pop_front() {
                    Some(byte) => {
                        buffer[read] = byte;
                        read += 1;
                    },
                    None => break,
                }
            }
            read
        }

        fn rxfifo_len(&self) -> usize {
            self.rx_fifo.len()
        }

        fn write_txfifo(&mut self, buffer: &[u8]) -> usize {
            self.tx_log.extend_from_slice(buffer).unwrap();
            buffer.len()
        }

        fn rxfifo_reset(&mut self) {
            self.rx_fifo.clear();
        }

        fn txfifo_reset(&mut self) {}

        fn enable_interrupts(&mut self, _mask: IrqMask) {}
        fn disable_interrupts(&mut self, _mask: IrqMask) {}
        fn clear_interrupts(&mut self, _mask: IrqMask) {}

        fn set_rts(&mut self, receive: bool) {
            self.rts = receive;
        }

        fn get_rts(&self) -> bool {
            self.rts
        }

        fn invert_tx(&mut self, invert: bool) {
            self.inverted = invert;
        }

        fn rx_level(&self) -> bool {
            self.rx_level
        }
    }

    #[derive(Default)]
    struct MockTimer {
        alarm: u32,
        running: bool,
    }

    impl DmxTimer for MockTimer {
        fn set_alarm(&mut self, micros: u32) {
            self.alarm = micros;
        }

        fn start(&mut self) {
            self.running = true;
        }

        fn pause(&mut self) {
            self.running = false;
        }
    }

    fn engine() -> FramingEngine<MockUart, MockTimer> {
        FramingEngine::new(MockUart::default(), MockTimer::default(), 176, 12)
    }

    fn get_request(destination: PackageAddress) -> BinaryRdmPackage {
        RdmData::Request(RdmRequestData {
            destination_uid: destination,
            source_uid: UniqueIdentifier::new(0x7FF0, 1).unwrap(),
            transaction_number: 0,
            port_id: 1,
            message_count: 0,
            sub_device: 0,
            command_class: RequestCommandClass::GetCommand,
            parameter_id: crate::pids::DEVICE_INFO,
            parameter_data: DataPack::new(),
        })
        .serialize()
    }

    fn pump_transmit(engine: &mut FramingEngine<MockUart, MockTimer>, now: i64) {
        assert!(!engine.handle_timer_alarm(now)); // break ends
        assert!(!engine.handle_timer_alarm(now)); // mab ends, fifo filled
        engine.handle_uart_event(UartEvent::TxData, now);
        engine.handle_uart_event(UartEvent::TxDone, now);
    }

    #[test]
    fn test_sending_and_idle_are_exclusive() {
        let mut engine = engine();
        assert!(engine.flags.idle() && !engine.flags.sending());

        engine.write(0, &[0u8; 513]);
        engine.start_transmit(513);
        assert!(engine.flags.sending() && !engine.flags.idle());

        pump_transmit(&mut engine, 1_000);
        assert!(engine.flags.idle() && !engine.flags.sending());
    }

    #[test]
    fn test_dmx_transmit_sequence_runs_break_then_mab() {
        let mut engine = engine();

        engine.write(0, &[0, 1, 2, 3]);
        engine.start_transmit(4);

        // Break: TX inverted, alarm set to the break length.
        assert!(engine.uart.inverted);
        assert_eq!(engine.timer.alarm, 176);

        // Break elapses: inversion ends, alarm reprogrammed for the MAB.
        engine.handle_timer_alarm(200);
        assert!(!engine.uart.inverted);
        assert_eq!(engine.timer.alarm, 12);

        // MAB elapses: the packet bytes reach the FIFO.
        engine.handle_timer_alarm(212);
        assert_eq!(&engine.uart.tx_log[..], &[0, 1, 2, 3]);

        engine.handle_uart_event(UartEvent::TxData, 300);
        assert!(engine.handle_uart_event(UartEvent::TxDone, 300));
        assert_eq!(engine.last_slot_timestamp(), 300);
    }

    #[test]
    fn test_transaction_number_increments_per_rdm_request() {
        let mut engine = engine();
        let frame = get_request(PackageAddress::Device(
            UniqueIdentifier::new(0x05E0, 1).unwrap(),
        ));

        for expected in 1..=3u8 {
            engine.write(0, &frame);
            engine.start_transmit(frame.len());
            assert_eq!(engine.transaction_number(), expected);
            pump_transmit(&mut engine, expected as i64 * 1000);
        }
    }

    #[test]
    fn test_rdm_request_turns_bus_around_and_arms_timeout() {
        let mut engine = engine();
        let frame = get_request(PackageAddress::Device(
            UniqueIdentifier::new(0x05E0, 1).unwrap(),
        ));

        engine.write(0, &frame);
        assert!(!engine.uart.get_rts());
        engine.start_transmit(frame.len());
        pump_transmit(&mut engine, 500);

        assert!(engine.uart.get_rts(), "bus must be in receive direction");
        assert!(engine.awaiting_response);
        assert_eq!(engine.timer.alarm, RDM_RESPONSE_TIMEOUT_US);
        assert!(engine.timer.running);

        // No response: the alarm posts a timeout wakeup.
        assert!(engine.handle_timer_alarm(3300));
        let packet = engine.take_packet().unwrap();
        assert_eq!(packet.error, Some(PacketError::Timeout));
        assert_eq!(packet.size, 0);
    }

    #[test]
    fn test_broadcast_set_does_not_wait_for_response() {
        let mut engine = engine();
        let frame = get_request(PackageAddress::Broadcast);

        engine.write(0, &frame);
        engine.start_transmit(frame.len());
        pump_transmit(&mut engine, 500);

        assert!(!engine.awaiting_response);
        assert!(!engine.timer.running);
    }

    #[test]
    fn test_receive_classifies_and_posts_one_packet() {
        let mut engine = engine();
        let frame = get_request(PackageAddress::Broadcast);

        engine.arm_receive();
        assert!(!engine.handle_uart_event(UartEvent::RxBreak, 0));
        engine.uart.feed(&frame);
        assert!(engine.handle_uart_event(UartEvent::RxData, 10));

        let packet = engine.take_packet().unwrap();
        assert_eq!(packet.kind, PacketKind::Rdm);
        assert_eq!(packet.size, frame.len());
        assert!(packet.error.is_none());
        assert_eq!(packet.start_code, Some(SC_RDM));
    }

    #[test]
    fn test_framing_error_reports_partial_size() {
        let mut engine = engine();

        engine.arm_receive();
        engine.handle_uart_event(UartEvent::RxBreak, 0);
        engine.uart.feed(&[0u8; 42]);
        engine.handle_uart_event(UartEvent::RxData, 10);

        assert!(engine.handle_uart_event(UartEvent::RxFramingError, 20));
        let packet = engine.take_packet().unwrap();
        assert_eq!(packet.size, 42);
        assert_eq!(packet.error, Some(PacketError::ImproperSlot));

        // The engine waits for the next break before accepting data again.
        engine.uart.feed(&[1, 2, 3]);
        assert!(!engine.handle_uart_event(UartEvent::RxData, 30));
        engine.handle_uart_event(UartEvent::RxBreak, 40);
        engine.uart.feed(&[0u8; 513]);
        assert!(engine.handle_uart_event(UartEvent::RxData, 50));
        assert_eq!(engine.take_packet().unwrap().size, 513);
    }

    #[test]
    fn test_rolling_rx_size_updates_on_break() {
        let mut engine = engine();

        engine.arm_receive();
        engine.handle_uart_event(UartEvent::RxBreak, 0);
        engine.uart.feed(&[0u8; 65]);
        // 65 bytes of a short universe: not complete against the default
        // 513-slot estimate.
        assert!(!engine.handle_uart_event(UartEvent::RxData, 10));

        // The next break completes the frame late and fixes the estimate.
        assert!(engine.handle_uart_event(UartEvent::RxBreak, 23_000));
        assert_eq!(engine.take_packet().unwrap().size, 65);
        assert_eq!(engine.rx_size, 65);

        // The following frame of the same length completes without a break.
        engine.uart.feed(&[0u8; 65]);
        assert!(engine.handle_uart_event(UartEvent::RxData, 24_000));
        assert_eq!(engine.take_packet().unwrap().size, 65);
    }

    #[test]
    fn test_second_packet_does_not_clobber_pending_metadata() {
        let mut engine = engine();

        engine.arm_receive();
        engine.handle_uart_event(UartEvent::RxBreak, 0);
        engine.uart.feed(&[0u8; 65]);
        engine.handle_uart_event(UartEvent::RxData, 10);
        engine.handle_uart_event(UartEvent::RxBreak, 30_000);

        // A second, longer frame arrives before the reader consumed the
        // first wakeup.
        engine.uart.feed(&[0u8; 100]);
        engine.handle_uart_event(UartEvent::RxData, 31_000);
        engine.handle_uart_event(UartEvent::RxBreak, 60_000);

        assert_eq!(engine.take_packet().unwrap().size, 65);
    }

    #[test]
    fn test_collision_posts_data_collision() {
        let mut engine = engine();

        engine.arm_receive();
        engine.handle_uart_event(UartEvent::RxBreak, 0);
        engine.uart.feed(&[0xFE, 0xFE]);
        engine.handle_uart_event(UartEvent::RxData, 5);

        assert!(engine.handle_uart_event(UartEvent::RxClash, 10));
        assert_eq!(
            engine.take_packet().unwrap().error,
            Some(PacketError::DataCollision)
        );
    }

    #[test]
    fn test_discovery_response_sends_without_break() {
        let mut engine = engine();
        let uid = UniqueIdentifier::new(0x05E0, 1).unwrap();

        let mut frame = [0u8; 24];
        let size = crate::rdm_data::encode_discovery_response(uid, 7, &mut frame);
        engine.write(0, &frame[..size]);
        engine.start_transmit(size);

        // Bytes hit the FIFO immediately, no timer involved.
        assert_eq!(engine.uart.tx_log.len(), size);
        assert!(!engine.timer.running);
        assert!(!engine.flags.in_break());
    }

    #[test]
    fn test_clamping_boundaries() {
        let mut engine = engine();

        for (requested, applied) in [
            (50, 92),
            (91, 92),
            (92, 92),
            (176, 176),
            (1_000_000, 1_000_000),
            (2_000_000, 1_000_000),
        ] {
            assert_eq!(engine.set_break_len(requested), applied);
        }

        for (requested, applied) in [
            (0, 245_000),
            (244_999, 245_000),
            (245_000, 245_000),
            (250_000, 250_000),
            (255_000, 255_000),
            (255_001, 255_000),
        ] {
            assert_eq!(engine.set_baud_rate(requested), applied);
        }

        for (requested, applied) in [(0, 12), (12, 12), (48, 48), (2_000_000, 1_000_000)] {
            assert_eq!(engine.set_mab_len(requested), applied);
        }
    }

    #[test]
    fn test_disable_masks_rx_and_enable_resets_head() {
        let mut engine = engine();

        engine.arm_receive();
        engine.handle_uart_event(UartEvent::RxBreak, 0);
        engine.uart.feed(&[0u8; 10]);
        engine.handle_uart_event(UartEvent::RxData, 5);
        assert_eq!(engine.head, 10);

        assert!(engine.disable());
        assert!(!engine.is_enabled());

        engine.enable();
        assert!(engine.is_enabled());
        assert_eq!(engine.head, -1);
        assert!(!engine.has_data());
    }
}
