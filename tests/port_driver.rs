//! Driving the interrupt-driven port against mock hardware.
//!
//! The tests play the role of the platform glue: they feed bytes into the
//! mock UART and forward the interrupt conditions to the port's ISR entry
//! points by hand.

use dmx_rdm_port::hal::{
    DmxHardware, DmxTimer, DmxUart, IrqMask, MemoryNvs, StdSignal, UartEvent,
};
use dmx_rdm_port::port::{DmxPort, PortConfig};
use dmx_rdm_port::responder::Personality;
use dmx_rdm_port::types::{DriverError, PacketError, PacketKind};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Instant;

// The port registry is process-wide, so tests that install drivers take
// this lock and each use their own slot.
fn registry_guard() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct UartState {
    rx_fifo: Vec<u8>,
    tx_log: Vec<u8>,
    baud: u32,
    rts: bool,
    inverted: bool,
}

#[derive(Default, Clone)]
struct SharedUart(Rc<RefCell<UartState>>);

impl SharedUart {
    fn feed(&self, data: &[u8]) {
        self.0.borrow_mut().rx_fifo.extend_from_slice(data);
    }

    fn sent(&self) -> Vec<u8> {
        self.0.borrow().tx_log.clone()
    }
}

impl DmxUart for SharedUart {
    fn set_baud_rate(&mut self, baud_rate: u32) {
        self.0.borrow_mut().baud = baud_rate;
    }

    fn baud_rate(&self) -> u32 {
        self.0.borrow().baud
    }

    fn read_rxfifo(&mut self, buffer: &mut [u8]) -> usize {
        let mut state = self.0.borrow_mut();
        let len = state.rx_fifo.len().min(buffer.len());
        buffer[..len].copy_from_slice(&state.rx_fifo[..len]);
        state.rx_fifo.drain(..len);
        len
    }

    fn rxfifo_len(&self) -> usize {
        self.0.borrow().rx_fifo.len()
    }

    fn write_txfifo(&mut self, buffer: &[u8]) -> usize {
        self.0.borrow_mut().tx_log.extend_from_slice(buffer);
        buffer.len()
    }

    fn rxfifo_reset(&mut self) {
        self.0.borrow_mut().rx_fifo.clear();
    }

    fn txfifo_reset(&mut self) {}

    fn enable_interrupts(&mut self, _mask: IrqMask) {}
    fn disable_interrupts(&mut self, _mask: IrqMask) {}
    fn clear_interrupts(&mut self, _mask: IrqMask) {}

    fn set_rts(&mut self, receive: bool) {
        self.0.borrow_mut().rts = receive;
    }

    fn get_rts(&self) -> bool {
        self.0.borrow().rts
    }

    fn invert_tx(&mut self, invert: bool) {
        self.0.borrow_mut().inverted = invert;
    }

    fn rx_level(&self) -> bool {
        true
    }
}

#[derive(Default, Clone)]
struct SharedTimer(Rc<RefCell<bool>>);

impl DmxTimer for SharedTimer {
    fn set_alarm(&mut self, _micros: u32) {}

    fn start(&mut self) {
        *self.0.borrow_mut() = true;
    }

    fn pause(&mut self) {
        *self.0.borrow_mut() = false;
    }
}

struct TestHardware;

impl DmxHardware for TestHardware {
    type Uart = SharedUart;
    type Timer = SharedTimer;
    type Signal = StdSignal;
    type Nvs = MemoryNvs;

    fn micros() -> i64 {
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        EPOCH.get_or_init(Instant::now).elapsed().as_micros() as i64
    }

    fn delay_micros(_micros: u32) {}

    fn mac_address() -> [u8; 6] {
        [0x02, 0x00, 0x00, 0x12, 0x34, 0x56]
    }
}

fn test_config() -> PortConfig {
    let mut config = PortConfig::default();
    config.device.personalities = &[Personality {
        footprint: 3,
        description: "RGB",
    }];
    config.device.current_personality = 1;
    config.device.dmx_start_address = 1;
    config
}

fn install(port_num: u8) -> (DmxPort<TestHardware>, SharedUart) {
    let uart = SharedUart::default();
    let port = DmxPort::<TestHardware>::install(
        port_num,
        &test_config(),
        uart.clone(),
        SharedTimer::default(),
        StdSignal::new(),
        MemoryNvs::new(),
    )
    .unwrap();

    (port, uart)
}

/// Walks the transmit reset sequence the hardware would drive: break,
/// mark-after-break, FIFO drain, transmitter idle.
fn pump_transmit(port: &DmxPort<TestHardware>) {
    port.on_timer_interrupt();
    port.on_timer_interrupt();
    port.on_uart_interrupt(UartEvent::TxData);
    port.on_uart_interrupt(UartEvent::TxDone);
}

#[test]
fn test_install_claims_slot_and_reinstall_after_delete() {
    let _guard = registry_guard();

    let (port, _uart) = install(0);
    assert_eq!(port.uid().manufacturer_uid(), 0x05E0);
    let heap_used = port.responder().params.heap_used();

    // The slot is exclusive while installed.
    let conflict = DmxPort::<TestHardware>::install(
        0,
        &test_config(),
        SharedUart::default(),
        SharedTimer::default(),
        StdSignal::new(),
        MemoryNvs::new(),
    );
    assert!(matches!(conflict, Err(DriverError::InvalidState)));

    port.delete();

    // A fresh install starts from an empty parameter heap.
    let (port, _uart) = install(0);
    assert_eq!(port.responder().params.heap_used(), heap_used);
}

#[test]
fn test_invalid_config_is_rejected_before_hardware() {
    let _guard = registry_guard();

    let mut config = test_config();
    config.device.dmx_start_address = 513;

    let result = DmxPort::<TestHardware>::install(
        1,
        &config,
        SharedUart::default(),
        SharedTimer::default(),
        StdSignal::new(),
        MemoryNvs::new(),
    );
    assert!(matches!(result, Err(DriverError::InvalidArg)));

    // The slot stays free for a valid install.
    let (port, _uart) = install(1);
    drop(port);
}

#[test]
fn test_timing_setters_clamp_and_report() {
    let _guard = registry_guard();
    let (mut port, _uart) = install(2);

    for (requested, applied) in [
        (50, 92),
        (91, 92),
        (92, 92),
        (176, 176),
        (1_000_000, 1_000_000),
        (2_000_000, 1_000_000),
    ] {
        assert_eq!(port.set_break_len(requested), applied);
    }

    for (requested, applied) in [
        (0, 245_000),
        (244_999, 245_000),
        (245_000, 245_000),
        (250_000, 250_000),
        (255_000, 255_000),
        (255_001, 255_000),
    ] {
        assert_eq!(port.set_baud_rate(requested), applied);
    }
}

#[test]
fn test_send_dmx_frame_reaches_the_wire() {
    let _guard = registry_guard();
    let (mut port, uart) = install(3);

    let mut frame = [0u8; 64];
    frame[1] = 0xAB;
    frame[63] = 0xCD;

    assert_eq!(port.write(0, &frame), 64);
    assert_eq!(port.send(64).unwrap(), 64);
    pump_transmit(&port);

    assert!(port.wait_sent(1000));
    assert_eq!(uart.sent(), frame.to_vec());
}

#[test]
fn test_improper_slot_surfaces_with_partial_size() {
    let _guard = registry_guard();
    let (mut port, uart) = install(0);

    // 42 clean slots, then a framing error mid-frame.
    port.on_uart_interrupt(UartEvent::RxBreak);
    uart.feed(&[0u8; 42]);
    port.on_uart_interrupt(UartEvent::RxData);
    port.on_uart_interrupt(UartEvent::RxFramingError);

    let packet = port.receive(Some(1000)).unwrap();
    assert_eq!(packet.size, 42);
    assert_eq!(packet.error, Some(PacketError::ImproperSlot));

    // The next clean frame is received normally.
    port.on_uart_interrupt(UartEvent::RxBreak);
    uart.feed(&[0u8; 513]);
    port.on_uart_interrupt(UartEvent::RxData);

    let packet = port.receive(Some(1000)).unwrap();
    assert_eq!(packet.size, 513);
    assert_eq!(packet.kind, PacketKind::Dmx);
    assert!(packet.error.is_none());
}

#[test]
fn test_receive_timeout_and_disable_semantics() {
    let _guard = registry_guard();
    let (mut port, uart) = install(1);

    let packet = port.receive(Some(1)).unwrap();
    assert_eq!(packet.error, Some(PacketError::Timeout));
    assert_eq!(packet.size, 0);

    port.disable().unwrap();
    assert!(matches!(port.receive(Some(1)), Err(DriverError::InvalidState)));
    assert!(matches!(port.disable(), Err(DriverError::InvalidState)));

    port.enable().unwrap();
    // Data from before the re-enable was dropped; a fresh frame arrives.
    port.on_uart_interrupt(UartEvent::RxBreak);
    uart.feed(&[0u8; 513]);
    port.on_uart_interrupt(UartEvent::RxData);
    assert!(port.receive(Some(1000)).unwrap().is_ok());
}

#[test]
fn test_sniffer_records_edges_without_blocking() {
    let _guard = registry_guard();
    let (mut port, _uart) = install(2);

    port.sniffer_enable();
    assert!(port.sniffer_read().is_none());

    // A break begins (negative edge handled while the uart reports the
    // line high again on the positive edge).
    port.on_sniffer_edge();
    port.on_uart_interrupt(UartEvent::RxBreak);
    port.on_sniffer_edge();

    port.sniffer_disable();
    assert!(port.sniffer_read().is_none());
}
