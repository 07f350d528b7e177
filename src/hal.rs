//! Hardware façade consumed by the framing engine.
//!
//! One UART, one hardware timer and (optionally) one GPIO edge-sense line
//! per port. Platform glue implements these traits, forwards the interrupt
//! sources to the [`DmxPort`](crate::port::DmxPort) ISR entry points and
//! provides a wakeup primitive for the blocking API calls.

use modular_bitfield::bitfield;
use modular_bitfield::prelude::B1;

/// An interrupt condition delivered to the framing engine.
///
/// `RxData` covers both the FIFO-threshold and the receive-timeout
/// conditions; both mean "drain the FIFO now".
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UartEvent {
    /// A break was detected on the line.
    RxBreak,
    /// Received data is waiting in the FIFO.
    RxData,
    /// A slot arrived with a framing error.
    RxFramingError,
    /// The receive FIFO overflowed.
    RxOverflow,
    /// An RS-485 collision was detected.
    RxClash,
    /// The transmit FIFO is ready for more data.
    TxData,
    /// The transmitter went idle after the last bit.
    TxDone,
}

/// Set of UART interrupt sources, used to mask and unmask lines.
#[bitfield]
#[derive(Clone, Copy)]
pub struct IrqMask {
    pub rx_break: bool,
    pub rx_data: bool,
    pub rx_framing_error: bool,
    pub rx_overflow: bool,
    pub rx_clash: bool,
    pub tx_data: bool,
    pub tx_done: bool,
    #[skip]
    __: B1,
}

impl IrqMask {
    /// All receive conditions.
    pub fn rx_all() -> Self {
        Self::new()
            .with_rx_break(true)
            .with_rx_data(true)
            .with_rx_framing_error(true)
            .with_rx_overflow(true)
            .with_rx_clash(true)
    }

    /// All transmit conditions.
    pub fn tx_all() -> Self {
        Self::new().with_tx_data(true).with_tx_done(true)
    }
}

/// One UART peripheral wired to an RS-485 transceiver.
///
/// All methods are called from interrupt context or inside the port's
/// critical section and must not block.
pub trait DmxUart {
    /// Applies a baud rate. The caller clamps to the DMX window beforehand.
    fn set_baud_rate(&mut self, baud_rate: u32);
    fn baud_rate(&self) -> u32;

    /// Drains the receive FIFO into `buffer`, returning the bytes read.
    fn read_rxfifo(&mut self, buffer: &mut [u8]) -> usize;
    /// Number of bytes currently waiting in the receive FIFO.
    fn rxfifo_len(&self) -> usize;
    /// Fills the transmit FIFO from `buffer`, returning the bytes written.
    fn write_txfifo(&mut self, buffer: &[u8]) -> usize;

    fn rxfifo_reset(&mut self);
    fn txfifo_reset(&mut self);

    fn enable_interrupts(&mut self, mask: IrqMask);
    fn disable_interrupts(&mut self, mask: IrqMask);
    fn clear_interrupts(&mut self, mask: IrqMask);

    /// Drives the transceiver direction. `true` selects receive.
    fn set_rts(&mut self, receive: bool);
    fn get_rts(&self) -> bool;

    /// Inverts the TX line, used to hold a break longer than the UART can.
    fn invert_tx(&mut self, invert: bool);

    /// Level of the RX line, used by the sniffer edge handler.
    fn rx_level(&self) -> bool;
}

/// One hardware timer with microsecond alarms.
pub trait DmxTimer {
    /// Arms the alarm `micros` from now. The timer keeps running and fires
    /// the port's timer interrupt when the alarm elapses.
    fn set_alarm(&mut self, micros: u32);
    fn start(&mut self);
    fn pause(&mut self);
}

/// Wakeup token armed by a blocked API caller and signalled from ISRs.
pub trait WakeupSignal {
    /// Signals a waiting task, if any. Callable from interrupt context.
    fn signal(&self);
    /// Clears a latched signal before a fresh wait.
    fn clear(&self);
    /// Blocks until signalled. Returns false on timeout.
    fn wait(&self, timeout_us: Option<u32>) -> bool;
}

/// Key addressing one persisted parameter: a short ASCII string of the form
/// `p<port>.<pid hex>`.
pub type NvsKey = heapless::String<12>;

pub fn nvs_key(port_num: u8, pid: u16) -> NvsKey {
    use core::fmt::Write;

    let mut key = NvsKey::new();
    // Cannot overflow: "p" + at most 3 digits + "." + 4 hex digits.
    write!(&mut key, "p{}.{:04x}", port_num, pid).unwrap();
    key
}

/// Non-volatile storage for parameters that survive a reboot.
pub trait NvsStore {
    /// Reads a value into `destination`, returning its length.
    fn load(&mut self, key: &NvsKey, destination: &mut [u8]) -> Option<usize>;
    /// Writes a value. Returns false when the store rejected it.
    fn save(&mut self, key: &NvsKey, data: &[u8]) -> bool;
}

/// The unit store persists nothing; every load misses.
impl NvsStore for () {
    fn load(&mut self, _key: &NvsKey, _destination: &mut [u8]) -> Option<usize> {
        None
    }

    fn save(&mut self, _key: &NvsKey, _data: &[u8]) -> bool {
        true
    }
}

const MEMORY_NVS_ENTRIES: usize = 16;
const MEMORY_NVS_VALUE_MAX: usize = 32;

/// A volatile [`NvsStore`] for host targets and tests.
#[derive(Default)]
pub struct MemoryNvs {
    entries: heapless::Vec<(NvsKey, heapless::Vec<u8, MEMORY_NVS_VALUE_MAX>), MEMORY_NVS_ENTRIES>,
}

impl MemoryNvs {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NvsStore for MemoryNvs {
    fn load(&mut self, key: &NvsKey, destination: &mut [u8]) -> Option<usize> {
        let (_, value) = self.entries.iter().find(|(entry, _)| entry == key)?;
        if value.len() > destination.len() {
            return None;
        }

        destination[..value.len()].copy_from_slice(value);
        Some(value.len())
    }

    fn save(&mut self, key: &NvsKey, data: &[u8]) -> bool {
        let Ok(value) = heapless::Vec::from_slice(data) else {
            return false;
        };

        match self.entries.iter_mut().find(|(entry, _)| entry == key) {
            Some((_, existing)) => {
                *existing = value;
                true
            },
            None => self.entries.push((key.clone(), value)).is_ok(),
        }
    }
}

/// Everything a platform contributes to one port.
pub trait DmxHardware {
    type Uart: DmxUart;
    type Timer: DmxTimer;
    type Signal: WakeupSignal;
    type Nvs: NvsStore;

    /// Monotonic microseconds since boot.
    fn micros() -> i64;
    /// Busy- or sleep-waits for `micros`. Only called from task context.
    fn delay_micros(micros: u32);
    /// MAC address the process-wide RDM device UID is derived from.
    fn mac_address() -> [u8; 6];
}

/// Condvar-backed [`WakeupSignal`] for hosted targets.
#[cfg(feature = "std")]
pub struct StdSignal {
    state: std::sync::Mutex<bool>,
    condvar: std::sync::Condvar,
}

#[cfg(feature = "std")]
impl Default for StdSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl StdSignal {
    pub fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(false),
            condvar: std::sync::Condvar::new(),
        }
    }
}

#[cfg(feature = "std")]
impl WakeupSignal for StdSignal {
    fn signal(&self) {
        *self.state.lock().unwrap() = true;
        self.condvar.notify_one();
    }

    fn clear(&self) {
        *self.state.lock().unwrap() = false;
    }

    fn wait(&self, timeout_us: Option<u32>) -> bool {
        let mut signalled = self.state.lock().unwrap();

        match timeout_us {
            None => {
                while !*signalled {
                    signalled = self.condvar.wait(signalled).unwrap();
                }
            },
            Some(timeout_us) => {
                let deadline = std::time::Duration::from_micros(timeout_us as u64);
                let (guard, result) = self
                    .condvar
                    .wait_timeout_while(signalled, deadline, |signalled| !*signalled)
                    .unwrap();
                signalled = guard;
                if result.timed_out() && !*signalled {
                    return false;
                }
            },
        }

        *signalled = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nvs_key_format() {
        assert_eq!(nvs_key(0, crate::pids::DMX_START_ADDRESS).as_str(), "p0.00f0");
        assert_eq!(nvs_key(3, crate::pids::IDENTIFY_DEVICE).as_str(), "p3.1000");
    }

    #[test]
    fn test_memory_nvs_round_trip() {
        let mut nvs = MemoryNvs::new();
        let key = nvs_key(0, crate::pids::DMX_START_ADDRESS);

        let mut out = [0u8; 4];
        assert!(nvs.load(&key, &mut out).is_none());

        assert!(nvs.save(&key, &[0x00, 0x64]));
        assert_eq!(nvs.load(&key, &mut out), Some(2));
        assert_eq!(&out[..2], &[0x00, 0x64]);

        // Overwrites replace the stored value.
        assert!(nvs.save(&key, &[0x01, 0x00]));
        assert_eq!(nvs.load(&key, &mut out), Some(2));
        assert_eq!(&out[..2], &[0x01, 0x00]);
    }

    #[test]
    fn test_irq_mask_groups() {
        let rx = IrqMask::rx_all();
        assert!(rx.rx_break() && rx.rx_data() && rx.rx_clash());
        assert!(!rx.tx_data() && !rx.tx_done());

        let tx = IrqMask::tx_all();
        assert!(tx.tx_data() && tx.tx_done());
        assert!(!tx.rx_break());
    }
}
