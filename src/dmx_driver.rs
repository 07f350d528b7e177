//! Driver traits the controller builds on.
//!
//! [`DmxPort`](crate::port::DmxPort) implements them over its interrupt
//! driven engine; test suites and exotic transports (an Enttec-style
//! widget, a mockup) can provide their own implementations.

use crate::rdm_data::{RdmData, RdmDeserializationError};
use crate::unique_identifier::UniqueIdentifier;

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmxError<E> {
    /// There were fewer bytes written to the bus than there should have been.
    UartOverflow,
    /// The request timed out.
    /// **Important:** If you implement a driver make sure this error gets raised instead
    /// of a driver specific error.
    TimeoutError,
    /// Raised when an RDM package could not be deserialized.
    DeserializationError(RdmDeserializationError),
    /// An error raised by the underlying driver.
    DriverError(E),
}

impl<E: core::fmt::Display> core::fmt::Display for DmxError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DmxError::UartOverflow => write!(f, "uart overflowed"),
            DmxError::TimeoutError => write!(f, "request timed out"),
            DmxError::DeserializationError(error) => error.fmt(f),
            DmxError::DriverError(error) => error.fmt(f),
        }
    }
}

#[cfg(feature = "std")]
impl<E: core::fmt::Display + core::fmt::Debug> std::error::Error for DmxError<E> {}

#[derive(Debug)]
pub enum DiscoveryOption {
    /// No device responded to the discovery request.
    /// There aren't any devices in the specified unique id range.
    NoDevice,
    /// The response to the discovery request couldn't be deserialized.
    /// There are multiple devices in the specified unique id range.
    Collision,
    /// The discovery response was successfully deserialized.
    /// There is only one device in the specified unique id range.
    Found(UniqueIdentifier),
}

/// Trait that ensures that the same Error is used in the [DmxControllerDriver] as well as the [RdmControllerDriver].
pub trait ControllerDriverErrorDef {
    /// The driver specific error.
    type DriverError;
}

/// Trait for controlling DMX fixtures.
pub trait DmxControllerDriver: ControllerDriverErrorDef {
    /// Send a DMX512 package. It shouldn't be bigger than 512 bytes.
    fn send_dmx_package(&mut self, package: &[u8]) -> Result<(), DmxError<Self::DriverError>>;
}

/// Trait for sending and receiving RDM packages from a controller point of view.
pub trait RdmControllerDriver: ControllerDriverErrorDef {
    /// Sends an RDM package.
    fn send_rdm(&mut self, package: RdmData) -> Result<(), DmxError<Self::DriverError>>;

    /// Receives an RDM package.
    fn receive_rdm(&mut self) -> Result<RdmData, DmxError<Self::DriverError>>;

    /// Receives an RDM discovery response.
    /// Returns the received device id.
    fn receive_rdm_discovery_response(
        &mut self,
    ) -> Result<DiscoveryOption, DmxError<Self::DriverError>>;

    /// Send a dmx discovery response. If this functionality is already been solved
    /// by the device at hand, provide an empty function.
    fn send_rdm_discovery_response(
        &mut self,
        uid: UniqueIdentifier,
    ) -> Result<(), DmxError<Self::DriverError>>;

    /// Blocks the calling task for `micros`. The controller uses this to
    /// honour ACK_TIMER deferrals and broadcast guard times.
    fn wait_micros(&mut self, micros: u32);
}
