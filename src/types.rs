use crate::consts::RDM_MAX_PDL;

pub type DataPack = heapless::Vec<u8, RDM_MAX_PDL>;

/// Response status of an rdm package.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ResponseType {
    /// The request was acknowledged.
    ResponseTypeAck = 0x00,
    /// The request was acknowledged but the result isn't ready yet.
    ResponseTypeAckTimer = 0x01,
    /// The request was not acknowledged.
    ResponseTypeNackReason = 0x02,
    /// The request was acknowledged but the response does not fit into a single response.
    ResponseTypeAckOverflow = 0x03,
}

impl TryFrom<u8> for ResponseType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        Ok(match value {
            0x00 => Self::ResponseTypeAck,
            0x01 => Self::ResponseTypeAckTimer,
            0x02 => Self::ResponseTypeNackReason,
            0x03 => Self::ResponseTypeAckOverflow,
            _ => {
                return Err(());
            },
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum NackReason {
    UnknownPid = 0x0000,
    FormatError = 0x0001,
    HardwareFault = 0x0002,
    ProxyReject = 0x0003,
    WriteProtect = 0x0004,
    UnsupportedCommandClass = 0x0005,
    DataOutOfRange = 0x0006,
    BufferFull = 0x0007,
    PacketSizeUnsupported = 0x0008,
    SubDeviceOutOfRange = 0x0009,
    ProxyBufferFull = 0x000A,
}

impl NackReason {
    pub fn serialize(&self) -> DataPack {
        DataPack::from_slice(&(*self as u16).to_be_bytes()).unwrap()
    }
}

impl TryFrom<u16> for NackReason {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, ()> {
        match value {
            0x0000 => Ok(Self::UnknownPid),
            0x0001 => Ok(Self::FormatError),
            0x0002 => Ok(Self::HardwareFault),
            0x0003 => Ok(Self::ProxyReject),
            0x0004 => Ok(Self::WriteProtect),
            0x0005 => Ok(Self::UnsupportedCommandClass),
            0x0006 => Ok(Self::DataOutOfRange),
            0x0007 => Ok(Self::BufferFull),
            0x0008 => Ok(Self::PacketSizeUnsupported),
            0x0009 => Ok(Self::SubDeviceOutOfRange),
            0x000A => Ok(Self::ProxyBufferFull),
            _ => Err(()),
        }
    }
}

/// What the classifier recognized the incoming byte stream as.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketKind {
    /// A null-start or alternate-start-code DMX frame.
    Dmx,
    /// A standard RDM request or response.
    Rdm,
    /// A Manchester-encoded DISC_UNIQUE_BRANCH response.
    RdmDiscoveryResponse,
}

/// Wire-level fault recorded by the framing engine for one packet.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketError {
    /// No packet arrived before the deadline.
    Timeout,
    /// The packet checksum did not verify.
    InvalidCrc,
    /// The UART receive FIFO overflowed.
    DataOverflow,
    /// A slot was improperly framed.
    ImproperSlot,
    /// Two transmitters drove the bus at once.
    DataCollision,
    /// The packet was longer than the DMX specification allows.
    PacketSize,
}

impl core::fmt::Display for PacketError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PacketError::Timeout => write!(f, "timed out waiting for a packet"),
            PacketError::InvalidCrc => write!(f, "checksum mismatch"),
            PacketError::DataOverflow => write!(f, "receive fifo overflowed"),
            PacketError::ImproperSlot => write!(f, "improperly framed slot"),
            PacketError::DataCollision => write!(f, "bus collision"),
            PacketError::PacketSize => write!(f, "packet too long"),
        }
    }
}

/// Metadata of one received packet, handed to the task that called
/// [`DmxPort::receive`](crate::port::DmxPort::receive).
///
/// `size` and `error` are both meaningful at once: a partial packet reports
/// the bytes that did arrive together with the fault that ended it.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmxPacket {
    /// Number of bytes in the driver buffer, including the start code.
    pub size: usize,
    /// Start code of the packet, when at least one byte arrived.
    pub start_code: Option<u8>,
    pub kind: PacketKind,
    pub error: Option<PacketError>,
}

impl DmxPacket {
    pub(crate) fn timeout() -> Self {
        Self {
            size: 0,
            start_code: None,
            kind: PacketKind::Dmx,
            error: Some(PacketError::Timeout),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Errors returned by the public port API before any hardware is touched.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError {
    /// An argument failed validation.
    InvalidArg,
    /// The operation is not legal in the port's current state.
    InvalidState,
    /// A bounded table or heap is exhausted.
    NoMem,
    /// The operation did not finish in time.
    Timeout,
}

impl core::fmt::Display for DriverError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DriverError::InvalidArg => write!(f, "invalid argument"),
            DriverError::InvalidState => write!(f, "invalid driver state"),
            DriverError::NoMem => write!(f, "out of driver memory"),
            DriverError::Timeout => write!(f, "operation timed out"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DriverError {}
