use crate::consts::BROADCAST_UID;
use crate::rdm_types::DeserializationError;

/// The unique id that is used as a source id in the packages.
/// There shouldn't be multiple devices with same unique id.
/// The manufacturer uids are assigned by the esta.
/// [more information](https://tsp.esta.org/tsp/working_groups/CP/mfctrIDs.php)
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct UniqueIdentifier {
    manufacturer_uid: u16,
    device_uid: u32,
}

impl core::fmt::Display for UniqueIdentifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04X}:{:08X}", self.manufacturer_uid, self.device_uid)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for UniqueIdentifier {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{:04X}:{:08X}", self.manufacturer_uid, self.device_uid);
    }
}

impl UniqueIdentifier {
    pub fn new(manufacturer_uid: u16, device_uid: u32) -> Result<Self, DeserializationError> {
        if device_uid == u32::MAX || manufacturer_uid == u16::MAX {
            return Err(DeserializationError);
        }

        Ok(UniqueIdentifier {
            manufacturer_uid,
            device_uid,
        })
    }

    pub fn manufacturer_uid(&self) -> u16 {
        self.manufacturer_uid
    }

    pub fn device_uid(&self) -> u32 {
        self.device_uid
    }

    pub fn to_bytes(&self) -> [u8; 6] {
        let mut buffer = [0u8; 6];

        buffer[..2].copy_from_slice(&self.manufacturer_uid.to_be_bytes());
        buffer[2..].copy_from_slice(&self.device_uid.to_be_bytes());

        buffer
    }

    /// Parses a wire-order UID. Broadcast addresses are rejected.
    pub fn from_bytes(buffer: &[u8; 6]) -> Result<Self, DeserializationError> {
        match PackageAddress::from_bytes(buffer) {
            PackageAddress::Device(uid) => Ok(uid),
            _ => Err(DeserializationError),
        }
    }

    /// The UID with its six wire bytes in reverse order.
    ///
    /// Some responders mute only when addressed with a byte-swapped UID;
    /// discovery retries each unresponsive device once with this form.
    pub fn flipped(&self) -> Result<Self, DeserializationError> {
        let bytes = self.to_bytes();
        let mut reversed = [0u8; 6];
        for (index, byte) in bytes.iter().rev().enumerate() {
            reversed[index] = *byte;
        }

        Self::from_bytes(&reversed)
    }
}

impl TryFrom<u64> for UniqueIdentifier {
    type Error = DeserializationError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > BROADCAST_UID {
            return Err(DeserializationError);
        }

        let manufacturer_uid = (value >> u32::BITS) as u16;
        let device_uid = (value & u32::MAX as u64) as u32;

        if device_uid == u32::MAX || manufacturer_uid == u16::MAX {
            return Err(DeserializationError);
        }

        Ok(Self {
            manufacturer_uid,
            device_uid,
        })
    }
}

impl From<UniqueIdentifier> for u64 {
    fn from(value: UniqueIdentifier) -> Self {
        ((value.manufacturer_uid as u64) << u32::BITS) | value.device_uid as u64
    }
}

impl PartialOrd for UniqueIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UniqueIdentifier {
    /// Lexicographic over the 48-bit wire representation, which equals
    /// numeric order over the (manufacturer, device) concatenation.
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        u64::from(*self).cmp(&u64::from(*other))
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PackageAddress {
    /// Broadcast to all devices.
    Broadcast,
    /// Broadcast to all devices from a specific manufacturer identified by the manufacturer id
    /// in the u16.
    ManufacturerBroadcast(u16),
    /// Send package to a specific device.
    Device(UniqueIdentifier),
}

impl PackageAddress {
    pub fn from_bytes(buffer: &[u8; 6]) -> Self {
        let manufacturer_uid = u16::from_be_bytes(buffer[0..2].try_into().unwrap());
        let device_uid = u32::from_be_bytes(buffer[2..].try_into().unwrap());

        if device_uid == u32::MAX {
            if manufacturer_uid == u16::MAX {
                Self::Broadcast
            } else {
                Self::ManufacturerBroadcast(manufacturer_uid)
            }
        } else {
            Self::Device(UniqueIdentifier {
                manufacturer_uid,
                device_uid,
            })
        }
    }

    pub fn to_bytes(&self) -> [u8; 6] {
        match self {
            Self::Broadcast => [0xFFu8; 6],
            Self::ManufacturerBroadcast(manufacturer_uid) => {
                let mut buffer = [0xFFu8; 6];
                buffer[..2].copy_from_slice(&manufacturer_uid.to_be_bytes());

                buffer
            },
            Self::Device(uid) => uid.to_bytes(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        match self {
            PackageAddress::Broadcast => true,
            PackageAddress::ManufacturerBroadcast(_) => true,
            PackageAddress::Device(_) => false,
        }
    }

    /// True if a responder owning `uid` is addressed by this destination.
    pub fn targets(&self, uid: &UniqueIdentifier) -> bool {
        match self {
            PackageAddress::Broadcast => true,
            PackageAddress::ManufacturerBroadcast(manufacturer_uid) => {
                *manufacturer_uid == uid.manufacturer_uid()
            },
            PackageAddress::Device(device_uid) => device_uid == uid,
        }
    }
}

impl TryFrom<u64> for PackageAddress {
    type Error = DeserializationError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > BROADCAST_UID {
            return Err(DeserializationError);
        }

        let manufacturer_uid = (value >> u32::BITS) as u16;
        let device_uid = (value & u32::MAX as u64) as u32;

        if device_uid == u32::MAX {
            if manufacturer_uid == u16::MAX {
                return Ok(Self::Broadcast);
            }

            return Ok(Self::ManufacturerBroadcast(manufacturer_uid));
        }

        Ok(Self::Device(UniqueIdentifier {
            manufacturer_uid,
            device_uid,
        }))
    }
}

impl From<PackageAddress> for u64 {
    fn from(value: PackageAddress) -> Self {
        match value {
            PackageAddress::Broadcast => BROADCAST_UID,
            PackageAddress::ManufacturerBroadcast(manufacturer_uid) => {
                ((manufacturer_uid as u64) << u32::BITS) | u32::MAX as u64
            },
            PackageAddress::Device(uid) => uid.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_ordering_follows_wire_bytes() {
        let low = UniqueIdentifier::new(0x05E0, 0x00000001).unwrap();
        let high = UniqueIdentifier::new(0x05E0, 0xFFFFFFFE).unwrap();
        let other_manufacturer = UniqueIdentifier::new(0x05E1, 0).unwrap();

        assert!(low < high);
        assert!(high < other_manufacturer);
    }

    #[test]
    fn test_flipped_reverses_wire_order() {
        let uid = UniqueIdentifier::new(0x0102, 0x03040506).unwrap();
        let flipped = uid.flipped().unwrap();

        assert_eq!(flipped.to_bytes(), [0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(flipped.flipped().unwrap(), uid);
    }

    #[test]
    fn test_address_targeting() {
        let uid = UniqueIdentifier::new(0x05E0, 42).unwrap();

        assert!(PackageAddress::Broadcast.targets(&uid));
        assert!(PackageAddress::ManufacturerBroadcast(0x05E0).targets(&uid));
        assert!(!PackageAddress::ManufacturerBroadcast(0x05E1).targets(&uid));
        assert!(PackageAddress::Device(uid).targets(&uid));
    }

    #[test]
    fn test_broadcast_round_trip() {
        let address = PackageAddress::from_bytes(&[0xFF; 6]);
        assert_eq!(address, PackageAddress::Broadcast);
        assert_eq!(u64::from(address), BROADCAST_UID);

        let manufacturer = PackageAddress::from_bytes(&[0x05, 0xE0, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(manufacturer, PackageAddress::ManufacturerBroadcast(0x05E0));
    }
}
