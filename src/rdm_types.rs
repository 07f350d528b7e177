use crate::consts::DMX_START_ADDRESS_NONE;
use crate::layouts::rdm_device_info_layout;
use crate::types::DataPack;
use crate::unique_identifier::{PackageAddress, UniqueIdentifier};
use modular_bitfield::bitfield;
use modular_bitfield::prelude::B12;

/// Wire size of a DEVICE_INFO parameter data block.
const RDM_DEVICE_INFO_SIZE: usize = 19;

#[derive(Debug)]
pub struct DeserializationError;

impl core::fmt::Display for DeserializationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "There was a deserialization error.")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DeserializationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DmxStartAddress {
    /// The requested device has a dmx footprint of 0.
    NoAddress,
    /// The requested device does allocate dmx addresses.
    Address(u16),
}

impl DmxStartAddress {
    pub fn as_u16(&self) -> u16 {
        match self {
            DmxStartAddress::Address(address) => *address,
            DmxStartAddress::NoAddress => DMX_START_ADDRESS_NONE,
        }
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, DeserializationError> {
        let start_address = u16::from_be_bytes(data.try_into().map_err(|_| DeserializationError)?);

        start_address.try_into().map_err(|_| DeserializationError)
    }

    pub fn serialize(&self) -> DataPack {
        DataPack::from_slice(&self.as_u16().to_be_bytes()).unwrap()
    }
}

impl TryFrom<u16> for DmxStartAddress {
    type Error = DeserializationError;

    fn try_from(start_address: u16) -> Result<Self, Self::Error> {
        if start_address == DMX_START_ADDRESS_NONE {
            return Ok(Self::NoAddress);
        }

        if !(1..=512).contains(&start_address) {
            return Err(DeserializationError);
        }

        Ok(Self::Address(start_address))
    }
}

/// Response to discovery mute/unmute requests.
pub struct DiscoveryMuteResponse {
    /// The responder is a proxy device.
    pub managed_proxy: bool,
    /// The responder supports sub devices.
    pub sub_device: bool,
    /// The responder is not operational before receiving a firmware update.
    pub boot_loader: bool,
    /// A proxy device has responded on behalf of another device.
    pub proxy_device: bool,
    /// Included if the responding device contains multiple responder ports.
    /// It is the UID of the primary port of the device.
    pub binding_uid: Option<UniqueIdentifier>,
}

#[bitfield]
struct DiscControlField {
    /// The responder is a proxy device.
    pub managed_proxy: bool,
    /// The responder supports sub devices.
    pub sub_device: bool,
    /// The responder is not operational before receiving a firmware update.
    pub boot_loader: bool,
    /// A proxy device has responded on behalf of another device.
    pub proxy_device: bool,
    #[skip]
    reserved: B12,
}

impl DiscoveryMuteResponse {
    pub fn deserialize(data: &[u8]) -> Result<Self, DeserializationError> {
        if data.len() < 2 {
            return Err(DeserializationError);
        }

        let control_field = DiscControlField::from_bytes((&data[0..2]).try_into().unwrap());
        let mut discovery_mute_response = Self {
            managed_proxy: control_field.managed_proxy(),
            sub_device: control_field.sub_device(),
            boot_loader: control_field.boot_loader(),
            proxy_device: control_field.proxy_device(),
            binding_uid: None,
        };

        if data.len() == 8 {
            let binding_uid = match PackageAddress::from_bytes((&data[2..8]).try_into().unwrap()) {
                PackageAddress::Device(uid) => uid,
                _ => return Err(DeserializationError),
            };

            discovery_mute_response.binding_uid = Some(binding_uid);
        }

        Ok(discovery_mute_response)
    }

    pub fn serialize(&self) -> DataPack {
        let mut data_pack = DataPack::new();
        let disc_control_field = DiscControlField::new()
            .with_managed_proxy(self.managed_proxy)
            .with_sub_device(self.sub_device)
            .with_boot_loader(self.boot_loader)
            .with_proxy_device(self.proxy_device);

        data_pack
            .extend_from_slice(&disc_control_field.into_bytes())
            .unwrap();

        match self.binding_uid {
            None => {},
            Some(uid) => data_pack.extend_from_slice(&uid.to_bytes()).unwrap(),
        }

        data_pack
    }
}

pub type SupportedParameters = heapless::Vec<u16, 128>;

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub device_model_id: u16,
    pub product_category: u16,
    pub software_version: u32,
    pub dmx_footprint: u16,
    pub current_personality: u8,
    pub personality_count: u8,
    pub dmx_start_address: DmxStartAddress,
    pub sub_device_count: u16,
    pub sensor_count: u8,
}

impl DeviceInfo {
    pub fn deserialize(buffer: &[u8]) -> Result<Self, DeserializationError> {
        if buffer.len() != rdm_device_info_layout::SIZE.unwrap() {
            return Err(DeserializationError);
        }

        let device_info_view = rdm_device_info_layout::View::new(buffer);
        if device_info_view.protocol_version().read() != 0x01_00 {
            return Err(DeserializationError);
        }

        let personality_field = device_info_view.dmx_personality().read();
        Ok(DeviceInfo {
            device_model_id: device_info_view.device_model_id().read(),
            product_category: device_info_view.product_category().read(),
            software_version: device_info_view.software_version_id().read(),
            dmx_footprint: device_info_view.dmx_footprint().read(),
            current_personality: (personality_field >> 8) as u8,
            personality_count: personality_field as u8,
            dmx_start_address: device_info_view.dmx_start_address().read().try_into()?,
            sub_device_count: device_info_view.sub_device_count().read(),
            sensor_count: device_info_view.sensor_count().read(),
        })
    }

    pub fn serialize(&self) -> DataPack {
        let mut resp_buffer = [0u8; RDM_DEVICE_INFO_SIZE];
        let mut device_info_view = rdm_device_info_layout::View::new(&mut resp_buffer[..]);

        device_info_view.protocol_version_mut().write(0x01_00);
        device_info_view
            .device_model_id_mut()
            .write(self.device_model_id);
        device_info_view
            .product_category_mut()
            .write(self.product_category);
        device_info_view
            .software_version_id_mut()
            .write(self.software_version);
        device_info_view
            .dmx_footprint_mut()
            .write(self.dmx_footprint);
        device_info_view
            .dmx_personality_mut()
            .write(((self.current_personality as u16) << 8) | self.personality_count as u16);
        device_info_view
            .dmx_start_address_mut()
            .write(self.dmx_start_address.as_u16());
        device_info_view
            .sub_device_count_mut()
            .write(self.sub_device_count);
        device_info_view.sensor_count_mut().write(self.sensor_count);

        DataPack::from_slice(&resp_buffer).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_address_bounds() {
        assert!(matches!(
            DmxStartAddress::try_from(1).unwrap(),
            DmxStartAddress::Address(1)
        ));
        assert!(matches!(
            DmxStartAddress::try_from(512).unwrap(),
            DmxStartAddress::Address(512)
        ));
        assert!(matches!(
            DmxStartAddress::try_from(0xFFFF).unwrap(),
            DmxStartAddress::NoAddress
        ));
        DmxStartAddress::try_from(0).unwrap_err();
        DmxStartAddress::try_from(513).unwrap_err();
    }

    #[test]
    fn test_device_info_round_trip() {
        let device_info = DeviceInfo {
            device_model_id: 0x1234,
            product_category: 0x0508,
            software_version: 0xDEADBEEF,
            dmx_footprint: 12,
            current_personality: 1,
            personality_count: 2,
            dmx_start_address: DmxStartAddress::Address(1),
            sub_device_count: 0,
            sensor_count: 0,
        };

        let serialized = device_info.serialize();
        assert_eq!(serialized.len(), 19);

        let parsed = DeviceInfo::deserialize(&serialized).unwrap();
        assert_eq!(parsed.device_model_id, 0x1234);
        assert_eq!(parsed.dmx_footprint, 12);
        assert_eq!(parsed.current_personality, 1);
        assert_eq!(parsed.personality_count, 2);
        assert_eq!(parsed.dmx_start_address, DmxStartAddress::Address(1));
    }

    #[test]
    fn test_mute_response_with_binding_uid() {
        let response = DiscoveryMuteResponse {
            managed_proxy: false,
            sub_device: false,
            boot_loader: false,
            proxy_device: false,
            binding_uid: Some(UniqueIdentifier::new(0x05E0, 7).unwrap()),
        };

        let serialized = response.serialize();
        assert_eq!(serialized.len(), 8);

        let parsed = DiscoveryMuteResponse::deserialize(&serialized).unwrap();
        assert_eq!(
            parsed.binding_uid,
            Some(UniqueIdentifier::new(0x05E0, 7).unwrap())
        );
    }
}
