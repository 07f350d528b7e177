//! Typed views over the parameter data of common controller requests.

use crate::pids;
use crate::rdm_types::{DeserializationError, DmxStartAddress, SupportedParameters};
use crate::types::DataPack;

pub fn deserialize_identify(buffer: &[u8]) -> Result<bool, DeserializationError> {
    if buffer.len() != 1 {
        return Err(DeserializationError);
    }

    Ok(buffer[0] != 0)
}

pub fn deserialize_software_version_label(
    buffer: &[u8],
) -> Result<heapless::String<32>, DeserializationError> {
    heapless::String::from_utf8(
        heapless::Vec::<_, 32>::from_slice(buffer).or(Err(DeserializationError))?,
    )
    .or(Err(DeserializationError))
}

pub fn deserialize_supported_parameters(
    buffer: &[u8],
) -> Result<SupportedParameters, DeserializationError> {
    if buffer.len() % 2 != 0 {
        return Err(DeserializationError);
    }

    let mut supported_parameters = heapless::Vec::new();
    for package_bytes in buffer.chunks(2) {
        supported_parameters
            .push(u16::from_be_bytes(package_bytes.try_into().unwrap()))
            .map_err(|_| DeserializationError)?;
    }

    Ok(supported_parameters)
}

#[derive(Debug)]
pub struct RdmResponseInfo {
    pub parameter_id: u16,
    pub message_count: u8,
    pub data: DataPack,
}

#[derive(Debug)]
pub enum RdmResponsePackage {
    IdentifyDevice(bool),
    SoftwareVersionLabel(heapless::String<32>),
    DmxStartAddress(DmxStartAddress),
    SupportedParameters(SupportedParameters),
    Custom(RdmResponseInfo),
}

impl RdmResponsePackage {
    pub fn from_response_info(
        response_info: RdmResponseInfo,
    ) -> Result<Self, DeserializationError> {
        Ok(match response_info.parameter_id {
            pids::IDENTIFY_DEVICE => {
                RdmResponsePackage::IdentifyDevice(deserialize_identify(&response_info.data)?)
            },
            pids::SOFTWARE_VERSION_LABEL => RdmResponsePackage::SoftwareVersionLabel(
                deserialize_software_version_label(&response_info.data)?,
            ),
            pids::DMX_START_ADDRESS => RdmResponsePackage::DmxStartAddress(
                DmxStartAddress::deserialize(&response_info.data)?,
            ),
            pids::SUPPORTED_PARAMETERS => RdmResponsePackage::SupportedParameters(
                deserialize_supported_parameters(&response_info.data)?,
            ),
            _ => Self::Custom(response_info),
        })
    }
}
