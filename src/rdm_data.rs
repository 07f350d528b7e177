use crate::command_class::{RequestCommandClass, ResponseCommandClass};
use crate::consts::{
    DELIMITER_BYTE, PREAMBLE_BYTE, PREAMBLE_MAX_LEN, RDM_DISCOVERY_RESPONSE_SIZE,
    RDM_HEADER_SIZE, RDM_MAX_PACKET_SIZE, RDM_MAX_PDL, RDM_MIN_PACKET_SIZE, SC_RDM,
    SC_SUB_MESSAGE,
};
use crate::layouts::rdm_message_layout;
use crate::types::{DataPack, ResponseType};
use crate::unique_identifier::{PackageAddress, UniqueIdentifier};
use crate::utils::calculate_checksum;

/// Binary representation of an RDM package.
pub type BinaryRdmPackage = heapless::Vec<u8, RDM_MAX_PACKET_SIZE>;

/// Error that gets raised when attempting to convert an [RdmRequestData] object
/// to a [RdmResponseData] object that contains a broadcast destination address.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsBroadcastError;

impl core::fmt::Display for IsBroadcastError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "tried to convert broadcast request to response")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for IsBroadcastError {}

/// An RDM Request package that does not have its parameter data deserialized.
#[derive(Debug, Clone)]
pub struct RdmRequestData {
    pub destination_uid: PackageAddress,
    pub source_uid: UniqueIdentifier,
    pub transaction_number: u8,
    pub port_id: u8,
    pub message_count: u8,
    pub sub_device: u16,
    pub command_class: RequestCommandClass,
    pub parameter_id: u16,
    pub parameter_data: DataPack,
}

impl RdmRequestData {
    pub fn build_response(
        &self,
        response_type: ResponseType,
        response: DataPack,
        message_count: u8,
    ) -> Result<RdmResponseData, IsBroadcastError> {
        Ok(RdmResponseData {
            destination_uid: PackageAddress::Device(self.source_uid),
            source_uid: match self.destination_uid {
                PackageAddress::Device(uid) => uid,
                _ => return Err(IsBroadcastError),
            },
            transaction_number: self.transaction_number,
            response_type,
            message_count,
            sub_device: self.sub_device,
            command_class: self.command_class.get_response_class(),
            parameter_id: self.parameter_id,
            parameter_data: response,
        })
    }
}

/// An RDM Response package that does not have its parameter data deserialized.
#[derive(Debug, Clone)]
pub struct RdmResponseData {
    pub destination_uid: PackageAddress,
    pub source_uid: UniqueIdentifier,
    pub transaction_number: u8,
    pub response_type: ResponseType,
    pub message_count: u8,
    pub sub_device: u16,
    pub command_class: ResponseCommandClass,
    pub parameter_id: u16,
    pub parameter_data: DataPack,
}

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RdmDeserializationError {
    /// Buffer must be at least 26 bytes
    BufferTooSmall,
    /// Buffer must be at most 257 bytes
    BufferTooBig,
    /// The command class was not found; contains contents of command class field
    CommandClassNotFound(u8),
    /// The response type was not found; contains contents of response type field
    ResponseTypeNotFound(u8),
    /// The message length field is incorrect; contains result of parsing
    WrongMessageLength(usize),
    /// Wrong checksum; contains result of parsing
    WrongChecksum,
    /// Received wrong start code (0xCC) or sub start code (0x01); contains result of parsing
    WrongStartCode,
    /// The source uid is a broadcast address.
    SourceUidIsBroadcast,
}

impl core::fmt::Display for RdmDeserializationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RdmDeserializationError::BufferTooSmall => write!(f, "buffer too small"),
            RdmDeserializationError::BufferTooBig => write!(f, "buffer too big"),
            RdmDeserializationError::CommandClassNotFound(command_class) => {
                write!(f, "command class {} not found", command_class)
            },
            RdmDeserializationError::ResponseTypeNotFound(response_type) => {
                write!(f, "response type {} is unknown", response_type)
            },
            RdmDeserializationError::WrongMessageLength(message_length) => {
                write!(f, "message length {} is incorrect", message_length)
            },
            RdmDeserializationError::WrongChecksum => write!(f, "checksum is incorrect"),
            RdmDeserializationError::WrongStartCode => write!(f, "start code is incorrect"),
            RdmDeserializationError::SourceUidIsBroadcast => write!(f, "source uid is a broadcast"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RdmDeserializationError {}

#[derive(Debug)]
pub enum RdmData {
    Request(RdmRequestData),
    Response(RdmResponseData),
}

impl RdmData {
    pub fn deserialize(buf: &[u8]) -> Result<Self, RdmDeserializationError> {
        deserialize_rdm_data(buf)
    }

    pub fn serialize(&self) -> BinaryRdmPackage {
        serialize_rdm_data(self)
    }
}

/// Deserialize rdm data.
/// Buffer must be between 26 and 257 bytes.
pub fn deserialize_rdm_data(buffer: &[u8]) -> Result<RdmData, RdmDeserializationError> {
    let buffer_size = buffer.len();

    if buffer_size < RDM_MIN_PACKET_SIZE {
        return Err(RdmDeserializationError::BufferTooSmall);
    }

    if buffer_size > RDM_MAX_PACKET_SIZE {
        return Err(RdmDeserializationError::BufferTooBig);
    }

    // Exclude checksum field
    // Will evaluate correctness later
    let expected_checksum = calculate_checksum(&buffer[..buffer_size - 2]);
    let actual_checksum =
        u16::from_be_bytes(buffer[buffer_size - 2..buffer_size].try_into().unwrap());

    if expected_checksum != actual_checksum {
        return Err(RdmDeserializationError::WrongChecksum);
    }

    let message_view = rdm_message_layout::View::new(buffer);

    if message_view.start_code().read() != SC_RDM
        || message_view.sub_start_code().read() != SC_SUB_MESSAGE
    {
        return Err(RdmDeserializationError::WrongStartCode);
    }

    // exclude checksum
    let message_length = message_view.message_length().read() as usize;
    if message_length != buffer_size - 2 {
        return Err(RdmDeserializationError::WrongMessageLength(message_length));
    }

    let parameter_data_and_checksum = message_view.parameter_data_and_checksum();
    let parameter_data =
        DataPack::from_slice(&parameter_data_and_checksum[..parameter_data_and_checksum.len() - 2])
            .map_err(|_| RdmDeserializationError::BufferTooBig)?;

    let command_class_field = message_view.command_class().read();
    let is_request = RequestCommandClass::try_from(command_class_field).is_ok();

    let rdm_data = if is_request {
        RdmData::Request(RdmRequestData {
            destination_uid: PackageAddress::from_bytes(
                message_view.destination_uid().try_into().unwrap(),
            ),
            source_uid: match PackageAddress::from_bytes(
                message_view.source_uid().try_into().unwrap(),
            ) {
                PackageAddress::Device(device_uid) => device_uid,
                _ => return Err(RdmDeserializationError::SourceUidIsBroadcast),
            },
            transaction_number: message_view.transaction_number().read(),
            port_id: message_view.port_id_response_type().read(),
            message_count: message_view.message_count().read(),
            sub_device: message_view.sub_device().read(),
            command_class: command_class_field
                .try_into()
                .map_err(|_| RdmDeserializationError::CommandClassNotFound(command_class_field))?,
            parameter_id: message_view.parameter_id().read(),
            parameter_data,
        })
    } else {
        let response_type_field = message_view.port_id_response_type().read();
        let response_type = response_type_field
            .try_into()
            .map_err(|_| RdmDeserializationError::ResponseTypeNotFound(response_type_field))?;

        RdmData::Response(RdmResponseData {
            destination_uid: PackageAddress::from_bytes(
                message_view.destination_uid().try_into().unwrap(),
            ),
            source_uid: match PackageAddress::from_bytes(
                message_view.source_uid().try_into().unwrap(),
            ) {
                PackageAddress::Device(uid) => uid,
                _ => return Err(RdmDeserializationError::SourceUidIsBroadcast),
            },
            transaction_number: message_view.transaction_number().read(),
            response_type,
            message_count: message_view.message_count().read(),
            sub_device: message_view.sub_device().read(),
            command_class: command_class_field
                .try_into()
                .map_err(|_| RdmDeserializationError::CommandClassNotFound(command_class_field))?,
            parameter_id: message_view.parameter_id().read(),
            parameter_data,
        })
    };

    Ok(rdm_data)
}

/// Serializes RDM data to a binary Vec.
pub fn serialize_rdm_data(rdm_data: &RdmData) -> BinaryRdmPackage {
    let mut dst = [0u8; RDM_MAX_PACKET_SIZE];

    let parameter_data_length = match rdm_data {
        RdmData::Request(ref request) => request.parameter_data.len(),
        RdmData::Response(ref response) => response.parameter_data.len(),
    };
    debug_assert!(parameter_data_length <= RDM_MAX_PDL);

    // parameter data length + all other fields including checksum
    let total_packet_length = parameter_data_length + RDM_MIN_PACKET_SIZE;
    let mut memory_view = rdm_message_layout::View::new(&mut dst[..total_packet_length]);

    memory_view.start_code_mut().write(SC_RDM);
    memory_view.sub_start_code_mut().write(SC_SUB_MESSAGE);

    memory_view
        .message_length_mut()
        .write(parameter_data_length as u8 + RDM_HEADER_SIZE as u8);

    match rdm_data {
        RdmData::Request(request) => {
            memory_view
                .destination_uid_mut()
                .copy_from_slice(&request.destination_uid.to_bytes());
            memory_view
                .source_uid_mut()
                .copy_from_slice(&request.source_uid.to_bytes());

            memory_view
                .transaction_number_mut()
                .write(request.transaction_number);
            memory_view
                .port_id_response_type_mut()
                .write(request.port_id);
            memory_view.message_count_mut().write(request.message_count);
            memory_view.sub_device_mut().write(request.sub_device);
            memory_view
                .command_class_mut()
                .write(request.command_class as u8);
            memory_view.parameter_id_mut().write(request.parameter_id);
            memory_view
                .parameter_data_length_mut()
                .write(parameter_data_length as u8);

            memory_view.parameter_data_and_checksum_mut()[..parameter_data_length]
                .copy_from_slice(&request.parameter_data);
        },
        RdmData::Response(response) => {
            memory_view
                .destination_uid_mut()
                .copy_from_slice(&response.destination_uid.to_bytes());
            memory_view
                .source_uid_mut()
                .copy_from_slice(&response.source_uid.to_bytes());

            memory_view
                .transaction_number_mut()
                .write(response.transaction_number);
            memory_view
                .port_id_response_type_mut()
                .write(response.response_type as u8);
            memory_view
                .message_count_mut()
                .write(response.message_count);
            memory_view.sub_device_mut().write(response.sub_device);
            memory_view
                .command_class_mut()
                .write(response.command_class as u8);
            memory_view.parameter_id_mut().write(response.parameter_id);
            memory_view
                .parameter_data_length_mut()
                .write(parameter_data_length as u8);

            memory_view.parameter_data_and_checksum_mut()[..parameter_data_length]
                .copy_from_slice(&response.parameter_data);
        },
    }

    let checksum = calculate_checksum(&dst[..total_packet_length - 2]);
    dst[total_packet_length - 2..total_packet_length].copy_from_slice(&checksum.to_be_bytes());

    heapless::Vec::from_slice(&dst[..total_packet_length]).unwrap()
}

/// Returns the received device uid if there is no collision.
pub fn deserialize_discovery_response(
    buffer: &[u8],
) -> Result<UniqueIdentifier, RdmDeserializationError> {
    let index_of_delimiter = match buffer
        .iter()
        .take(PREAMBLE_MAX_LEN + 1)
        .position(|&x| x == DELIMITER_BYTE)
    {
        None => {
            return Err(RdmDeserializationError::WrongStartCode);
        },
        Some(index) => index,
    };

    let start_index = index_of_delimiter + 1;
    let message_length = buffer.len() - start_index;
    if message_length < RDM_DISCOVERY_RESPONSE_SIZE {
        return Err(RdmDeserializationError::WrongMessageLength(message_length));
    }

    // The checksum covers the encoded form of the UID, not the decoded bytes.
    let calculated_checksum = calculate_checksum(&buffer[start_index..start_index + 12]);

    let mut device_uid_buf = [0u8; 6];
    decode_disc_unique(&buffer[start_index..start_index + 12], &mut device_uid_buf);
    let uid = match PackageAddress::from_bytes(&device_uid_buf) {
        PackageAddress::Device(uid) => uid,
        _ => return Err(RdmDeserializationError::SourceUidIsBroadcast),
    };

    let mut checksum_buf = [0u8; 2];
    decode_disc_unique(
        &buffer[start_index + 12..start_index + 16],
        &mut checksum_buf,
    );
    let received_checksum = u16::from_be_bytes(checksum_buf);

    if calculated_checksum != received_checksum {
        return Err(RdmDeserializationError::WrongChecksum);
    }

    Ok(uid)
}

/// Encodes a DISC_UNIQUE_BRANCH response into `out`.
///
/// Writes `preamble_len` preamble bytes (at most 7), the delimiter, the
/// Manchester-encoded UID and the encoded checksum. Returns the number of
/// bytes written.
pub fn encode_discovery_response(
    uid: UniqueIdentifier,
    preamble_len: usize,
    out: &mut [u8],
) -> usize {
    let preamble_len = preamble_len.min(PREAMBLE_MAX_LEN);
    let total = preamble_len + 1 + RDM_DISCOVERY_RESPONSE_SIZE;
    debug_assert!(out.len() >= total);

    out[..preamble_len].fill(PREAMBLE_BYTE);
    out[preamble_len] = DELIMITER_BYTE;

    let data_start = preamble_len + 1;
    encode_disc_unique(&uid.to_bytes(), &mut out[data_start..data_start + 12]);

    let checksum = calculate_checksum(&out[data_start..data_start + 12]);
    encode_disc_unique(
        &checksum.to_be_bytes(),
        &mut out[data_start + 12..data_start + 16],
    );

    total
}

/// Encode bytes as `(b | 0xAA, b | 0x55)` pairs. The destination has to be
/// twice the source size.
pub(crate) fn encode_disc_unique(src: &[u8], dest: &mut [u8]) {
    debug_assert!(dest.len() >= src.len() * 2);

    for (index, byte) in src.iter().enumerate() {
        dest[index * 2] = byte | 0xAA;
        dest[index * 2 + 1] = byte | 0x55;
    }
}

/// Decode `(lo, hi)` pairs as `(lo & 0x55) | (hi & 0xAA)`. The destination has
/// to be at least half the source size.
fn decode_disc_unique(src: &[u8], dest: &mut [u8]) {
    debug_assert!(dest.len() * 2 >= src.len());

    for (index, byte) in src
        .chunks(2)
        .map(|chunk| (chunk[0] & 0x55) | (chunk[1] & 0xAA))
        .enumerate()
    {
        dest[index] = byte;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NackReason;

    fn request() -> RdmRequestData {
        RdmRequestData {
            destination_uid: PackageAddress::Device(UniqueIdentifier::new(0x05E0, 1).unwrap()),
            source_uid: UniqueIdentifier::new(0x7FF0, 42).unwrap(),
            transaction_number: 7,
            port_id: 1,
            message_count: 0,
            sub_device: 0,
            command_class: RequestCommandClass::GetCommand,
            parameter_id: crate::pids::DEVICE_INFO,
            parameter_data: DataPack::new(),
        }
    }

    #[test]
    fn test_request_round_trip() {
        let serialized = RdmData::Request(request()).serialize();
        assert_eq!(serialized.len(), RDM_MIN_PACKET_SIZE);

        match RdmData::deserialize(&serialized).unwrap() {
            RdmData::Request(parsed) => {
                assert_eq!(parsed.source_uid, request().source_uid);
                assert_eq!(parsed.transaction_number, 7);
                assert_eq!(parsed.parameter_id, crate::pids::DEVICE_INFO);
                assert!(parsed.parameter_data.is_empty());
            },
            RdmData::Response(_) => panic!("deserialized as response"),
        }
    }

    #[test]
    fn test_empty_pdl_checksum_is_header_sum() {
        let serialized = RdmData::Request(request()).serialize();

        let expected = calculate_checksum(&serialized[..RDM_HEADER_SIZE]);
        let actual = u16::from_be_bytes(serialized[RDM_HEADER_SIZE..].try_into().unwrap());
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_corrupted_checksum_is_rejected() {
        let mut serialized = RdmData::Request(request()).serialize();
        let last = serialized.len() - 1;
        serialized[last] ^= 0xFF;

        assert!(matches!(
            RdmData::deserialize(&serialized),
            Err(RdmDeserializationError::WrongChecksum)
        ));
    }

    #[test]
    fn test_response_round_trip() {
        let response = request()
            .build_response(
                ResponseType::ResponseTypeNackReason,
                NackReason::UnknownPid.serialize(),
                3,
            )
            .unwrap();
        let serialized = RdmData::Response(response).serialize();

        match RdmData::deserialize(&serialized).unwrap() {
            RdmData::Response(parsed) => {
                assert_eq!(parsed.response_type, ResponseType::ResponseTypeNackReason);
                assert_eq!(parsed.message_count, 3);
                assert_eq!(&parsed.parameter_data[..], &[0x00, 0x00]);
            },
            RdmData::Request(_) => panic!("deserialized as request"),
        }
    }

    #[test]
    fn test_broadcast_request_cannot_become_response() {
        let mut broadcast = request();
        broadcast.destination_uid = PackageAddress::Broadcast;

        broadcast
            .build_response(ResponseType::ResponseTypeAck, DataPack::new(), 0)
            .unwrap_err();
    }

    #[test]
    fn test_discovery_response_all_preamble_lengths() {
        let uid = UniqueIdentifier::new(0x05E0, 0x01020304).unwrap();

        for preamble_len in 0..=PREAMBLE_MAX_LEN {
            let mut buffer = [0u8; 24];
            let written = encode_discovery_response(uid, preamble_len, &mut buffer);
            assert_eq!(written, preamble_len + 17);

            let decoded = deserialize_discovery_response(&buffer[..written]).unwrap();
            assert_eq!(decoded, uid);
        }
    }

    #[test]
    fn test_discovery_response_preamble_too_long() {
        // 8 preamble bytes and no delimiter within the first 8 slots.
        let mut buffer = [PREAMBLE_BYTE; 25];
        buffer[8] = DELIMITER_BYTE;

        deserialize_discovery_response(&buffer).unwrap_err();
    }

    #[test]
    fn test_discovery_response_corruption_is_detected() {
        let uid = UniqueIdentifier::new(0x05E0, 0xABCD).unwrap();
        let mut buffer = [0u8; 24];
        let written = encode_discovery_response(uid, 7, &mut buffer);

        // Simulate a collision garbling one encoded byte.
        buffer[10] = 0x00;
        deserialize_discovery_response(&buffer[..written]).unwrap_err();
    }
}
