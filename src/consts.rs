/// Start code of a null-start DMX packet.
pub const DMX_NULL_START: u8 = 0x00;
/// Start code + 512 slot bytes.
pub const DMX_MAX_PACKET_SIZE: usize = 513;
/// RDM start code.
pub const SC_RDM: u8 = 0xCC;
/// RDM sub-start code.
pub const SC_SUB_MESSAGE: u8 = 0x01;

/// Preamble byte of a DISC_UNIQUE_BRANCH response.
pub const PREAMBLE_BYTE: u8 = 0xFE;
/// Preamble delimiter of a DISC_UNIQUE_BRANCH response.
pub const DELIMITER_BYTE: u8 = 0xAA;
/// A DISC_UNIQUE_BRANCH response carries at most 7 preamble bytes.
pub const PREAMBLE_MAX_LEN: usize = 7;

/// The all-ones broadcast UID as a 48-bit integer.
pub const BROADCAST_UID: u64 = 0xFFFF_FFFF_FFFF;

/// Nominal DMX baud rate.
pub const DMX_BAUD: u32 = 250_000;
/// Lowest baud rate permitted by the DMX specification.
pub const DMX_BAUD_MIN: u32 = 245_000;
/// Highest baud rate permitted by the DMX specification.
pub const DMX_BAUD_MAX: u32 = 255_000;

/// Default transmitted break length in microseconds.
pub const DMX_BREAK_LEN_US: u32 = 176;
/// Default transmitted mark-after-break length in microseconds.
pub const DMX_MAB_LEN_US: u32 = 12;
/// Shortest transmittable break.
pub const DMX_BREAK_LEN_MIN_US: u32 = 92;
/// Longest transmittable break.
pub const DMX_BREAK_LEN_MAX_US: u32 = 1_000_000;
/// Shortest transmittable mark-after-break.
pub const DMX_MAB_LEN_MIN_US: u32 = 12;
/// Longest transmittable mark-after-break.
pub const DMX_MAB_LEN_MAX_US: u32 = 1_000_000;

/// Header plus checksum of an RDM message with an empty parameter data block.
pub const RDM_MIN_PACKET_SIZE: usize = 26;
/// Largest possible RDM message including the checksum.
pub const RDM_MAX_PACKET_SIZE: usize = 257;
/// Size of the RDM message header, start code through PDL inclusive.
pub const RDM_HEADER_SIZE: usize = 24;
/// Largest permissible parameter data length.
pub const RDM_MAX_PDL: usize = 231;

/// Encoded DISC_UNIQUE_BRANCH response excluding preamble and delimiter.
pub const RDM_DISCOVERY_RESPONSE_SIZE: usize = 16;
/// Encoded DISC_UNIQUE_BRANCH response including 7 preamble bytes + delimiter.
pub const RDM_MAX_DISCOVERY_RESPONSE_SIZE: usize = RDM_DISCOVERY_RESPONSE_SIZE + 8;

/// Maximum time a responder may take to begin its response, plus slack.
pub const RDM_RESPONSE_TIMEOUT_US: u32 = 2800;
/// Controller-side wait for a complete response packet.
pub const RDM_REQUEST_TIMEOUT_US: u32 = 23_000;
/// Guard time observed after a broadcast request before reusing the bus.
pub const RDM_BROADCAST_GUARD_US: u32 = 3200;

/// Number of PIDs every compliant responder registers at install.
pub const RESPONDER_PIDS_REQUIRED: usize = 9;
/// Additional optional PIDs the responder table can hold.
pub const RESPONDER_PIDS_OPTIONAL: usize = 25;
/// Capacity of the responder PID table.
pub const RESPONDER_PIDS_MAX: usize = RESPONDER_PIDS_REQUIRED + RESPONDER_PIDS_OPTIONAL;
/// Capacity of the queued-message ring.
pub const RESPONDER_QUEUE_MAX: usize = 64;

/// Smallest permissible parameter heap.
pub const PD_HEAP_MIN_SIZE: usize = 53;
/// Capacity backing the per-port parameter heap.
pub const PD_HEAP_CAPACITY: usize = 256;

/// Number of addressable port slots in the process-wide registry.
pub const DMX_NUM_MAX: usize = 4;

/// A DMX start address of 0xFFFF means the device occupies no slots.
pub const DMX_START_ADDRESS_NONE: u16 = 0xFFFF;

/// Worst-case depth of the discovery binary search stack.
pub const DISCOVERY_STACK_DEPTH: usize = 49;

/// ESTA manufacturer id used for MAC-derived device UIDs.
pub const DEFAULT_MANUFACTURER_ID: u16 = 0x05E0;

/// Capacity of the sniffer metadata queue.
pub const SNIFFER_QUEUE_SIZE: usize = 8;
