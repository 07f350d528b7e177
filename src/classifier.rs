//! Incremental packet recognition.
//!
//! The framing engine calls [`classify`] every time `head` advances. The
//! classifier reads at most the first three bytes of the buffer plus the
//! preamble of a discovery response and decides the earliest moment the
//! packet can be declared complete, so the waiting task is woken without
//! waiting for the following break.

use crate::consts::{
    DELIMITER_BYTE, PREAMBLE_BYTE, PREAMBLE_MAX_LEN, RDM_DISCOVERY_RESPONSE_SIZE, SC_RDM,
    SC_SUB_MESSAGE,
};
use crate::rdm_data::deserialize_discovery_response;
use crate::types::{PacketError, PacketKind};
use crate::utils::calculate_checksum;

/// Result of classifying a partially received buffer.
#[derive(Copy, Clone, Debug)]
pub struct Classification {
    pub complete: bool,
    pub kind: PacketKind,
    pub error: Option<PacketError>,
}

impl Classification {
    fn incomplete(kind: PacketKind) -> Self {
        Self {
            complete: false,
            kind,
            error: None,
        }
    }

    fn complete(kind: PacketKind, error: Option<PacketError>) -> Self {
        Self {
            complete: true,
            kind,
            error,
        }
    }
}

/// Classifies `buffer[..head]`. `rx_size_estimate` is the rolling estimate
/// of non-RDM packet length maintained by the framing engine.
pub fn classify(buffer: &[u8], head: usize, rx_size_estimate: usize) -> Classification {
    if head == 0 {
        return Classification::incomplete(PacketKind::Dmx);
    }

    match buffer[0] {
        SC_RDM if head < 2 || buffer[1] == SC_SUB_MESSAGE => classify_rdm(buffer, head),
        PREAMBLE_BYTE | DELIMITER_BYTE => classify_discovery_response(buffer, head),
        _ => classify_dmx(head, rx_size_estimate),
    }
}

fn classify_rdm(buffer: &[u8], head: usize) -> Classification {
    if head < 3 {
        return Classification::incomplete(PacketKind::Rdm);
    }

    // The message length field counts start code through the last parameter
    // byte; the two checksum bytes follow it.
    let expected = buffer[2] as usize + 2;
    if head < expected {
        return Classification::incomplete(PacketKind::Rdm);
    }

    let calculated = calculate_checksum(&buffer[..expected - 2]);
    let received = u16::from_be_bytes(buffer[expected - 2..expected].try_into().unwrap());

    let error = (calculated != received).then_some(PacketError::InvalidCrc);
    Classification::complete(PacketKind::Rdm, error)
}

fn classify_discovery_response(buffer: &[u8], head: usize) -> Classification {
    let preamble_len = buffer[..head.min(PREAMBLE_MAX_LEN + 1)]
        .iter()
        .position(|byte| *byte == DELIMITER_BYTE);

    let Some(preamble_len) = preamble_len else {
        if head > PREAMBLE_MAX_LEN {
            // More than 7 preamble bytes without a delimiter. Multiple
            // responders are stepping on each other.
            return Classification::complete(
                PacketKind::RdmDiscoveryResponse,
                Some(PacketError::InvalidCrc),
            );
        }
        return Classification::incomplete(PacketKind::RdmDiscoveryResponse);
    };

    let expected = preamble_len + 1 + RDM_DISCOVERY_RESPONSE_SIZE;
    if head < expected {
        return Classification::incomplete(PacketKind::RdmDiscoveryResponse);
    }

    let error =
        deserialize_discovery_response(&buffer[..expected]).is_err().then_some(PacketError::InvalidCrc);
    Classification::complete(PacketKind::RdmDiscoveryResponse, error)
}

fn classify_dmx(head: usize, rx_size_estimate: usize) -> Classification {
    if rx_size_estimate > 0 && head >= rx_size_estimate {
        Classification::complete(PacketKind::Dmx, None)
    } else {
        Classification::incomplete(PacketKind::Dmx)
    }
}
