//! Process-wide driver state.
//!
//! Interrupt glue gets handed a bare port number, so installs go through a
//! registry of per-slot atomics that enforces exclusive ownership of each
//! port. The RDM device UID is derived once, from the MAC address of the
//! first port to install; that port becomes the binding port whose UID a
//! multi-port device reports in its mute replies.

use crate::consts::{DEFAULT_MANUFACTURER_ID, DMX_NUM_MAX};
use crate::unique_identifier::UniqueIdentifier;
use core::sync::atomic::{AtomicBool, AtomicI8, AtomicU64, Ordering};

static SLOTS: [AtomicBool; DMX_NUM_MAX] = [
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
];

/// 0 means "not yet derived"; a derived UID is never null.
static DEVICE_UID: AtomicU64 = AtomicU64::new(0);
static BINDING_PORT: AtomicI8 = AtomicI8::new(-1);

/// Claims a port slot. Fails when the slot is unknown or already owned.
pub(crate) fn claim_slot(port_num: u8) -> bool {
    let Some(slot) = SLOTS.get(port_num as usize) else {
        return false;
    };

    slot.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

pub(crate) fn release_slot(port_num: u8) {
    if let Some(slot) = SLOTS.get(port_num as usize) {
        slot.store(false, Ordering::Release);
    }
}

pub(crate) fn is_installed(port_num: u8) -> bool {
    SLOTS
        .get(port_num as usize)
        .is_some_and(|slot| slot.load(Ordering::Acquire))
}

pub(crate) fn installed_count() -> usize {
    SLOTS
        .iter()
        .filter(|slot| slot.load(Ordering::Acquire))
        .count()
}

/// Derives and publishes the process-wide device UID on first install.
/// Every later port observes the same UID.
pub(crate) fn bind_device_uid(port_num: u8, mac: [u8; 6]) -> UniqueIdentifier {
    let device_id = u32::from_be_bytes(mac[2..6].try_into().unwrap());
    let derived = ((DEFAULT_MANUFACTURER_ID as u64) << 32) | device_id as u64;

    match DEVICE_UID.compare_exchange(0, derived, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => {
            BINDING_PORT.store(port_num as i8, Ordering::Release);
            UniqueIdentifier::try_from(derived).unwrap()
        },
        Err(existing) => UniqueIdentifier::try_from(existing).unwrap(),
    }
}

/// The process-wide RDM device UID, once a port has installed.
pub fn device_uid() -> Option<UniqueIdentifier> {
    let uid = DEVICE_UID.load(Ordering::Acquire);
    (uid != 0).then(|| UniqueIdentifier::try_from(uid).unwrap())
}

/// The port whose UID is reported as the binding UID.
pub fn binding_port() -> Option<u8> {
    let port = BINDING_PORT.load(Ordering::Acquire);
    (port >= 0).then_some(port as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_claims_are_exclusive() {
        assert!(claim_slot(3));
        assert!(!claim_slot(3));

        release_slot(3);
        assert!(claim_slot(3));
        release_slot(3);
    }

    #[test]
    fn test_unknown_slot_is_rejected() {
        assert!(!claim_slot(DMX_NUM_MAX as u8));
    }

    #[test]
    fn test_device_uid_is_derived_once() {
        let first = bind_device_uid(2, [0xAA, 0xBB, 0x01, 0x02, 0x03, 0x04]);
        let second = bind_device_uid(3, [0xAA, 0xBB, 0xFF, 0xFF, 0xFF, 0xFE]);

        assert_eq!(first, second);
        assert_eq!(first.manufacturer_uid(), DEFAULT_MANUFACTURER_ID);
        assert_eq!(device_uid(), Some(first));
    }
}
