use crate::consts::{BROADCAST_UID, DISCOVERY_STACK_DEPTH};
use crate::dmx_controller::{DmxController, RdmResponseError};
use crate::dmx_driver::{DiscoveryOption, DmxError, RdmControllerDriver};
use crate::unique_identifier::{PackageAddress, UniqueIdentifier};

/// The 16-bit unsigned sum every RDM checksum is built from.
#[inline]
pub(crate) fn calculate_checksum(data: &[u8]) -> u16 {
    let mut checksum = 0u16;

    for byte in data {
        checksum = checksum.wrapping_add(*byte as u16);
    }

    checksum
}

const MUTE_ATTEMPTS: usize = 3;
const BRANCH_ATTEMPTS: usize = 3;
const QUICK_FINDS: usize = 3;

/// Blocking full-bus discovery, the tree search of ANSI E1.20 section 7.
///
/// Un-mutes every responder, then walks the UID space with an explicit
/// interval stack. Intervals that answer cleanly are muted and reported
/// through `found`; collisions split the interval at its midpoint, the
/// lower half searched first. Unresponsive single-UID intervals are retried
/// with a byte-flipped UID once, which recovers devices that misimplement
/// the UID byte order.
///
/// `found` receives each discovered UID (the binding UID when the responder
/// reports one) together with its running index. Returns the device count.
pub fn discover_with_callback<Driver: RdmControllerDriver>(
    controller: &mut DmxController<Driver>,
    found: &mut dyn FnMut(UniqueIdentifier, usize),
) -> Result<usize, RdmResponseError<Driver::DriverError>> {
    // Un-mute all devices. Nobody answers a broadcast.
    controller.rdm_disc_un_mute(PackageAddress::Broadcast)?;

    let mut stack: heapless::Vec<(u64, u64), DISCOVERY_STACK_DEPTH> = heapless::Vec::new();
    stack.push((0, BROADCAST_UID - 1)).unwrap();

    let mut num_found = 0usize;

    while let Some((lower_bound, upper_bound)) = stack.pop() {
        if lower_bound == upper_bound {
            // Cannot branch further; mute the single candidate directly.
            if let Ok(uid) = UniqueIdentifier::try_from(lower_bound) {
                if let Some(uid) = mute_with_retries(controller, uid)? {
                    found(uid, num_found);
                    num_found += 1;
                }
            }
            continue;
        }

        match branch_with_retries(controller, lower_bound, upper_bound)? {
            BranchOutcome::Empty => {},
            BranchOutcome::Single(mut uid) => {
                // At most one device answered. Mute it, then keep searching
                // the same interval for stragglers before giving up on it.
                if let Some(muted_uid) = mute_with_retries(controller, uid)? {
                    found(muted_uid, num_found);
                    num_found += 1;
                }

                let mut split = false;
                for _ in 0..QUICK_FINDS {
                    match branch_with_retries(controller, lower_bound, upper_bound)? {
                        BranchOutcome::Empty => break,
                        BranchOutcome::Single(next_uid) => {
                            uid = next_uid;
                            if let Some(muted_uid) = mute_with_retries(controller, uid)? {
                                found(muted_uid, num_found);
                                num_found += 1;
                            }
                        },
                        BranchOutcome::Collision => {
                            split = true;
                            break;
                        },
                    }
                }

                if split {
                    push_halves(&mut stack, lower_bound, upper_bound);
                }
            },
            BranchOutcome::Collision => {
                push_halves(&mut stack, lower_bound, upper_bound);
            },
        }
    }

    #[cfg(feature = "log")]
    log::info!("rdm discovery finished, {} devices found", num_found);

    Ok(num_found)
}

/// [`discover_with_callback`] collecting into a UID slice. Returns the
/// number of devices found; when it equals `uids.len()` the bus may hold
/// more devices than the slice could take.
pub fn discover_devices<Driver: RdmControllerDriver>(
    controller: &mut DmxController<Driver>,
    uids: &mut [UniqueIdentifier],
) -> Result<usize, RdmResponseError<Driver::DriverError>> {
    let mut stored = 0usize;
    discover_with_callback(controller, &mut |uid, _| {
        if stored < uids.len() {
            uids[stored] = uid;
            stored += 1;
        }
    })?;

    Ok(stored)
}

enum BranchOutcome {
    Empty,
    Single(UniqueIdentifier),
    Collision,
}

fn push_halves(
    stack: &mut heapless::Vec<(u64, u64), DISCOVERY_STACK_DEPTH>,
    lower_bound: u64,
    upper_bound: u64,
) {
    let midpoint = lower_bound + (upper_bound - lower_bound) / 2;

    // The upper half is pushed first so the lower half is handled first.
    stack.push((midpoint + 1, upper_bound)).ok();
    stack.push((lower_bound, midpoint)).ok();
}

fn branch_with_retries<Driver: RdmControllerDriver>(
    controller: &mut DmxController<Driver>,
    lower_bound: u64,
    upper_bound: u64,
) -> Result<BranchOutcome, RdmResponseError<Driver::DriverError>> {
    for _ in 0..BRANCH_ATTEMPTS {
        match controller.rdm_discover(lower_bound, upper_bound) {
            Ok(DiscoveryOption::NoDevice) => continue,
            Ok(DiscoveryOption::Found(uid)) => return Ok(BranchOutcome::Single(uid)),
            Ok(DiscoveryOption::Collision) => return Ok(BranchOutcome::Collision),
            Err(RdmResponseError::DmxError(DmxError::TimeoutError)) => continue,
            Err(error) => return Err(error),
        }
    }

    Ok(BranchOutcome::Empty)
}

/// Mutes `uid`, retrying up to three times and once more with the UID
/// byte-flipped. Returns the UID to report, preferring the binding UID.
fn mute_with_retries<Driver: RdmControllerDriver>(
    controller: &mut DmxController<Driver>,
    uid: UniqueIdentifier,
) -> Result<Option<UniqueIdentifier>, RdmResponseError<Driver::DriverError>> {
    for _ in 0..MUTE_ATTEMPTS {
        match controller.rdm_disc_mute(PackageAddress::Device(uid)) {
            Ok(Some(response)) => return Ok(Some(response.binding_uid.unwrap_or(uid))),
            Ok(None) => return Ok(None),
            Err(RdmResponseError::DmxError(DmxError::TimeoutError)) => continue,
            Err(RdmResponseError::DmxError(DmxError::DeserializationError(_))) => continue,
            Err(error) => return Err(error),
        }
    }

    // Work around responders that flip their own UID byte order.
    let Ok(flipped) = uid.flipped() else {
        return Ok(None);
    };
    match controller.rdm_disc_mute(PackageAddress::Device(flipped)) {
        Ok(Some(response)) => Ok(Some(response.binding_uid.unwrap_or(flipped))),
        Ok(None) => Ok(None),
        Err(RdmResponseError::DmxError(DmxError::TimeoutError)) => Ok(None),
        Err(RdmResponseError::DmxError(DmxError::DeserializationError(_))) => Ok(None),
        Err(error) => Err(error),
    }
}
