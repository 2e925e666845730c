//! Status derivation from check outcomes
//!
//! A device's status is a pure function of the most recent check outcome,
//! never inferred from stale data. The function lives here on its own so
//! it can be unit-tested without any network access.

use crate::DeviceStatus;
use crate::probe::ProbeOutcome;

/// Derive a device status from the outcome of one check.
///
/// `probe` is `None` when the reachability check could not be executed at
/// all (registry or configuration fault). `collection_attempted` is true
/// only when the collector actually ran, which requires a successful
/// probe and collection enabled for the device.
///
/// Rules, in order:
/// 1. probe not executed -> `Unknown`
/// 2. unreachable -> `Offline`
/// 3. reachable, collection disabled or not attempted -> `Online`
/// 4. reachable, collection attempted, at least one attribute -> `Online`
/// 5. reachable, collection attempted, zero attributes -> `Warning`
///
/// `Warning` marks a device that answers at the network layer while its
/// management interface is non-functional, which is a different condition
/// from both offline and healthy.
pub fn evaluate(
    probe: Option<ProbeOutcome>,
    collection_attempted: bool,
    collected_any: bool,
) -> DeviceStatus {
    match probe {
        None => DeviceStatus::Unknown,
        Some(ProbeOutcome::Unreachable(_)) => DeviceStatus::Offline,
        Some(ProbeOutcome::Reachable) => {
            if !collection_attempted || collected_any {
                DeviceStatus::Online
            } else {
                DeviceStatus::Warning
            }
        }
    }
}
