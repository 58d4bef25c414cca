//! CPU count from a claim's request specification
//!
//! Used for claims that have not been allocated yet: the CPU count is what
//! the claim asks for, not what it was granted.

use k8s_openapi::api::resource::v1::{ExactDeviceRequest, ResourceClaim};

use crate::quantity;
use crate::CPU_CAPACITY_KEY;

/// Sum the CPUs requested by `claim` from the `driver` device class
pub fn count_requested_cpus(claim: &ResourceClaim, driver: &str) -> i64 {
    claim
        .spec
        .devices
        .as_ref()
        .and_then(|devices| devices.requests.as_ref())
        .into_iter()
        .flatten()
        .filter_map(|request| request.exactly.as_ref())
        .filter(|exact| exact.device_class_name == driver)
        .map(exact_request_cpus)
        .fold(0i64, i64::saturating_add)
}

/// CPUs for a single exact device request.
///
/// Without capacity requests every requested device is one CPU. With capacity
/// requests the CPU amount per device must be a whole number >= 1, otherwise
/// the request contributes nothing.
pub fn exact_request_cpus(request: &ExactDeviceRequest) -> i64 {
    let count = request.count.unwrap_or(1).max(1);

    let capacity_requests = request
        .capacity
        .as_ref()
        .and_then(|capacity| capacity.requests.as_ref())
        .filter(|requests| !requests.is_empty());

    match capacity_requests {
        None => count,
        Some(requests) => match requests.get(CPU_CAPACITY_KEY).and_then(quantity::exact_integer) {
            Some(cpus) if cpus >= 1 => cpus.saturating_mul(count),
            _ => 0,
        },
    }
}
