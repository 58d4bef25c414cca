//! CPU count from an allocated claim's devices
//!
//! Devices published by the driver either carry a CPU capacity (grouped mode,
//! one device spans several cores) or stand for a single core. The capacity of
//! each device comes from the ResourceSlices of the driver.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::resource::v1::{ResourceClaim, ResourceSlice};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::warn;

use super::ClaimStore;
use crate::{quantity, Error, CPU_CAPACITY_KEY};

/// Device name to CPU capacity, for one driver.
///
/// `None` marks a device that is published without a CPU capacity; such a
/// device counts as one core. Devices missing from the catalog count as zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceCapacityCatalog {
    devices: BTreeMap<String, Option<Quantity>>,
}

impl DeviceCapacityCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from the ResourceSlices published by `driver`
    ///
    /// Slices of other drivers are ignored. A device published in several
    /// slices keeps the capacity of the last one.
    pub fn from_slices<'a>(slices: impl IntoIterator<Item = &'a ResourceSlice>, driver: &str) -> Self {
        let mut catalog = Self::new();
        for slice in slices.into_iter().filter(|s| s.spec.driver == driver) {
            for device in slice.spec.devices.iter().flatten() {
                let cpu = device
                    .capacity
                    .as_ref()
                    .and_then(|capacity| capacity.get(CPU_CAPACITY_KEY))
                    .map(|capacity| capacity.value.clone());
                catalog.insert(device.name.clone(), cpu);
            }
        }
        catalog
    }

    /// Record a device and its CPU capacity
    pub fn insert(&mut self, device: impl Into<String>, cpu: Option<Quantity>) {
        self.devices.insert(device.into(), cpu);
    }

    /// Number of devices in the catalog
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns true if the catalog has no devices
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// CPU count of a single device, or `None` if the device is not published
    pub fn device_cpus(&self, device: &str) -> Option<i64> {
        let capacity = self.devices.get(device)?;
        Some(match capacity {
            None => 1,
            Some(quantity) => quantity::ceil_value(quantity).unwrap_or_else(|| {
                warn!(device = %device, capacity = %quantity.0, "Ignoring unparsable CPU capacity");
                0
            }),
        })
    }

    /// Total CPUs across `devices`; unknown devices contribute nothing
    pub fn cpu_total<'a>(&self, devices: impl IntoIterator<Item = &'a String>) -> i64 {
        devices
            .into_iter()
            .filter_map(|device| self.device_cpus(device))
            .fold(0i64, i64::saturating_add)
    }
}

/// Distinct devices of `driver` allocated to `claim`
pub fn allocated_devices(claim: &ResourceClaim, driver: &str) -> BTreeSet<String> {
    claim
        .status
        .as_ref()
        .and_then(|status| status.allocation.as_ref())
        .and_then(|allocation| allocation.devices.as_ref())
        .and_then(|devices| devices.results.as_ref())
        .into_iter()
        .flatten()
        .filter(|result| result.driver == driver && !result.device.is_empty())
        .map(|result| result.device.clone())
        .collect()
}

/// Sum the CPUs of the devices allocated to `claim`.
///
/// Returns 0 without consulting the store when the claim has no allocated
/// devices of `driver`.
pub async fn count_allocated_cpus(
    store: &dyn ClaimStore,
    claim: &ResourceClaim,
    driver: &str,
) -> Result<i64, Error> {
    let devices = allocated_devices(claim, driver);
    if devices.is_empty() {
        return Ok(0);
    }
    let catalog = store.device_capacities(driver).await?;
    Ok(catalog.cpu_total(&devices))
}
