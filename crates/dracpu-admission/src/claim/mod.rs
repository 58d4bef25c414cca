//! ResourceClaim to CPU count resolution
//!
//! [`ClaimCpuResolver`] turns a claim reference into the number of CPUs the
//! claim represents:
//! - missing claims are retried for a short window (claims generated from
//!   templates appear asynchronously) and then count as zero
//! - allocated claims are rejected unless [`AllocatedClaimPolicy::CountDevices`]
//!   is configured
//! - allocated devices are counted from the driver's ResourceSlices
//! - otherwise the claim's request specification is counted

pub mod capacity;
pub mod request;

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::resource::v1::ResourceClaim;
use tracing::{debug, instrument};

#[cfg(test)]
use mockall::automock;

use crate::context::RequestContext;
use crate::retry::{retry_while_missing, NotFoundRetry};
use crate::{ClaimError, Error, DEFAULT_DRIVER_NAME};

pub use capacity::DeviceCapacityCatalog;

/// Read access to ResourceClaims and the driver's device capacities
///
/// This trait allows mocking the Kubernetes API in tests while using the real
/// client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Fetch a ResourceClaim, returning `None` if it does not exist
    async fn get_claim(&self, namespace: &str, name: &str) -> Result<Option<ResourceClaim>, Error>;

    /// Device name to CPU capacity for every device published by `driver`
    async fn device_capacities(&self, driver: &str) -> Result<DeviceCapacityCatalog, Error>;
}

/// Resolves a claim reference to the number of CPUs it represents
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClaimCpuCounter: Send + Sync {
    /// Total CPUs represented by the claim `namespace/claim_name`
    ///
    /// A claim that does not exist (after retries) resolves to 0.
    async fn claim_cpu_count(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        claim_name: &str,
    ) -> Result<i64, ClaimError>;
}

/// What to do with a claim that is already allocated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AllocatedClaimPolicy {
    /// Reject the claim as already allocated before counting anything
    #[default]
    Reject,
    /// Count the CPUs of the allocated devices instead of rejecting
    CountDevices,
}

/// Immutable resolver configuration, built once at startup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolverConfig {
    /// DRA driver (and DeviceClass) whose requests are counted
    pub driver_name: String,
    /// Retry window for claims that do not exist yet
    pub retry: NotFoundRetry,
    /// Handling of claims that already carry an allocation
    pub allocated_claims: AllocatedClaimPolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            driver_name: DEFAULT_DRIVER_NAME.to_string(),
            retry: NotFoundRetry::default(),
            allocated_claims: AllocatedClaimPolicy::default(),
        }
    }
}

/// [`ClaimCpuCounter`] backed by a [`ClaimStore`]
pub struct ClaimCpuResolver {
    store: Arc<dyn ClaimStore>,
    config: Arc<ResolverConfig>,
}

impl ClaimCpuResolver {
    /// Create a resolver over `store` with the given configuration
    pub fn new(store: Arc<dyn ClaimStore>, config: Arc<ResolverConfig>) -> Self {
        Self { store, config }
    }
}

#[async_trait]
impl ClaimCpuCounter for ClaimCpuResolver {
    #[instrument(skip(self, ctx), fields(driver = %self.config.driver_name))]
    async fn claim_cpu_count(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        claim_name: &str,
    ) -> Result<i64, ClaimError> {
        let store = self.store.as_ref();
        let driver = self.config.driver_name.as_str();

        let claim = retry_while_missing(
            &self.config.retry,
            ctx,
            "get_resource_claim",
            || async move {
                store
                    .get_claim(namespace, claim_name)
                    .await
                    .map_err(ClaimError::from)
            },
        )
        .await?;

        let Some(claim) = claim else {
            debug!("ResourceClaim not found within retry window, counting as zero");
            return Ok(0);
        };

        let allocated = claim
            .status
            .as_ref()
            .is_some_and(|status| status.allocation.is_some());
        if allocated && self.config.allocated_claims == AllocatedClaimPolicy::Reject {
            return Err(ClaimError::AlreadyAllocated);
        }

        let from_devices = tokio::select! {
            biased;
            done = ctx.done() => return Err(done.into()),
            total = capacity::count_allocated_cpus(store, &claim, driver) => total?,
        };
        if from_devices > 0 {
            debug!(cpus = from_devices, "Counted CPUs from allocated devices");
            return Ok(from_devices);
        }

        let requested = request::count_requested_cpus(&claim, driver);
        debug!(cpus = requested, "Counted CPUs from claim requests");
        Ok(requested)
    }
}
