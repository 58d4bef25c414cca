//! Admission-time CPU consistency checks for the `dra.cpu` DRA driver
//!
//! A Pod that references `dra.cpu` ResourceClaims must request exactly as many
//! CPUs as those claims represent, and must not reuse a claim that has already
//! been allocated to another consumer.
//!
//! # Modules
//!
//! - [`quantity`] - CPU quantity parsing and whole-core normalization
//! - [`claim`] - ResourceClaim to CPU count resolution
//! - [`validation`] - Pod-level claim/CPU request invariant
//! - [`context`] - Request-scoped deadline and cancellation
//! - [`retry`] - Bounded retry for claims that are not created yet
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod claim;
pub mod context;
pub mod error;
pub mod quantity;
pub mod retry;
pub mod validation;

pub use claim::{
    AllocatedClaimPolicy, ClaimCpuCounter, ClaimCpuResolver, ClaimStore, ResolverConfig,
};
pub use context::RequestContext;
pub use error::{ClaimError, Error};
pub use validation::{validate_pod_claims, PodSnapshot};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default DRA driver (and DeviceClass) name validated by the webhook
pub const DEFAULT_DRIVER_NAME: &str = "dra.cpu";

/// Qualified capacity name carrying the CPU count of a device
///
/// Used both for per-device capacities published in ResourceSlices and for
/// capacity requests inside a ResourceClaim.
pub const CPU_CAPACITY_KEY: &str = "dra.cpu/cpu";
