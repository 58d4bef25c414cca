//! Pod-level claim/CPU request invariant
//!
//! When a Pod references `dra.cpu` ResourceClaims, the sum of its container
//! CPU requests must equal the number of CPUs those claims represent. Claims
//! that resolve to zero CPUs (not created yet, other drivers) leave the Pod
//! unconstrained.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::debug;

use crate::claim::ClaimCpuCounter;
use crate::context::RequestContext;
use crate::error::ClaimError;
use crate::quantity::cpu_request_count;

/// Resource name of the CPU request in a container's resource list
const CPU_RESOURCE: &str = "cpu";

/// A pod-level claim reference (`spec.resourceClaims[*]`)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PodClaimRef {
    /// Reference name used by containers
    pub name: String,
    /// Backing ResourceClaim, if the reference names one directly
    pub resource_claim_name: Option<String>,
}

/// The parts of a container the invariant looks at
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContainerSnapshot {
    /// Container name
    pub name: String,
    /// CPU request, if declared
    pub cpu_request: Option<Quantity>,
    /// Claim reference names used by the container
    pub claims: Vec<String>,
}

/// Read-only view of a Pod for claim validation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PodSnapshot {
    /// Namespace the claims are looked up in
    pub namespace: String,
    /// Pod name (may be empty for generateName pods)
    pub name: String,
    /// Regular containers in declaration order
    pub containers: Vec<ContainerSnapshot>,
    /// Pod-level claim references
    pub claim_refs: Vec<PodClaimRef>,
}

impl PodSnapshot {
    /// Build a snapshot of `pod`.
    ///
    /// The Pod's own namespace wins; `fallback_namespace` (the admission
    /// request namespace) is used when the object does not carry one. Init
    /// containers are not part of the snapshot.
    pub fn from_pod(pod: &Pod, fallback_namespace: Option<&str>) -> Self {
        let namespace = pod
            .metadata
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .or(fallback_namespace)
            .unwrap_or_default()
            .to_string();

        let Some(spec) = pod.spec.as_ref() else {
            return Self {
                namespace,
                name: pod.metadata.name.clone().unwrap_or_default(),
                ..Default::default()
            };
        };

        let containers = spec
            .containers
            .iter()
            .map(|container| {
                let resources = container.resources.as_ref();
                ContainerSnapshot {
                    name: container.name.clone(),
                    cpu_request: resources
                        .and_then(|r| r.requests.as_ref())
                        .and_then(|requests| requests.get(CPU_RESOURCE))
                        .cloned(),
                    claims: resources
                        .and_then(|r| r.claims.as_ref())
                        .into_iter()
                        .flatten()
                        .map(|claim| claim.name.clone())
                        .collect(),
                }
            })
            .collect();

        let claim_refs = spec
            .resource_claims
            .iter()
            .flatten()
            .map(|rc| PodClaimRef {
                name: rc.name.clone(),
                resource_claim_name: rc.resource_claim_name.clone(),
            })
            .collect();

        Self {
            namespace,
            name: pod.metadata.name.clone().unwrap_or_default(),
            containers,
            claim_refs,
        }
    }
}

/// Reference name to backing ResourceClaim name, built once per validation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimReferenceMap {
    claims: BTreeMap<String, String>,
}

impl ClaimReferenceMap {
    /// Build the map, skipping unnamed references and references without a
    /// backing claim name (e.g. template references)
    pub fn from_refs(refs: &[PodClaimRef]) -> Self {
        let claims = refs
            .iter()
            .filter(|r| !r.name.is_empty())
            .filter_map(|r| {
                r.resource_claim_name
                    .as_ref()
                    .map(|claim| (r.name.clone(), claim.clone()))
            })
            .collect();
        Self { claims }
    }

    /// The backing claim for `reference`
    pub fn get(&self, reference: &str) -> Option<&str> {
        self.claims.get(reference).map(String::as_str)
    }

    /// Returns true if no reference has a backing claim
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Number of references with a backing claim
    pub fn len(&self) -> usize {
        self.claims.len()
    }
}

/// Check the Pod's CPU requests against the claims it references.
///
/// Returns one message per problem, in container order, with the total
/// mismatch (if any) last. An empty list means the Pod is accepted. A failure
/// on one claim never stops the others from being checked.
pub async fn validate_pod_claims(
    ctx: &RequestContext,
    pod: &PodSnapshot,
    driver_name: &str,
    counter: &dyn ClaimCpuCounter,
) -> Vec<String> {
    if pod.claim_refs.is_empty() {
        return Vec::new();
    }

    let claims = ClaimReferenceMap::from_refs(&pod.claim_refs);
    if claims.is_empty() {
        return Vec::new();
    }

    let mut total_pod_cpu: i64 = 0;
    let mut total_claim_cpu: i64 = 0;
    let mut errors = Vec::new();

    for container in &pod.containers {
        if let Some(cpu) = &container.cpu_request {
            total_pod_cpu = total_pod_cpu.saturating_add(cpu_request_count(cpu));
        }

        for reference in &container.claims {
            let Some(claim_name) = claims.get(reference) else {
                continue;
            };

            match counter
                .claim_cpu_count(ctx, &pod.namespace, claim_name)
                .await
            {
                Ok(cpus) => {
                    debug!(
                        pod = %pod.name,
                        container = %container.name,
                        claim = %claim_name,
                        cpus = cpus,
                        "Resolved ResourceClaim CPU count"
                    );
                    total_claim_cpu = total_claim_cpu.saturating_add(cpus);
                }
                Err(ClaimError::AlreadyAllocated) => {
                    errors.push(format!("ResourceClaim {claim_name:?} is already allocated"));
                }
                Err(e) => {
                    errors.push(format!("failed to get ResourceClaim {claim_name:?}: {e}"));
                }
            }
        }
    }

    if total_claim_cpu > 0 && total_pod_cpu != total_claim_cpu {
        errors.push(format!(
            "pod CPU requests ({total_pod_cpu}) must match {driver_name} claim total ({total_claim_cpu})"
        ));
    }

    errors
}
