//! Kubernetes-backed claim store
//!
//! Reads ResourceClaims and ResourceSlices through the API server; no caching,
//! every admission review sees the current state.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dracpu_admission::claim::{
    ClaimCpuResolver, ClaimStore, DeviceCapacityCatalog, ResolverConfig,
};
use dracpu_admission::Error;
use k8s_openapi::api::resource::v1::{ResourceClaim, ResourceSlice};
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use crate::error::WebhookError;

/// [`ClaimStore`] over a live cluster
#[derive(Clone)]
pub struct KubeClaimStore {
    client: Client,
}

impl KubeClaimStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Claim CPU resolver reading through this store
    pub fn into_resolver(self, config: Arc<ResolverConfig>) -> ClaimCpuResolver {
        ClaimCpuResolver::new(Arc::new(self), config)
    }
}

/// Field selector restricting ResourceSlices to one driver
pub fn driver_field_selector(driver: &str) -> String {
    format!("spec.driver={driver}")
}

/// A failed ResourceSlice list, tagged with the driver it was scoped to
fn slice_list_error(driver: &str, err: impl std::fmt::Display) -> Error {
    Error::store_for(
        "device_capacities",
        format!("listing ResourceSlices for driver {driver}: {err}"),
    )
}

#[async_trait]
impl ClaimStore for KubeClaimStore {
    async fn get_claim(&self, namespace: &str, name: &str) -> Result<Option<ResourceClaim>, Error> {
        let api: Api<ResourceClaim> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(claim) => Ok(Some(claim)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn device_capacities(&self, driver: &str) -> Result<DeviceCapacityCatalog, Error> {
        let api: Api<ResourceSlice> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&driver_field_selector(driver));
        let slices = api
            .list(&params)
            .await
            .map_err(|e| slice_list_error(driver, e))?;

        let catalog = DeviceCapacityCatalog::from_slices(&slices.items, driver);
        debug!(
            driver = %driver,
            slices = slices.items.len(),
            devices = catalog.len(),
            "Loaded device capacities"
        );
        Ok(catalog)
    }
}

/// Build a client from `kubeconfig`, or infer one (in-cluster, then default
/// kubeconfig) when no path is given
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, WebhookError> {
    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                WebhookError::client("read_kubeconfig", format!("{}: {e}", path.display()))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| WebhookError::client("load_kubeconfig", e))?
        }
        None => Config::infer()
            .await
            .map_err(|e| WebhookError::client("infer_config", e))?,
    };
    Client::try_from(config).map_err(|e| WebhookError::client("create_client", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_field_selector() {
        assert_eq!(driver_field_selector("dra.cpu"), "spec.driver=dra.cpu");
    }

    #[test]
    fn test_slice_list_error_names_operation_and_driver() {
        let err = slice_list_error("dra.cpu", "connection refused");
        assert!(matches!(err, Error::Store { ref context, .. } if context == "device_capacities"));
        assert_eq!(
            err.to_string(),
            "store error [device_capacities]: \
             listing ResourceSlices for driver dra.cpu: connection refused"
        );
    }

    #[tokio::test]
    async fn test_missing_kubeconfig_is_a_client_error() {
        let err = create_client(Some(Path::new("/nonexistent/dracpu/kubeconfig")))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            WebhookError::Client { ref context, .. } if context == "read_kubeconfig"
        ));
    }
}
