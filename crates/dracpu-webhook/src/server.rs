//! HTTPS server for the admission webhook

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::config::Cli;
use crate::error::WebhookError;
use crate::webhook::{webhook_router, WebhookState};

/// Time in-flight reviews get to finish after a shutdown signal
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind the server
    pub addr: SocketAddr,
    /// TLS certificate PEM file
    pub cert_file: PathBuf,
    /// TLS private key PEM file
    pub key_file: PathBuf,
    /// Path of the health route
    pub healthz_path: String,
}

impl From<&Cli> for ServerConfig {
    fn from(cli: &Cli) -> Self {
        Self {
            addr: cli.bind_address,
            cert_file: cli.tls_cert_file.clone(),
            key_file: cli.tls_private_key_file.clone(),
            healthz_path: cli.healthz_path.clone(),
        }
    }
}

/// Serve the webhook until `shutdown` resolves.
///
/// The state turns ready once the listener is bound. On shutdown the server
/// stops accepting connections, gives in-flight reviews
/// [`SHUTDOWN_GRACE_PERIOD`] to finish, then cancels whatever is left through
/// the state's request token.
pub async fn start_server<S>(
    config: ServerConfig,
    state: Arc<WebhookState>,
    shutdown: S,
) -> Result<(), WebhookError>
where
    S: Future<Output = ()> + Send + 'static,
{
    let tls_config = RustlsConfig::from_pem_file(&config.cert_file, &config.key_file)
        .await
        .map_err(|e| {
            WebhookError::Tls(format!(
                "loading {} / {}: {e}",
                config.cert_file.display(),
                config.key_file.display()
            ))
        })?;

    let app = webhook_router(state.clone(), &config.healthz_path);
    let handle = Handle::new();

    let listening = handle.clone();
    let ready_state = state.clone();
    tokio::spawn(async move {
        if let Some(addr) = listening.listening().await {
            ready_state.set_ready(true);
            info!(addr = %addr, "Webhook server listening");
        }
    });

    let stopping = handle.clone();
    let stopping_state = state.clone();
    tokio::spawn(async move {
        shutdown.await;
        info!(
            grace_secs = SHUTDOWN_GRACE_PERIOD.as_secs(),
            "Shutting down webhook server"
        );
        stopping_state.set_ready(false);
        stopping.graceful_shutdown(Some(SHUTDOWN_GRACE_PERIOD));
    });

    info!(addr = %config.addr, "Starting webhook server");

    let result = axum_server::bind_rustls(config.addr, tls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await;

    state.requests.cancel();
    state.set_ready(false);
    result?;

    info!("Webhook server stopped");
    Ok(())
}

/// Resolves on SIGTERM or SIGINT
pub async fn shutdown_signal() {
    let sigint = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT"),
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGINT");
                std::future::pending::<()>().await;
            }
        }
    };

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "Failed to register SIGTERM handler, waiting for SIGINT only");
            sigint.await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clap::Parser;
    use dracpu_admission::{ClaimCpuCounter, ClaimError, RequestContext};

    struct ZeroCounter;

    #[async_trait]
    impl ClaimCpuCounter for ZeroCounter {
        async fn claim_cpu_count(
            &self,
            _ctx: &RequestContext,
            _namespace: &str,
            _claim_name: &str,
        ) -> Result<i64, ClaimError> {
            Ok(0)
        }
    }

    #[test]
    fn test_server_config_from_cli() {
        let cli = Cli::try_parse_from([
            "dracpu-admission",
            "--bind-address",
            "127.0.0.1:8443",
            "--healthz-path",
            "/readyz",
        ])
        .unwrap();
        let config = ServerConfig::from(&cli);
        assert_eq!(config.addr, "127.0.0.1:8443".parse().unwrap());
        assert_eq!(config.healthz_path, "/readyz");
        assert_eq!(config.cert_file, PathBuf::from("/etc/webhook/certs/tls.crt"));
    }

    #[tokio::test]
    async fn test_missing_certificates_fail_before_binding() {
        let state = Arc::new(WebhookState::new(
            Arc::new(ZeroCounter),
            "dra.cpu",
            Duration::from_secs(8),
        ));
        let config = ServerConfig {
            addr: "127.0.0.1:0".parse().unwrap(),
            cert_file: PathBuf::from("/nonexistent/dracpu/tls.crt"),
            key_file: PathBuf::from("/nonexistent/dracpu/tls.key"),
            healthz_path: "/healthz".to_string(),
        };

        let err = start_server(config, state.clone(), std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Tls(_)));
        assert!(!state.is_ready());
    }
}
