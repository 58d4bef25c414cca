//! dracpu-admission - validating webhook keeping Pod CPU requests consistent
//! with their dra.cpu ResourceClaims

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use dracpu_webhook::config::Cli;
use dracpu_webhook::server::{shutdown_signal, start_server, ServerConfig};
use dracpu_webhook::store::{create_client, KubeClaimStore};
use dracpu_webhook::telemetry::{init_telemetry, TelemetryConfig};
use dracpu_webhook::webhook::WebhookState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // TLS for both the webhook listener and the kube client
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install aws-lc-rs crypto provider: {e:?}");
        std::process::exit(1);
    }

    init_telemetry(TelemetryConfig::default())?;

    let cli = Cli::parse();
    cli.validate()?;

    let resolver_config = Arc::new(cli.resolver_config());
    info!(
        driver = %resolver_config.driver_name,
        retry_wait_ms = resolver_config.retry.wait.as_millis(),
        retry_total_ms = resolver_config.retry.total.as_millis(),
        allocated_claims = ?resolver_config.allocated_claims,
        admission_timeout_ms = cli.admission_timeout.as_millis(),
        "Starting dracpu-admission"
    );

    let client = create_client(cli.kubeconfig.as_deref()).await?;
    let counter = Arc::new(KubeClaimStore::new(client).into_resolver(resolver_config));

    let state = Arc::new(WebhookState::new(
        counter,
        cli.driver_name.clone(),
        cli.admission_timeout,
    ));

    start_server(ServerConfig::from(&cli), state, shutdown_signal()).await?;
    Ok(())
}
