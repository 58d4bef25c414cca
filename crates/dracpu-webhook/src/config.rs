//! Command-line and environment configuration
//!
//! Every flag has a default suitable for running in-cluster behind a
//! ValidatingWebhookConfiguration; the retry window can also be tuned through
//! `DRACPU_ADMISSION_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use dracpu_admission::claim::{AllocatedClaimPolicy, ResolverConfig};
use dracpu_admission::retry::NotFoundRetry;
use dracpu_admission::DEFAULT_DRIVER_NAME;

use crate::error::WebhookError;
use crate::webhook::VALIDATE_PATH;

/// dracpu-admission - validating webhook for dra.cpu ResourceClaims
#[derive(Parser, Debug, Clone)]
#[command(name = "dracpu-admission", version, about, long_about = None)]
pub struct Cli {
    /// Address the HTTPS server listens on
    #[arg(long, env = "DRACPU_ADMISSION_BIND_ADDRESS", default_value = "0.0.0.0:9443")]
    pub bind_address: SocketAddr,

    /// PEM certificate served to the API server
    #[arg(long, default_value = "/etc/webhook/certs/tls.crt")]
    pub tls_cert_file: PathBuf,

    /// PEM private key for the serving certificate
    #[arg(long, default_value = "/etc/webhook/certs/tls.key")]
    pub tls_private_key_file: PathBuf,

    /// Path to a kubeconfig; the in-cluster configuration is used when absent
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// DRA driver (and DeviceClass) whose claims are checked
    #[arg(long, default_value = DEFAULT_DRIVER_NAME)]
    pub driver_name: String,

    /// Path of the readiness/liveness endpoint
    #[arg(long, default_value = "/healthz")]
    pub healthz_path: String,

    /// Delay between lookups of a ResourceClaim that does not exist yet
    #[arg(
        long,
        env = "DRACPU_ADMISSION_CLAIM_GET_RETRY_WAIT",
        default_value = "50ms",
        value_parser = parse_duration
    )]
    pub claim_get_retry_wait: Duration,

    /// Total time to wait for a missing ResourceClaim before counting it as zero
    #[arg(
        long,
        env = "DRACPU_ADMISSION_CLAIM_GET_RETRY_TOTAL",
        default_value = "500ms",
        value_parser = parse_duration
    )]
    pub claim_get_retry_total: Duration,

    /// Upper bound for handling a single admission review
    #[arg(long, default_value = "8s", value_parser = parse_duration)]
    pub admission_timeout: Duration,

    /// Count the devices of already-allocated claims instead of rejecting them
    #[arg(long)]
    pub count_allocated_devices: bool,
}

impl Cli {
    /// Reject combinations the server cannot run with
    pub fn validate(&self) -> Result<(), WebhookError> {
        if self.driver_name.trim().is_empty() {
            return Err(WebhookError::Config("--driver-name must not be empty".into()));
        }
        if !self.healthz_path.starts_with('/') {
            return Err(WebhookError::Config(format!(
                "--healthz-path must start with '/', got {:?}",
                self.healthz_path
            )));
        }
        if self.healthz_path == VALIDATE_PATH {
            return Err(WebhookError::Config(format!(
                "--healthz-path must not be {VALIDATE_PATH}"
            )));
        }
        if self.admission_timeout.is_zero() {
            return Err(WebhookError::Config(
                "--admission-timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Claim resolver settings derived from the flags
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            driver_name: self.driver_name.clone(),
            retry: NotFoundRetry::new(self.claim_get_retry_wait, self.claim_get_retry_total),
            allocated_claims: if self.count_allocated_devices {
                AllocatedClaimPolicy::CountDevices
            } else {
                AllocatedClaimPolicy::Reject
            },
        }
    }
}

/// Parse a duration such as `50ms`, `1.5s`, `2m` or `1m30s`.
///
/// Accepted units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare
/// `0` is the only value allowed without a unit.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("invalid duration {input:?}"));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid duration {input:?}"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_nanos = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in duration {input:?}")),
            unit => return Err(format!("unknown unit {unit:?} in duration {input:?}")),
        };
        nanos += value * unit_nanos;
        rest = &rest[unit_len..];
    }

    if !nanos.is_finite() || nanos > u64::MAX as f64 {
        return Err(format!("duration {input:?} is out of range"));
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["dracpu-admission"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.bind_address, "0.0.0.0:9443".parse().unwrap());
        assert_eq!(cli.tls_cert_file, PathBuf::from("/etc/webhook/certs/tls.crt"));
        assert_eq!(cli.tls_private_key_file, PathBuf::from("/etc/webhook/certs/tls.key"));
        assert_eq!(cli.driver_name, DEFAULT_DRIVER_NAME);
        assert_eq!(cli.healthz_path, "/healthz");
        assert_eq!(cli.claim_get_retry_wait, Duration::from_millis(50));
        assert_eq!(cli.claim_get_retry_total, Duration::from_millis(500));
        assert_eq!(cli.admission_timeout, Duration::from_secs(8));
        assert!(!cli.count_allocated_devices);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_resolver_config_from_flags() {
        let cli = parse(&[
            "--driver-name",
            "cpu.example.com",
            "--claim-get-retry-wait",
            "10ms",
            "--claim-get-retry-total",
            "2s",
            "--count-allocated-devices",
        ]);
        let config = cli.resolver_config();
        assert_eq!(config.driver_name, "cpu.example.com");
        assert_eq!(
            config.retry,
            NotFoundRetry::new(Duration::from_millis(10), Duration::from_secs(2))
        );
        assert_eq!(config.allocated_claims, AllocatedClaimPolicy::CountDevices);
    }

    #[test]
    fn test_allocated_claims_rejected_by_default() {
        assert_eq!(
            parse(&[]).resolver_config().allocated_claims,
            AllocatedClaimPolicy::Reject
        );
    }

    #[test]
    fn test_invalid_duration_flag_is_rejected() {
        let result = Cli::try_parse_from(["dracpu-admission", "--admission-timeout", "soon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_paths() {
        let mut cli = parse(&[]);
        cli.healthz_path = "healthz".to_string();
        assert!(cli.validate().is_err());

        cli.healthz_path = VALIDATE_PATH.to_string();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_driver_and_zero_timeout() {
        let mut cli = parse(&[]);
        cli.driver_name = " ".to_string();
        assert!(cli.validate().is_err());

        let mut cli = parse(&["--admission-timeout", "0"]);
        assert!(cli.validate().is_err());
        cli.admission_timeout = Duration::from_secs(1);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("50ms"), Ok(Duration::from_millis(50)));
        assert_eq!(parse_duration("8s"), Ok(Duration::from_secs(8)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("250us"), Ok(Duration::from_micros(250)));
        assert_eq!(parse_duration("100ns"), Ok(Duration::from_nanos(100)));
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
    }

    #[test]
    fn test_parse_duration_fractions_and_compounds() {
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration(" 500ms "), Ok(Duration::from_millis(500)));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("50").is_err());
        assert!(parse_duration("ms").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("5 days").is_err());
        assert!(parse_duration("1..5s").is_err());
    }
}
