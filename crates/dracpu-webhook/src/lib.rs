//! Validating admission webhook for the `dra.cpu` DRA driver
//!
//! Wires the checks of `dracpu_admission` to a Kubernetes API client and an
//! HTTPS server that answers AdmissionReview requests.
//!
//! # Modules
//!
//! - [`config`] - Command-line and environment configuration
//! - [`store`] - Kubernetes-backed claim store
//! - [`webhook`] - AdmissionReview handlers and router
//! - [`server`] - TLS listener, readiness and graceful shutdown
//! - [`telemetry`] - Structured logging setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod webhook;

pub use config::Cli;
pub use error::WebhookError;
