//! Error types for the webhook server

use thiserror::Error;

/// Webhook process error
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Invalid command-line or environment configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// TLS certificate or key could not be loaded
    #[error("TLS config error: {0}")]
    Tls(String),

    /// Kubernetes client construction failed
    #[error("kubernetes client error [{context}]: {message}")]
    Client {
        /// Description of what failed
        message: String,
        /// Step that failed (e.g., "read_kubeconfig", "infer_config")
        context: String,
    },

    /// The HTTPS server stopped with an error
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

impl WebhookError {
    /// Create a client error for the given step
    pub fn client(context: impl Into<String>, msg: impl std::fmt::Display) -> Self {
        Self::Client {
            message: msg.to_string(),
            context: context.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_carries_context() {
        let err = WebhookError::client("read_kubeconfig", "no such file");
        assert_eq!(
            err.to_string(),
            "kubernetes client error [read_kubeconfig]: no such file"
        );
    }

    #[test]
    fn io_errors_convert_to_server_errors() {
        let err: WebhookError =
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use").into();
        assert!(matches!(err, WebhookError::Server(_)));
        assert!(err.to_string().contains("address in use"));
    }
}
