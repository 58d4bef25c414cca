//! Error types for claim resolution
//!
//! [`Error`] covers failures talking to the claim store. [`ClaimError`] is what
//! a claim CPU count resolves to when it cannot produce a number; callers
//! branch on its variants instead of matching message text.

use thiserror::Error;

use crate::context::ContextDone;

/// Claim store error
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Store failure with the operation that produced it
    #[error("store error [{context}]: {message}")]
    Store {
        /// Description of what failed
        message: String,
        /// Operation that failed (e.g., "get_claim", "device_capacities")
        context: String,
    },
}

impl Error {
    /// Create a store error for the given operation
    pub fn store_for(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Store {
            message: msg.into(),
            context: context.into(),
        }
    }
}

/// Why a claim could not be turned into a CPU count
#[derive(Debug, Error)]
pub enum ClaimError {
    /// The claim is already allocated and cannot be counted for another Pod
    #[error("resourceclaim already allocated")]
    AlreadyAllocated,

    /// The claim store failed; never retried
    #[error(transparent)]
    Store(#[from] Error),

    /// The request was cancelled while resolving the claim
    #[error("context canceled")]
    Cancelled,

    /// The request deadline passed while resolving the claim
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl From<ContextDone> for ClaimError {
    fn from(done: ContextDone) -> Self {
        match done {
            ContextDone::Cancelled => Self::Cancelled,
            ContextDone::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}
