use thiserror::Error;

/// Error taxonomy shared across the core. Variants map 1:1 onto the
/// propagation policy: a `TransientExternal` is retried by its caller, an
/// `InvalidExternalResponse` is counted as a provider failure, a
/// `PolicyRejection` ends the cycle without a retry, and so on.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("transient failure calling {target}: {reason}")]
    TransientExternal { target: String, reason: String },

    #[error("invalid response from {target}: {reason}")]
    InvalidExternalResponse { target: String, reason: String },

    #[error("policy rejected: {reason}")]
    PolicyRejection { reason: String },

    #[error("circuit open for {target}")]
    CircuitOpen { target: String },

    #[error("data integrity violation: {reason}")]
    DataIntegrity { reason: String },

    #[error("replay timestamp unparseable: {raw}")]
    ReplayTimestampError { raw: String },

    #[error("fatal: {reason}")]
    Fatal { reason: String },
}

impl CoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::TransientExternal { .. })
    }
}
