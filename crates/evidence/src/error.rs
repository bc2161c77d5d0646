//! Evidence Error Types

use thiserror::Error;

/// Errors raised by a single evidence source.
///
/// All of them mean "this provider is unavailable for this cycle"; callers
/// degrade the affected input to absent data.
#[derive(Debug, Error)]
pub enum EvidenceError {
    /// Transport failure (DNS, connect, TLS, body read)
    #[error("Request to {source_name} failed: {message}")]
    Transport {
        source_name: &'static str,
        message: String,
    },

    /// Non-success HTTP status after retries were exhausted
    #[error("{source_name} returned HTTP {status}")]
    Status { source_name: &'static str, status: u16 },

    /// Response body did not have the expected shape
    #[error("Invalid response from {source_name}: {message}")]
    InvalidResponse {
        source_name: &'static str,
        message: String,
    },

    /// Provider did not answer in time
    #[error("{0} timed out after {1}ms")]
    Timeout(&'static str, u64),
}

impl EvidenceError {
    /// Name of the source that failed.
    pub fn source_name(&self) -> &'static str {
        match self {
            EvidenceError::Transport { source_name, .. }
            | EvidenceError::Status { source_name, .. }
            | EvidenceError::InvalidResponse { source_name, .. } => source_name,
            EvidenceError::Timeout(source_name, _) => source_name,
        }
    }
}
