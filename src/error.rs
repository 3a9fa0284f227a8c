//! Failure taxonomy of a dispatch call.

use thiserror::Error;

use crate::request::MaterializationError;
use crate::response::{ApiFailure, ProtocolViolation};
use crate::transport::TransportFailure;

/// The single typed failure a dispatch call can end with.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// `max_attempts` was zero, so no attempt could ever be made.
    #[error("Invalid retry count: max_attempts must be at least 1")]
    InvalidRetryCount,

    #[error(transparent)]
    Materialization(#[from] MaterializationError),

    #[error(transparent)]
    Transport(#[from] TransportFailure),

    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    /// A non-retryable failure reported by the remote endpoint.
    #[error(transparent)]
    Api(#[from] ApiFailure),

    /// Every attempt was rate limited; carries the last server response.
    #[error("Gave up after {attempts} rate-limited attempts: {last}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: ApiFailure,
    },
}

impl DispatchError {
    /// The server-reported failure, for both terminal and exhausted outcomes.
    pub fn api_failure(&self) -> Option<&ApiFailure> {
        match self {
            DispatchError::Api(failure) => Some(failure),
            DispatchError::ExhaustedRetries { last, .. } => Some(last),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DispatchError::Transport(TransportFailure::Cancelled))
    }
}
