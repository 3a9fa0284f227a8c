//! Single HTTP exchange abstraction.
//!
//! A [`Transport`] performs exactly one network exchange per call and never
//! retries. Retry decisions live in [`crate::retry`].

mod http;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, StatusCode};
use thiserror::Error;

use crate::cancel::CancellationSignal;
use crate::request::MaterializedContent;

pub use self::http::HttpTransport;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A failure below the API layer. Never retried.
#[derive(Error, Debug)]
pub enum TransportFailure {
    /// The exchange exceeded its deadline without the caller asking to stop.
    #[error("Request timed out")]
    Timeout {
        #[source]
        source: BoxError,
    },

    /// The caller requested cancellation.
    #[error("Request cancelled")]
    Cancelled,

    #[error("Exception during making request: {source}")]
    ConnectionError {
        #[source]
        source: BoxError,
    },
}

impl TransportFailure {
    pub fn timeout(source: impl Into<BoxError>) -> Self {
        TransportFailure::Timeout {
            source: source.into(),
        }
    }

    pub fn connection(source: impl Into<BoxError>) -> Self {
        TransportFailure::ConnectionError {
            source: source.into(),
        }
    }
}

/// A fully read HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `payload` to `url` once.
    ///
    /// Must return [`TransportFailure::Cancelled`] if `cancel` fires before the
    /// response has been read.
    async fn send(
        &self,
        url: &str,
        method: Method,
        payload: &MaterializedContent,
        cancel: &CancellationSignal,
    ) -> Result<RawResponse, TransportFailure>;
}
