//! Retry coordination for rate-limited API calls.
//!
//! A dispatch call materializes its payload once, then runs attempts strictly
//! one after another. Only rate-limit failures (code 429) are retried, after
//! the server's `retry_after` hint or the configured default wait. Everything
//! else ends the call on the spot.

use log::{debug, warn};
use serde::de::DeserializeOwned;

use crate::cancel::CancellationSignal;
use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::request::{ApiRequest, ContentCache};
use crate::response::{ApiFailure, ProtocolViolation, Rejection, interpret};
use crate::transport::{RawResponse, Transport, TransportFailure};

/// Result of a single attempt.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    ApiError(ApiFailure),
    ProtocolError(ProtocolViolation),
    TransportError(TransportFailure),
}

impl<T: DeserializeOwned> AttemptOutcome<T> {
    /// Classifies what the transport returned for one attempt.
    pub fn from_exchange(exchange: Result<RawResponse, TransportFailure>) -> Self {
        let response = match exchange {
            Ok(response) => response,
            Err(failure) => return AttemptOutcome::TransportError(failure),
        };

        match interpret(&response) {
            Ok(value) => AttemptOutcome::Success(value),
            Err(Rejection::Api(failure)) => AttemptOutcome::ApiError(failure),
            Err(Rejection::Protocol(violation)) => AttemptOutcome::ProtocolError(violation),
        }
    }
}

/// Bookkeeping of one dispatch call, dropped when the call returns.
#[derive(Debug, Default)]
pub struct RetryState {
    pub attempts: u32,
    pub last_failure: Option<ApiFailure>,
}

impl RetryState {
    fn into_exhausted(self) -> DispatchError {
        match self.last_failure {
            Some(last) => DispatchError::ExhaustedRetries {
                attempts: self.attempts,
                last,
            },
            None => DispatchError::InvalidRetryCount,
        }
    }
}

/// Runs dispatch calls through a [`Transport`] with rate-limit retries.
pub struct RetryCoordinator<T> {
    transport: T,
    config: DispatchConfig,
}

impl<T: Transport> RetryCoordinator<T> {
    pub fn new(transport: T, config: DispatchConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends `request` to `url`, retrying while the server rate limits us.
    ///
    /// The payload is materialized before the first attempt and reused for
    /// every retry. `cancel` is honored during each exchange and each backoff.
    #[tracing::instrument(skip_all, fields(method = request.method_name()))]
    pub async fn dispatch<R: ApiRequest + ?Sized>(
        &self,
        url: &str,
        request: &R,
        cancel: &CancellationSignal,
    ) -> Result<R::Response, DispatchError> {
        let max_attempts = self.config.max_attempts;
        if max_attempts == 0 {
            return Err(DispatchError::InvalidRetryCount);
        }
        if cancel.is_cancelled() {
            return Err(TransportFailure::Cancelled.into());
        }

        let content = ContentCache::new(request);
        let payload = content.get().await?;
        let method_name = request.method_name();
        let mut state = RetryState::default();

        while state.attempts < max_attempts {
            state.attempts += 1;
            debug!(
                "{}: sending attempt {}/{}",
                method_name, state.attempts, max_attempts
            );

            let exchange = self
                .transport
                .send(url, request.http_method(), payload, cancel)
                .await;

            let failure = match AttemptOutcome::from_exchange(exchange) {
                AttemptOutcome::Success(value) => return Ok(value),
                AttemptOutcome::ApiError(failure) if failure.is_rate_limited() => failure,
                AttemptOutcome::ApiError(failure) => {
                    debug!("{}: non-retryable error: {}", method_name, failure);
                    return Err(failure.into());
                }
                AttemptOutcome::ProtocolError(violation) => return Err(violation.into()),
                AttemptOutcome::TransportError(failure) => return Err(failure.into()),
            };

            let wait = self.config.retry_wait(&failure);
            state.last_failure = Some(failure);
            if state.attempts == max_attempts {
                break;
            }

            warn!(
                "{}: rate limited on attempt {}/{}, retrying in {:?}...",
                method_name, state.attempts, max_attempts, wait
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("{}: cancelled during backoff", method_name);
                    return Err(TransportFailure::Cancelled.into());
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        warn!(
            "{}: still rate limited after {} attempts, giving up",
            method_name, state.attempts
        );
        Err(state.into_exhausted())
    }
}
