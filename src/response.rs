//! Decoding of raw HTTP responses into typed results or API failures.
//!
//! The remote API wraps every answer in an envelope:
//!
//! - HTTP 200: `{ "ok": true, "result": ... }`
//! - anything else: `{ "error_code": 429, "description": "...", "parameters": { "retry_after": 5 } }`
//!
//! Both envelopes pass a validation guard before they are accepted. An envelope
//! that fails its guard is a [`ProtocolViolation`], never an [`ApiFailure`].

use log::debug;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::transport::RawResponse;

/// Error code the remote side uses to ask callers to slow down.
pub const RATE_LIMIT_CODE: i32 = 429;

/// Structured hints attached to an error envelope.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseParameters {
    /// The group has been migrated to a supergroup with this identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrate_to_chat_id: Option<i64>,
    /// Seconds to wait before the request can be repeated.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_seconds"
    )]
    pub retry_after: Option<u64>,
}

/// Accepts any JSON number. Fractions round up, negatives clamp to zero.
fn lenient_seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    let hint = Option::<f64>::deserialize(deserializer)?;
    Ok(hint.map(|secs| {
        if secs.is_finite() && secs > 0.0 {
            secs.ceil() as u64
        } else {
            0
        }
    }))
}

/// A logical failure reported by the remote endpoint over a successful exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("API error {code}: {description}")]
pub struct ApiFailure {
    pub code: i32,
    pub description: String,
    pub parameters: Option<ResponseParameters>,
}

impl ApiFailure {
    pub fn new(code: i32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            parameters: None,
        }
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.parameters.get_or_insert_with(Default::default).retry_after = Some(seconds);
        self
    }

    pub fn is_rate_limited(&self) -> bool {
        self.code == RATE_LIMIT_CODE
    }

    /// Server supplied wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        self.parameters
            .as_ref()
            .and_then(|p| p.retry_after)
            .map(Duration::from_secs)
    }

    pub fn migrate_to_chat_id(&self) -> Option<i64> {
        self.parameters.as_ref().and_then(|p| p.migrate_to_chat_id)
    }
}

/// The remote side answered with a structurally invalid envelope.
#[derive(Error, Debug)]
pub enum ProtocolViolation {
    #[error("required properties not found in error response (HTTP {status})")]
    MalformedError { status: u16 },

    #[error("required properties not found in response")]
    MalformedSuccess,

    #[error("failed to decode response body (HTTP {status})")]
    Undecodable {
        status: u16,
        #[source]
        source: serde_json::Error,
    },
}

/// Why a response could not be turned into a success value.
#[derive(Error, Debug)]
pub enum Rejection {
    #[error(transparent)]
    Api(#[from] ApiFailure),
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    #[serde(default)]
    error_code: i32,
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Deserialize, Debug)]
struct SuccessEnvelope<T> {
    #[serde(default)]
    ok: bool,
    result: Option<T>,
}

/// Classifies a raw response as a typed success value or a rejection.
///
/// Consumes nothing but the given body; calls are independent of each other.
pub fn interpret<T: DeserializeOwned>(response: &RawResponse) -> Result<T, Rejection> {
    let status = response.status;

    if status != StatusCode::OK {
        let envelope: ErrorEnvelope = decode(response)?;

        let description = match envelope.description {
            Some(description) if envelope.error_code != 0 => description,
            _ => {
                debug!("Rejecting malformed error envelope (HTTP {})", status);
                return Err(ProtocolViolation::MalformedError {
                    status: status.as_u16(),
                }
                .into());
            }
        };

        return Err(ApiFailure {
            code: envelope.error_code,
            description,
            parameters: envelope.parameters,
        }
        .into());
    }

    let envelope: SuccessEnvelope<T> = decode(response)?;
    match envelope.result {
        Some(result) if envelope.ok => Ok(result),
        _ => {
            debug!("Rejecting success envelope without ok/result");
            Err(ProtocolViolation::MalformedSuccess.into())
        }
    }
}

fn decode<E: DeserializeOwned>(response: &RawResponse) -> Result<E, ProtocolViolation> {
    serde_json::from_slice(&response.body).map_err(|source| ProtocolViolation::Undecodable {
        status: response.status.as_u16(),
        source,
    })
}
