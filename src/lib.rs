//! Resilient request dispatcher for bot API clients.
//!
//! Requests are retried while the server answers with rate-limit failures,
//! waiting for the server supplied `retry_after` hint between attempts. The
//! request payload is materialized once per call, so single-pass upload
//! streams survive any number of retries.

pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod request;
pub mod response;
pub mod retry;
pub mod transport;

pub use cancel::CancellationSignal;
pub use client::BotClient;
pub use config::{ClientOptions, DispatchConfig};
pub use error::DispatchError;
pub use request::{
    ApiRequest, ContentCache, InputFile, JsonRequest, MaterializationError, MaterializedContent,
    MultipartForm, MultipartRequest, RequestContent,
};
pub use response::{ApiFailure, ProtocolViolation, ResponseParameters};
pub use retry::RetryCoordinator;
pub use transport::{HttpTransport, RawResponse, Transport, TransportFailure};
