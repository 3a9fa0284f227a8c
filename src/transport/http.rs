//! reqwest-backed transport.

use async_trait::async_trait;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};

use super::{RawResponse, Transport, TransportFailure};
use crate::cancel::CancellationSignal;
use crate::request::MaterializedContent;

/// Transport performing real network exchanges through a pooled reqwest client.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a new transport wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Returns a reference to the underlying reqwest Client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    async fn exchange(
        &self,
        url: &str,
        method: Method,
        payload: &MaterializedContent,
    ) -> Result<RawResponse, reqwest::Error> {
        let mut request = self.client.request(method, url);
        if let Some(content_type) = payload.content_type() {
            request = request.header(CONTENT_TYPE, content_type);
        }
        if !payload.is_empty() {
            // Bytes clones share the buffer, the body is never rebuilt.
            request = request.body(payload.body().clone());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        debug!("Received HTTP {} ({} bytes)", status, body.len());

        Ok(RawResponse { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[tracing::instrument(skip_all, fields(method = %method, bytes = payload.len()))]
    async fn send(
        &self,
        url: &str,
        method: Method,
        payload: &MaterializedContent,
        cancel: &CancellationSignal,
    ) -> Result<RawResponse, TransportFailure> {
        if cancel.is_cancelled() {
            return Err(TransportFailure::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Request cancelled by caller");
                Err(TransportFailure::Cancelled)
            }
            result = self.exchange(url, method, payload) => result.map_err(classify_error),
        }
    }
}

/// Maps a reqwest error onto the transport failure taxonomy.
///
/// The request URL embeds the bot token, so it is stripped before the error
/// can reach a caller's logs.
fn classify_error(error: reqwest::Error) -> TransportFailure {
    let error = error.without_url();
    if error.is_timeout() {
        TransportFailure::timeout(error)
    } else {
        TransportFailure::connection(error)
    }
}
