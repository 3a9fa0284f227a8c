//! Bot API client composed from options, a transport and a retry coordinator.

use anyhow::Result;
use log::debug;

use crate::cancel::CancellationSignal;
use crate::config::{ClientOptions, DispatchConfig};
use crate::error::DispatchError;
use crate::request::ApiRequest;
use crate::retry::RetryCoordinator;
use crate::transport::{HttpTransport, Transport};

/// Sends [`ApiRequest`]s to `{base_request_url}/{method_name}`.
pub struct BotClient<T: Transport = HttpTransport> {
    options: ClientOptions,
    base_request_url: String,
    coordinator: RetryCoordinator<T>,
}

impl BotClient<HttpTransport> {
    /// Creates a client talking to the real API through reqwest.
    pub fn new(options: ClientOptions, config: DispatchConfig) -> Result<Self> {
        options.validate()?;
        let transport = HttpTransport::new(options.build_http_client()?);
        Ok(Self::with_transport(options, config, transport))
    }
}

impl<T: Transport> BotClient<T> {
    /// Creates a client on top of any transport implementation.
    pub fn with_transport(options: ClientOptions, config: DispatchConfig, transport: T) -> Self {
        let base_request_url = options.base_request_url();
        debug!(
            "Bot client for {:?} with up to {} attempts per request",
            options.bot_id(),
            config.max_attempts
        );
        Self {
            options,
            base_request_url,
            coordinator: RetryCoordinator::new(transport, config),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn config(&self) -> &DispatchConfig {
        self.coordinator.config()
    }

    pub fn transport(&self) -> &T {
        self.coordinator.transport()
    }

    pub fn request_url(&self, method_name: &str) -> String {
        format!("{}/{}", self.base_request_url, method_name)
    }

    /// Performs one dispatch call for `request`, including rate-limit retries.
    #[tracing::instrument(skip_all, fields(method = request.method_name()))]
    pub async fn make_request<R: ApiRequest + ?Sized>(
        &self,
        request: &R,
        cancel: &CancellationSignal,
    ) -> Result<R::Response, DispatchError> {
        let url = self.request_url(request.method_name());
        self.coordinator.dispatch(&url, request, cancel).await
    }
}
