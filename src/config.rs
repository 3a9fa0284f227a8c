//! Dispatcher and client configuration.
//!
//! Both structs deserialize with defaults for missing fields, durations are
//! written in whole seconds:
//!
//! ```json
//! { "max_attempts": 5, "default_retry_wait": 10, "max_retry_wait": 60 }
//! ```

use anyhow::{Context, Result, bail};
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::response::ApiFailure;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(10);
pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(100);

/// Environment variable holding the bot token.
pub const TOKEN_ENV: &str = "BOT_TOKEN";
/// Environment variable overriding the API server URL.
pub const BASE_URL_ENV: &str = "BOT_API_URL";

/// Retry policy of the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on attempts, including the first one.
    pub max_attempts: u32,
    /// Wait used when a rate-limit failure carries no hint.
    #[serde(with = "secs")]
    pub default_retry_wait: Duration,
    /// Optional cap applied to server supplied hints.
    #[serde(with = "option_secs")]
    pub max_retry_wait: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            default_retry_wait: DEFAULT_RETRY_WAIT,
            max_retry_wait: None,
        }
    }
}

impl DispatchConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_default_retry_wait(mut self, wait: Duration) -> Self {
        self.default_retry_wait = wait;
        self
    }

    pub fn with_max_retry_wait(mut self, cap: Duration) -> Self {
        self.max_retry_wait = Some(cap);
        self
    }

    /// How long to back off after a rate-limit failure.
    pub fn retry_wait(&self, failure: &ApiFailure) -> Duration {
        let wait = failure.retry_after().unwrap_or(self.default_retry_wait);
        match self.max_retry_wait {
            Some(cap) => wait.min(cap),
            None => wait,
        }
    }
}

/// Connection settings of a bot client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Read from config files, never written back out.
    #[serde(skip_serializing)]
    pub token: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Route requests to the test environment of the API server.
    #[serde(default)]
    pub use_test_environment: bool,
    #[serde(default = "default_request_timeout", with = "secs")]
    pub request_timeout: Duration,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

impl ClientOptions {
    /// Creates options for `token`, which must look like `123456:secret`.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let options = Self {
            token: token.into(),
            base_url: default_base_url(),
            use_test_environment: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        };
        options.validate()?;
        Ok(options)
    }

    /// Reads [`TOKEN_ENV`] and, if set, [`BASE_URL_ENV`] from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup(TOKEN_ENV).with_context(|| format!("{} is not set", TOKEN_ENV))?;
        let mut options = Self::new(token)?;
        if let Some(base_url) = lookup(BASE_URL_ENV) {
            options.base_url = base_url;
        }
        Ok(options)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_test_environment(mut self, enabled: bool) -> Self {
        self.use_test_environment = enabled;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.bot_id().is_none() {
            bail!("Invalid bot token format. Expected '<bot id>:<secret>'.");
        }
        if self.base_url.trim().is_empty() {
            bail!("Base URL must not be empty.");
        }
        Ok(())
    }

    /// Numeric bot identifier, the part of the token before the colon.
    pub fn bot_id(&self) -> Option<i64> {
        let (id, secret) = self.token.split_once(':')?;
        if secret.is_empty() {
            return None;
        }
        id.parse().ok()
    }

    /// `{base_url}/bot{token}`, with `/test` appended for the test environment.
    pub fn base_request_url(&self) -> String {
        let mut url = format!("{}/bot{}", self.base_url.trim_end_matches('/'), self.token);
        if self.use_test_environment {
            url.push_str("/test");
        }
        url
    }

    /// Builds the pooled HTTP client used by the transport.
    pub fn build_http_client(&self) -> Result<Client> {
        debug!("Using bot token {}", mask_token(&self.token));

        let client = Client::builder()
            .user_agent(concat!("botdispatch/", env!("CARGO_PKG_VERSION")))
            .timeout(self.request_timeout)
            .build()?;
        Ok(client)
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("token", &mask_token(&self.token))
            .field("base_url", &self.base_url)
            .field("use_test_environment", &self.use_test_environment)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Keeps the bot id readable and hides the secret.
pub(crate) fn mask_token(token: &str) -> String {
    match token.split_once(':') {
        Some((id, secret)) if secret.chars().count() > 4 => {
            let tail: String = secret
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("{}:*********{}", id, tail)
        }
        _ => "*********".to_string(),
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod option_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|secs| secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TOKEN: &str = "123456:ABC-DEF1234ghIkl";

    #[test]
    fn test_dispatch_config_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.default_retry_wait, Duration::from_secs(10));
        assert_eq!(config.max_retry_wait, None);
    }

    #[test]
    fn test_dispatch_config_from_partial_json() {
        let config: DispatchConfig = serde_json::from_str(r#"{"max_attempts": 3}"#).unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.default_retry_wait, DEFAULT_RETRY_WAIT);

        let config: DispatchConfig = serde_json::from_str(
            r#"{"max_attempts": 2, "default_retry_wait": 4, "max_retry_wait": 30}"#,
        )
        .unwrap();
        assert_eq!(config.default_retry_wait, Duration::from_secs(4));
        assert_eq!(config.max_retry_wait, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_dispatch_config_serializes_seconds() {
        let config = DispatchConfig::default().with_max_retry_wait(Duration::from_secs(60));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"max_attempts": 5, "default_retry_wait": 10, "max_retry_wait": 60})
        );
    }

    #[test]
    fn test_retry_wait_uses_hint_then_default() {
        let config = DispatchConfig::default();

        let hinted = ApiFailure::new(429, "Too Many Requests").with_retry_after(3);
        assert_eq!(config.retry_wait(&hinted), Duration::from_secs(3));

        let bare = ApiFailure::new(429, "Too Many Requests");
        assert_eq!(config.retry_wait(&bare), Duration::from_secs(10));

        let config = config.with_default_retry_wait(Duration::from_secs(1));
        assert_eq!(config.retry_wait(&bare), Duration::from_secs(1));
    }

    #[test]
    fn test_retry_wait_is_capped() {
        let config = DispatchConfig::default().with_max_retry_wait(Duration::from_secs(30));
        let hinted = ApiFailure::new(429, "Too Many Requests").with_retry_after(3600);
        assert_eq!(config.retry_wait(&hinted), Duration::from_secs(30));
    }

    #[test]
    fn test_client_options_base_request_url() {
        let options = ClientOptions::new(TOKEN).unwrap();
        assert_eq!(
            options.base_request_url(),
            format!("https://api.telegram.org/bot{}", TOKEN)
        );

        let options = options
            .with_base_url("http://localhost:8081/")
            .with_test_environment(true);
        assert_eq!(
            options.base_request_url(),
            format!("http://localhost:8081/bot{}/test", TOKEN)
        );
    }

    #[test]
    fn test_client_options_bot_id() {
        let options = ClientOptions::new(TOKEN).unwrap();
        assert_eq!(options.bot_id(), Some(123456));
    }

    #[test]
    fn test_client_options_rejects_bad_tokens() {
        assert!(ClientOptions::new("no-colon").is_err());
        assert!(ClientOptions::new("abc:secret").is_err());
        assert!(ClientOptions::new("123:").is_err());
        assert!(ClientOptions::new("").is_err());
    }

    #[test]
    fn test_client_options_rejects_empty_base_url() {
        let options = ClientOptions::new(TOKEN).unwrap().with_base_url("  ");
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_client_options_from_vars() {
        let vars: HashMap<&str, &str> =
            HashMap::from([(TOKEN_ENV, TOKEN), (BASE_URL_ENV, "http://127.0.0.1:9000")]);

        let options = ClientOptions::from_vars(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(options.token, TOKEN);
        assert_eq!(options.base_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn test_client_options_from_vars_requires_token() {
        let result = ClientOptions::from_vars(|_| None);
        let err = result.unwrap_err();
        assert!(err.to_string().contains(TOKEN_ENV));
    }

    #[test]
    fn test_client_options_deserialize_defaults() {
        let options: ClientOptions =
            serde_json::from_str(&format!(r#"{{"token": "{}"}}"#, TOKEN)).unwrap();
        assert_eq!(options.base_url, DEFAULT_BASE_URL);
        assert!(!options.use_test_environment);
        assert_eq!(options.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_client_options_serialize_omits_token() {
        let options = ClientOptions::new(TOKEN).unwrap();
        let json = serde_json::to_value(&options).unwrap();

        assert!(json.get("token").is_none());
        assert!(!json.to_string().contains(TOKEN));
        assert_eq!(json["base_url"], DEFAULT_BASE_URL);
    }

    #[test]
    fn test_debug_masks_token() {
        let options = ClientOptions::new(TOKEN).unwrap();
        let printed = format!("{:?}", options);
        assert!(!printed.contains("ABC-DEF1234ghIkl"));
        assert!(printed.contains("123456:*********hIkl"));
    }

    #[test]
    fn test_mask_token_short_secret() {
        assert_eq!(mask_token("1:abc"), "*********");
        assert_eq!(mask_token("garbage"), "*********");
    }

    #[test]
    fn test_build_http_client() {
        let options = ClientOptions::new(TOKEN)
            .unwrap()
            .with_request_timeout(Duration::from_secs(5));
        assert!(options.build_http_client().is_ok());
    }
}
