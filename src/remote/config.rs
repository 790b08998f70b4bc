//! Connection settings for the HTTP remote.

use std::time::Duration;

/// Where and how to reach the remote collaborators.
///
/// Built explicitly or resolved from the environment. `WEFTRUN_BASE_URL`
/// names the remote root and `WEFTRUN_AUTH_TOKEN`, when present, is sent
/// as a bearer token on every request. A `.env` file is honored for local
/// development.
#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
}

impl RemoteConfig {
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:8080";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            request_timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Resolve settings from the process environment, falling back to the
    /// local-development defaults.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let base_url = std::env::var("WEFTRUN_BASE_URL")
            .unwrap_or_else(|_| Self::DEFAULT_BASE_URL.to_string());
        let auth_token = std::env::var("WEFTRUN_AUTH_TOKEN").ok();
        Self {
            base_url,
            auth_token,
            request_timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_URL)
    }
}
