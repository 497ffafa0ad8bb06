use std::time::Duration;

use url::Url;

use crate::error::Error;

const DEFAULT_BASE_URL: &str = "http://localhost:3001/api/v1";

/// Backend client configuration.
///
/// Required field (`base_url`) is a constructor parameter. Everything else
/// has a default and a `with_*` override.
///
/// ```rust,ignore
/// use sociamatic_auth::ClientConfig;
///
/// let config = ClientConfig::new("https://crm.example.com/api/v1".parse()?)
///     .with_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) base_url: Url,
    pub(crate) timeout: Duration,
    pub(crate) refresh_path: String,
    pub(crate) expiry_redirect_delay: Duration,
    pub(crate) dev_login_enabled: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL.parse().expect("valid default URL"))
    }
}

impl ClientConfig {
    /// Create a configuration for the given API base URL.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(10),
            refresh_path: "/auth/refresh".into(),
            expiry_redirect_delay: Duration::from_secs(1),
            dev_login_enabled: false,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Optional env vars
    /// - `SOCIAMATIC_API_URL`: API base URL (default `http://localhost:3001/api/v1`)
    /// - `SOCIAMATIC_API_TIMEOUT_SECS`: request timeout in seconds (default 10)
    /// - `SOCIAMATIC_REFRESH_PATH`: token refresh endpoint (default `/auth/refresh`)
    /// - `DEV_AUTH`: `"1"` or `"true"` enables the development test account
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = match std::env::var("SOCIAMATIC_API_URL") {
            Ok(s) => Self::new(
                s.parse()
                    .map_err(|e| Error::Config(format!("SOCIAMATIC_API_URL: {e}")))?,
            ),
            Err(_) => Self::default(),
        };

        if let Ok(secs) = std::env::var("SOCIAMATIC_API_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("SOCIAMATIC_API_TIMEOUT_SECS: {e}")))?;
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Ok(path) = std::env::var("SOCIAMATIC_REFRESH_PATH") {
            config = config.with_refresh_path(path);
        }

        let dev_auth = matches!(std::env::var("DEV_AUTH").as_deref(), Ok("1" | "true"));

        Ok(config.with_dev_login_enabled(dev_auth))
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    /// Delay before navigating to the login view after a session expires.
    #[must_use]
    pub fn with_expiry_redirect_delay(mut self, delay: Duration) -> Self {
        self.expiry_redirect_delay = delay;
        self
    }

    /// Enable the fixed `test@example.com` development account.
    #[must_use]
    pub fn with_dev_login_enabled(mut self, enabled: bool) -> Self {
        self.dev_login_enabled = enabled;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn refresh_path(&self) -> &str {
        &self.refresh_path
    }

    #[must_use]
    pub fn expiry_redirect_delay(&self) -> Duration {
        self.expiry_redirect_delay
    }

    #[must_use]
    pub fn dev_login_enabled(&self) -> bool {
        self.dev_login_enabled
    }

    /// Join an API path onto the base URL, keeping the base path prefix.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
            .parse()
            .map_err(|e| Error::Config(format!("invalid endpoint {path}: {e}")))
    }
}
