use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::Algorithm;

use super::jwks::DEFAULT_REFRESH_INTERVAL;
use crate::jwt::{Clock, system_clock};

/// Timeout for discovery and JWKS requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration of an [`OidcAuthenticator`](super::OidcAuthenticator).
#[derive(Clone)]
pub struct OidcOptions {
    pub(crate) issuer_url: String,
    pub(crate) audience: String,
    pub(crate) signing_method: Algorithm,
    pub(crate) refresh_interval: Duration,
    pub(crate) http_timeout: Duration,
    pub(crate) leeway: Duration,
    pub(crate) clock: Clock,
}

impl OidcOptions {
    /// `issuer_url` must equal the `iss` of accepted tokens; `audience` must
    /// be one of their `aud` values.
    pub fn new(issuer_url: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            audience: audience.into(),
            signing_method: Algorithm::RS256,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            leeway: Duration::ZERO,
            clock: system_clock(),
        }
    }

    pub fn with_signing_method(mut self, alg: Algorithm) -> Self {
        self.signing_method = alg;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }
}
