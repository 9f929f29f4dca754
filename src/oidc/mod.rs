//! OIDC relying-party authenticator.
//!
//! Keys come from the issuer's JWKS, located through discovery at
//! construction time and refreshed in the background. Issuer and audience are
//! checked only once the signature is trusted.

pub mod discovery;
pub mod id_token;
pub mod jwks;
#[cfg(test)]
pub(crate) mod mock_server;
mod options;

pub use discovery::{ProviderConfig, SUPPORTED_ALGORITHMS, discover};
pub use id_token::IdToken;
pub use jwks::{DEFAULT_REFRESH_INTERVAL, JwksError, KeySet, MAX_REFRESH_INTERVAL, RemoteKeySet};
pub use options::{DEFAULT_HTTP_TIMEOUT, OidcOptions};

use std::sync::Arc;

use jsonwebtoken::Header;
use tracing::{debug, info, warn};

use crate::claims::AuthClaims;
use crate::engine::Authenticator;
use crate::error::{AuthError, AuthResult};
use crate::jwt::{ValidityWindow, decode_header, verify_signature};

pub struct OidcAuthenticator {
    options: OidcOptions,
    provider: ProviderConfig,
    key_set: Arc<dyn KeySet>,
    window: ValidityWindow,
}

impl OidcAuthenticator {
    /// Discover the issuer, fetch its keys and start background refresh.
    pub async fn new(options: OidcOptions) -> AuthResult<Self> {
        validate_options(&options)?;

        let client = reqwest::Client::builder()
            .timeout(options.http_timeout)
            .build()
            .map_err(|e| AuthError::Discovery(format!("error building HTTP client: {}", e)))?;

        let provider = discover(&client, &options.issuer_url).await?;
        let key_set = RemoteKeySet::fetch(&client, &provider.jwks_url)
            .await
            .map_err(|e| {
                AuthError::Discovery(format!("error fetching keys from {}: {}", provider.jwks_url, e))
            })?;
        key_set.start_refresh(client, options.refresh_interval);

        info!(
            "OIDC authenticator ready for {} ({} keys)",
            provider.issuer,
            key_set.key_count()
        );
        Self::from_parts(options, provider, Arc::new(key_set))
    }

    /// Build from an already-resolved provider and key set.
    pub fn from_parts(
        options: OidcOptions,
        provider: ProviderConfig,
        key_set: Arc<dyn KeySet>,
    ) -> AuthResult<Self> {
        validate_options(&options)?;
        let window = ValidityWindow::new(options.leeway, options.clock.clone())?;
        Ok(Self {
            options,
            provider,
            key_set,
            window,
        })
    }

    pub fn provider_config(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn jwks_uri(&self) -> &str {
        &self.provider.jwks_url
    }

    /// Verify an ID token and expose its OpenID Connect fields.
    pub fn verify_id_token(&self, raw: &str) -> AuthResult<IdToken> {
        let (header, claims) = self.verify(raw)?;
        IdToken::from_claims(claims, header.alg)
    }

    fn verify(&self, token: &str) -> AuthResult<(Header, AuthClaims)> {
        let header = decode_header(token)?;
        if header.alg != self.options.signing_method {
            warn!(
                "Rejected ID token signed with {:?}, expected {:?}",
                header.alg, self.options.signing_method
            );
            return Err(AuthError::UnsupportedSigningMethod);
        }

        let key = self.key_set.key(header.kid.as_deref()).ok_or_else(|| {
            warn!("No JWKS key for kid {:?}", header.kid);
            AuthError::GetKeyFailed
        })?;
        let payload = verify_signature(token, &header, &key)?;

        let claims = AuthClaims::from_payload(&payload)?;
        self.window.check(&claims)?;

        if claims.issuer() != Some(self.options.issuer_url.as_str()) {
            return Err(AuthError::InvalidIssuer);
        }
        if !claims.audience().contains(&self.options.audience.as_str()) {
            return Err(AuthError::InvalidAudience);
        }

        debug!("ID token verified for subject: {:?}", claims.subject());
        Ok((header, claims))
    }
}

fn validate_options(options: &OidcOptions) -> AuthResult<()> {
    url::Url::parse(&options.issuer_url).map_err(|e| {
        AuthError::InvalidConfiguration(format!(
            "invalid OIDC issuer URL `{}`: {}",
            options.issuer_url, e
        ))
    })?;
    if options.refresh_interval.is_zero() || options.refresh_interval > MAX_REFRESH_INTERVAL {
        return Err(AuthError::InvalidConfiguration(format!(
            "JWKS refresh interval must be between 1ns and {}s",
            MAX_REFRESH_INTERVAL.as_secs()
        )));
    }
    if !SUPPORTED_ALGORITHMS.contains(&options.signing_method) {
        return Err(AuthError::InvalidConfiguration(format!(
            "unsupported OIDC signing method {:?}",
            options.signing_method
        )));
    }
    Ok(())
}

impl Authenticator for OidcAuthenticator {
    fn authenticate_token(&self, token: &str) -> AuthResult<AuthClaims> {
        self.verify(token).map(|(_, claims)| claims)
    }

    /// A relying party holds no signing key.
    fn create_identity(&self, _claims: &AuthClaims) -> AuthResult<String> {
        Err(AuthError::MissingKeyFunc)
    }

    fn close(&self) {
        self.key_set.close();
    }
}
