//! Options for the JWT authenticator.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};

use crate::error::{AuthError, AuthResult};

/// Resolves the key for a token from its header (e.g. by `kid`).
pub type KeyFunc = Arc<dyn Fn(&Header) -> anyhow::Result<JwtKey> + Send + Sync>;

/// Source of the current time used for `exp`/`nbf` checks.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub(crate) fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Key material for one signing algorithm family.
///
/// The encoding half is optional: verify-only keys cannot issue tokens.
#[derive(Clone)]
pub struct JwtKey {
    encoding: Option<EncodingKey>,
    decoding: DecodingKey,
}

impl JwtKey {
    /// Symmetric secret for the HS family.
    pub fn secret(secret: &[u8]) -> Self {
        Self {
            encoding: Some(EncodingKey::from_secret(secret)),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// RSA key pair (RS and PS families) from PEM.
    pub fn rsa_pem(private_pem: &[u8], public_pem: &[u8]) -> AuthResult<Self> {
        let encoding = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| AuthError::InvalidConfiguration(format!("invalid RSA private key: {}", e)))?;
        let decoding = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| AuthError::InvalidConfiguration(format!("invalid RSA public key: {}", e)))?;
        Ok(Self {
            encoding: Some(encoding),
            decoding,
        })
    }

    /// EC key pair (ES family) from PEM.
    pub fn ec_pem(private_pem: &[u8], public_pem: &[u8]) -> AuthResult<Self> {
        let encoding = EncodingKey::from_ec_pem(private_pem)
            .map_err(|e| AuthError::InvalidConfiguration(format!("invalid EC private key: {}", e)))?;
        let decoding = DecodingKey::from_ec_pem(public_pem)
            .map_err(|e| AuthError::InvalidConfiguration(format!("invalid EC public key: {}", e)))?;
        Ok(Self {
            encoding: Some(encoding),
            decoding,
        })
    }

    pub fn verify_only(decoding: DecodingKey) -> Self {
        Self {
            encoding: None,
            decoding,
        }
    }

    pub fn encoding_key(&self) -> Option<&EncodingKey> {
        self.encoding.as_ref()
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

/// Immutable configuration of a [`JwtAuthenticator`](super::JwtAuthenticator).
#[derive(Clone)]
pub struct JwtOptions {
    pub(crate) signing_method: Algorithm,
    pub(crate) key_func: Option<KeyFunc>,
    pub(crate) key_id: Option<String>,
    pub(crate) leeway: Duration,
    pub(crate) clock: Clock,
}

impl Default for JwtOptions {
    fn default() -> Self {
        Self {
            signing_method: Algorithm::HS256,
            key_func: None,
            key_id: None,
            leeway: Duration::ZERO,
            clock: system_clock(),
        }
    }
}

impl JwtOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expected (and issuing) algorithm. Defaults to HS256.
    pub fn with_signing_method(mut self, alg: Algorithm) -> Self {
        self.signing_method = alg;
        self
    }

    /// Constant symmetric secret.
    pub fn with_key(self, key: impl AsRef<[u8]>) -> Self {
        self.with_jwt_key(JwtKey::secret(key.as_ref()))
    }

    /// Constant key material of any family.
    pub fn with_jwt_key(mut self, key: JwtKey) -> Self {
        self.key_func = Some(Arc::new(move |_: &Header| Ok(key.clone())));
        self
    }

    /// Custom key resolver.
    pub fn with_key_func<F>(mut self, key_func: F) -> Self
    where
        F: Fn(&Header) -> anyhow::Result<JwtKey> + Send + Sync + 'static,
    {
        self.key_func = Some(Arc::new(key_func));
        self
    }

    /// `kid` written into issued token headers.
    pub fn with_key_id(mut self, kid: impl Into<String>) -> Self {
        self.key_id = Some(kid.into());
        self
    }

    /// Clock skew tolerated on `exp` and `nbf`.
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
}
