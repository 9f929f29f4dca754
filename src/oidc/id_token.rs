//! Verified OpenID Connect ID tokens.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::Algorithm;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::claims::AuthClaims;
use crate::error::{AuthError, AuthResult};

/// Claim carrying the access token hash.
pub const AT_HASH: &str = "at_hash";
pub const NONCE: &str = "nonce";

/// The fields OpenID Connect requires of an ID token, plus the full claim set.
#[derive(Debug, Clone, PartialEq)]
pub struct IdToken {
    pub issuer: String,
    pub audience: Vec<String>,
    pub subject: String,
    pub expiry: Option<DateTime<Utc>>,
    pub issued_at: Option<DateTime<Utc>>,
    /// Not verified here; callers compare it with the nonce they sent.
    pub nonce: Option<String>,
    pub access_token_hash: Option<String>,
    pub signing_algorithm: Algorithm,
    pub claims: AuthClaims,
}

impl IdToken {
    pub(crate) fn from_claims(claims: AuthClaims, signing_algorithm: Algorithm) -> AuthResult<Self> {
        Ok(Self {
            issuer: claims.issuer().unwrap_or_default().to_string(),
            audience: claims.audience().into_iter().map(str::to_string).collect(),
            subject: claims.subject().unwrap_or_default().to_string(),
            expiry: claims.expiration_time(),
            issued_at: claims.issued_at(),
            nonce: claims.get_str(NONCE)?.map(str::to_string),
            access_token_hash: claims.get_str(AT_HASH)?.map(str::to_string),
            signing_algorithm,
            claims,
        })
    }

    /// Check that `access_token` matches the `at_hash` of this ID token.
    pub fn verify_access_token(&self, access_token: &str) -> AuthResult<()> {
        let expected = self
            .access_token_hash
            .as_deref()
            .filter(|hash| !hash.is_empty())
            .ok_or(AuthError::NoAtHash)?;

        if access_token_hash(self.signing_algorithm, access_token)? != expected {
            return Err(AuthError::InvalidAtHash);
        }
        Ok(())
    }
}

/// Left half of the algorithm-selected digest of `access_token`, base64url
/// encoded without padding.
pub fn access_token_hash(alg: Algorithm, access_token: &str) -> AuthResult<String> {
    let digest = match alg {
        Algorithm::RS256 | Algorithm::ES256 | Algorithm::PS256 => {
            Sha256::digest(access_token.as_bytes()).to_vec()
        }
        Algorithm::RS384 | Algorithm::ES384 | Algorithm::PS384 => {
            Sha384::digest(access_token.as_bytes()).to_vec()
        }
        Algorithm::RS512 | Algorithm::PS512 => Sha512::digest(access_token.as_bytes()).to_vec(),
        _ => return Err(AuthError::UnsupportedSigningMethod),
    };
    Ok(URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2]))
}
