//! OpenID provider discovery (`/.well-known/openid-configuration`).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AuthError, AuthResult};

/// Provider metadata, see RFC 8414 section 2.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Must match the `iss` of issued tokens exactly.
    pub issuer: String,
    #[serde(rename = "authorization_endpoint")]
    pub auth_url: String,
    #[serde(rename = "token_endpoint")]
    pub token_url: String,
    #[serde(rename = "userinfo_endpoint")]
    pub user_info_url: String,
    #[serde(rename = "jwks_uri")]
    pub jwks_url: String,
    #[serde(rename = "revocation_endpoint")]
    pub revocation_url: String,
    #[serde(rename = "id_token_signing_alg_values_supported")]
    pub algorithms: Vec<String>,
}

/// Algorithms an OIDC relying party accepts for ID tokens.
pub const SUPPORTED_ALGORITHMS: [jsonwebtoken::Algorithm; 8] = [
    jsonwebtoken::Algorithm::RS256,
    jsonwebtoken::Algorithm::RS384,
    jsonwebtoken::Algorithm::RS512,
    jsonwebtoken::Algorithm::ES256,
    jsonwebtoken::Algorithm::ES384,
    jsonwebtoken::Algorithm::PS256,
    jsonwebtoken::Algorithm::PS384,
    jsonwebtoken::Algorithm::PS512,
];

pub fn discovery_uri(issuer_url: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer_url.trim_end_matches('/')
    )
}

/// Fetch and validate the discovery document of `issuer_url`.
pub async fn discover(client: &reqwest::Client, issuer_url: &str) -> AuthResult<ProviderConfig> {
    let well_known = discovery_uri(issuer_url);
    debug!("Fetching OIDC configuration from {}", well_known);

    let response = client
        .get(&well_known)
        .send()
        .await
        .map_err(|e| AuthError::Discovery(format!("error getting OIDC: {}", e)))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(AuthError::Discovery(format!(
            "unexpected status code getting OIDC: {}",
            status.as_u16()
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| AuthError::Discovery(format!("error reading response body: {}", e)))?;

    let config: ProviderConfig = serde_json::from_slice(&body)
        .map_err(|e| AuthError::Discovery(format!("failed parsing document: {}", e)))?;

    if config.issuer.is_empty() {
        return Err(AuthError::Discovery("missing issuer value".to_string()));
    }
    if config.jwks_url.is_empty() {
        return Err(AuthError::Discovery("missing jwks_uri value".to_string()));
    }

    Ok(config)
}
