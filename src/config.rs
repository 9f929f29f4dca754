use anyhow::{Context, anyhow, bail};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{env, fs, path::Path, path::PathBuf, str::FromStr, sync::Arc, time::Duration};
use tracing::info;

use crate::engine::Authenticator;
use crate::jwt::{JwtAuthenticator, JwtKey, JwtOptions};
use crate::noop::NoopAuthenticator;
use crate::oidc::{OidcAuthenticator, OidcOptions};
use crate::presharedkey::{PreSharedKeyAuthenticator, PreSharedKeyOptions};

/// Backend selection, e.g. `{"type": "jwt", "key": "${JWT_SECRET}"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    Noop,
    Jwt(JwtConfig),
    Oidc(OidcConfig),
    PreSharedKey(PreSharedKeyConfig),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtConfig {
    #[serde(default = "default_jwt_algorithm")]
    pub algorithm: String,
    /// Shared secret for HS algorithms.
    #[serde(default)]
    pub key: Option<String>,
    /// PEM private key for RS/PS/ES algorithms; omit for verify-only.
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    #[serde(default)]
    pub public_key_path: Option<PathBuf>,
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub leeway_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcConfig {
    pub issuer_url: String,
    pub audience: String,
    #[serde(default = "default_oidc_algorithm")]
    pub algorithm: String,
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
    #[serde(default)]
    pub leeway_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreSharedKeyConfig {
    #[serde(default)]
    pub keys: Vec<String>,
}

fn default_jwt_algorithm() -> String {
    "HS256".to_string()
}

fn default_oidc_algorithm() -> String {
    "RS256".to_string()
}

impl AuthConfig {
    /// Parse a JSON document, expanding `${VAR}` in every string value.
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let mut doc: Value = serde_json::from_str(raw).context("invalid authenticator config JSON")?;
        expand_value(&mut doc, &|name| env::var(name).ok());
        serde_json::from_value(doc).context("invalid authenticator config")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json_str(&raw)
    }

    /// Load from the first location [`resolve_config_path`] finds.
    pub fn load_default() -> anyhow::Result<Self> {
        Self::load(&resolve_config_path()?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Jwt(_) => "jwt",
            Self::Oidc(_) => "oidc",
            Self::PreSharedKey(_) => "pre_shared_key",
        }
    }

    /// Construct the configured backend. OIDC performs discovery here.
    pub async fn build(&self) -> anyhow::Result<Arc<dyn Authenticator>> {
        info!("Building {} authenticator", self.kind());
        let authenticator: Arc<dyn Authenticator> = match self {
            Self::Noop => Arc::new(NoopAuthenticator::new()),
            Self::Jwt(cfg) => Arc::new(JwtAuthenticator::new(cfg.options()?)?),
            Self::Oidc(cfg) => Arc::new(OidcAuthenticator::new(cfg.options()?).await?),
            Self::PreSharedKey(cfg) => Arc::new(PreSharedKeyAuthenticator::new(
                PreSharedKeyOptions::new().with_keys(cfg.keys.iter().cloned()),
            )),
        };
        Ok(authenticator)
    }
}

impl JwtConfig {
    pub fn options(&self) -> anyhow::Result<JwtOptions> {
        let alg = parse_algorithm(&self.algorithm)?;
        let mut options = JwtOptions::new()
            .with_signing_method(alg)
            .with_jwt_key(self.key_material(alg)?)
            .with_leeway(Duration::from_secs(self.leeway_secs));
        if let Some(kid) = &self.key_id {
            options = options.with_key_id(kid.clone());
        }
        Ok(options)
    }

    fn key_material(&self, alg: Algorithm) -> anyhow::Result<JwtKey> {
        if matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            let key = self
                .key
                .as_deref()
                .ok_or_else(|| anyhow!("`key` is required for {:?}", alg))?;
            return Ok(JwtKey::secret(key.as_bytes()));
        }

        let public_path = self
            .public_key_path
            .as_deref()
            .ok_or_else(|| anyhow!("`public_key_path` is required for {:?}", alg))?;
        let public = read_pem(public_path)?;
        let is_ec = matches!(alg, Algorithm::ES256 | Algorithm::ES384);

        match &self.private_key_path {
            Some(private_path) => {
                let private = read_pem(private_path)?;
                let key = if is_ec {
                    JwtKey::ec_pem(&private, &public)?
                } else {
                    JwtKey::rsa_pem(&private, &public)?
                };
                Ok(key)
            }
            None => {
                let decoding = if is_ec {
                    DecodingKey::from_ec_pem(&public)
                } else {
                    DecodingKey::from_rsa_pem(&public)
                }
                .with_context(|| format!("invalid public key {}", public_path.display()))?;
                Ok(JwtKey::verify_only(decoding))
            }
        }
    }
}

impl OidcConfig {
    pub fn options(&self) -> anyhow::Result<OidcOptions> {
        let mut options = OidcOptions::new(&self.issuer_url, &self.audience)
            .with_signing_method(parse_algorithm(&self.algorithm)?)
            .with_leeway(Duration::from_secs(self.leeway_secs));
        if let Some(secs) = self.refresh_interval_secs {
            options = options.with_refresh_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = self.http_timeout_secs {
            options = options.with_http_timeout(Duration::from_secs(secs));
        }
        Ok(options)
    }
}

fn parse_algorithm(name: &str) -> anyhow::Result<Algorithm> {
    Algorithm::from_str(name).map_err(|_| anyhow!("unknown signing algorithm `{}`", name))
}

fn read_pem(path: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read key {}", path.display()))
}

/// `AUTHN_CONFIG`, then `$XDG_CONFIG_HOME/authn/authn.json`, then `./authn.json`.
pub fn resolve_config_path() -> anyhow::Result<PathBuf> {
    if let Ok(p) = env::var("AUTHN_CONFIG") {
        return Ok(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("authn").join("authn.json");
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let candidate = PathBuf::from("authn.json");
    if candidate.exists() {
        return Ok(candidate);
    }

    bail!("Could not find authn.json (set AUTHN_CONFIG or create ./authn.json)")
}

fn expand_value(value: &mut Value, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        Value::String(s) => *s = expand_env_vars(s, lookup),
        Value::Array(items) => items.iter_mut().for_each(|item| expand_value(item, lookup)),
        Value::Object(map) => map.values_mut().for_each(|item| expand_value(item, lookup)),
        _ => {}
    }
}

/// Replace `${NAME}` with `lookup(NAME)`; unknown names stay verbatim.
fn expand_env_vars(input: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            match lookup(&name) {
                Some(val) => out.push_str(&val),
                None => {
                    out.push_str("${");
                    out.push_str(&name);
                    out.push('}');
                }
            }
        } else {
            out.push(ch);
        }
    }

    out
}
