//! JWKS (JSON Web Key Set) fetching and background refresh.
//!
//! Keys are read synchronously on every request and replaced wholesale by a
//! background tokio task, so readers only ever see a complete key set.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, warn};

/// Default interval between background key refreshes (48 hours).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(48 * 60 * 60);

/// Longest accepted refresh interval (one year).
pub const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A single JSON Web Key from a JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC")
    pub kty: String,
    /// Key ID, matched against the JWT header `kid`
    pub kid: Option<String>,
    pub alg: Option<String>,
    /// Key use ("sig" or "enc")
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url encoded)
    pub n: Option<String>,
    /// RSA exponent (base64url encoded)
    pub e: Option<String>,
    /// EC curve name
    pub crv: Option<String>,
    /// EC x coordinate (base64url encoded)
    pub x: Option<String>,
    /// EC y coordinate (base64url encoded)
    pub y: Option<String>,
}

/// A JWKS document containing multiple keys.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// Read accessor over a set of verification keys.
pub trait KeySet: Send + Sync {
    /// Key for `kid`. A token without `kid` matches only a single-key set.
    fn key(&self, kid: Option<&str>) -> Option<DecodingKey>;

    /// Stop any background refresh.
    fn close(&self) {}
}

#[derive(Clone)]
struct KeyEntry {
    kid: Option<String>,
    key: DecodingKey,
}

type Keys = Arc<RwLock<Vec<KeyEntry>>>;

/// Key set fetched from a remote `jwks_uri` and refreshed periodically.
pub struct RemoteKeySet {
    jwks_uri: String,
    keys: Keys,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteKeySet {
    /// Fetch the key set once, without starting background refresh.
    pub async fn fetch(client: &reqwest::Client, jwks_uri: &str) -> Result<Self, JwksError> {
        let entries = fetch_keys(client, jwks_uri).await?;
        Ok(Self {
            jwks_uri: jwks_uri.to_string(),
            keys: Arc::new(RwLock::new(entries)),
            refresh_task: Mutex::new(None),
        })
    }

    /// Start refreshing the keys every `interval` on the current runtime.
    ///
    /// A failed refresh keeps the previous keys. Intervals are capped at
    /// [`MAX_REFRESH_INTERVAL`].
    pub fn start_refresh(&self, client: reqwest::Client, interval: Duration) {
        let keys = self.keys.clone();
        let jwks_uri = self.jwks_uri.clone();
        let interval = interval.min(MAX_REFRESH_INTERVAL);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                match fetch_keys(&client, &jwks_uri).await {
                    Ok(entries) => match keys.write() {
                        Ok(mut guard) => {
                            debug!("Refreshed {} keys from {}", entries.len(), jwks_uri);
                            *guard = entries;
                        }
                        Err(_) => {
                            warn!("JWKS key lock poisoned, stopping refresh");
                            return;
                        }
                    },
                    Err(e) => warn!("JWKS refresh failed, keeping previous keys: {}", e),
                }
            }
        });

        match self.refresh_task.lock() {
            Ok(mut slot) => {
                if let Some(previous) = slot.replace(handle) {
                    previous.abort();
                }
            }
            Err(_) => handle.abort(),
        }
    }

    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Key IDs currently held, in document order.
    pub fn kids(&self) -> Vec<String> {
        match self.keys.read() {
            Ok(keys) => keys.iter().filter_map(|k| k.kid.clone()).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn key_count(&self) -> usize {
        self.keys.read().map(|keys| keys.len()).unwrap_or(0)
    }

    fn stop_refresh(&self) {
        if let Ok(mut slot) = self.refresh_task.lock()
            && let Some(handle) = slot.take()
        {
            debug!("Stopping JWKS refresh for {}", self.jwks_uri);
            handle.abort();
        }
    }
}

impl KeySet for RemoteKeySet {
    fn key(&self, kid: Option<&str>) -> Option<DecodingKey> {
        // A poisoned lock reads as "no key" rather than panicking.
        let keys = self.keys.read().ok()?;
        match kid {
            Some(kid) => keys
                .iter()
                .find(|entry| entry.kid.as_deref() == Some(kid))
                .map(|entry| entry.key.clone()),
            None if keys.len() == 1 => keys.first().map(|entry| entry.key.clone()),
            None => None,
        }
    }

    fn close(&self) {
        self.stop_refresh();
    }
}

impl Drop for RemoteKeySet {
    fn drop(&mut self) {
        self.stop_refresh();
    }
}

async fn fetch_keys(client: &reqwest::Client, jwks_uri: &str) -> Result<Vec<KeyEntry>, JwksError> {
    debug!("Fetching JWKS from {}", jwks_uri);

    let response = client
        .get(jwks_uri)
        .send()
        .await
        .map_err(|e| JwksError::FetchError(e.to_string()))?;

    if !response.status().is_success() {
        return Err(JwksError::FetchError(format!(
            "HTTP {} from JWKS endpoint",
            response.status()
        )));
    }

    let document: JwksDocument = response
        .json()
        .await
        .map_err(|e| JwksError::ParseError(e.to_string()))?;

    parse_document(document)
}

fn parse_document(document: JwksDocument) -> Result<Vec<KeyEntry>, JwksError> {
    let mut entries = Vec::new();

    for jwk in document.keys {
        if jwk.key_use.as_deref() == Some("enc") {
            debug!("Skipping encryption key {:?}", jwk.kid);
            continue;
        }

        match jwk_to_decoding_key(&jwk) {
            Ok(key) => {
                debug!("Loaded {} key with kid: {:?}", jwk.kty, jwk.kid);
                entries.push(KeyEntry { kid: jwk.kid, key });
            }
            Err(e) => warn!("Failed to parse JWK: {}", e),
        }
    }

    if entries.is_empty() {
        return Err(JwksError::NoValidKeys);
    }
    Ok(entries)
}

fn jwk_to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, JwksError> {
    fn component<'a>(value: &'a Option<String>, name: &str, kty: &str) -> Result<&'a str, JwksError> {
        value
            .as_deref()
            .ok_or_else(|| JwksError::ParseError(format!("Missing '{}' in {} key", name, kty)))
    }

    match jwk.kty.as_str() {
        "RSA" => {
            let n = component(&jwk.n, "n", "RSA")?;
            let e = component(&jwk.e, "e", "RSA")?;
            DecodingKey::from_rsa_components(n, e)
                .map_err(|e| JwksError::ParseError(format!("Invalid RSA components: {}", e)))
        }
        "EC" => {
            let x = component(&jwk.x, "x", "EC")?;
            let y = component(&jwk.y, "y", "EC")?;
            DecodingKey::from_ec_components(x, y)
                .map_err(|e| JwksError::ParseError(format!("Invalid EC components: {}", e)))
        }
        other => Err(JwksError::ParseError(format!("Unsupported key type: {}", other))),
    }
}

/// Errors that can occur while loading a JWKS document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JwksError {
    /// Failed to fetch JWKS from endpoint.
    FetchError(String),
    /// Failed to parse JWKS response.
    ParseError(String),
    /// No usable signing keys in the document.
    NoValidKeys,
}

impl std::fmt::Display for JwksError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FetchError(msg) => write!(f, "Failed to fetch JWKS: {}", msg),
            Self::ParseError(msg) => write!(f, "Failed to parse JWKS: {}", msg),
            Self::NoValidKeys => write!(f, "No valid keys found in JWKS"),
        }
    }
}

impl std::error::Error for JwksError {}
