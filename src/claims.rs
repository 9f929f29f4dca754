//! Normalized claims model.
//!
//! [`AuthClaims`] is the backend-independent view of an authenticated
//! principal. Claims are keyed by their JWT wire names and hold one of a
//! small closed set of value shapes ([`ClaimValue`]). Registered claims are
//! type-checked on the way in, so a present `sub` is always a string and a
//! present `exp` is always a usable timestamp.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{AuthError, AuthResult};

/// Wire names of the registered claims understood by this crate.
///
/// See <https://datatracker.ietf.org/doc/html/rfc7519#section-4.1>.
pub struct StandardClaim;

impl StandardClaim {
    pub const SUBJECT: &'static str = "sub";
    pub const ISSUER: &'static str = "iss";
    pub const AUDIENCE: &'static str = "aud";
    pub const EXPIRATION_TIME: &'static str = "exp";
    pub const NOT_BEFORE: &'static str = "nbf";
    pub const ISSUED_AT: &'static str = "iat";
    pub const JWT_ID: &'static str = "jti";
    /// Space-delimited scope list, see RFC 6749 section 3.3.
    pub const SCOPE: &'static str = "scope";

    /// Error reported when the named registered claim has the wrong shape.
    ///
    /// Returns `None` for names this crate does not type-check.
    fn shape_error(name: &str) -> Option<AuthError> {
        match name {
            Self::SUBJECT => Some(AuthError::InvalidSubject),
            Self::ISSUER => Some(AuthError::InvalidIssuer),
            Self::AUDIENCE => Some(AuthError::InvalidAudience),
            Self::EXPIRATION_TIME => Some(AuthError::InvalidExpiration),
            Self::NOT_BEFORE => Some(AuthError::InvalidNotBefore),
            Self::ISSUED_AT => Some(AuthError::InvalidIssuedAt),
            Self::JWT_ID | Self::SCOPE => Some(AuthError::InvalidClaims),
            _ => None,
        }
    }
}

/// A single claim value.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimValue {
    String(String),
    StringList(Vec<String>),
    Number(f64),
}

impl ClaimValue {
    /// Convert a JSON value, returning `None` for shapes outside this model.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(Self::StringList),
            _ => None,
        }
    }

    /// Convert to JSON. Whole numbers are emitted as integers.
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::StringList(list) => {
                Value::Array(list.iter().cloned().map(Value::String).collect())
            }
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 => {
                Value::from(*n as i64)
            }
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }

    fn is_numeric_date(&self) -> bool {
        matches!(self, Self::Number(n) if numeric_date(*n).is_some())
    }
}

impl From<String> for ClaimValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for ClaimValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Vec<String>> for ClaimValue {
    fn from(list: Vec<String>) -> Self {
        Self::StringList(list)
    }
}

impl From<f64> for ClaimValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for ClaimValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

/// Convert a NumericDate (seconds since the epoch) into a timestamp.
fn numeric_date(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value < 0.0 || value >= i64::MAX as f64 {
        return None;
    }
    let secs = value.trunc();
    let nanos = ((value - secs) * 1e9) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
}

/// Set of granted scopes.
///
/// Ordered so that the space-joined wire form is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the space-delimited wire form. Empty segments are ignored.
    pub fn parse(scope: &str) -> Self {
        scope.split(' ').filter(|s| !s.is_empty()).collect()
    }

    /// Insert a scope, returning `false` if it was already present.
    pub fn insert(&mut self, scope: impl Into<String>) -> bool {
        self.0.insert(scope.into())
    }

    pub fn remove(&mut self, scope: &str) -> bool {
        self.0.remove(scope)
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Space-joined wire form.
    pub fn to_scope_string(&self) -> String {
        self.iter().collect::<Vec<_>>().join(" ")
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_scope_string())
    }
}

/// Claims asserted about an authenticated principal.
///
/// Built fresh for every authentication call and owned by the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthClaims {
    claims: BTreeMap<String, ClaimValue>,
    scopes: ScopeSet,
}

impl AuthClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.claims
            .insert(StandardClaim::SUBJECT.to_string(), ClaimValue::String(subject.into()));
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.claims
            .insert(StandardClaim::ISSUER.to_string(), ClaimValue::String(issuer.into()));
        self
    }

    pub fn with_audience<I, S>(mut self, audience: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let audience = audience.into_iter().map(Into::into).collect();
        self.claims.insert(
            StandardClaim::AUDIENCE.to_string(),
            ClaimValue::StringList(audience),
        );
        self
    }

    pub fn with_jwt_id(mut self, jti: impl Into<String>) -> Self {
        self.claims
            .insert(StandardClaim::JWT_ID.to_string(), ClaimValue::String(jti.into()));
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.insert(scope);
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for scope in scopes {
            self.scopes.insert(scope);
        }
        self
    }

    /// Set a claim, type-checking registered names.
    ///
    /// Setting `scope` replaces the scope set.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ClaimValue>) -> AuthResult<()> {
        let name = name.into();
        let value = value.into();

        if name == StandardClaim::SCOPE {
            self.scopes = match value {
                ClaimValue::String(s) => ScopeSet::parse(&s),
                ClaimValue::StringList(list) => list.into_iter().collect(),
                ClaimValue::Number(_) => return Err(AuthError::InvalidClaims),
            };
            return Ok(());
        }

        let well_formed = match name.as_str() {
            StandardClaim::SUBJECT | StandardClaim::ISSUER | StandardClaim::JWT_ID => {
                matches!(value, ClaimValue::String(_))
            }
            StandardClaim::AUDIENCE => !matches!(value, ClaimValue::Number(_)),
            StandardClaim::EXPIRATION_TIME | StandardClaim::NOT_BEFORE | StandardClaim::ISSUED_AT => {
                value.is_numeric_date()
            }
            _ => !matches!(value, ClaimValue::Number(n) if !n.is_finite()),
        };
        if !well_formed {
            return Err(StandardClaim::shape_error(&name).unwrap_or(AuthError::InvalidClaims));
        }

        self.claims.insert(name, value);
        Ok(())
    }

    pub fn set_expiration_time(&mut self, at: DateTime<Utc>) -> AuthResult<()> {
        self.set(StandardClaim::EXPIRATION_TIME, at.timestamp())
    }

    pub fn set_not_before(&mut self, at: DateTime<Utc>) -> AuthResult<()> {
        self.set(StandardClaim::NOT_BEFORE, at.timestamp())
    }

    pub fn set_issued_at(&mut self, at: DateTime<Utc>) -> AuthResult<()> {
        self.set(StandardClaim::ISSUED_AT, at.timestamp())
    }

    pub fn remove(&mut self, name: &str) -> Option<ClaimValue> {
        self.claims.remove(name)
    }

    /// Raw value of a claim. Scopes live in [`AuthClaims::scopes`].
    pub fn get(&self, name: &str) -> Option<&ClaimValue> {
        self.claims.get(name)
    }

    pub fn get_str(&self, name: &str) -> AuthResult<Option<&str>> {
        match self.claims.get(name) {
            None => Ok(None),
            Some(ClaimValue::String(s)) => Ok(Some(s)),
            Some(_) => Err(AuthError::InvalidType),
        }
    }

    /// String list claim. A single string is read as a one-element list.
    pub fn get_strings(&self, name: &str) -> AuthResult<Option<Vec<&str>>> {
        match self.claims.get(name) {
            None => Ok(None),
            Some(ClaimValue::String(s)) => Ok(Some(vec![s.as_str()])),
            Some(ClaimValue::StringList(list)) => {
                Ok(Some(list.iter().map(String::as_str).collect()))
            }
            Some(ClaimValue::Number(_)) => Err(AuthError::InvalidType),
        }
    }

    pub fn get_number(&self, name: &str) -> AuthResult<Option<f64>> {
        match self.claims.get(name) {
            None => Ok(None),
            Some(ClaimValue::Number(n)) => Ok(Some(*n)),
            Some(_) => Err(AuthError::InvalidType),
        }
    }

    pub fn get_time(&self, name: &str) -> AuthResult<Option<DateTime<Utc>>> {
        match self.get_number(name)? {
            None => Ok(None),
            Some(n) => numeric_date(n).map(Some).ok_or(AuthError::InvalidType),
        }
    }

    pub fn subject(&self) -> Option<&str> {
        self.get_str(StandardClaim::SUBJECT).ok().flatten()
    }

    pub fn issuer(&self) -> Option<&str> {
        self.get_str(StandardClaim::ISSUER).ok().flatten()
    }

    pub fn audience(&self) -> Vec<&str> {
        self.get_strings(StandardClaim::AUDIENCE)
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    pub fn expiration_time(&self) -> Option<DateTime<Utc>> {
        self.get_time(StandardClaim::EXPIRATION_TIME).ok().flatten()
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.get_time(StandardClaim::NOT_BEFORE).ok().flatten()
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.get_time(StandardClaim::ISSUED_AT).ok().flatten()
    }

    pub fn jwt_id(&self) -> Option<&str> {
        self.get_str(StandardClaim::JWT_ID).ok().flatten()
    }

    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    pub fn scopes_mut(&mut self) -> &mut ScopeSet {
        &mut self.scopes
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty() && self.scopes.is_empty()
    }

    /// Project a verified JWT payload into claims.
    ///
    /// Registered claims with the wrong shape fail with their specific error.
    /// Unregistered claims outside the value model are dropped.
    pub fn from_payload(payload: &Map<String, Value>) -> AuthResult<Self> {
        let mut claims = Self::new();
        for (name, raw) in payload {
            match ClaimValue::from_json(raw) {
                Some(value) => claims.set(name.as_str(), value)?,
                None => match StandardClaim::shape_error(name) {
                    Some(err) => return Err(err),
                    None => debug!("Skipping claim `{}` with unsupported shape", name),
                },
            }
        }
        Ok(claims)
    }

    /// Wire form of the claims, with scopes space-joined under `scope`.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload: Map<String, Value> = self
            .claims
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        if !self.scopes.is_empty() {
            payload.insert(
                StandardClaim::SCOPE.to_string(),
                Value::String(self.scopes.to_scope_string()),
            );
        }
        payload
    }
}

impl Serialize for AuthClaims {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_payload().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AuthClaims {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let payload = Map::<String, Value>::deserialize(deserializer)?;
        Self::from_payload(&payload).map_err(serde::de::Error::custom)
    }
}
