//! Pre-shared key authenticator: a flat allow-list of opaque keys.

use std::collections::HashSet;

use rand::seq::IteratorRandom;
use tracing::{debug, warn};

use crate::claims::AuthClaims;
use crate::engine::Authenticator;
use crate::error::{AuthError, AuthResult};

const EMPTY_KEY_SET: &str = "please specify at least one key";

#[derive(Debug, Clone, Default)]
pub struct PreSharedKeyOptions {
    valid_keys: HashSet<String>,
}

impl PreSharedKeyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the accepted keys.
    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// Accepts any listed key; issuing a credential picks one of them at random.
///
/// An empty key set is only reported when the authenticator is used.
pub struct PreSharedKeyAuthenticator {
    options: PreSharedKeyOptions,
}

impl PreSharedKeyAuthenticator {
    pub fn new(options: PreSharedKeyOptions) -> Self {
        if options.valid_keys.is_empty() {
            warn!("Pre-shared key authenticator created without keys");
        }
        Self { options }
    }

    pub fn key_count(&self) -> usize {
        self.options.valid_keys.len()
    }
}

impl Authenticator for PreSharedKeyAuthenticator {
    fn authenticate_token(&self, token: &str) -> AuthResult<AuthClaims> {
        if self.options.valid_keys.is_empty() {
            return Err(AuthError::InvalidConfiguration(EMPTY_KEY_SET.to_string()));
        }
        if self.options.valid_keys.contains(token) {
            debug!("Pre-shared key accepted");
            return Ok(AuthClaims::new());
        }
        Err(AuthError::Unauthenticated)
    }

    fn create_identity(&self, _claims: &AuthClaims) -> AuthResult<String> {
        self.options
            .valid_keys
            .iter()
            .choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| AuthError::InvalidConfiguration(EMPTY_KEY_SET.to_string()))
    }
}
