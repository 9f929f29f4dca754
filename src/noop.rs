//! Authenticator that accepts everything, for tests and local development.

use crate::claims::AuthClaims;
use crate::engine::Authenticator;
use crate::error::AuthResult;
use crate::metadata::{RequestContext, TransportKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuthenticator;

impl NoopAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

impl Authenticator for NoopAuthenticator {
    /// Succeeds even when the request carries no credential.
    fn authenticate(&self, _ctx: &RequestContext, _kind: TransportKind) -> AuthResult<AuthClaims> {
        Ok(AuthClaims::new())
    }

    fn authenticate_token(&self, _token: &str) -> AuthResult<AuthClaims> {
        Ok(AuthClaims::new())
    }

    fn create_identity(&self, _claims: &AuthClaims) -> AuthResult<String> {
        Ok(String::new())
    }

    /// Leaves the context untouched.
    fn create_identity_with_context(
        &self,
        ctx: RequestContext,
        _kind: TransportKind,
        _claims: &AuthClaims,
    ) -> AuthResult<RequestContext> {
        Ok(ctx)
    }
}
