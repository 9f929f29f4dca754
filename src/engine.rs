//! The authenticator capability contract.

use crate::claims::AuthClaims;
use crate::error::AuthResult;
use crate::metadata::{self, BEARER_WORD, RequestContext, TransportKind};

/// A pluggable authentication backend.
///
/// Instances are built once from immutable options and shared read-only by
/// every concurrent request, so all methods take `&self`.
pub trait Authenticator: Send + Sync {
    /// Authenticate the bearer token carried by `ctx` under the `kind`
    /// convention.
    fn authenticate(&self, ctx: &RequestContext, kind: TransportKind) -> AuthResult<AuthClaims> {
        let token = metadata::auth_from_md(ctx, BEARER_WORD, kind)?;
        self.authenticate_token(&token)
    }

    /// Validate a raw token string and return its claims.
    fn authenticate_token(&self, token: &str) -> AuthResult<AuthClaims>;

    /// Issue a credential encoding `claims`.
    fn create_identity(&self, claims: &AuthClaims) -> AuthResult<String>;

    /// Issue a credential and write it into the outgoing metadata of `ctx`.
    fn create_identity_with_context(
        &self,
        ctx: RequestContext,
        kind: TransportKind,
        claims: &AuthClaims,
    ) -> AuthResult<RequestContext> {
        let token = self.create_identity(claims)?;
        metadata::md_with_auth(ctx, BEARER_WORD, &token, kind)
    }

    /// Release backend resources such as background key refresh.
    fn close(&self) {}
}
