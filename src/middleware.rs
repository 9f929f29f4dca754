//! Server and client adapters around an [`Authenticator`].
//!
//! The server side authenticates inbound requests and attaches the claims to
//! request-scoped state: [`server`] for a plain [`RequestContext`],
//! [`authenticate`] as an axum middleware with [`Authenticated`] to read the
//! result. The client side ([`ClientAuthenticator`]) attaches a freshly issued
//! credential to outbound requests.

use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::claims::AuthClaims;
use crate::engine::Authenticator;
use crate::error::{AuthError, AuthResult};
use crate::metadata::{RequestContext, Transport, TransportKind};

/// Transport kind name used for HTTP requests.
const HTTP_TRANSPORT: &str = "http";

/// Authenticate `ctx` with the transport-header convention and attach the
/// resulting claims.
pub fn server(authenticator: &dyn Authenticator, ctx: RequestContext) -> AuthResult<RequestContext> {
    let claims = authenticator.authenticate(&ctx, TransportKind::Transport)?;
    Ok(ctx.with_auth_claims(claims))
}

/// Claims stored in request extensions by [`authenticate`].
#[derive(Clone)]
struct VerifiedClaims(AuthClaims);

/// Axum middleware: rejects requests that fail authentication with `401`.
///
/// Use with `axum::middleware::from_fn_with_state(authenticator, authenticate)`.
pub async fn authenticate(
    State(authenticator): State<Arc<dyn Authenticator>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    let transport = Transport::new(HTTP_TRANSPORT)
        .with_operation(request.uri().path())
        .with_request_header(request.headers().clone());
    let ctx = RequestContext::new().with_server_transport(transport);

    let ctx = server(authenticator.as_ref(), ctx).map_err(|err| {
        warn!(
            "Rejected {} {}: {} ({})",
            request.method(),
            request.uri().path(),
            err.reason(),
            err.code()
        );
        AuthRejection(err)
    })?;

    if let Some(claims) = ctx.auth_claims() {
        debug!("Authenticated subject: {:?}", claims.subject());
        request.extensions_mut().insert(VerifiedClaims(claims.clone()));
    }
    Ok(next.run(request).await)
}

/// Extractor for the claims attached by [`authenticate`].
#[derive(Debug, Clone)]
pub struct Authenticated(pub AuthClaims);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<VerifiedClaims>()
            .map(|verified| Authenticated(verified.0.clone()))
            .ok_or(AuthRejection(AuthError::Unauthenticated))
    }
}

/// `401 Unauthorized` with a JSON `{code, reason, message}` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRejection(pub AuthError);

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = json!({
            "code": self.0.code(),
            "reason": self.0.reason(),
            "message": self.0.to_string(),
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Attaches a credential for fixed claims to outbound requests.
///
/// Identity creation failures are logged and the request goes out without a
/// credential.
#[derive(Clone)]
pub struct ClientAuthenticator {
    authenticator: Arc<dyn Authenticator>,
    claims: AuthClaims,
}

impl ClientAuthenticator {
    pub fn new(authenticator: Arc<dyn Authenticator>, claims: AuthClaims) -> Self {
        Self {
            authenticator,
            claims,
        }
    }

    pub fn claims(&self) -> &AuthClaims {
        &self.claims
    }

    pub fn authorize(&self, ctx: RequestContext) -> RequestContext {
        match self.authenticator.create_identity_with_context(
            ctx.clone(),
            TransportKind::Transport,
            &self.claims,
        ) {
            Ok(ctx) => ctx,
            Err(err) => {
                error!("authenticator middleware create token failed: {}", err);
                ctx
            }
        }
    }

    /// Write the credential into the `Authorization` header of `request`.
    pub fn authorize_request<B>(&self, request: &mut http::Request<B>) {
        let headers = std::mem::take(request.headers_mut());
        let transport = Transport::new(HTTP_TRANSPORT)
            .with_operation(request.uri().path())
            .with_request_header(headers);

        let mut ctx = self.authorize(RequestContext::new().with_client_transport(transport));
        if let Some(transport) = ctx.take_client_transport() {
            *request.headers_mut() = transport.into_request_header();
        }
    }
}
