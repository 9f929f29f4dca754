//! Bearer credential binding to request metadata.
//!
//! Two carrier conventions are supported, selected explicitly with
//! [`TransportKind`]:
//!
//! - **Grpc**: a single metadata bag per direction (incoming metadata for
//!   servers, outgoing metadata for clients).
//! - **Transport**: a request/reply header pair owned by a higher-level
//!   transport abstraction ([`Transport`]); servers read the server
//!   transport's request header, clients write the client transport's
//!   request header.
//!
//! Both use the `Authorization` header with a `<scheme> <token>` value.

use std::str::FromStr;

use http::{HeaderMap, HeaderValue, Extensions, header::AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::claims::AuthClaims;
use crate::error::{AuthError, AuthResult};

/// Token type prefix used by every authenticator in this crate.
pub const BEARER_WORD: &str = "Bearer";

/// Canonical header carrying the credential.
pub const HEADER_AUTHORIZATION: &str = "Authorization";

/// Selects the metadata carrier convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Shared incoming/outgoing metadata bag.
    #[default]
    Grpc,
    /// Request/reply header pair of a [`Transport`].
    Transport,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grpc => "grpc",
            Self::Transport => "transport",
        }
    }
}

impl FromStr for TransportKind {
    type Err = std::convert::Infallible;

    /// Unknown names fall back to [`TransportKind::Grpc`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "transport" | "http" => Self::Transport,
            _ => Self::Grpc,
        })
    }
}

/// Header carrier of a higher-level transport (think HTTP request/response).
#[derive(Debug, Clone, Default)]
pub struct Transport {
    kind: String,
    endpoint: String,
    operation: String,
    request_header: HeaderMap,
    reply_header: HeaderMap,
}

impl Transport {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    pub fn with_request_header(mut self, header: HeaderMap) -> Self {
        self.request_header = header;
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn request_header(&self) -> &HeaderMap {
        &self.request_header
    }

    pub fn request_header_mut(&mut self) -> &mut HeaderMap {
        &mut self.request_header
    }

    pub fn reply_header(&self) -> &HeaderMap {
        &self.reply_header
    }

    pub fn reply_header_mut(&mut self) -> &mut HeaderMap {
        &mut self.reply_header
    }

    pub fn into_request_header(self) -> HeaderMap {
        self.request_header
    }
}

/// Private slot for authenticated claims in [`RequestContext`] extensions.
#[derive(Clone)]
struct ClaimsSlot(AuthClaims);

/// Request-scoped state passed explicitly down the call chain.
///
/// Carries the metadata of both conventions plus the claims attached by the
/// server middleware.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    incoming_metadata: HeaderMap,
    outgoing_metadata: HeaderMap,
    server_transport: Option<Transport>,
    client_transport: Option<Transport>,
    extensions: Extensions,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_incoming_metadata(mut self, metadata: HeaderMap) -> Self {
        self.incoming_metadata = metadata;
        self
    }

    pub fn with_server_transport(mut self, transport: Transport) -> Self {
        self.server_transport = Some(transport);
        self
    }

    pub fn with_client_transport(mut self, transport: Transport) -> Self {
        self.client_transport = Some(transport);
        self
    }

    pub fn incoming_metadata(&self) -> &HeaderMap {
        &self.incoming_metadata
    }

    pub fn incoming_metadata_mut(&mut self) -> &mut HeaderMap {
        &mut self.incoming_metadata
    }

    pub fn outgoing_metadata(&self) -> &HeaderMap {
        &self.outgoing_metadata
    }

    pub fn server_transport(&self) -> Option<&Transport> {
        self.server_transport.as_ref()
    }

    pub fn server_transport_mut(&mut self) -> Option<&mut Transport> {
        self.server_transport.as_mut()
    }

    pub fn client_transport(&self) -> Option<&Transport> {
        self.client_transport.as_ref()
    }

    pub fn take_client_transport(&mut self) -> Option<Transport> {
        self.client_transport.take()
    }

    /// Attach authenticated claims to this request.
    pub fn with_auth_claims(mut self, claims: AuthClaims) -> Self {
        self.extensions.insert(ClaimsSlot(claims));
        self
    }

    /// Claims attached by the server middleware, if any.
    pub fn auth_claims(&self) -> Option<&AuthClaims> {
        self.extensions.get::<ClaimsSlot>().map(|slot| &slot.0)
    }
}

/// Raw `Authorization` value on the inbound side of `kind`.
pub fn extract_token(ctx: &RequestContext, kind: TransportKind) -> Option<&str> {
    let header = match kind {
        TransportKind::Grpc => ctx.incoming_metadata.get(AUTHORIZATION),
        TransportKind::Transport => ctx
            .server_transport
            .as_ref()
            .and_then(|t| t.request_header.get(AUTHORIZATION)),
    };
    header.and_then(|value| value.to_str().ok())
}

/// Split a `<scheme> <token>` value, matching the scheme case-insensitively.
pub fn parse_authorization(value: &str, expected_scheme: &str) -> AuthResult<String> {
    let Some((scheme, token)) = value.split_once(' ') else {
        return Err(AuthError::MissingBearerToken);
    };
    if !scheme.eq_ignore_ascii_case(expected_scheme) || token.is_empty() {
        return Err(AuthError::MissingBearerToken);
    }
    Ok(token.to_string())
}

/// Read the bearer token for `expected_scheme` from the request metadata.
pub fn auth_from_md(
    ctx: &RequestContext,
    expected_scheme: &str,
    kind: TransportKind,
) -> AuthResult<String> {
    match extract_token(ctx, kind) {
        Some(value) if !value.is_empty() => parse_authorization(value, expected_scheme),
        _ => Err(AuthError::MissingBearerToken),
    }
}

/// Write `<scheme> <token>` into the outgoing metadata of `kind`.
///
/// With the transport convention and no client transport in the context the
/// credential is dropped with a warning, matching how hosting middleware
/// treats calls made outside a client transport.
pub fn inject_token(
    ctx: &mut RequestContext,
    scheme: &str,
    token: &str,
    kind: TransportKind,
) -> AuthResult<()> {
    let value = HeaderValue::from_str(&format!("{} {}", scheme, token))
        .map_err(|_| AuthError::InvalidToken)?;

    match kind {
        TransportKind::Grpc => {
            ctx.outgoing_metadata.insert(AUTHORIZATION, value);
        }
        TransportKind::Transport => match ctx.client_transport.as_mut() {
            Some(transport) => {
                transport.request_header.insert(AUTHORIZATION, value);
            }
            None => warn!("No client transport in context, credential not injected"),
        },
    }
    Ok(())
}

/// Consuming form of [`inject_token`].
pub fn md_with_auth(
    mut ctx: RequestContext,
    scheme: &str,
    token: &str,
    kind: TransportKind,
) -> AuthResult<RequestContext> {
    inject_token(&mut ctx, scheme, token, kind)?;
    Ok(ctx)
}

/// Move the outgoing side of a client context to the inbound side of a server
/// context, as a network hop would.
pub fn forward(outgoing: &RequestContext) -> RequestContext {
    let mut inbound = RequestContext::new().with_incoming_metadata(outgoing.outgoing_metadata.clone());
    if let Some(client) = &outgoing.client_transport {
        inbound = inbound.with_server_transport(
            Transport::new(client.kind.clone())
                .with_endpoint(client.endpoint.clone())
                .with_operation(client.operation.clone())
                .with_request_header(client.request_header.clone()),
        );
    }
    inbound
}
