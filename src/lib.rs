//! Pluggable request authentication.
//!
//! One [`Authenticator`] contract with interchangeable backends (JWT, OIDC,
//! pre-shared key, no-op), a normalized claim model and the binding of bearer
//! credentials to request metadata.

pub mod claims;
pub mod config;
pub mod engine;
pub mod error;
pub mod jwt;
pub mod metadata;
pub mod middleware;
pub mod noop;
pub mod oidc;
pub mod presharedkey;

pub use claims::{AuthClaims, ClaimValue, ScopeSet, StandardClaim};
pub use config::AuthConfig;
pub use engine::Authenticator;
pub use error::{AuthError, AuthResult};
pub use jwt::{JwtAuthenticator, JwtKey, JwtOptions};
pub use metadata::{BEARER_WORD, HEADER_AUTHORIZATION, RequestContext, Transport, TransportKind};
pub use middleware::{Authenticated, ClientAuthenticator};
pub use noop::NoopAuthenticator;
pub use oidc::{IdToken, OidcAuthenticator, OidcOptions, ProviderConfig};
pub use presharedkey::{PreSharedKeyAuthenticator, PreSharedKeyOptions};
