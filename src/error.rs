//! Authentication error taxonomy.
//!
//! Every failure an authenticator can report is one variant of [`AuthError`].
//! Each variant carries a stable numeric code so the hosting framework can map
//! it onto its own status convention without string matching.

use std::fmt;

use jsonwebtoken::errors::ErrorKind;

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors that can occur while authenticating a request or issuing a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No well-formed `<scheme> <token>` value in the request metadata.
    MissingBearerToken,
    /// Token is malformed or failed generic validation.
    InvalidToken,
    /// Signature verification or token signing failed.
    SignTokenFailed,
    /// Token is expired or not yet valid.
    TokenExpired,
    /// Token algorithm differs from the configured algorithm.
    UnsupportedSigningMethod,
    /// Claims payload is absent or has the wrong shape.
    InvalidClaims,
    /// `sub` claim is present but not a string.
    InvalidSubject,
    /// `iss` claim has the wrong type or does not match the expected issuer.
    InvalidIssuer,
    /// `aud` claim has the wrong type or does not contain the expected audience.
    InvalidAudience,
    /// `exp` claim is present but not a valid numeric date.
    InvalidExpiration,
    /// `nbf` claim is present but not a valid numeric date.
    InvalidNotBefore,
    /// `iat` claim is present but not a valid numeric date.
    InvalidIssuedAt,
    /// A claim accessor found a value of a different shape than requested.
    InvalidType,
    /// No key resolver configured for signing or verification.
    MissingKeyFunc,
    /// The key resolver returned an error.
    GetKeyFailed,
    /// Generic authentication failure.
    Unauthenticated,
    /// ID token carries no `at_hash` claim.
    NoAtHash,
    /// Access token hash does not match the `at_hash` claim.
    InvalidAtHash,
    /// Authenticator options cannot be honoured.
    InvalidConfiguration(String),
    /// OIDC provider discovery failed while constructing the authenticator.
    Discovery(String),
}

impl AuthError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidSubject => 1001,
            Self::InvalidAudience => 1002,
            Self::InvalidIssuer => 1003,
            Self::InvalidClaims => 1004,
            Self::InvalidToken => 1005,
            Self::InvalidExpiration => 1006,
            Self::InvalidNotBefore => 1007,
            Self::InvalidIssuedAt => 1008,
            Self::InvalidType => 1009,
            Self::MissingBearerToken => 1010,
            Self::TokenExpired => 1011,
            Self::UnsupportedSigningMethod => 1012,
            Self::InvalidConfiguration(_) => 1013,
            Self::MissingKeyFunc => 1014,
            Self::SignTokenFailed => 1015,
            Self::GetKeyFailed => 1016,
            Self::Discovery(_) => 1017,
            Self::NoAtHash => 1050,
            Self::InvalidAtHash => 1051,
            Self::Unauthenticated => 1500,
        }
    }

    /// Stable reason string, suitable for structured error bodies.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingBearerToken => "MISSING_BEARER_TOKEN",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::SignTokenFailed => "SIGN_TOKEN_FAILED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::UnsupportedSigningMethod => "UNSUPPORTED_SIGNING_METHOD",
            Self::InvalidClaims => "INVALID_CLAIMS",
            Self::InvalidSubject => "INVALID_SUBJECT",
            Self::InvalidIssuer => "INVALID_ISSUER",
            Self::InvalidAudience => "INVALID_AUDIENCE",
            Self::InvalidExpiration => "INVALID_EXPIRATION",
            Self::InvalidNotBefore => "INVALID_NOT_BEFORE",
            Self::InvalidIssuedAt => "INVALID_ISSUED_AT",
            Self::InvalidType => "INVALID_TYPE",
            Self::MissingKeyFunc => "MISSING_KEY_FUNC",
            Self::GetKeyFailed => "GET_KEY_FAILED",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::NoAtHash => "NO_AT_HASH",
            Self::InvalidAtHash => "INVALID_AT_HASH",
            Self::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            Self::Discovery(_) => "DISCOVERY_FAILED",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBearerToken => write!(f, "missing bearer token"),
            Self::InvalidToken => write!(f, "invalid bearer token"),
            Self::SignTokenFailed => write!(f, "sign token failed"),
            Self::TokenExpired => write!(f, "token expired"),
            Self::UnsupportedSigningMethod => write!(f, "unsupported signing method"),
            Self::InvalidClaims => write!(f, "invalid claims"),
            Self::InvalidSubject => write!(f, "invalid subject"),
            Self::InvalidIssuer => write!(f, "invalid issuer"),
            Self::InvalidAudience => write!(f, "invalid audience"),
            Self::InvalidExpiration => write!(f, "invalid expiration time"),
            Self::InvalidNotBefore => write!(f, "invalid not before time"),
            Self::InvalidIssuedAt => write!(f, "invalid issued at time"),
            Self::InvalidType => write!(f, "claim has an unexpected type"),
            Self::MissingKeyFunc => write!(f, "missing key func"),
            Self::GetKeyFailed => write!(f, "get key failed"),
            Self::Unauthenticated => write!(f, "unauthenticated"),
            Self::NoAtHash => write!(f, "id token did not have an access token hash"),
            Self::InvalidAtHash => {
                write!(f, "access token hash does not match value in ID token")
            }
            Self::InvalidConfiguration(msg) => write!(f, "invalid auth configuration: {}", msg),
            Self::Discovery(msg) => write!(f, "OIDC discovery failed: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => Self::SignTokenFailed,
            ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => Self::TokenExpired,
            ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => Self::UnsupportedSigningMethod,
            ErrorKind::InvalidIssuer => Self::InvalidIssuer,
            ErrorKind::InvalidAudience => Self::InvalidAudience,
            ErrorKind::InvalidSubject => Self::InvalidSubject,
            ErrorKind::Json(_) | ErrorKind::MissingRequiredClaim(_) => Self::InvalidClaims,
            ErrorKind::InvalidKeyFormat => Self::SignTokenFailed,
            _ => Self::InvalidToken,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(AuthError::InvalidSubject.code(), 1001);
        assert_eq!(AuthError::InvalidToken.code(), 1005);
        assert_eq!(AuthError::MissingBearerToken.code(), 1010);
        assert_eq!(AuthError::TokenExpired.code(), 1011);
        assert_eq!(AuthError::UnsupportedSigningMethod.code(), 1012);
        assert_eq!(AuthError::Unauthenticated.code(), 1500);
        assert_eq!(AuthError::NoAtHash.code(), 1050);
        assert_eq!(AuthError::InvalidAtHash.code(), 1051);
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let all = [
            AuthError::MissingBearerToken,
            AuthError::InvalidToken,
            AuthError::SignTokenFailed,
            AuthError::TokenExpired,
            AuthError::UnsupportedSigningMethod,
            AuthError::InvalidClaims,
            AuthError::InvalidSubject,
            AuthError::InvalidIssuer,
            AuthError::InvalidAudience,
            AuthError::InvalidExpiration,
            AuthError::InvalidNotBefore,
            AuthError::InvalidIssuedAt,
            AuthError::InvalidType,
            AuthError::MissingKeyFunc,
            AuthError::GetKeyFailed,
            AuthError::Unauthenticated,
            AuthError::NoAtHash,
            AuthError::InvalidAtHash,
            AuthError::InvalidConfiguration(String::new()),
            AuthError::Discovery(String::new()),
        ];
        let codes: std::collections::HashSet<i32> = all.iter().map(AuthError::code).collect();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(AuthError::MissingBearerToken.to_string(), "missing bearer token");
        assert_eq!(AuthError::InvalidToken.to_string(), "invalid bearer token");
        assert_eq!(
            AuthError::InvalidConfiguration("no keys".to_string()).to_string(),
            "invalid auth configuration: no keys"
        );
        assert_eq!(
            AuthError::Discovery("missing jwks_uri value".to_string()).to_string(),
            "OIDC discovery failed: missing jwks_uri value"
        );
    }

    #[test]
    fn test_from_jsonwebtoken_error() {
        let err: AuthError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidSignature).into();
        assert_eq!(err, AuthError::SignTokenFailed);

        let err: AuthError = jsonwebtoken::errors::Error::from(ErrorKind::ExpiredSignature).into();
        assert_eq!(err, AuthError::TokenExpired);

        let err: AuthError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidAlgorithm).into();
        assert_eq!(err, AuthError::UnsupportedSigningMethod);

        let err: AuthError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidToken).into();
        assert_eq!(err, AuthError::InvalidToken);
    }
}
