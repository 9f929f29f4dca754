//! JWT authenticator with a symmetric or asymmetric signing key.
//!
//! A token whose declared algorithm is not the configured one is rejected
//! before any key is resolved, whatever key family it claims. Only then is the
//! signature verified under that algorithm.

mod options;

pub use options::{Clock, JwtKey, JwtOptions, KeyFunc};
pub(crate) use options::system_clock;

use std::time::Duration;

use chrono::TimeDelta;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::claims::AuthClaims;
use crate::engine::Authenticator;
use crate::error::{AuthError, AuthResult};

/// Accepted time window of a token, evaluated against an injectable clock.
///
/// A token is valid iff `now < exp + leeway` and `nbf - leeway <= now`.
#[derive(Clone)]
pub(crate) struct ValidityWindow {
    leeway: TimeDelta,
    clock: Clock,
}

impl ValidityWindow {
    pub(crate) fn new(leeway: Duration, clock: Clock) -> AuthResult<Self> {
        let leeway = TimeDelta::from_std(leeway)
            .map_err(|_| AuthError::InvalidConfiguration("leeway out of range".to_string()))?;
        Ok(Self { leeway, clock })
    }

    pub(crate) fn check(&self, claims: &AuthClaims) -> AuthResult<()> {
        let now = (self.clock)();
        // An overflowing bound lies beyond any representable instant.
        if let Some(exp) = claims.expiration_time()
            && exp.checked_add_signed(self.leeway).is_some_and(|end| now >= end)
        {
            return Err(AuthError::TokenExpired);
        }
        if let Some(nbf) = claims.not_before()
            && now.checked_add_signed(self.leeway).is_some_and(|late| late < nbf)
        {
            return Err(AuthError::TokenExpired);
        }
        Ok(())
    }
}

/// Decode the header of a compact token.
pub(crate) fn decode_header(token: &str) -> AuthResult<Header> {
    jsonwebtoken::decode_header(token).map_err(|_| AuthError::InvalidToken)
}

/// Verify the signature under the declared algorithm and return the payload.
///
/// Registered-claim checks are left to the caller.
pub(crate) fn verify_signature(
    token: &str,
    header: &Header,
    key: &DecodingKey,
) -> AuthResult<Map<String, Value>> {
    let mut validation = Validation::new(header.alg);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.leeway = 0;

    let data = jsonwebtoken::decode::<Map<String, Value>>(token, key, &validation)?;
    Ok(data.claims)
}

/// Authenticator for self-issued JWTs.
pub struct JwtAuthenticator {
    options: JwtOptions,
    window: ValidityWindow,
}

impl JwtAuthenticator {
    pub fn new(options: JwtOptions) -> AuthResult<Self> {
        let window = ValidityWindow::new(options.leeway, options.clock.clone())?;
        Ok(Self { options, window })
    }

    pub fn signing_method(&self) -> Algorithm {
        self.options.signing_method
    }

    fn resolve_key(&self, header: &Header) -> AuthResult<JwtKey> {
        let key_func = self
            .options
            .key_func
            .as_ref()
            .ok_or(AuthError::MissingKeyFunc)?;
        key_func(header).map_err(|e| {
            warn!("JWT key resolution failed: {}", e);
            AuthError::GetKeyFailed
        })
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate_token(&self, token: &str) -> AuthResult<AuthClaims> {
        let header = decode_header(token)?;
        if header.alg != self.options.signing_method {
            warn!(
                "Rejected JWT signed with {:?}, expected {:?}",
                header.alg, self.options.signing_method
            );
            return Err(AuthError::UnsupportedSigningMethod);
        }

        let key = self.resolve_key(&header)?;
        let payload = verify_signature(token, &header, key.decoding_key())?;
        let claims = AuthClaims::from_payload(&payload)?;
        self.window.check(&claims)?;

        debug!("JWT verified for subject: {:?}", claims.subject());
        Ok(claims)
    }

    fn create_identity(&self, claims: &AuthClaims) -> AuthResult<String> {
        let mut header = Header::new(self.options.signing_method);
        header.kid = self.options.key_id.clone();

        let key = self.resolve_key(&header)?;
        let encoding_key = key.encoding_key().ok_or_else(|| {
            warn!("JWT key for {:?} has no signing half", header.alg);
            AuthError::SignTokenFailed
        })?;

        jsonwebtoken::encode(&header, &claims.to_payload(), encoding_key).map_err(|e| {
            warn!("JWT signing failed: {}", e);
            AuthError::SignTokenFailed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{BEARER_WORD, HEADER_AUTHORIZATION, RequestContext, Transport, TransportKind, forward};
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use chrono::{DateTime, Utc};
    use jsonwebtoken::EncodingKey;
    use serde_json::json;

    const ISSUER_PRIVATE: &[u8] = include_bytes!("../oidc/testdata/issuer_rsa.pem");
    const ISSUER_PUBLIC: &[u8] = include_bytes!("../oidc/testdata/issuer_rsa.pub.pem");

    fn hs256(key: &str) -> JwtAuthenticator {
        JwtAuthenticator::new(JwtOptions::new().with_key(key)).unwrap()
    }

    fn fixed_clock(secs: i64) -> impl Fn() -> DateTime<Utc> + Send + Sync + 'static {
        move || DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn decode_segment(segment: &str) -> Value {
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segment).unwrap()).unwrap()
    }

    fn sign_raw(payload: &Value, key: &str) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            payload,
            &EncodingKey::from_secret(key.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_create_and_authenticate_round_trip() {
        let auth = hs256("test");
        let principal = AuthClaims::new()
            .with_subject("user_name")
            .with_scopes(["a", "b"]);

        let token = auth.create_identity(&principal).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        // In-memory HMAC signing is deterministic.
        assert_eq!(auth.create_identity(&principal).unwrap(), token);

        assert_eq!(decode_segment(parts[0]), json!({"alg": "HS256", "typ": "JWT"}));
        assert_eq!(decode_segment(parts[1]), json!({"scope": "a b", "sub": "user_name"}));

        let claims = auth.authenticate_token(&token).unwrap();
        assert_eq!(claims.subject(), Some("user_name"));
        assert_eq!(claims.scopes(), principal.scopes());
    }

    #[test]
    fn test_authenticate_through_transport_metadata() {
        let auth = hs256("test");
        let principal = AuthClaims::new()
            .with_subject("user_name")
            .with_scopes(["local:admin:user_name", "tenant:admin:user_name"]);

        let client = RequestContext::new().with_client_transport(Transport::new("test"));
        let client = auth
            .create_identity_with_context(client, TransportKind::Transport, &principal)
            .unwrap();

        let header = client
            .client_transport()
            .unwrap()
            .request_header()
            .get(HEADER_AUTHORIZATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let (scheme, _) = header.split_once(' ').unwrap();
        assert_eq!(scheme, BEARER_WORD);

        let server = forward(&client);
        let claims = auth.authenticate(&server, TransportKind::Transport).unwrap();
        assert_eq!(claims.subject(), Some("user_name"));
        assert!(claims.has_scope("local:admin:user_name"));
        assert!(claims.has_scope("tenant:admin:user_name"));
    }

    #[test]
    fn test_authenticate_without_token() {
        let auth = hs256("test");
        let ctx = RequestContext::new().with_server_transport(Transport::new("test"));
        assert_eq!(
            auth.authenticate(&ctx, TransportKind::Transport),
            Err(AuthError::MissingBearerToken)
        );
    }

    #[test]
    fn test_malformed_tokens() {
        let auth = hs256("test");
        assert_eq!(auth.authenticate_token("12313123"), Err(AuthError::InvalidToken));
        assert_eq!(auth.authenticate_token("a.b.c"), Err(AuthError::InvalidToken));
        assert_eq!(auth.authenticate_token(""), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_wrong_signature() {
        let token = hs256("other").create_identity(&AuthClaims::new().with_subject("x")).unwrap();
        assert_eq!(hs256("test").authenticate_token(&token), Err(AuthError::SignTokenFailed));
    }

    #[test]
    fn test_algorithm_mismatch_with_valid_signature() {
        let token = hs256("testKey").create_identity(&AuthClaims::new().with_subject("fly")).unwrap();

        for alg in [Algorithm::HS384, Algorithm::HS512, Algorithm::ES384] {
            let auth = JwtAuthenticator::new(
                JwtOptions::new().with_key("testKey").with_signing_method(alg),
            )
            .unwrap();
            assert_eq!(
                auth.authenticate_token(&token),
                Err(AuthError::UnsupportedSigningMethod),
                "{:?}",
                alg
            );
        }
    }

    #[test]
    fn test_rsa_round_trip_and_algorithm_confusion() {
        let rs256 = JwtAuthenticator::new(
            JwtOptions::new()
                .with_signing_method(Algorithm::RS256)
                .with_jwt_key(JwtKey::rsa_pem(ISSUER_PRIVATE, ISSUER_PUBLIC).unwrap()),
        )
        .unwrap();

        let token = rs256.create_identity(&AuthClaims::new().with_subject("svc")).unwrap();
        assert_eq!(rs256.authenticate_token(&token).unwrap().subject(), Some("svc"));

        // HMAC token keyed with the public key bytes must not pass.
        let forged = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &json!({"sub": "admin"}),
            &EncodingKey::from_secret(ISSUER_PUBLIC),
        )
        .unwrap();
        assert_eq!(
            rs256.authenticate_token(&forged),
            Err(AuthError::UnsupportedSigningMethod)
        );
    }

    #[test]
    fn test_verify_only_key_cannot_issue() {
        let auth = JwtAuthenticator::new(
            JwtOptions::new()
                .with_signing_method(Algorithm::RS256)
                .with_jwt_key(JwtKey::verify_only(DecodingKey::from_rsa_pem(ISSUER_PUBLIC).unwrap())),
        )
        .unwrap();
        assert_eq!(
            auth.create_identity(&AuthClaims::new()),
            Err(AuthError::SignTokenFailed)
        );
    }

    #[test]
    fn test_missing_key_func() {
        let auth = JwtAuthenticator::new(JwtOptions::new()).unwrap();
        assert_eq!(auth.create_identity(&AuthClaims::new()), Err(AuthError::MissingKeyFunc));

        let token = hs256("test").create_identity(&AuthClaims::new()).unwrap();
        assert_eq!(auth.authenticate_token(&token), Err(AuthError::MissingKeyFunc));
    }

    #[test]
    fn test_key_func_by_kid() {
        let options = JwtOptions::new()
            .with_key_id("k2")
            .with_key_func(|header: &Header| match header.kid.as_deref() {
                Some("k1") => Ok(JwtKey::secret(b"first")),
                Some("k2") => Ok(JwtKey::secret(b"second")),
                other => Err(anyhow::anyhow!("unknown kid {:?}", other)),
            });
        let auth = JwtAuthenticator::new(options).unwrap();

        let token = auth.create_identity(&AuthClaims::new().with_subject("k")).unwrap();
        assert_eq!(decode_segment(token.split('.').next().unwrap())["kid"], "k2");
        assert_eq!(auth.authenticate_token(&token).unwrap().subject(), Some("k"));

        let no_kid = hs256("second").create_identity(&AuthClaims::new()).unwrap();
        assert_eq!(auth.authenticate_token(&no_kid), Err(AuthError::GetKeyFailed));
    }

    #[test]
    fn test_payload_shape_errors() {
        let auth = hs256("test");
        assert_eq!(
            auth.authenticate_token(&sign_raw(&json!([1, 2]), "test")),
            Err(AuthError::InvalidClaims)
        );
        assert_eq!(
            auth.authenticate_token(&sign_raw(&json!({"sub": 5}), "test")),
            Err(AuthError::InvalidSubject)
        );
        assert_eq!(
            auth.authenticate_token(&sign_raw(&json!({"exp": "never"}), "test")),
            Err(AuthError::InvalidExpiration)
        );
    }

    #[test]
    fn test_expiry_boundary_is_strict() {
        let now = 1_700_000_000;
        let auth = JwtAuthenticator::new(JwtOptions::new().with_key("test").with_clock(fixed_clock(now)))
            .unwrap();

        let past = sign_raw(&json!({"sub": "u", "exp": now - 10}), "test");
        assert_eq!(auth.authenticate_token(&past), Err(AuthError::TokenExpired));

        let at_expiry = sign_raw(&json!({"sub": "u", "exp": now}), "test");
        assert_eq!(auth.authenticate_token(&at_expiry), Err(AuthError::TokenExpired));

        let just_valid = sign_raw(&json!({"sub": "u", "exp": now + 1}), "test");
        assert!(auth.authenticate_token(&just_valid).is_ok());
    }

    #[test]
    fn test_not_before_boundary() {
        let now = 1_700_000_000;
        let auth = JwtAuthenticator::new(JwtOptions::new().with_key("test").with_clock(fixed_clock(now)))
            .unwrap();

        let future = sign_raw(&json!({"nbf": now + 1}), "test");
        assert_eq!(auth.authenticate_token(&future), Err(AuthError::TokenExpired));

        let at_nbf = sign_raw(&json!({"nbf": now}), "test");
        assert!(auth.authenticate_token(&at_nbf).is_ok());
    }

    #[test]
    fn test_leeway_extends_window() {
        let now = 1_700_000_000;
        let auth = JwtAuthenticator::new(
            JwtOptions::new()
                .with_key("test")
                .with_clock(fixed_clock(now))
                .with_leeway(Duration::from_secs(30)),
        )
        .unwrap();

        let recently_expired = sign_raw(&json!({"exp": now - 10}), "test");
        assert!(auth.authenticate_token(&recently_expired).is_ok());

        let long_expired = sign_raw(&json!({"exp": now - 30}), "test");
        assert_eq!(auth.authenticate_token(&long_expired), Err(AuthError::TokenExpired));

        let almost_valid = sign_raw(&json!({"nbf": now + 20}), "test");
        assert!(auth.authenticate_token(&almost_valid).is_ok());
    }

    #[test]
    fn test_cross_family_algorithm_rejected_before_key_lookup() {
        let ec = JwtAuthenticator::new(
            JwtOptions::new()
                .with_signing_method(Algorithm::ES256)
                .with_key_func(|_: &Header| Err(anyhow::anyhow!("no key for this token"))),
        )
        .unwrap();
        let token = sign_raw(&json!({"sub": "admin"}), "anything");
        assert_eq!(ec.authenticate_token(&token), Err(AuthError::UnsupportedSigningMethod));
    }

    #[test]
    fn test_leeway_with_far_future_expiry() {
        let far = DateTime::<Utc>::MAX_UTC.timestamp();
        let auth = JwtAuthenticator::new(
            JwtOptions::new()
                .with_key("test")
                .with_clock(fixed_clock(1_700_000_000))
                .with_leeway(Duration::from_secs(30)),
        )
        .unwrap();

        let token = sign_raw(&json!({"sub": "u", "exp": far}), "test");
        assert_eq!(auth.authenticate_token(&token).unwrap().subject(), Some("u"));

        let late = sign_raw(&json!({"nbf": far}), "test");
        assert_eq!(auth.authenticate_token(&late), Err(AuthError::TokenExpired));
    }

    #[test]
    fn test_token_without_exp_never_expires() {
        let auth = JwtAuthenticator::new(JwtOptions::new().with_key("test").with_clock(fixed_clock(i64::from(i32::MAX))))
            .unwrap();
        let token = auth.create_identity(&AuthClaims::new().with_subject("u")).unwrap();
        assert!(auth.authenticate_token(&token).is_ok());
    }
}
