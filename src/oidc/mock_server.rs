//! In-process OIDC issuer for tests.
//!
//! Serves discovery, JWKS and token endpoints on `127.0.0.1:0` and signs with
//! the fixed RSA key under `testdata/`. The server stops when the handle drops.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use super::id_token::access_token_hash;

pub const TEST_KEY_N: &str = "8PsABqIj3abNYjdXa04bZqHhorgDTed2R2Gg0syHIPV7VcUIzTBsy06lfq3KLlPqaxivsYCbbqG-0XapU3qVev5RwfZmF6JYEsltQLRBLbiAGwSkqfDxYdIKnQgZS5XBGlXR_WSbnhb_hdi7kGnDYDmi5Bmk8sGp6I4Q6OY6PFCkuCTm_52IEHYjt8gk2sz2Bd2h7bvmjj4ztRK3JYWJq2Xyl98M2iGjSoQvtPV2CRsJf150flFIphFOSWFb4hL4Z7nJ3RQSOSzHR7U1vHN_b-e3uEuwndXqzxaeTbBSKHQip9o5_2gSxiN4Sx_lXWA7Q7XOYKv42CRVRWCw6P0PPQ";
pub const TEST_KEY_E: &str = "AQAB";
pub const KID: &str = "1";
pub const ACCESS_TOKEN: &str = "8xLOxBtZp8";

pub const ISSUER_PRIVATE_PEM: &[u8] = include_bytes!("testdata/issuer_rsa.pem");
pub const ROGUE_PRIVATE_PEM: &[u8] = include_bytes!("testdata/rogue_rsa.pem");

/// Behaviour of the discovery endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMode {
    Healthy,
    MissingIssuer,
    MissingJwksUri,
    Status(u16),
}

struct MockState {
    issuer: String,
    mode: MockMode,
}

pub struct MockIssuer {
    issuer: String,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockIssuer {
    pub async fn start() -> Self {
        Self::start_with(MockMode::Healthy).await
    }

    pub async fn start_with(mode: MockMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let issuer = format!("http://{}", listener.local_addr().unwrap());

        let state = Arc::new(MockState {
            issuer: issuer.clone(),
            mode,
        });
        let app = Router::new()
            .route("/.well-known/openid-configuration", get(configuration))
            .route("/oidc/jwks", get(jwks))
            .route("/oauth2/token", get(token).post(token))
            .with_state(state);

        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            issuer,
            shutdown: Some(tx),
        }
    }

    pub fn url(&self) -> String {
        self.issuer.clone()
    }

    pub fn jwks_uri(&self) -> String {
        format!("{}/oidc/jwks", self.issuer)
    }

    /// ID token for `audience`/`subject` signed by this issuer.
    pub fn token(&self, audience: &str, subject: &str) -> String {
        self.sign(&json!({"iss": self.issuer, "aud": [audience], "sub": subject}))
    }

    pub fn sign(&self, payload: &Value) -> String {
        sign_with(ISSUER_PRIVATE_PEM, Algorithm::RS256, payload)
    }
}

impl Drop for MockIssuer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Sign `payload` with kid `1` under any RSA private key.
pub fn sign_with(private_pem: &[u8], alg: Algorithm, payload: &Value) -> String {
    let mut header = Header::new(alg);
    header.kid = Some(KID.to_string());
    let key = EncodingKey::from_rsa_pem(private_pem).unwrap();
    jsonwebtoken::encode(&header, payload, &key).unwrap()
}

async fn configuration(State(state): State<Arc<MockState>>) -> Response {
    let issuer = &state.issuer;
    let mut document = json!({
        "issuer": issuer,
        "jwks_uri": format!("{}/oidc/jwks", issuer),
        "revocation_endpoint": format!("{}/oauth2/revoke", issuer),
        "token_endpoint": format!("{}/oauth2/token", issuer),
        "authorization_endpoint": format!("{}/oidc/authorize", issuer),
        "userinfo_endpoint": format!("{}/oidc/userinfo", issuer),
        "id_token_signing_alg_values_supported": ["RS256"],
    });

    match state.mode {
        MockMode::Healthy => {}
        MockMode::MissingIssuer => {
            document["issuer"] = Value::String(String::new());
        }
        MockMode::MissingJwksUri => {
            if let Some(object) = document.as_object_mut() {
                object.remove("jwks_uri");
            }
        }
        MockMode::Status(code) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return status.into_response();
        }
    }
    Json(document).into_response()
}

async fn jwks() -> Json<Value> {
    Json(json!({
        "keys": [{
            "kid": KID,
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": TEST_KEY_N,
            "e": TEST_KEY_E,
        }]
    }))
}

async fn token(State(state): State<Arc<MockState>>) -> Json<Value> {
    let at_hash = access_token_hash(Algorithm::RS256, ACCESS_TOKEN).unwrap_or_default();
    let id_token = sign_with(
        ISSUER_PRIVATE_PEM,
        Algorithm::RS256,
        &json!({
            "iss": state.issuer,
            "aud": ["authn.test"],
            "sub": "user",
            "at_hash": at_hash,
        }),
    );

    Json(json!({
        "token_type": "Bearer",
        "expires_in": "3600",
        "access_token": ACCESS_TOKEN,
        "refresh_token": ACCESS_TOKEN,
        "id_token": id_token,
    }))
}
