use anyhow::{Context, Result};
use authn::{AuthClaims, AuthConfig, Authenticated, Authenticator, JwtAuthenticator, JwtOptions};
use axum::{Json, Router, middleware, routing::get};
use chrono::Utc;
use clap::{Parser, Subcommand};
use jsonwebtoken::Algorithm;
use std::{path::PathBuf, str::FromStr, sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "authn")]
#[command(about = "Issue, verify and serve bearer credentials")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue a JWT with a shared secret
    Mint {
        #[arg(long, env = "AUTHN_JWT_KEY")]
        key: String,
        #[arg(long, default_value = "HS256")]
        alg: String,
        #[arg(long)]
        sub: Option<String>,
        /// Granted scope (repeatable)
        #[arg(long = "scope")]
        scopes: Vec<String>,
        /// Lifetime in seconds (omit for a token without `exp`)
        #[arg(long)]
        exp_secs: Option<i64>,
        /// Add a random `jti`
        #[arg(long, default_value_t = false)]
        jti: bool,
    },
    /// Verify a JWT and print its claims
    Verify {
        #[arg(long, env = "AUTHN_JWT_KEY")]
        key: String,
        #[arg(long, default_value = "HS256")]
        alg: String,
        token: String,
    },
    /// Print the discovery document of an OIDC issuer
    Discover {
        #[arg(long)]
        issuer: String,
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },
    /// Serve `/whoami` behind the configured authenticator
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        bind: String,
        /// Config file (defaults to AUTHN_CONFIG / XDG / ./authn.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn jwt_authenticator(key: &str, alg: &str) -> Result<JwtAuthenticator> {
    let alg = Algorithm::from_str(alg).with_context(|| format!("unknown algorithm `{}`", alg))?;
    Ok(JwtAuthenticator::new(
        JwtOptions::new().with_key(key).with_signing_method(alg),
    )?)
}

async fn whoami(Authenticated(claims): Authenticated) -> Json<AuthClaims> {
    Json(claims)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("authn=info".parse()?))
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Mint {
            key,
            alg,
            sub,
            scopes,
            exp_secs,
            jti,
        } => {
            let auth = jwt_authenticator(&key, &alg)?;

            let mut claims = AuthClaims::new().with_scopes(scopes);
            if let Some(sub) = sub {
                claims = claims.with_subject(sub);
            }
            if jti {
                claims = claims.with_jwt_id(uuid::Uuid::new_v4().to_string());
            }
            let now = Utc::now();
            claims.set_issued_at(now)?;
            if let Some(secs) = exp_secs {
                claims.set_expiration_time(now + chrono::Duration::seconds(secs))?;
            }

            println!("{}", auth.create_identity(&claims)?);
        }
        Commands::Verify { key, alg, token } => {
            let auth = jwt_authenticator(&key, &alg)?;
            let claims = auth.authenticate_token(&token)?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
        Commands::Discover {
            issuer,
            timeout_secs,
        } => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()?;
            let provider = authn::oidc::discover(&client, &issuer).await?;
            println!("{}", serde_json::to_string_pretty(&provider)?);
        }
        Commands::Serve { bind, config } => {
            let config = match config {
                Some(path) => AuthConfig::load(&path)?,
                None => AuthConfig::load_default()?,
            };
            let authenticator: Arc<dyn Authenticator> = config.build().await?;

            let app = Router::new()
                .route("/whoami", get(whoami))
                .layer(middleware::from_fn_with_state(
                    authenticator.clone(),
                    authn::middleware::authenticate,
                ))
                .layer(
                    ServiceBuilder::new()
                        .layer(TraceLayer::new_for_http())
                        .layer(CorsLayer::permissive()),
                );

            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("Serving {} authenticator on http://{}", config.kind(), bind);

            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
            authenticator.close();
        }
    }

    Ok(())
}
