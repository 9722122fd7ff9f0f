//! Application state and startup wiring

use std::sync::Arc;

use anyhow::Context;
use crypto::FieldCipher;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::auth::cookies::CookiePolicy;
use crate::auth::db::AuthRepository;
use crate::auth::rate_limit::RateLimiter;
use crate::auth::security::PasswordHasher;
use crate::auth::service::AuthService;
use crate::auth::store::{self, EphemeralStore, RedisBackend};
use crate::auth::tokens::JwtService;
use crate::config::ServerConfig;
use crate::services::{AccountService, AuditRecorder};

/// Shared application state: one connection pool and one Redis manager,
/// cloned into every service that needs them
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub db_pool: PgPool,
    pub repos: AuthRepository,
    pub store: EphemeralStore,
    pub jwt: JwtService,
    pub cookies: CookiePolicy,
    pub rate_limiter: RateLimiter,
    pub auth: AuthService,
    pub account: AccountService,
}

impl AppState {
    /// Connect to Postgres and Redis and wire the services together
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database.url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        info!("Connected to PostgreSQL");

        sqlx::migrate!()
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;

        let redis = store::connect(&config.redis.url).await?;
        info!("Connected to Redis");

        let repos = AuthRepository::new(db_pool.clone());
        let store = EphemeralStore::new(RedisBackend::new(redis.clone()));
        let rate_limiter = RateLimiter::new(redis, config.auth.rate_limit_enabled);

        let jwt = JwtService::new(&jwt_secret(&config)?, config.access_token_duration());
        let cookies = CookiePolicy::new(
            config.auth.secure_cookies,
            config.access_token_duration().as_secs() as i64,
            config.refresh_token_duration().as_secs() as i64,
        );

        let cipher = Arc::new(field_cipher(&config)?);
        let hasher = PasswordHasher::new()?;
        let notifier = email_service::notifier_from_env();
        let audit = AuditRecorder::new(repos.audit_logs.clone());

        let auth = AuthService::new(
            repos.clone(),
            store.clone(),
            hasher.clone(),
            jwt.clone(),
            Arc::clone(&notifier),
            audit.clone(),
            config.auth.verification_code_ttl,
            config.refresh_token_duration().as_secs(),
        );
        let account = AccountService::new(
            repos.clone(),
            store.clone(),
            hasher,
            cipher,
            notifier,
            audit,
            config.auth.password_history_depth,
        );

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            repos,
            store,
            jwt,
            cookies,
            rate_limiter,
            auth,
            account,
        })
    }
}

fn jwt_secret(config: &ServerConfig) -> anyhow::Result<String> {
    let secret = config.auth.jwt_secret.clone();
    if secret == "change-me-in-production" {
        if config.is_production() {
            anyhow::bail!("JWT_SECRET must be set in production");
        }
        warn!("Using the default JWT secret; set JWT_SECRET for anything beyond local development");
    }
    Ok(secret)
}

fn field_cipher(config: &ServerConfig) -> anyhow::Result<FieldCipher> {
    match config.encryption.field_key.as_deref() {
        Some(key) => FieldCipher::from_base64(key).context("Invalid field encryption key"),
        None if config.is_production() => {
            anyhow::bail!("FIELD_ENCRYPTION_KEY must be set in production")
        }
        None => {
            warn!(
                "No field encryption key configured; generated an ephemeral key. \
                 Encrypted profile data will be unrecoverable after a restart"
            );
            Ok(FieldCipher::new(FieldCipher::generate_key())?)
        }
    }
}
