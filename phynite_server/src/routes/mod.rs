//! Route handlers for the signup service

pub mod admin;
pub mod extract;
pub mod signup;

use crate::{
    abuse::RateLimiter, cache::ProductCache, config::Config, session::FormSigner,
    settings::SettingsStore, stewie::StewieClient,
};
use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::IntoResponse,
    routing::get,
    Router,
};
use phynite_common::constants::{ADMIN_PREFIX, SIGNUP_PREFIX};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub settings: SettingsStore,
    pub rate_limiter: RateLimiter,
    pub stewie: StewieClient,
    pub products: Arc<ProductCache>,
    pub signer: FormSigner,
    /// Present when running against PostgreSQL
    pub db: Option<PgPool>,
}

impl AppState {
    pub fn new(
        config: Config,
        settings: SettingsStore,
        rate_limiter: RateLimiter,
        db: Option<PgPool>,
    ) -> Result<Self, reqwest::Error> {
        let signer = FormSigner::new(config.form_secret.clone());
        Ok(Self {
            config: Arc::new(config),
            settings,
            rate_limiter,
            stewie: StewieClient::new()?,
            products: Arc::new(ProductCache::new()),
            signer,
            db,
        })
    }
}

/// Build the full router
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest(SIGNUP_PREFIX, signup::router())
        .nest(ADMIN_PREFIX, admin::router())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let storage = match &state.db {
        Some(pool) => sqlx::query("SELECT 1")
            .fetch_one(pool)
            .await
            .map(|_| "ok")
            .unwrap_or("error"),
        None => "memory",
    };

    let status = if storage == "error" { "degraded" } else { "healthy" };

    axum::Json(serde_json::json!({
        "status": status,
        "storage": storage,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
