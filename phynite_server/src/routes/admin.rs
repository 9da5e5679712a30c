//! Admin routes for settings and maintenance

use crate::{
    error::ApiError,
    routes::{extract::AdminAuth, AppState},
};
use axum::{
    extract::State,
    routing::{delete, get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use phynite_common::{CleanupResponse, Settings};

/// Build the admin router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/settings", get(get_settings).put(update_settings))
        .route("/rate-limits/cleanup", post(cleanup_rate_limits))
        .route("/products-cache", delete(clear_products_cache))
}

/// Current settings with the API key masked
async fn get_settings(State(state): State<AppState>, _admin: AdminAuth) -> Result<Json<Settings>, ApiError> {
    Ok(Json(state.settings.load().await?.masked()))
}

/// Replace settings; invalid values are sanitized rather than rejected
async fn update_settings(
    State(state): State<AppState>,
    _admin: AdminAuth,
    WithRejection(Json(candidate), _): WithRejection<Json<Settings>, ApiError>,
) -> Result<Json<Settings>, ApiError> {
    let previous = state.settings.load().await?;
    let updated = state.settings.update(candidate).await?;

    if previous.api_key != updated.api_key || previous.api_base_url() != updated.api_base_url() {
        let dropped = state.products.invalidate();
        tracing::debug!(dropped, "Upstream changed, product cache cleared");
    }

    tracing::info!(
        environment = updated.environment.as_str(),
        rate_limit = updated.rate_limit,
        "Settings updated"
    );

    Ok(Json(updated.masked()))
}

async fn cleanup_rate_limits(
    State(state): State<AppState>,
    _admin: AdminAuth,
) -> Result<Json<CleanupResponse>, ApiError> {
    let removed = state.rate_limiter.cleanup(Utc::now()).await?;
    Ok(Json(CleanupResponse { success: true, removed }))
}

async fn clear_products_cache(State(state): State<AppState>, _admin: AdminAuth) -> Json<CleanupResponse> {
    let removed = state.products.invalidate() as u64;
    Json(CleanupResponse { success: true, removed })
}
