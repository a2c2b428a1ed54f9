// HTTP surface: Prometheus scrape endpoint and runtime configuration

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;

use crate::config::{ConfigRecord, ConfigStore};
use crate::error::CupsError;
use crate::metrics::{LoadFactorCfg, LoadFactors};
use crate::orchestrator::ServiceHandle;
use crate::prom::CupsMetricExporter;

pub struct AppState {
    pub handle: ServiceHandle,
    pub exporter: Option<Arc<CupsMetricExporter>>,
    pub store: ConfigStore,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/config", get(get_config).patch(patch_config))
        .route("/load-factors", get(get_load_factors))
        .with_state(state)
}

pub struct ApiError(CupsError);

impl From<CupsError> for ApiError {
    fn from(e: CupsError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CupsError::InvalidConfiguration(_) => StatusCode::BAD_REQUEST,
            CupsError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct LoadFactorsView {
    pub mode: LoadFactorCfg,
    #[serde(rename = "static")]
    pub static_factors: LoadFactors,
    #[serde(rename = "dynamic")]
    pub dynamic_factors: Option<LoadFactors>,
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Some(exporter) = &state.exporter {
        exporter.collect();
    }
    crate::gather_metrics!(buffer, encoder, state.exporter, "CUPS");

    let content_type = encoder.format_type().to_string();
    (
        [("Content-Type", content_type)],
        String::from_utf8(buffer).unwrap_or_default(),
    )
}

async fn get_config(State(state): State<Arc<AppState>>) -> Json<ConfigRecord> {
    Json(ConfigRecord::from(&state.handle.config()))
}

/// Validate, persist, then apply; a rejected update changes nothing
async fn patch_config(
    State(state): State<Arc<AppState>>,
    Json(update): Json<ConfigRecord>,
) -> Result<Json<ConfigRecord>, ApiError> {
    let config = state.handle.config().merged(&update).map_err(|e| {
        tracing::warn!("Rejected configuration update {:?}: {}", update, e);
        e
    })?;

    state.store.save(&config)?;
    state.handle.apply(config).await?;
    tracing::info!("Configuration updated: {:?}", config);

    Ok(Json(ConfigRecord::from(&config)))
}

async fn get_load_factors(State(state): State<Arc<AppState>>) -> Json<LoadFactorsView> {
    let status = state.handle.status();
    Json(LoadFactorsView {
        mode: status.config.load_factor_cfg,
        static_factors: status.config.static_load_factors,
        dynamic_factors: status.dynamic_load_factors,
    })
}
