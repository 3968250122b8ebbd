use axum::{
    Json,
    extract::State,
    http::header,
    response::IntoResponse,
};
use comarca_core::{Grau, Sistema, TribunalConfig};
use serde::Serialize;

use crate::{errors::ApiResponse, state::AppState};

// The catalog is static per process; intermediaries may cache briefly and
// serve stale while revalidating.
const CATALOG_CACHE_CONTROL: &str = "max-age=300, stale-while-revalidate=3600";

#[derive(Debug, Serialize)]
pub struct TribunalDto {
    pub id: String,
    pub code: String,
    pub sistema: Sistema,
    pub grau: Grau,
    pub name: String,
    pub uf: String,
    pub url: String,
}

impl From<&TribunalConfig> for TribunalDto {
    fn from(config: &TribunalConfig) -> Self {
        Self {
            id: config.id.to_string(),
            code: config.id.code.clone(),
            sistema: config.id.sistema,
            grau: config.id.grau,
            name: config.name.clone(),
            uf: config.uf.clone(),
            url: config.url.clone(),
        }
    }
}

/// Ordered tribunal catalog for target selection.
pub async fn list_tribunals_handler(
    State(state): State<AppState>,
) -> impl IntoResponse {
    let tribunals: Vec<TribunalDto> =
        state.registry.list().iter().map(TribunalDto::from).collect();
    (
        [(header::CACHE_CONTROL, CATALOG_CACHE_CONTROL)],
        Json(ApiResponse::success(tribunals)),
    )
}
