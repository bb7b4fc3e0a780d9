//! System config administration.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::auth::AdminUser;
use crate::config_store::ConfigItem;
use crate::error::AppError;
use crate::extract::JsonBody;
use crate::models::ConfigUpdate;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UpdateConfigResponse {
    pub updated: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/admin/config", get(get_config))
        .route("/admin/config/update", post(update_config))
        .with_state(state)
}

/// GET /api/v1/admin/config
async fn get_config(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<ConfigItem>>, AppError> {
    let items = state.config.list_all().await?;
    Ok(Json(items))
}

/// POST /api/v1/admin/config/update
///
/// Upserts every item, then invalidates the config cache.
async fn update_config(
    State(state): State<AppState>,
    admin: AdminUser,
    JsonBody(items): JsonBody<Vec<ConfigUpdate>>,
) -> Result<Json<UpdateConfigResponse>, AppError> {
    state.config.update(&items).await?;

    tracing::info!(
        admin_id = %admin.profile.id,
        keys = ?items.iter().map(|i| i.key.as_str()).collect::<Vec<_>>(),
        "Config updated by admin"
    );

    Ok(Json(UpdateConfigResponse {
        updated: items.len(),
    }))
}
