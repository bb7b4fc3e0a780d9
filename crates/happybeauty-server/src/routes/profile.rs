//! Credit account creation and retrieval.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::credits::NewAccount;
use crate::error::AppError;
use crate::extract::JsonBody;
use crate::models::UserProfile;
use crate::state::AppState;

const MAX_NICKNAME_CHARS: usize = 32;
const MAX_DEVICE_ID_CHARS: usize = 128;

/// Request body for creating the caller's credit account.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileRequest {
    pub nickname: String,
    pub device_id: String,
    /// Device id from the invite link the user arrived through.
    #[serde(default)]
    pub referrer_device_id: Option<String>,
}

fn required(value: &str, field: &str, max_chars: usize) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    if value.chars().count() > max_chars {
        return Err(AppError::BadRequest(format!(
            "{} must be at most {} characters",
            field, max_chars
        )));
    }
    Ok(value.to_string())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/profile", get(get_profile).post(create_profile))
        .with_state(state)
}

/// POST /api/v1/profile
async fn create_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(request): JsonBody<CreateProfileRequest>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    let account = NewAccount {
        user_id: auth.user_id,
        nickname: required(&request.nickname, "nickname", MAX_NICKNAME_CHARS)?,
        device_id: required(&request.device_id, "deviceId", MAX_DEVICE_ID_CHARS)?,
        referrer_device_id: request.referrer_device_id,
    };

    let profile = state.credits.create_account(account, state.today()).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// GET /api/v1/profile
async fn get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UserProfile>, AppError> {
    let profile = state.credits.balance(auth.user_id, state.today()).await?;
    Ok(Json(profile))
}
