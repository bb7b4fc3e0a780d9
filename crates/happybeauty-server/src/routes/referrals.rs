//! Referral status for the share screen.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::referral::DAILY_REFERRAL_CAP;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStatusResponse {
    /// Device id to embed in the invite link.
    pub device_id: String,
    pub referrals_today: i32,
    pub max_referrals_per_day: i32,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/referrals/status", get(referral_status))
        .with_state(state)
}

/// GET /api/v1/referrals/status
async fn referral_status(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ReferralStatusResponse>, AppError> {
    let profile = state.credits.balance(auth.user_id, state.today()).await?;

    Ok(Json(ReferralStatusResponse {
        device_id: profile.device_id,
        referrals_today: profile.referrals_today,
        max_referrals_per_day: DAILY_REFERRAL_CAP,
    }))
}
