//! Credit spending, redeem codes and balance history.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::credits::DEFAULT_DEBIT;
use crate::error::AppError;
use crate::extract::JsonBody;
use crate::models::CreditEvent;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct DebitRequest {
    /// Credits to spend; defaults to one.
    #[serde(default)]
    pub amount: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub credits: i32,
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    pub credits: i32,
    pub credits_added: i32,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/credits/debit", post(debit))
        .route("/credits/redeem", post(redeem))
        .route("/credits/history", get(history))
        .with_state(state)
}

/// POST /api/v1/credits/debit
///
/// Spends credits for one feature use. 402 when the balance is too low.
async fn debit(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(request): JsonBody<DebitRequest>,
) -> Result<Json<BalanceResponse>, AppError> {
    let amount = request.amount.unwrap_or(DEFAULT_DEBIT);
    if amount <= 0 {
        return Err(AppError::BadRequest("amount must be positive".to_string()));
    }

    let credits = state.credits.debit(auth.user_id, amount).await?;
    Ok(Json(BalanceResponse { credits }))
}

/// POST /api/v1/credits/redeem
async fn redeem(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(request): JsonBody<RedeemRequest>,
) -> Result<Json<RedeemResponse>, AppError> {
    let (credits_added, credits) = state
        .redeem
        .redeem(&request.code, auth.user_id, state.today())
        .await?;

    Ok(Json(RedeemResponse {
        credits,
        credits_added,
    }))
}

/// GET /api/v1/credits/history?limit=N
///
/// Most recent balance changes, newest first.
async fn history(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<CreditEvent>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let events = state.credits.history(auth.user_id, limit).await?;
    Ok(Json(events))
}
