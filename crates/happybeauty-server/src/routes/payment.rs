//! Payment order endpoints and the provider notification webhook.

use std::str::FromStr;

use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use happybeauty_crypto::CallbackParams;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::extract::JsonBody;
use crate::models::{Order, OrderStatus};
use crate::orders::NotifyAck;
use crate::state::AppState;

/// An amount sent either as a JSON number or a decimal string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(serde_json::Number),
    Text(String),
}

impl AmountInput {
    /// Parses through the decimal text so `9.9` stays exactly 9.9.
    fn to_decimal(&self) -> Result<BigDecimal, AppError> {
        let text = match self {
            AmountInput::Number(n) => n.to_string(),
            AmountInput::Text(s) => s.trim().to_string(),
        };
        BigDecimal::from_str(&text)
            .map_err(|e| AppError::BadRequest(format!("Invalid amount format: {}", e)))
    }
}

/// Request body for creating a payment order.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Amount to charge in CNY.
    pub amount: AmountInput,
    /// Credits granted once the payment is confirmed.
    pub credits: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    /// Provider checkout page to redirect the buyer to.
    pub pay_url: String,
}

/// Order status as seen by its owner.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    pub order_id: String,
    pub status: OrderStatus,
    pub amount: String,
    pub credits: i32,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<Order> for OrderStatusResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.out_trade_no,
            status: order.status,
            amount: crate::gateway::format_amount(&order.amount),
            credits: order.credits_to_add,
            created_at: order.created_at,
            paid_at: order.paid_at,
        }
    }
}

/// Creates the authenticated payment router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/payment/alipay/create", post(create_order))
        .route("/payment/orders/{order_id}", get(get_order))
        .with_state(state)
}

/// Creates the provider webhook router. It is mounted outside the request
/// deadline so processing always runs to completion.
pub fn notify_router(state: AppState) -> Router {
    Router::new()
        .route("/payment/alipay/notify", post(alipay_notify))
        .with_state(state)
}

/// POST /api/v1/payment/alipay/create
///
/// Creates a PENDING order and returns the provider checkout URL.
async fn create_order(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(request): JsonBody<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, AppError> {
    let amount = request.amount.to_decimal()?;

    // Orders need an owner account to credit.
    state.credits.balance(auth.user_id, state.today()).await?;

    let created = state
        .orders
        .create_order(auth.user_id, amount, request.credits)
        .await?;

    Ok(Json(CreateOrderResponse {
        order_id: created.order.out_trade_no,
        pay_url: created.pay_url,
    }))
}

/// GET /api/v1/payment/orders/{order_id}
async fn get_order(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(order_id): Path<String>,
) -> Result<Json<OrderStatusResponse>, AppError> {
    let order = state
        .orders
        .find_order(&order_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;

    Ok(Json(order.into()))
}

/// POST /api/v1/payment/alipay/notify
///
/// Form-encoded provider notification. Always answers with the plain-text
/// token `success` or `failure`, never an error body.
async fn alipay_notify(State(state): State<AppState>, body: Bytes) -> &'static str {
    let body = match std::str::from_utf8(&body) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(error = %e, "Payment notification body is not UTF-8");
            return NotifyAck::Failure.as_str();
        }
    };
    let fields: Vec<(String, String)> = match serde_urlencoded::from_str(body) {
        Ok(fields) => fields,
        Err(e) => {
            tracing::warn!(error = %e, "Unparsable payment notification body");
            return NotifyAck::Failure.as_str();
        }
    };
    let params: CallbackParams = fields.into_iter().collect();

    // Detached so a provider disconnect cannot cancel a confirmation mid-flight.
    let orders = state.orders.clone();
    let ack = tokio::spawn(async move { orders.handle_notification(params).await })
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Payment notification task failed");
            NotifyAck::Failure
        });

    ack.as_str()
}
