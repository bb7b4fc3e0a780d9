//! HappyBeauty Server - credit ledger API
//!
//! Payment orders confirmed by provider webhooks, redeem codes and
//! referrals all mutate a per-user credit balance; each external event
//! changes the balance at most once.

pub mod auth;
pub mod config;
pub mod config_store;
pub mod credits;
pub mod db;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod models;
pub mod orders;
pub mod redeem;
pub mod referral;
pub mod retry;
pub mod routes;
pub mod state;
pub mod store;

pub use error::AppError;
pub use routes::create_router;
pub use state::{AppState, Clock};
