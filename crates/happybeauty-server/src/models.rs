//! Database models for orders, credit accounts, redeem codes and config.

pub mod config_entry;
pub mod credit_event;
pub mod order;
pub mod redeem_code_usage;
pub mod user_profile;

pub use config_entry::{ConfigEntry, ConfigUpdate};
pub use credit_event::{CreditEvent, CreditReason, NewCreditEvent};
pub use order::{NewOrder, Order, OrderStatus};
pub use redeem_code_usage::{NewRedeemCodeUsage, RedeemCodeUsage};
pub use user_profile::{NewUserProfile, UserProfile};
