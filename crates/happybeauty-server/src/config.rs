//! Deployment settings read from the environment.

use std::net::SocketAddr;

use anyhow::{Context, Result};

use crate::config_store::ConfigKey;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// Process-level settings. Provider keys here are only defaults; persisted
/// config overrides them at runtime.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// HS256 secret shared with the identity provider.
    pub jwt_secret: String,
    /// Expected `aud` claim of bearer tokens.
    pub jwt_audience: String,
    /// Deployment defaults for config keys, in `ConfigKey::ALL` order.
    pub config_defaults: Vec<(ConfigKey, String)>,
}

impl Settings {
    /// Loads settings, reading a `.env` file first if one exists.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads settings through `lookup`, which returns a variable's value if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret =
            lookup("SUPABASE_JWT_SECRET").context("SUPABASE_JWT_SECRET must be set")?;
        let jwt_audience = lookup("JWT_AUDIENCE").unwrap_or_else(|| "authenticated".to_string());

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("BIND_ADDR must be a socket address")?;

        let config_defaults = ConfigKey::ALL
            .iter()
            .map(|key| {
                let value = lookup(key.env_var()).unwrap_or_else(|| key.builtin_default().to_string());
                (*key, value)
            })
            .collect();

        Ok(Self {
            database_url,
            bind_addr,
            jwt_secret,
            jwt_audience,
            config_defaults,
        })
    }
}
