//! System config key/value model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A persisted config override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One item of an admin config write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl ConfigUpdate {
    pub fn into_entry(self, updated_at: DateTime<Utc>) -> ConfigEntry {
        ConfigEntry {
            key: self.key,
            value: self.value,
            description: self.description,
            updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_update_description_optional() {
        let update: ConfigUpdate =
            serde_json::from_str(r#"{"key":"alipay_debug","value":"false"}"#).unwrap();
        assert_eq!(update.key, "alipay_debug");
        assert!(update.description.is_none());
    }
}
