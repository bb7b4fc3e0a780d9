//! Parameter maps exchanged with the payment provider.
//!
//! Both directions (our signed page-pay request and the provider's
//! asynchronous notification) are flat string-to-string maps. A `BTreeMap`
//! keeps them ordered by key, which is the order the canonical form needs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// Name of the parameter carrying the base64 signature.
pub const SIGN_FIELD: &str = "sign";

/// Name of the parameter naming the signature algorithm.
pub const SIGN_TYPE_FIELD: &str = "sign_type";

/// SHA256withRSA, the provider's standard scheme.
pub const SIGN_TYPE_RSA2: &str = "RSA2";

/// Ed25519, used by sandboxes and local tooling.
pub const SIGN_TYPE_ED25519: &str = "ED25519";

/// Signature scheme named by a `sign_type` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignType {
    #[default]
    Rsa2,
    Ed25519,
}

impl SignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignType::Rsa2 => SIGN_TYPE_RSA2,
            SignType::Ed25519 => SIGN_TYPE_ED25519,
        }
    }
}

impl fmt::Display for SignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.eq_ignore_ascii_case(SIGN_TYPE_RSA2) {
            Ok(SignType::Rsa2)
        } else if value.eq_ignore_ascii_case(SIGN_TYPE_ED25519) {
            Ok(SignType::Ed25519)
        } else {
            Err(anyhow!("Unsupported sign_type: '{}'", value))
        }
    }
}

/// Flat provider parameters, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackParams(BTreeMap<String, String>);

impl CallbackParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Splits off the `sign` parameter, returning the remaining fields and
    /// the signature (if one was present).
    pub fn take_signature(mut self) -> (Self, Option<String>) {
        let signature = self.0.remove(SIGN_FIELD);
        (self, signature)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, String>> for CallbackParams {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl From<std::collections::HashMap<String, String>> for CallbackParams {
    fn from(map: std::collections::HashMap<String, String>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallbackParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
