//! Payment provider client: signed page-pay redirect URLs and callback
//! authentication.
//!
//! Building a URL is pure computation over a [`ProviderSettings`] snapshot;
//! nothing here touches the ledger.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use happybeauty_crypto::{CallbackParams, ParamSigner, SignType, SIGN_FIELD, SIGN_TYPE_FIELD};
use serde::Serialize;

use crate::config_store::ProviderSettings;

pub const PRODUCTION_GATEWAY: &str = "https://openapi.alipay.com/gateway.do";
pub const SANDBOX_GATEWAY: &str = "https://openapi-sandbox.dl.alipaydev.com/gateway.do";

const PAGE_PAY_METHOD: &str = "alipay.trade.page.pay";
const PRODUCT_CODE: &str = "FAST_INSTANT_TRADE_PAY";

/// Provider timestamps are China Standard Time.
const PROVIDER_UTC_OFFSET_HOURS: i64 = 8;

/// Trade statuses that mean the buyer paid.
pub const PAID_TRADE_STATUSES: [&str; 2] = ["TRADE_SUCCESS", "TRADE_FINISHED"];

/// Errors building a provider request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Payment provider setting is missing: {0}")]
    NotConfigured(&'static str),

    #[error("Unsupported sign type: {0}")]
    UnsupportedSignType(String),

    #[error("Invalid merchant signing key: {0}")]
    InvalidSigningKey(String),

    #[error("Failed to sign provider request: {0}")]
    Signing(String),

    #[error("Failed to encode provider request: {0}")]
    Encoding(String),
}

#[derive(Debug, Serialize)]
struct BizContent<'a> {
    out_trade_no: &'a str,
    total_amount: String,
    subject: String,
    product_code: &'a str,
}

/// Order subject shown on the provider's checkout page.
pub fn subject_for(credits: i32) -> String {
    format!("能量充值 - {}次", credits)
}

/// Amount as the provider expects it: exactly two decimal places.
pub fn format_amount(amount: &BigDecimal) -> String {
    amount.with_scale(2).to_string()
}

pub fn gateway_url(settings: &ProviderSettings) -> &'static str {
    if settings.debug {
        SANDBOX_GATEWAY
    } else {
        PRODUCTION_GATEWAY
    }
}

/// Scheme named by the `alipay_sign_type` setting. Blank means the default.
pub fn configured_sign_type(settings: &ProviderSettings) -> Result<SignType, GatewayError> {
    let value = settings.sign_type.trim();
    if value.is_empty() {
        return Ok(SignType::default());
    }
    value
        .parse()
        .map_err(|_| GatewayError::UnsupportedSignType(value.to_string()))
}

fn require<'a>(value: &'a str, name: &'static str) -> Result<&'a str, GatewayError> {
    if value.trim().is_empty() {
        Err(GatewayError::NotConfigured(name))
    } else {
        Ok(value.trim())
    }
}

/// Builds the signed redirect URL for a page-pay checkout.
pub fn build_page_pay_url(
    settings: &ProviderSettings,
    out_trade_no: &str,
    amount: &BigDecimal,
    credits: i32,
    now: DateTime<Utc>,
) -> Result<String, GatewayError> {
    let sign_type = configured_sign_type(settings)?;
    let app_id = require(&settings.app_id, "alipay_app_id")?;
    let notify_url = require(&settings.notify_url, "alipay_notify_url")?;
    let private_key = require(&settings.app_private_key, "alipay_app_private_key")?;

    let signer = ParamSigner::from_base64(sign_type, private_key)
        .map_err(|e| GatewayError::InvalidSigningKey(e.to_string()))?;

    let biz_content = serde_json::to_string(&BizContent {
        out_trade_no,
        total_amount: format_amount(amount),
        subject: subject_for(credits),
        product_code: PRODUCT_CODE,
    })
    .map_err(|e| GatewayError::Encoding(e.to_string()))?;

    let timestamp = (now.naive_utc() + Duration::hours(PROVIDER_UTC_OFFSET_HOURS))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();

    let mut params = CallbackParams::new();
    params.insert("app_id", app_id);
    params.insert("method", PAGE_PAY_METHOD);
    params.insert("format", "JSON");
    params.insert("charset", "utf-8");
    params.insert(SIGN_TYPE_FIELD, sign_type.as_str());
    params.insert("timestamp", timestamp);
    params.insert("version", "1.0");
    params.insert("notify_url", notify_url);
    if !settings.return_url.trim().is_empty() {
        params.insert("return_url", settings.return_url.trim());
    }
    params.insert("biz_content", biz_content);

    let signature = signer
        .sign_request(&params)
        .map_err(|e| GatewayError::Signing(e.to_string()))?;
    params.insert(SIGN_FIELD, signature);

    let query =
        serde_urlencoded::to_string(&params).map_err(|e| GatewayError::Encoding(e.to_string()))?;

    Ok(format!("{}?{}", gateway_url(settings), query))
}

/// Authenticates provider fields against the configured public key.
///
/// `params` must already have `sign` removed. The scheme comes from
/// `alipay_sign_type`; an unknown scheme never verifies.
pub fn verify_notification(settings: &ProviderSettings, params: &CallbackParams, signature: &str) -> bool {
    match configured_sign_type(settings) {
        Ok(sign_type) => happybeauty_crypto::verify_notification(
            sign_type,
            settings.public_key.trim(),
            params,
            signature,
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Cannot verify notification");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use happybeauty_crypto::{encode_signing_key, encode_verifying_key, generate_keypair};
    use std::collections::BTreeMap;
    use std::str::FromStr;

    const MERCHANT_KEY: &str = include_str!("../../../fixtures/keys/merchant_rsa2.key");
    const MERCHANT_PUB: &str = include_str!("../../../fixtures/keys/merchant_rsa2.pub");

    #[derive(serde::Deserialize)]
    struct RequestVector {
        private_key_pkcs8_base64: String,
        request_signature_base64: String,
    }

    fn settings(debug: bool) -> ProviderSettings {
        ProviderSettings {
            app_id: "2021000000000001".to_string(),
            app_private_key: MERCHANT_KEY.to_string(),
            // Lets the tests check our own request signature.
            public_key: MERCHANT_PUB.to_string(),
            sign_type: "RSA2".to_string(),
            debug,
            notify_url: "https://api.example.com/api/v1/payment/alipay/notify".to_string(),
            return_url: String::new(),
        }
    }

    fn ed25519_settings() -> ProviderSettings {
        let (signing_key, verifying_key) = generate_keypair();
        ProviderSettings {
            app_private_key: encode_signing_key(&signing_key),
            public_key: encode_verifying_key(&verifying_key),
            sign_type: "ED25519".to_string(),
            ..settings(false)
        }
    }

    fn query_of(url: &str) -> BTreeMap<String, String> {
        let (_, query) = url.split_once('?').unwrap();
        serde_urlencoded::from_str(query).unwrap()
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-28T02:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn request_signature_ok(settings: &ProviderSettings, url: &str) -> bool {
        let sign_type = configured_sign_type(settings).unwrap();
        let (params, signature) = CallbackParams::from(query_of(url)).take_signature();
        happybeauty_crypto::ParamVerifier::from_base64(sign_type, &settings.public_key)
            .unwrap()
            .verify_request(&params, &signature.unwrap())
            .is_ok()
    }

    #[test]
    fn test_format_amount_two_decimals() {
        assert_eq!(format_amount(&BigDecimal::from_str("9.9").unwrap()), "9.90");
        assert_eq!(format_amount(&BigDecimal::from(30)), "30.00");
    }

    #[test]
    fn test_page_pay_url_is_signed() {
        let settings = settings(false);
        let amount = BigDecimal::from_str("9.90").unwrap();
        let url = build_page_pay_url(&settings, "PAY_abc", &amount, 10, now()).unwrap();

        assert!(url.starts_with(PRODUCTION_GATEWAY));
        let query = query_of(&url);
        assert_eq!(query["method"], "alipay.trade.page.pay");
        assert_eq!(query["sign_type"], "RSA2");
        assert_eq!(query["timestamp"], "2026-01-28 10:30:00");
        assert!(!query.contains_key("return_url"));

        let biz: serde_json::Value = serde_json::from_str(&query["biz_content"]).unwrap();
        assert_eq!(biz["out_trade_no"], "PAY_abc");
        assert_eq!(biz["total_amount"], "9.90");
        assert_eq!(biz["subject"], "能量充值 - 10次");
        assert_eq!(biz["product_code"], "FAST_INSTANT_TRADE_PAY");

        assert!(request_signature_ok(&settings, &url));
    }

    #[test]
    fn test_rsa2_request_matches_golden_signature() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures/rsa2_golden_vectors.json");
        let golden: RequestVector =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        let settings = ProviderSettings {
            app_private_key: golden.private_key_pkcs8_base64,
            ..settings(false)
        };

        let amount = BigDecimal::from_str("9.90").unwrap();
        let url = build_page_pay_url(
            &settings,
            "PAY_3f2a9c1d7e8b4a6f0c5d2e1b9a8f7c6d",
            &amount,
            10,
            now(),
        )
        .unwrap();

        assert_eq!(query_of(&url)["sign"], golden.request_signature_base64);
    }

    #[test]
    fn test_ed25519_remains_available() {
        let settings = ed25519_settings();
        let url = build_page_pay_url(&settings, "PAY_abc", &BigDecimal::from(1), 1, now()).unwrap();

        assert_eq!(query_of(&url)["sign_type"], "ED25519");
        assert!(request_signature_ok(&settings, &url));
    }

    #[test]
    fn test_blank_sign_type_defaults_to_rsa2() {
        let mut settings = settings(false);
        settings.sign_type = "  ".to_string();
        assert_eq!(configured_sign_type(&settings).unwrap(), SignType::Rsa2);

        let url = build_page_pay_url(&settings, "PAY_abc", &BigDecimal::from(1), 1, now()).unwrap();
        assert_eq!(query_of(&url)["sign_type"], "RSA2");
    }

    #[test]
    fn test_notification_verified_with_configured_scheme() {
        let settings = settings(false);
        let signer = ParamSigner::from_base64(SignType::Rsa2, MERCHANT_KEY).unwrap();
        let params: CallbackParams = [
            ("out_trade_no", "PAY_abc"),
            ("trade_status", "TRADE_SUCCESS"),
            ("sign_type", "RSA2"),
        ]
        .into_iter()
        .collect();
        let signature = signer.sign_notification(&params).unwrap();

        assert!(verify_notification(&settings, &params, &signature));

        let mut other = settings.clone();
        other.sign_type = "ED25519".to_string();
        assert!(!verify_notification(&other, &params, &signature));
    }

    #[test]
    fn test_debug_uses_sandbox() {
        let settings = settings(true);
        let url = build_page_pay_url(&settings, "PAY_abc", &BigDecimal::from(1), 1, now()).unwrap();
        assert!(url.starts_with(SANDBOX_GATEWAY));
    }

    #[test]
    fn test_missing_app_id() {
        let mut settings = settings(false);
        settings.app_id = String::new();
        let result = build_page_pay_url(&settings, "PAY_abc", &BigDecimal::from(1), 1, now());
        assert!(matches!(result, Err(GatewayError::NotConfigured("alipay_app_id"))));
    }

    #[test]
    fn test_unknown_sign_type_rejected() {
        let mut settings = settings(false);
        settings.sign_type = "RSA".to_string();

        let result = build_page_pay_url(&settings, "PAY_abc", &BigDecimal::from(1), 1, now());
        assert!(matches!(result, Err(GatewayError::UnsupportedSignType(ref s)) if s == "RSA"));

        let params: CallbackParams = [("out_trade_no", "PAY_abc")].into_iter().collect();
        assert!(!verify_notification(&settings, &params, "c2ln"));
    }

    #[test]
    fn test_invalid_private_key() {
        let mut settings = settings(false);
        settings.app_private_key = "not-a-key".to_string();
        let result = build_page_pay_url(&settings, "PAY_abc", &BigDecimal::from(1), 1, now());
        assert!(matches!(result, Err(GatewayError::InvalidSigningKey(_))));
    }

    #[test]
    fn test_ed25519_key_under_rsa2_is_invalid() {
        let mut settings = settings(false);
        settings.app_private_key = ed25519_settings().app_private_key;
        let result = build_page_pay_url(&settings, "PAY_abc", &BigDecimal::from(1), 1, now());
        assert!(matches!(result, Err(GatewayError::InvalidSigningKey(_))));
    }
}
