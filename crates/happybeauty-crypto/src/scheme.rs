// Signing and verification selected by `sign_type`
//
// The merchant key signs outgoing requests; the provider key verifies
// incoming notifications. Both are configured as base64 strings together
// with the scheme they belong to.

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::canonical::{canonical_bytes, request_canonical_bytes};
use crate::keys::{signing_key_from_base64, verifying_key_from_base64};
use crate::rsa2::{
    rsa2_private_key_from_base64, rsa2_public_key_from_base64, sign_rsa2, verify_rsa2,
};
use crate::types::{CallbackParams, SignType};
use crate::verify::{check_sign_type, verify_ed25519};

/// A private key able to sign provider parameters.
pub enum ParamSigner {
    Rsa2(Box<RsaPrivateKey>),
    Ed25519(SigningKey),
}

impl ParamSigner {
    /// Parses `encoded` as a private key of the given scheme.
    pub fn from_base64(sign_type: SignType, encoded: &str) -> Result<Self> {
        match sign_type {
            SignType::Rsa2 => Ok(Self::Rsa2(Box::new(rsa2_private_key_from_base64(encoded)?))),
            SignType::Ed25519 => Ok(Self::Ed25519(signing_key_from_base64(encoded)?)),
        }
    }

    pub fn sign_type(&self) -> SignType {
        match self {
            Self::Rsa2(_) => SignType::Rsa2,
            Self::Ed25519(_) => SignType::Ed25519,
        }
    }

    /// Base64 signature over raw bytes.
    pub fn sign_bytes(&self, message: &[u8]) -> Result<String> {
        match self {
            Self::Rsa2(key) => sign_rsa2(key, message),
            Self::Ed25519(key) => Ok(BASE64_STANDARD.encode(key.sign(message).to_bytes())),
        }
    }

    /// Signs a request to the provider (`sign_type` is covered).
    pub fn sign_request(&self, params: &CallbackParams) -> Result<String> {
        self.sign_bytes(&request_canonical_bytes(params))
    }

    /// Signs a notification, playing the provider.
    pub fn sign_notification(&self, params: &CallbackParams) -> Result<String> {
        self.sign_bytes(&canonical_bytes(params))
    }
}

/// A public key able to check provider parameters.
pub enum ParamVerifier {
    Rsa2(RsaPublicKey),
    Ed25519(VerifyingKey),
}

impl ParamVerifier {
    /// Parses `encoded` as a public key of the given scheme.
    pub fn from_base64(sign_type: SignType, encoded: &str) -> Result<Self> {
        match sign_type {
            SignType::Rsa2 => Ok(Self::Rsa2(rsa2_public_key_from_base64(encoded)?)),
            SignType::Ed25519 => Ok(Self::Ed25519(verifying_key_from_base64(encoded)?)),
        }
    }

    pub fn sign_type(&self) -> SignType {
        match self {
            Self::Rsa2(_) => SignType::Rsa2,
            Self::Ed25519(_) => SignType::Ed25519,
        }
    }

    pub fn verify_bytes(&self, message: &[u8], signature: &str) -> Result<()> {
        match self {
            Self::Rsa2(key) => verify_rsa2(key, message, signature),
            Self::Ed25519(key) => verify_ed25519(key, message, signature),
        }
    }

    /// Checks a notification. `params` must have `sign` removed; a
    /// `sign_type` field, if present, must name this key's scheme.
    pub fn verify_notification(&self, params: &CallbackParams, signature: &str) -> Result<()> {
        check_sign_type(params, self.sign_type())?;
        self.verify_bytes(&canonical_bytes(params), signature)
    }

    /// Checks a request signature as the provider would.
    pub fn verify_request(&self, params: &CallbackParams, signature: &str) -> Result<()> {
        check_sign_type(params, self.sign_type())?;
        self.verify_bytes(&request_canonical_bytes(params), signature)
    }
}

/// Boolean notification check against a base64 public key of `sign_type`.
///
/// Never errors: a malformed key or signature is simply `false`.
pub fn verify_notification(
    sign_type: SignType,
    public_key_base64: &str,
    params: &CallbackParams,
    signature: &str,
) -> bool {
    ParamVerifier::from_base64(sign_type, public_key_base64)
        .and_then(|verifier| verifier.verify_notification(params, signature))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{encode_signing_key, encode_verifying_key};

    const PROVIDER_KEY: &str = include_str!("../../../fixtures/keys/provider_rsa2.key");
    const PROVIDER_PUB: &str = include_str!("../../../fixtures/keys/provider_rsa2.pub");

    fn notification(sign_type: &str) -> CallbackParams {
        [
            ("out_trade_no", "PAY_0001"),
            ("total_amount", "9.90"),
            ("trade_status", "TRADE_SUCCESS"),
            ("sign_type", sign_type),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_rsa2_notification_roundtrip() {
        let signer = ParamSigner::from_base64(SignType::Rsa2, PROVIDER_KEY).unwrap();
        let params = notification("RSA2");
        let signature = signer.sign_notification(&params).unwrap();

        assert!(verify_notification(SignType::Rsa2, PROVIDER_PUB, &params, &signature));
    }

    #[test]
    fn test_ed25519_notification_roundtrip() {
        let signing_key = SigningKey::from_bytes(&[0x42; 32]);
        let signer =
            ParamSigner::from_base64(SignType::Ed25519, &encode_signing_key(&signing_key)).unwrap();
        let public_key = encode_verifying_key(&signing_key.verifying_key());

        let params = notification("ED25519");
        let signature = signer.sign_notification(&params).unwrap();
        assert!(verify_notification(SignType::Ed25519, &public_key, &params, &signature));
    }

    #[test]
    fn test_scheme_mismatch_fails() {
        let signer = ParamSigner::from_base64(SignType::Rsa2, PROVIDER_KEY).unwrap();
        let params = notification("RSA2");
        let signature = signer.sign_notification(&params).unwrap();

        // RSA public key is not a 32-byte Ed25519 key.
        assert!(!verify_notification(SignType::Ed25519, PROVIDER_PUB, &params, &signature));

        let verifier = ParamVerifier::from_base64(SignType::Rsa2, PROVIDER_PUB).unwrap();
        let err = verifier
            .verify_notification(&notification("ED25519"), &signature)
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported sign_type"));
    }

    #[test]
    fn test_request_and_notification_forms_differ() {
        let signer = ParamSigner::from_base64(SignType::Rsa2, PROVIDER_KEY).unwrap();
        let verifier = ParamVerifier::from_base64(SignType::Rsa2, PROVIDER_PUB).unwrap();
        let params = notification("RSA2");

        let request_signature = signer.sign_request(&params).unwrap();
        assert!(verifier.verify_request(&params, &request_signature).is_ok());
        assert!(verifier.verify_notification(&params, &request_signature).is_err());
    }

    #[test]
    fn test_tampered_rsa2_notification_fails() {
        let signer = ParamSigner::from_base64(SignType::Rsa2, PROVIDER_KEY).unwrap();
        let params = notification("RSA2");
        let signature = signer.sign_notification(&params).unwrap();

        let mut tampered = params.clone();
        tampered.insert("total_amount", "0.01");
        assert!(!verify_notification(SignType::Rsa2, PROVIDER_PUB, &tampered, &signature));
    }

    #[test]
    fn test_signer_reports_scheme() {
        let signer = ParamSigner::from_base64(SignType::Rsa2, PROVIDER_KEY).unwrap();
        assert_eq!(signer.sign_type(), SignType::Rsa2);
        assert!(ParamSigner::from_base64(SignType::Ed25519, PROVIDER_KEY).is_err());
    }
}
