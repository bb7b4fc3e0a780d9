// Ed25519 notification verification
//
// `verify_params` reports why a signature was rejected; `verify_callback`
// collapses everything to a boolean for callers that must always answer the
// provider and never propagate an error. Scheme selection lives in `scheme`.

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::canonical::canonical_bytes;
use crate::keys::verifying_key_from_base64;
use crate::types::{CallbackParams, SignType, SIGN_TYPE_FIELD};

/// If `params` carries a `sign_type`, it must name `expected`.
pub(crate) fn check_sign_type(params: &CallbackParams, expected: SignType) -> Result<()> {
    if let Some(sign_type) = params.get(SIGN_TYPE_FIELD) {
        if !sign_type.trim().eq_ignore_ascii_case(expected.as_str()) {
            return Err(anyhow!(
                "Unsupported sign_type: '{}' (expected '{}')",
                sign_type,
                expected
            ));
        }
    }
    Ok(())
}

/// Verifies a base64 Ed25519 signature over raw bytes.
pub fn verify_ed25519(verifying_key: &VerifyingKey, message: &[u8], signature: &str) -> Result<()> {
    let signature_bytes = BASE64_STANDARD
        .decode(signature.trim())
        .map_err(|e| anyhow!("Invalid base64 signature: {}", e))?;

    let signature_array: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| anyhow!("Invalid signature length: expected 64 bytes"))?;

    let signature = Signature::from_bytes(&signature_array);

    verifying_key
        .verify(message, &signature)
        .map_err(|_| anyhow!("Signature verification failed: invalid signature"))
}

/// Verifies an Ed25519 `signature` over the canonical form of `params`.
///
/// If `params` carries a `sign_type`, it must name Ed25519.
pub fn verify_params(
    verifying_key: &VerifyingKey,
    params: &CallbackParams,
    signature: &str,
) -> Result<()> {
    check_sign_type(params, SignType::Ed25519)?;
    verify_ed25519(verifying_key, &canonical_bytes(params), signature)
}

/// Boolean Ed25519 verification against a base64 public key.
///
/// Returns `false` for a malformed key, malformed signature, unsupported
/// `sign_type` or a signature mismatch.
pub fn verify_callback(public_key_base64: &str, params: &CallbackParams, signature: &str) -> bool {
    verifying_key_from_base64(public_key_base64)
        .and_then(|key| verify_params(&key, params, signature))
        .is_ok()
}
