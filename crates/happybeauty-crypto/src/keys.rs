// HappyBeauty Crypto - Key generation and encoding

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand_core::OsRng;

/// Generates a new Ed25519 keypair using secure random bytes from the OS.
pub fn generate_keypair() -> (SigningKey, VerifyingKey) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();
    (signing_key, verifying_key)
}

/// Encodes a signing key (its 32-byte seed) as standard base64.
pub fn encode_signing_key(signing_key: &SigningKey) -> String {
    BASE64_STANDARD.encode(signing_key.to_bytes())
}

/// Encodes a verifying key as standard base64.
pub fn encode_verifying_key(verifying_key: &VerifyingKey) -> String {
    BASE64_STANDARD.encode(verifying_key.as_bytes())
}

/// Parses a base64 signing key seed. Surrounding whitespace is ignored,
/// since keys are usually pasted into config values.
pub fn signing_key_from_base64(encoded: &str) -> Result<SigningKey> {
    let bytes = decode_key_bytes(encoded)?;
    Ok(SigningKey::from_bytes(&bytes))
}

/// Parses a base64 Ed25519 public key.
pub fn verifying_key_from_base64(encoded: &str) -> Result<VerifyingKey> {
    let bytes = decode_key_bytes(encoded)?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| anyhow!("Invalid public key: {}", e))
}

fn decode_key_bytes(encoded: &str) -> Result<[u8; 32]> {
    let trimmed = encoded.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Key is empty"));
    }

    let bytes = BASE64_STANDARD
        .decode(trimmed)
        .map_err(|e| anyhow!("Invalid base64 key: {}", e))?;

    bytes
        .try_into()
        .map_err(|v: Vec<u8>| anyhow!("Invalid key length: expected 32 bytes, got {}", v.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, Verifier};

    #[test]
    fn test_generate_keypair_signs_and_verifies() {
        let (signing_key, verifying_key) = generate_keypair();

        let message = b"out_trade_no=PAY_1";
        let signature = signing_key.sign(message);

        assert!(verifying_key.verify(message, &signature).is_ok());
    }

    #[test]
    fn test_generate_keypair_produces_different_keys() {
        let (_, verifying_key1) = generate_keypair();
        let (_, verifying_key2) = generate_keypair();
        assert_ne!(verifying_key1.as_bytes(), verifying_key2.as_bytes());
    }

    #[test]
    fn test_encode_decode_keys() {
        let (signing_key, verifying_key) = generate_keypair();

        let decoded_signing = signing_key_from_base64(&encode_signing_key(&signing_key)).unwrap();
        assert_eq!(decoded_signing.to_bytes(), signing_key.to_bytes());

        let decoded_verifying =
            verifying_key_from_base64(&encode_verifying_key(&verifying_key)).unwrap();
        assert_eq!(decoded_verifying, verifying_key);
    }

    #[test]
    fn test_key_with_whitespace_is_accepted() {
        let (_, verifying_key) = generate_keypair();
        let padded = format!("  {}\n", encode_verifying_key(&verifying_key));
        assert!(verifying_key_from_base64(&padded).is_ok());
    }

    #[test]
    fn test_rejects_empty_key() {
        let err = verifying_key_from_base64("   ").unwrap_err();
        assert!(err.to_string().contains("Key is empty"));
    }

    #[test]
    fn test_rejects_bad_base64() {
        let err = signing_key_from_base64("not base64!!").unwrap_err();
        assert!(err.to_string().contains("Invalid base64 key"));
    }

    #[test]
    fn test_rejects_wrong_length() {
        let err = verifying_key_from_base64(&BASE64_STANDARD.encode([1u8; 16])).unwrap_err();
        assert!(err.to_string().contains("expected 32 bytes, got 16"));
    }
}
