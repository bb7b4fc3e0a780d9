// RSA2 (SHA256withRSA, PKCS#1 v1.5) keys and signatures
//
// The provider distributes keys as bare base64 DER: PKCS#8 or PKCS#1 for the
// merchant private key, SubjectPublicKeyInfo for its own public key. PEM
// armoring is accepted too, since keys are often pasted straight from a
// key tool.

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use rand_core::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

/// Modulus size for generated keys, the provider's minimum for RSA2.
pub const RSA2_KEY_BITS: usize = 2048;

/// Generates an RSA2 keypair from OS randomness.
pub fn generate_rsa2_keypair() -> Result<(RsaPrivateKey, RsaPublicKey)> {
    let private_key = RsaPrivateKey::new(&mut OsRng, RSA2_KEY_BITS)
        .map_err(|e| anyhow!("RSA key generation failed: {}", e))?;
    let public_key = private_key.to_public_key();
    Ok((private_key, public_key))
}

/// Encodes a private key as base64 PKCS#8 DER.
pub fn encode_rsa2_private_key(private_key: &RsaPrivateKey) -> Result<String> {
    let der = private_key
        .to_pkcs8_der()
        .map_err(|e| anyhow!("Failed to encode RSA private key: {}", e))?;
    Ok(BASE64_STANDARD.encode(der.as_bytes()))
}

/// Encodes a public key as base64 SubjectPublicKeyInfo DER.
pub fn encode_rsa2_public_key(public_key: &RsaPublicKey) -> Result<String> {
    let der = public_key
        .to_public_key_der()
        .map_err(|e| anyhow!("Failed to encode RSA public key: {}", e))?;
    Ok(BASE64_STANDARD.encode(der.as_bytes()))
}

/// Parses a PKCS#8 or PKCS#1 private key, base64 DER or PEM.
pub fn rsa2_private_key_from_base64(encoded: &str) -> Result<RsaPrivateKey> {
    let trimmed = encoded.trim();
    if trimmed.starts_with("-----BEGIN") {
        return RsaPrivateKey::from_pkcs8_pem(trimmed)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(trimmed))
            .map_err(|e| anyhow!("Invalid RSA private key PEM: {}", e));
    }

    let der = decode_der(trimmed)?;
    RsaPrivateKey::from_pkcs8_der(&der)
        .or_else(|_| RsaPrivateKey::from_pkcs1_der(&der))
        .map_err(|e| anyhow!("Invalid RSA private key: {}", e))
}

/// Parses a SubjectPublicKeyInfo or PKCS#1 public key, base64 DER or PEM.
pub fn rsa2_public_key_from_base64(encoded: &str) -> Result<RsaPublicKey> {
    let trimmed = encoded.trim();
    if trimmed.starts_with("-----BEGIN") {
        return RsaPublicKey::from_public_key_pem(trimmed)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(trimmed))
            .map_err(|e| anyhow!("Invalid RSA public key PEM: {}", e));
    }

    let der = decode_der(trimmed)?;
    RsaPublicKey::from_public_key_der(&der)
        .or_else(|_| RsaPublicKey::from_pkcs1_der(&der))
        .map_err(|e| anyhow!("Invalid RSA public key: {}", e))
}

/// SHA256withRSA signature over `message`, base64 encoded.
pub fn sign_rsa2(private_key: &RsaPrivateKey, message: &[u8]) -> Result<String> {
    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let signature = signing_key
        .try_sign(message)
        .map_err(|e| anyhow!("RSA signing failed: {}", e))?;
    Ok(BASE64_STANDARD.encode(signature.to_bytes()))
}

/// Checks a base64 SHA256withRSA signature over `message`.
pub fn verify_rsa2(public_key: &RsaPublicKey, message: &[u8], signature: &str) -> Result<()> {
    let bytes = BASE64_STANDARD
        .decode(signature.trim())
        .map_err(|e| anyhow!("Invalid base64 signature: {}", e))?;
    let signature = Signature::try_from(bytes.as_slice())
        .map_err(|e| anyhow!("Invalid signature encoding: {}", e))?;

    VerifyingKey::<Sha256>::new(public_key.clone())
        .verify(message, &signature)
        .map_err(|_| anyhow!("Signature verification failed: invalid signature"))
}

/// Base64 DER with any embedded line breaks removed.
fn decode_der(encoded: &str) -> Result<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(anyhow!("Key is empty"));
    }
    BASE64_STANDARD
        .decode(compact)
        .map_err(|e| anyhow!("Invalid base64 key: {}", e))
}
