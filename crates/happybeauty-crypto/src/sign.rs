// Parameter signing
//
// Used for our outgoing page-pay requests (merchant app key), and by the CLI
// and tests to play the provider when producing notifications.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};

use crate::canonical::canonical_bytes;
use crate::types::CallbackParams;

/// Signs the canonical form of `params` and returns the base64 signature.
///
/// `sign` / `sign_type` entries already present in `params` are ignored by
/// the canonical form, so a map can be signed before or after `sign_type`
/// is inserted.
pub fn sign_params(signing_key: &SigningKey, params: &CallbackParams) -> String {
    let signature = signing_key.sign(&canonical_bytes(params));
    BASE64_STANDARD.encode(signature.to_bytes())
}
