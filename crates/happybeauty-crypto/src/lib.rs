// HappyBeauty Crypto - Payment provider parameter signing and verification

pub mod canonical;
pub mod keys;
pub mod rsa2;
pub mod scheme;
pub mod sign;
pub mod types;
pub mod verify;

pub use canonical::{
    canonical_bytes, canonical_string, request_canonical_bytes, request_canonical_string,
};
pub use keys::{
    encode_signing_key, encode_verifying_key, generate_keypair, signing_key_from_base64,
    verifying_key_from_base64,
};
pub use rsa2::{
    encode_rsa2_private_key, encode_rsa2_public_key, generate_rsa2_keypair,
    rsa2_private_key_from_base64, rsa2_public_key_from_base64, sign_rsa2, verify_rsa2,
};
pub use scheme::{verify_notification, ParamSigner, ParamVerifier};
pub use sign::sign_params;
pub use types::{
    CallbackParams, SignType, SIGN_FIELD, SIGN_TYPE_ED25519, SIGN_TYPE_FIELD, SIGN_TYPE_RSA2,
};
pub use verify::{verify_callback, verify_ed25519, verify_params};
