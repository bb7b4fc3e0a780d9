// Canonical form of provider parameters for signing
//
// Requests we send and notifications we receive differ in one field: the
// request signature covers `sign_type`, the notification signature does not.

use crate::types::{CallbackParams, SIGN_FIELD, SIGN_TYPE_FIELD};

fn join_signed<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    pairs
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Builds the canonical string of a provider notification.
///
/// - `sign` and `sign_type` are excluded
/// - parameters with empty values are dropped
/// - remaining pairs are sorted by key (byte order) and joined as `k=v` with `&`
///
/// Values are used raw (already URL-decoded), never re-encoded.
pub fn canonical_string(params: &CallbackParams) -> String {
    join_signed(
        params
            .iter()
            .filter(|(k, _)| *k != SIGN_FIELD && *k != SIGN_TYPE_FIELD),
    )
}

/// UTF-8 bytes of [`canonical_string`].
pub fn canonical_bytes(params: &CallbackParams) -> Vec<u8> {
    canonical_string(params).into_bytes()
}

/// Builds the canonical string of a request to the provider: like
/// [`canonical_string`] but `sign_type` stays in.
pub fn request_canonical_string(params: &CallbackParams) -> String {
    join_signed(params.iter().filter(|(k, _)| *k != SIGN_FIELD))
}

/// UTF-8 bytes of [`request_canonical_string`].
pub fn request_canonical_bytes(params: &CallbackParams) -> Vec<u8> {
    request_canonical_string(params).into_bytes()
}
