//! Short-hash references: a 6 character, user-facing handle for recent records.
//!
//! The handle is the first six hex digits of the SHA-1 of the record id. It is
//! not unique; callers resolve it against a bounded lookback window only.

use sha1::{Digest, Sha1};

/// Number of hex characters in a short reference.
pub const SHORT_REFERENCE_LEN: usize = 6;

/// Returns the short reference for a record id.
///
/// # Examples
///
/// ```
/// use glucmon_common::reference::short_hash;
///
/// let hash = short_hash("7201847362918400001");
/// assert_eq!(hash.len(), 6);
/// assert_eq!(hash, short_hash("7201847362918400001"));
/// ```
pub fn short_hash(id: &str) -> String {
    let digest = Sha1::digest(id.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(SHORT_REFERENCE_LEN);
    encoded
}

/// Whether `token` has the shape of a short reference rather than a full id.
pub fn is_short_reference(token: &str) -> bool {
    token.len() == SHORT_REFERENCE_LEN && token.chars().all(|c| c.is_ascii_hexdigit())
}

/// Whether `token` (a short reference, any case) addresses `id`.
pub fn matches(token: &str, id: &str) -> bool {
    short_hash(id).eq_ignore_ascii_case(token)
}
