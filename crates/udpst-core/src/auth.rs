//! Pluggable authentication digest (spec.md §1: "treated as a pluggable MAC
//! over a fixed byte range").
//!
//! # Why
//! The reference implementation computes an HMAC-SHA256 over the Setup PDU
//! with the checksum field zeroed and the digest field itself excluded,
//! using a single statically configured key. Multi-key authentication
//! (§C.6 of `SPEC_FULL.md`) generalizes the single key into a small lookup
//! keyed by the request's `keyId`, selected only for protocol versions at or
//! above the multi-key threshold per §4.5's tie-break rule.
//!
//! # What
//! [`MacAlgorithm`] is the narrow trait the control state machine calls
//! through; [`HmacSha256`] is the default implementation. [`AuthKeyring`]
//! holds the small `keyId -> key` table.
//!
//! # How
//! Grounded on `udpst_control.c::validate_auth`'s
//! `HMAC(EVP_sha256(), key, strlen(key), (const unsigned char *) cHdrSR,
//! repo.rcvDataSize, digest2, &uvar)` call over the whole PDU (digest field
//! still zeroed at that point) and constant-time comparison against the
//! received digest.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Protocol version at or above which a Setup Request's `keyId` field
/// selects the key; below it, key id 0 (the default) is always used. Mirrors
/// §4.5's tie-break rule; the concrete version number is not present in the
/// retrieved protocol header and is fixed here as an Open Question
/// resolution (see `DESIGN.md`).
pub const MULTIKEY_PROTOCOL_VERSION: u8 = 5;

/// Implicit key id used below [`MULTIKEY_PROTOCOL_VERSION`] and reserved as
/// the always-present fallback in [`AuthKeyring`].
pub const DEFAULT_KEY_ID: u8 = 0;

/// A MAC over a fixed byte range, computed with the caller's key. The
/// control state machine always calls this with the digest field zeroed
/// inside `message` and the checksum field (when present) also zeroed, per
/// the PDU's own encode/verify convention.
pub trait MacAlgorithm: Send + Sync {
    /// Digest length this algorithm produces; [`AuthKeyring`] keys and the
    /// Setup PDU's `digest` field are both fixed at 32 bytes, which matches
    /// HMAC-SHA256 but is asserted, not assumed, by callers that accept a
    /// different implementation.
    fn digest(&self, key: &[u8], message: &[u8]) -> [u8; 32];

    /// Default, non-constant-time equality check. Implementations backed by
    /// a MAC crate with its own constant-time comparison (e.g.
    /// [`HmacSha256`], which overrides this with `hmac::Mac::verify_slice`)
    /// should not rely on this default.
    fn verify(&self, key: &[u8], message: &[u8], expected: &[u8; 32]) -> bool {
        self.digest(key, message) == *expected
    }
}

/// Default authentication algorithm, matching the reference
/// implementation's `HMAC(EVP_sha256(), ...)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct HmacSha256;

impl MacAlgorithm for HmacSha256 {
    fn digest(&self, key: &[u8], message: &[u8]) -> [u8; 32] {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
        mac.update(message);
        mac.finalize().into_bytes().into()
    }

    fn verify(&self, key: &[u8], message: &[u8], expected: &[u8; 32]) -> bool {
        let Ok(mut mac) = <Hmac<Sha256> as Mac>::new_from_slice(key) else {
            return false;
        };
        mac.update(message);
        mac.verify_slice(expected).is_ok()
    }
}

/// A small `keyId -> key` table. Key id [`DEFAULT_KEY_ID`] is always the one
/// consulted for protocol versions below [`MULTIKEY_PROTOCOL_VERSION`].
#[derive(Clone, Debug, Default)]
pub struct AuthKeyring {
    keys: HashMap<u8, Vec<u8>>,
}

impl AuthKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a single-key ring, installed at [`DEFAULT_KEY_ID`]; this is
    /// the common case and matches the reference implementation's single
    /// `conf.authKey` configuration string.
    pub fn single(key: impl Into<Vec<u8>>) -> Self {
        let mut keys = HashMap::new();
        keys.insert(DEFAULT_KEY_ID, key.into());
        Self { keys }
    }

    pub fn insert(&mut self, key_id: u8, key: impl Into<Vec<u8>>) {
        self.keys.insert(key_id, key.into());
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Resolves the key id a Setup Request should be authenticated against,
    /// per §4.5: below the multi-key threshold the default key id is always
    /// used, regardless of what the request's `keyId` field says.
    pub fn resolve_key_id(&self, protocol_version: u8, requested_key_id: u8) -> u8 {
        if protocol_version < MULTIKEY_PROTOCOL_VERSION {
            DEFAULT_KEY_ID
        } else {
            requested_key_id
        }
    }

    pub fn key(&self, key_id: u8) -> Option<&[u8]> {
        self.keys.get(&key_id).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_round_trips_as_its_own_verifier() {
        let mac = HmacSha256;
        let digest = mac.digest(b"secret", b"hello world");
        assert!(mac.verify(b"secret", b"hello world", &digest));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let mac = HmacSha256;
        let digest = mac.digest(b"secret", b"hello world");
        assert!(!mac.verify(b"other", b"hello world", &digest));
    }

    #[test]
    fn below_multikey_threshold_always_resolves_default_key() {
        let mut ring = AuthKeyring::new();
        ring.insert(DEFAULT_KEY_ID, "k0");
        ring.insert(3, "k3");
        assert_eq!(ring.resolve_key_id(MULTIKEY_PROTOCOL_VERSION - 1, 3), DEFAULT_KEY_ID);
    }

    #[test]
    fn at_or_above_multikey_threshold_honors_requested_key_id() {
        let ring = AuthKeyring::new();
        assert_eq!(ring.resolve_key_id(MULTIKEY_PROTOCOL_VERSION, 3), 3);
    }
}
