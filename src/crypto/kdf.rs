//! HKDF, HMAC, and PBKDF2 derivations (C1), grounded on the teacher's
//! `util::crypto::hkdf_expand` plus the `hmac`/`pbkdf2` crates confirmed
//! alongside it in the pack's `awcjack-signal-tauri` manifest.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

/// `hkdf(ikm, len, {salt?, info?})` — spec.md §4.1. `salt` defaults to a
/// zero-filled key of the hash's block size per RFC 5869 when omitted,
/// matching the teacher's original no-salt helper.
pub fn hkdf_expand(key: &[u8], salt: Option<&[u8]>, info: &[u8], length: usize) -> Vec<u8> {
    let hk = Hkdf::<Sha256>::new(salt, key);
    let mut okm = vec![0u8; length];
    hk.expand(info, &mut okm).expect("hkdf output length is within RFC 5869 bounds");
    okm
}

/// HMAC-SHA256, used for the ADV device-identity HMAC (spec.md §4.5).
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// HMAC-SHA512, used by the Double Ratchet chain/message-key derivations.
pub fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    let mut mac = Hmac::<Sha512>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

const PAIRING_CODE_ITERATIONS: u32 = 131_072;

/// `derivePairingCodeKey(pairingCode, salt)` — PBKDF2-HMAC-SHA256, 131072
/// rounds, 32-byte output, matching the numeric-pairing-code key stretch
/// described in spec.md §4.5.
pub fn derive_pairing_code_key(pairing_code: &[u8], salt: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(pairing_code, salt, PAIRING_CODE_ITERATIONS, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hkdf_expand_is_deterministic() {
        let a = hkdf_expand(b"ikm", None, b"info", 64);
        let b = hkdf_expand(b"ikm", None, b"info", 64);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hkdf_expand_varies_with_info() {
        let a = hkdf_expand(b"ikm", None, b"info-a", 32);
        let b = hkdf_expand(b"ikm", None, b"info-b", 32);
        assert_ne!(a, b);
    }

    #[test]
    fn hkdf_expand_varies_with_salt() {
        let a = hkdf_expand(b"ikm", Some(b"salt-a"), b"info", 32);
        let b = hkdf_expand(b"ikm", Some(b"salt-b"), b"info", 32);
        let c = hkdf_expand(b"ikm", None, b"info", 32);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hmac_sha256_is_deterministic_and_keyed() {
        let a = hmac_sha256(b"key1", b"message");
        let b = hmac_sha256(b"key1", b"message");
        let c = hmac_sha256(b"key2", b"message");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn derive_pairing_code_key_is_deterministic() {
        let a = derive_pairing_code_key(b"123456", b"salt");
        let b = derive_pairing_code_key(b"123456", b"salt");
        assert_eq!(a, b);
    }

    #[test]
    fn derive_pairing_code_key_varies_with_salt() {
        let a = derive_pairing_code_key(b"123456", b"salt-a");
        let b = derive_pairing_code_key(b"123456", b"salt-b");
        assert_ne!(a, b);
    }
}
