//! Curve25519 key generation, ECDH, and XEdDSA sign/verify (C1).
//!
//! Public keys are stored raw (32 bytes, spec.md §3 invariant 1); the 0x05
//! version-prefixed 33-byte form is only produced at the wire/signature
//! boundary by [`as_signal_pub`].

use crate::error::CryptoError;
use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::montgomery::MontgomeryPoint;
use curve25519_dalek::scalar::Scalar;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use x25519_dalek::{PublicKey, StaticSecret};

/// libsignal/WhatsApp's version byte prepended to wire-carried public keys.
pub const DJB_KEY_TYPE: u8 = 0x05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub private: [u8; 32],
    pub public: [u8; 32],
}

impl KeyPair {
    pub fn from_private(private: [u8; 32]) -> Self {
        let secret = StaticSecret::from(private);
        let public = PublicKey::from(&secret).to_bytes();
        Self { private, public }
    }
}

/// `generateKeyPair()` — fresh X25519 keypair.
pub fn generate_key_pair() -> KeyPair {
    let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
    let public = PublicKey::from(&secret).to_bytes();
    KeyPair {
        private: secret.to_bytes(),
        public,
    }
}

/// Prepends the 0x05 key-type byte; the only place a 33-byte key is produced.
pub fn as_signal_pub(public: &[u8; 32]) -> [u8; 33] {
    let mut out = [0u8; 33];
    out[0] = DJB_KEY_TYPE;
    out[1..].copy_from_slice(public);
    out
}

/// `sharedSecret(priv, pub33)` — `pub` must already carry the 0x05 prefix.
pub fn shared_secret(private: &[u8; 32], pub33: &[u8]) -> Result<[u8; 32], CryptoError> {
    if pub33.len() != 33 {
        return Err(CryptoError::ShortKey {
            expected: 33,
            actual: pub33.len(),
        });
    }
    let mut pub32 = [0u8; 32];
    pub32.copy_from_slice(&pub33[1..]);

    let secret = StaticSecret::from(*private);
    let public = PublicKey::from(pub32);
    Ok(secret.diffie_hellman(&public).to_bytes())
}

/// XEdDSA sign over a raw Curve25519 private scalar — no Ed25519 keypair is
/// ever minted. `nonce = H(priv || pub || msg)`, `R = nonce*B`, `s = nonce +
/// H(R || pub || msg) * priv`, matching the WhatsApp/libsignal convention
/// reflected in the pack's `chatwarp-api` WA-keys reference.
pub fn sign(private: &[u8; 32], public: &[u8; 32], message: &[u8]) -> [u8; 64] {
    let secret = Scalar::from_bytes_mod_order(*private);
    let nonce = hash_to_scalar(&[private, public, message]);
    let r = (&nonce * ED25519_BASEPOINT_TABLE).compress().to_bytes();
    let challenge = hash_to_scalar(&[&r, public, message]);
    let s = nonce + challenge * secret;

    let mut out = [0u8; 64];
    out[..32].copy_from_slice(&r);
    out[32..].copy_from_slice(&s.to_bytes());
    out
}

/// XEdDSA verify against a raw Curve25519 public key.
pub fn verify(public: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    if signature.len() != 64 {
        return Err(CryptoError::ShortSignature {
            expected: 64,
            actual: signature.len(),
        });
    }

    let mut r_bytes = [0u8; 32];
    r_bytes.copy_from_slice(&signature[..32]);
    let r_point = CompressedEdwardsY(r_bytes)
        .decompress()
        .ok_or(CryptoError::BadSignature)?;

    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&signature[32..]);
    let s: Scalar = Option::from(Scalar::from_canonical_bytes(s_bytes)).ok_or(CryptoError::BadSignature)?;

    let mont = MontgomeryPoint(*public);
    let challenge = hash_to_scalar(&[&r_bytes, public, message]);
    let lhs = &s * ED25519_BASEPOINT_TABLE;

    for sign_bit in [0u8, 1u8] {
        let Some(a_point) = mont.to_edwards(sign_bit) else {
            continue;
        };
        if lhs == r_point + (challenge * a_point) {
            return Ok(());
        }
    }
    Err(CryptoError::BadSignature)
}

fn hash_to_scalar(parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&hasher.finalize());
    Scalar::from_bytes_mod_order_wide(&wide)
}

/// Fresh 14-bit registration id per spec.md §4.2: two random bytes masked
/// with 0x3FFF, saturated to at least 1.
pub fn generate_registration_id() -> u32 {
    let mut raw = [0u8; 2];
    rand::thread_rng().fill_bytes(&mut raw);
    let id = u16::from_le_bytes(raw) & 0x3FFF;
    id.max(1) as u32
}
