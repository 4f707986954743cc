//! Curve25519, AEAD, and KDF primitives underpinning every higher-level
//! module (C1). Nothing above this module touches a cipher or scalar
//! directly.

pub mod aead;
pub mod curve;
pub mod kdf;

pub use aead::{pad_pkcs7, unpad_pkcs7};
pub use curve::{as_signal_pub, generate_key_pair, generate_registration_id, shared_secret, sign, verify, KeyPair};
