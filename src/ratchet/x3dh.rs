//! X3DH key agreement (C6 session bootstrap), grounded on the pack's
//! `rekindle-crypto::signal_session::{establish_session,respond_to_session}`
//! reference — concatenated DH outputs through one HKDF expand, replacing
//! the teacher's broken fixed-IV SHA-256 self-chain.

use crate::crypto::{self, KeyPair};

const INFO: &[u8] = b"WhatsAppSignalX3DH";

pub struct InitiatorOutput {
    pub root_key: [u8; 32],
    pub chain_key: [u8; 32],
}

/// Alice's side: she holds her own identity/ephemeral keypairs and Bob's
/// public bundle. `bob_one_time_prekey_pub` is `None` when the bundle
/// carried no one-time pre-key.
pub fn initiate(
    identity: &KeyPair,
    ephemeral: &KeyPair,
    bob_identity_pub: &[u8; 32],
    bob_signed_prekey_pub: &[u8; 32],
    bob_one_time_prekey_pub: Option<&[u8; 32]>,
) -> Result<InitiatorOutput, crate::error::CryptoError> {
    let dh1 = crypto::shared_secret(&identity.private, &crypto::as_signal_pub(bob_signed_prekey_pub))?;
    let dh2 = crypto::shared_secret(&ephemeral.private, &crypto::as_signal_pub(bob_identity_pub))?;
    let dh3 = crypto::shared_secret(&ephemeral.private, &crypto::as_signal_pub(bob_signed_prekey_pub))?;

    let mut ikm = Vec::with_capacity(32 * 4);
    ikm.extend_from_slice(&dh1);
    ikm.extend_from_slice(&dh2);
    ikm.extend_from_slice(&dh3);
    if let Some(otk) = bob_one_time_prekey_pub {
        let dh4 = crypto::shared_secret(&ephemeral.private, &crypto::as_signal_pub(otk))?;
        ikm.extend_from_slice(&dh4);
    }

    Ok(split_okm(crypto::kdf::hkdf_expand(&ikm, None, INFO, 64)))
}

/// Bob's side: mirrors Alice's DH ordering (DH1 and DH2 swap roles).
pub fn respond(
    identity: &KeyPair,
    signed_prekey: &KeyPair,
    one_time_prekey: Option<&KeyPair>,
    alice_identity_pub: &[u8; 32],
    alice_ephemeral_pub: &[u8; 32],
) -> Result<InitiatorOutput, crate::error::CryptoError> {
    let dh1 = crypto::shared_secret(&signed_prekey.private, &crypto::as_signal_pub(alice_identity_pub))?;
    let dh2 = crypto::shared_secret(&identity.private, &crypto::as_signal_pub(alice_ephemeral_pub))?;
    let dh3 = crypto::shared_secret(&signed_prekey.private, &crypto::as_signal_pub(alice_ephemeral_pub))?;

    let mut ikm = Vec::with_capacity(32 * 4);
    ikm.extend_from_slice(&dh1);
    ikm.extend_from_slice(&dh2);
    ikm.extend_from_slice(&dh3);
    if let Some(otk) = one_time_prekey {
        let dh4 = crypto::shared_secret(&otk.private, &crypto::as_signal_pub(alice_ephemeral_pub))?;
        ikm.extend_from_slice(&dh4);
    }

    Ok(split_okm(crypto::kdf::hkdf_expand(&ikm, None, INFO, 64)))
}

fn split_okm(okm: Vec<u8>) -> InitiatorOutput {
    let mut root_key = [0u8; 32];
    let mut chain_key = [0u8; 32];
    root_key.copy_from_slice(&okm[..32]);
    chain_key.copy_from_slice(&okm[32..]);
    InitiatorOutput { root_key, chain_key }
}
