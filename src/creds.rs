//! Credential model (C2): constructs and transforms [`Credentials`] without
//! touching storage. Grounded on the teacher's `signal::prekey`/`identity`
//! structs, replacing their Ed25519 signing with the XEdDSA primitives in
//! [`crate::crypto`].

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use crate::crypto::{self, KeyPair};
use crate::types::Jid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPreKey {
    pub key_id: u32,
    pub key_pair: KeyPair,
    #[serde(with = "BigArray")]
    pub signature: [u8; 64],
}

impl SignedPreKey {
    /// `signature = Sign(identity.private, asSignalPub(keyPair.public))` —
    /// spec.md §3.
    pub fn generate(key_id: u32, identity: &KeyPair) -> Self {
        let key_pair = crypto::generate_key_pair();
        let prefixed = crypto::as_signal_pub(&key_pair.public);
        let signature = crypto::sign(&identity.private, &identity.public, &prefixed);
        Self {
            key_id,
            key_pair,
            signature,
        }
    }

    pub fn verify(&self, identity_public: &[u8; 32]) -> Result<(), crate::error::CryptoError> {
        let prefixed = crypto::as_signal_pub(&self.key_pair.public);
        crypto::verify(identity_public, &prefixed, &self.signature)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreKey {
    pub key_id: u32,
    pub key_pair: KeyPair,
    pub used: bool,
    pub used_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl PreKey {
    pub fn generate(key_id: u32) -> Self {
        Self {
            key_id,
            key_pair: crypto::generate_key_pair(),
            used: false,
            used_at: None,
        }
    }
}

/// `account` sub-record populated once pairing completes (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub details: Vec<u8>,
    pub account_signature_key: [u8; 32],
    #[serde(with = "BigArray")]
    pub account_signature: [u8; 64],
    #[serde(with = "BigArray")]
    pub device_signature: [u8; 64],
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Me {
    pub id: String,
    pub name: Option<String>,
    pub lid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccountSettings {
    pub unarchive_chats: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalIdentity {
    pub identifier: crate::types::SignalAddress,
    pub identifier_key: [u8; 32],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub signed_identity_key: KeyPair,
    pub noise_key: KeyPair,
    pub pairing_ephemeral_key_pair: KeyPair,
    pub signed_pre_key: SignedPreKey,
    pub registration_id: u32,
    pub adv_secret_key: [u8; 32],
    pub next_pre_key_id: u32,
    pub first_unuploaded_pre_key_id: u32,
    pub account_sync_counter: u32,
    pub account_settings: AccountSettings,
    pub registered: bool,
    pub account: Option<Account>,
    pub me: Option<Me>,
    pub platform: Option<String>,
    pub signal_identities: Vec<SignalIdentity>,
    pub companion_key: Option<Vec<u8>>,
}

/// `initAuthCreds()` — spec.md §4.2.
pub fn init_auth_creds() -> Credentials {
    let signed_identity_key = crypto::generate_key_pair();
    let noise_key = crypto::generate_key_pair();
    let pairing_ephemeral_key_pair = crypto::generate_key_pair();
    let signed_pre_key = SignedPreKey::generate(1, &signed_identity_key);
    let registration_id = crypto::generate_registration_id();

    let mut adv_secret_key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut adv_secret_key);

    Credentials {
        signed_identity_key,
        noise_key,
        pairing_ephemeral_key_pair,
        signed_pre_key,
        registration_id,
        adv_secret_key,
        next_pre_key_id: 1,
        first_unuploaded_pre_key_id: 1,
        account_sync_counter: 0,
        account_settings: AccountSettings::default(),
        registered: false,
        account: None,
        me: None,
        platform: None,
        signal_identities: Vec::new(),
        companion_key: None,
    }
}

/// `updateCredsAfterPairing(creds, jid, displayName?) → creds'` — spec.md §4.2.
/// Only touches the fields the successful pair actually establishes; the
/// account/signal-identity fields are filled in separately by C5's delta.
pub fn update_creds_after_pairing(mut creds: Credentials, jid: &Jid, display_name: Option<String>) -> Credentials {
    creds.registered = true;
    creds.me = Some(Me {
        id: jid.to_string(),
        name: display_name,
        lid: None,
    });
    creds.platform.get_or_insert_with(|| "web".to_string());
    creds
}

/// Base64 form used wherever advSecretKey/companionKey cross a JSON
/// boundary (spec.md §6 persistence schema: `advSecretKey TEXT`).
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn decode_base64(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_creds_satisfy_invariant_1() {
        let creds = init_auth_creds();
        assert!((1..=16383).contains(&creds.registration_id));
        assert_eq!(creds.signed_pre_key.key_id, 1);
        assert!(creds.signed_pre_key.verify(&creds.signed_identity_key.public).is_ok());
    }

    #[test]
    fn fresh_creds_are_unregistered() {
        let creds = init_auth_creds();
        assert!(!creds.registered);
        assert_eq!(creds.next_pre_key_id, 1);
        assert_eq!(creds.first_unuploaded_pre_key_id, 1);
        assert_eq!(creds.account_sync_counter, 0);
        assert!(!creds.account_settings.unarchive_chats);
    }

    #[test]
    fn adv_secret_key_decodes_to_32_bytes() {
        let creds = init_auth_creds();
        let encoded = encode_base64(&creds.adv_secret_key);
        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded.len(), 32);
    }

    #[test]
    fn update_after_pairing_sets_registered_and_me() {
        let creds = init_auth_creds();
        let jid: Jid = "5511999999999@s.whatsapp.net".parse().unwrap();
        let updated = update_creds_after_pairing(creds, &jid, Some("Alice".to_string()));
        assert!(updated.registered);
        let me = updated.me.unwrap();
        assert_eq!(me.id, "5511999999999@s.whatsapp.net");
        assert_eq!(me.name.as_deref(), Some("Alice"));
        assert_eq!(updated.platform.as_deref(), Some("web"));
    }

    #[test]
    fn update_after_pairing_preserves_existing_platform() {
        let mut creds = init_auth_creds();
        creds.platform = Some("android".to_string());
        let jid: Jid = "5511999999999@s.whatsapp.net".parse().unwrap();
        let updated = update_creds_after_pairing(creds, &jid, None);
        assert_eq!(updated.platform.as_deref(), Some("android"));
    }

    #[test]
    fn signed_pre_key_signature_fails_for_wrong_identity() {
        let identity = crypto::generate_key_pair();
        let other_identity = crypto::generate_key_pair();
        let spk = SignedPreKey::generate(1, &identity);
        assert!(spk.verify(&other_identity.public).is_err());
    }
}
