//! The Signal protocol store (C4): an adapter over [`AuthStateStore`]
//! exposing the operations a session builder/cipher needs. Indexed by the
//! owning identity's public key so instances never share a singleton
//! (spec.md §9 "Singleton with hidden state").

use std::collections::HashMap;
use std::sync::Arc;

use crate::crypto;
use crate::error::Result;
use crate::store::{AuthStateStore, SessionRecord, StoreType, StoreValue};
use crate::types::{AddressInput, ForeignAddress, Jid, SignalAddress};

/// Accepts any of the shapes spec.md §4.4 lists: a bare string, a
/// `(name, deviceId)` pair, or a foreign address object.
pub enum AddressLike<'a> {
    Raw(&'a str),
    Jid(&'a Jid),
    NameDevice(&'a str, u32),
    Foreign(&'a dyn ForeignAddress),
}

fn resolve<'a>(addr: AddressLike<'a>) -> Result<SignalAddress> {
    let input = match addr {
        AddressLike::Raw(s) => AddressInput::Raw(s),
        AddressLike::Jid(jid) => AddressInput::Jid(jid),
        AddressLike::NameDevice(name, device) => AddressInput::NameDevice(name.to_string(), device),
        AddressLike::Foreign(f) => AddressInput::Foreign(f),
    };
    crate::types::resolve_address(input)
}

pub struct SignalProtocolStore {
    auth_state: Arc<AuthStateStore>,
    identity_public: [u8; 33],
    identity_private: [u8; 32],
    registration_id: u32,
    signed_pre_key: crypto::KeyPair,
    companion_key: std::sync::Mutex<Option<Vec<u8>>>,
}

impl SignalProtocolStore {
    pub fn new(
        auth_state: Arc<AuthStateStore>,
        identity: &crypto::KeyPair,
        registration_id: u32,
        signed_pre_key: crypto::KeyPair,
        companion_key: Option<Vec<u8>>,
    ) -> Self {
        Self {
            auth_state,
            identity_public: crypto::as_signal_pub(&identity.public),
            identity_private: identity.private,
            registration_id,
            signed_pre_key,
            companion_key: std::sync::Mutex::new(companion_key),
        }
    }

    /// Keys the instance manager's map of live stores (spec.md §9).
    pub fn identity_key(&self) -> [u8; 33] {
        self.identity_public
    }

    pub fn get_identity_key_pair(&self) -> ([u8; 33], [u8; 32]) {
        (self.identity_public, self.identity_private)
    }

    pub fn get_local_registration_id(&self) -> u32 {
        if self.registration_id == 0 {
            tracing::warn!("registration id missing from credentials, generating a fresh one");
            crypto::generate_registration_id()
        } else {
            self.registration_id
        }
    }

    /// `true` if unchanged or first-seen; `false` if different from the
    /// stored key (still accepted — TOFU-with-update, spec.md §4.4).
    pub async fn save_identity(&self, addr: AddressLike<'_>, key33: [u8; 33]) -> Result<bool> {
        let address = resolve(addr)?;
        let existing = self
            .auth_state
            .get(Some(StoreType::Identity), Some(std::slice::from_ref(&address.cache_key())));

        let unchanged_or_new = match existing.get(&address.cache_key()) {
            Some(StoreValue::Identity(record)) => {
                let changed = record.identity_key != key33;
                if changed {
                    tracing::warn!(jid = %address, "identity key changed for peer, accepting under TOFU policy");
                }
                !changed
            }
            _ => true,
        };

        let mut batch = HashMap::new();
        let mut inner = HashMap::new();
        inner.insert(
            address.cache_key(),
            Some(StoreValue::Identity(crate::store::IdentityRecord {
                identity_key: key33.to_vec(),
                trust_level: 1,
            })),
        );
        batch.insert(StoreType::Identity, inner);
        self.auth_state.set(batch).await?;

        Ok(unchanged_or_new)
    }

    pub fn load_identity(&self, addr: AddressLike<'_>) -> Result<Option<Vec<u8>>> {
        let address = resolve(addr)?;
        let existing = self
            .auth_state
            .get(Some(StoreType::Identity), Some(std::slice::from_ref(&address.cache_key())));
        Ok(existing.get(&address.cache_key()).and_then(|v| match v {
            StoreValue::Identity(record) => Some(record.identity_key.clone()),
            _ => None,
        }))
    }

    /// Always true under TOFU (spec.md §4.4); change events are logged by
    /// `save_identity`, not refused here.
    pub fn is_trusted_identity(&self, _addr: AddressLike<'_>, _key: &[u8]) -> bool {
        true
    }

    pub async fn load_pre_key(&self, key_id: u32) -> Option<crate::creds::PreKey> {
        let result = self.auth_state.get(Some(StoreType::PreKey), Some(&[key_id.to_string()]));
        match result.get(&key_id.to_string()) {
            Some(StoreValue::PreKey(pk)) if !pk.used => Some(pk.clone()),
            _ => None,
        }
    }

    /// Also calls `markPreKeyAsUsed` in C3 (spec.md §4.4).
    pub async fn remove_pre_key(&self, key_id: u32) -> Result<()> {
        self.auth_state.mark_pre_key_as_used(key_id).await
    }

    pub fn load_signed_pre_key(&self) -> crypto::KeyPair {
        self.signed_pre_key
    }

    pub fn load_session(&self, addr: AddressLike<'_>) -> Result<Option<SessionRecord>> {
        let address = resolve(addr)?;
        let result = self
            .auth_state
            .get(Some(StoreType::Session), Some(&[address.cache_key()]));
        Ok(result.get(&address.cache_key()).and_then(|v| match v {
            StoreValue::Session(record) => Some(record.clone()),
            _ => None,
        }))
    }

    pub async fn store_session(&self, addr: AddressLike<'_>, record: SessionRecord) -> Result<()> {
        let address = resolve(addr)?;
        let mut batch = HashMap::new();
        let mut inner = HashMap::new();
        inner.insert(address.cache_key(), Some(StoreValue::Session(record)));
        batch.insert(StoreType::Session, inner);
        self.auth_state.set(batch).await
    }

    pub fn contains_session(&self, addr: AddressLike<'_>) -> Result<bool> {
        Ok(self.load_session(addr)?.is_some())
    }

    pub async fn delete_session(&self, addr: AddressLike<'_>) -> Result<()> {
        let address = resolve(addr)?;
        let mut batch = HashMap::new();
        let mut inner = HashMap::new();
        inner.insert(address.cache_key(), None);
        batch.insert(StoreType::Session, inner);
        self.auth_state.set(batch).await
    }

    /// `deleteAllSessions(name)` — spec.md §4.4: removes every device session
    /// cached under `name`, matching the `name:` prefix `get_sub_device_sessions`
    /// scans for.
    pub async fn delete_all_sessions(&self, name: &str) -> Result<()> {
        let all = self.auth_state.get(Some(StoreType::Session), None);
        let prefix = format!("{name}:");
        let mut inner = HashMap::new();
        for key in all.keys() {
            if key.starts_with(&prefix) {
                inner.insert(key.clone(), None);
            }
        }
        if inner.is_empty() {
            return Ok(());
        }
        let mut batch = HashMap::new();
        batch.insert(StoreType::Session, inner);
        self.auth_state.set(batch).await
    }

    /// Scans cached session keys with the `name:` prefix (spec.md §4.4).
    pub fn get_sub_device_sessions(&self, name: &str) -> Vec<u32> {
        let all = self.auth_state.get(Some(StoreType::Session), None);
        let prefix = format!("{name}:");
        all.keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|device| device.parse().ok())
            .collect()
    }

    pub fn load_sender_key(&self, group_id: &str, sender_id: &str) -> Option<Vec<u8>> {
        let key = format!("{group_id}:{sender_id}");
        let result = self.auth_state.get(Some(StoreType::SenderKey), Some(&[key.clone()]));
        result.get(&key).and_then(|v| match v {
            StoreValue::SenderKey(bytes) => Some(bytes.clone()),
            _ => None,
        })
    }

    pub async fn store_sender_key(&self, group_id: &str, sender_id: &str, key: Vec<u8>) -> Result<()> {
        let id = format!("{group_id}:{sender_id}");
        let mut batch = HashMap::new();
        let mut inner = HashMap::new();
        inner.insert(id, Some(StoreValue::SenderKey(key)));
        batch.insert(StoreType::SenderKey, inner);
        self.auth_state.set(batch).await
    }

    /// Carried but unused by any decrypt path in the core (spec.md §9 open
    /// question: opaque passthrough).
    pub fn get_companion_key(&self) -> Option<Vec<u8>> {
        self.companion_key.lock().unwrap().clone()
    }

    pub fn update_companion_key(&self, key: Vec<u8>) {
        *self.companion_key.lock().unwrap() = Some(key);
    }

    /// Exposes the backing store for tests that need to seed fixtures
    /// directly (e.g. a pre-key the server hasn't handed out through the
    /// normal bundle-upload path yet).
    #[cfg(test)]
    pub fn auth_state_for_test(&self) -> &Arc<AuthStateStore> {
        &self.auth_state
    }
}
