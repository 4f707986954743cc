//! The auth-state store (C3): a persisted key-value store scoped by
//! `instanceId`, backed by sqlite, with a mutex-protected in-memory cache.
//! Grounded on the teacher's `database::sqlite::Sqlite*Store` query idiom
//! and reified per spec.md §9's "callback-driven store abstraction" note:
//! the debounce becomes an explicit timer owned by this struct.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sqlx::Row;
use tokio::sync::Mutex as AsyncMutex;

use crate::creds::{Credentials, PreKey, SignedPreKey};
use crate::crypto::KeyPair;
use crate::db::Database;
use crate::error::{Result, StoreError};
use crate::events::{CoreEvent, EventEmitter};
use crate::store::{AppStateVersion, IdentityRecord, SessionRecord, StoreType, StoreValue};

const DEBOUNCE: Duration = Duration::from_millis(100);
const PRE_KEY_GC_INTERVAL: u32 = 10;
const PRE_KEY_LOW_WATERMARK: u32 = 5;
const PRE_KEY_BATCH_SIZE: u32 = 30;

type CacheKey = (StoreType, String);

struct Cache {
    entries: HashMap<CacheKey, StoreValue>,
    dirty: HashSet<CacheKey>,
    flush_scheduled: bool,
}

pub struct AuthStateStore {
    instance_id: String,
    db: Database,
    cache: StdMutex<Cache>,
    flush_lock: AsyncMutex<()>,
    pre_key_mark_count: StdMutex<u32>,
    events: EventEmitter,
}

impl AuthStateStore {
    pub async fn new(instance_id: impl Into<String>, db: Database, events: EventEmitter) -> Result<std::sync::Arc<Self>> {
        let store = std::sync::Arc::new(Self {
            instance_id: instance_id.into(),
            db,
            cache: StdMutex::new(Cache {
                entries: HashMap::new(),
                dirty: HashSet::new(),
                flush_scheduled: false,
            }),
            flush_lock: AsyncMutex::new(()),
            pre_key_mark_count: StdMutex::new(0),
            events,
        });
        store.load_cache().await?;
        Ok(store)
    }

    /// Populates the cache from every table on startup (spec.md §4.3
    /// "PreKey cache load", generalized to every type).
    async fn load_cache(&self) -> Result<()> {
        let pool = self.db.pool();

        let pre_key_rows = sqlx::query("SELECT key_id, public_key, private_key, used, used_at FROM pre_keys WHERE instance_id = ?")
            .bind(&self.instance_id)
            .fetch_all(pool)
            .await?;
        let mut cache = self.cache.lock().unwrap();
        for row in pre_key_rows {
            let key_id: i64 = row.get("key_id");
            let public = decode_key32(row.get::<String, _>("public_key"))?;
            let private = decode_key32(row.get::<String, _>("private_key"))?;
            let used: bool = row.get("used");
            let used_at: Option<chrono::DateTime<chrono::Utc>> = row.get("used_at");
            let pre_key = PreKey {
                key_id: key_id as u32,
                key_pair: KeyPair { private, public },
                used,
                used_at,
            };
            cache
                .entries
                .insert((StoreType::PreKey, key_id.to_string()), StoreValue::PreKey(pre_key));
        }
        drop(cache);

        let session_rows = sqlx::query("SELECT jid, device, record FROM sessions WHERE instance_id = ?")
            .bind(&self.instance_id)
            .fetch_all(pool)
            .await?;
        let mut cache = self.cache.lock().unwrap();
        for row in session_rows {
            let jid: String = row.get("jid");
            let device: i64 = row.get("device");
            let record_json: String = row.get("record");
            let value: serde_json::Value = serde_json::from_str(&record_json)?;
            let record: SessionRecord = serde_json::from_value(value)?;
            cache.entries.insert(
                (StoreType::Session, format!("{jid}:{device}")),
                StoreValue::Session(record),
            );
        }
        drop(cache);

        let identity_rows = sqlx::query("SELECT jid, identity_key, trust_level FROM identities WHERE instance_id = ?")
            .bind(&self.instance_id)
            .fetch_all(pool)
            .await?;
        let mut cache = self.cache.lock().unwrap();
        for row in identity_rows {
            let jid: String = row.get("jid");
            let identity_key_b64: String = row.get("identity_key");
            let mut identity_key = BASE64.decode(&identity_key_b64).unwrap_or_default();
            if identity_key.len() == 32 {
                // Stored bare; prepend 0x05 as spec.md §4.3 requires on load.
                identity_key.insert(0, 0x05);
            }
            let trust_level: i64 = row.get("trust_level");
            cache.entries.insert(
                (StoreType::Identity, jid),
                StoreValue::Identity(IdentityRecord {
                    identity_key,
                    trust_level: trust_level as u8,
                }),
            );
        }
        drop(cache);

        let sender_key_rows =
            sqlx::query("SELECT group_id, sender_id, sender_key FROM sender_keys WHERE instance_id = ?")
                .bind(&self.instance_id)
                .fetch_all(pool)
                .await?;
        let mut cache = self.cache.lock().unwrap();
        for row in sender_key_rows {
            let group_id: String = row.get("group_id");
            let sender_id: String = row.get("sender_id");
            let sender_key: Vec<u8> = row.get("sender_key");
            cache.entries.insert(
                (StoreType::SenderKey, format!("{group_id}:{sender_id}")),
                StoreValue::SenderKey(sender_key),
            );
        }
        drop(cache);

        let app_state_key_rows = sqlx::query("SELECT key_id, key_data FROM app_state_keys WHERE instance_id = ?")
            .bind(&self.instance_id)
            .fetch_all(pool)
            .await?;
        let mut cache = self.cache.lock().unwrap();
        for row in app_state_key_rows {
            let key_id: String = row.get("key_id");
            let key_data: Vec<u8> = row.get("key_data");
            cache
                .entries
                .insert((StoreType::AppStateSyncKey, key_id), StoreValue::AppStateKey(key_data));
        }
        drop(cache);

        let app_state_version_rows =
            sqlx::query("SELECT name, version, hash FROM app_state_versions WHERE instance_id = ?")
                .bind(&self.instance_id)
                .fetch_all(pool)
                .await?;
        let mut cache = self.cache.lock().unwrap();
        for row in app_state_version_rows {
            let name: String = row.get("name");
            let version: i64 = row.get("version");
            let hash: Vec<u8> = row.get("hash");
            cache.entries.insert(
                (StoreType::AppStateSyncVersion, name),
                StoreValue::AppStateVersion(AppStateVersion {
                    version: version as u64,
                    hash,
                }),
            );
        }
        Ok(())
    }

    /// `get(type?, ids?) → map<id, value>` — spec.md §4.3. Omitting `store_type`
    /// while also omitting `ids` dumps the whole cache across every type,
    /// keyed by id alone (debug dump); omitting just `store_type` with `ids`
    /// given looks each id up regardless of which type it lives under.
    pub fn get(&self, store_type: Option<StoreType>, ids: Option<&[String]>) -> HashMap<String, StoreValue> {
        let cache = self.cache.lock().unwrap();
        match (store_type, ids) {
            (Some(store_type), Some(ids)) => ids
                .iter()
                .filter_map(|id| {
                    cache
                        .entries
                        .get(&(store_type, id.clone()))
                        .map(|v| (id.clone(), v.clone()))
                })
                .collect(),
            (None, Some(ids)) => cache
                .entries
                .iter()
                .filter(|((_, id), _)| ids.contains(id))
                .map(|((_, id), v)| (id.clone(), v.clone()))
                .collect(),
            (Some(store_type), None) => cache
                .entries
                .iter()
                .filter(|((t, _), _)| *t == store_type)
                .map(|((_, id), v)| (id.clone(), v.clone()))
                .collect(),
            (None, None) => cache
                .entries
                .iter()
                .map(|((_, id), v)| (id.clone(), v.clone()))
                .collect(),
        }
    }

    /// Debug dump of the entire cache, ids included, regardless of type.
    pub fn get_all(&self) -> HashMap<String, StoreValue> {
        self.get(None, None)
    }

    /// `set(batch)` — spec.md §4.3. Critical types flush synchronously
    /// before this returns; non-critical types are cached immediately and
    /// flushed on the debounce timer.
    pub async fn set(
        self: &std::sync::Arc<Self>,
        batch: HashMap<StoreType, HashMap<String, Option<StoreValue>>>,
    ) -> Result<()> {
        let mut critical_writes = Vec::new();

        {
            let mut cache = self.cache.lock().unwrap();
            for (store_type, entries) in batch {
                for (id, value) in entries {
                    let key = (store_type, id.clone());
                    match value {
                        Some(v) => {
                            cache.entries.insert(key.clone(), v.clone());
                            if store_type.is_critical() {
                                critical_writes.push((store_type, id, Some(v)));
                            } else {
                                cache.dirty.insert(key);
                            }
                        }
                        None => {
                            cache.entries.remove(&key);
                            if store_type.is_critical() {
                                critical_writes.push((store_type, id, None));
                            } else {
                                cache.dirty.insert(key);
                            }
                        }
                    }
                }
            }
        }

        if !critical_writes.is_empty() {
            let _guard = self.flush_lock.lock().await;
            for (store_type, id, value) in critical_writes {
                self.persist_one(store_type, &id, value.as_ref()).await?;
                if store_type == StoreType::Session {
                    if let Some((jid, device)) = parse_session_id(&id) {
                        self.events.emit(CoreEvent::SessionStored { jid, device });
                    }
                } else if store_type == StoreType::Identity {
                    if let Ok(jid) = id.parse() {
                        self.events.emit(CoreEvent::IdentityChanged { jid });
                    }
                }
            }
        }

        self.schedule_debounced_flush();
        Ok(())
    }

    /// Debounced flush for non-critical types (spec.md §4.3, §5 ordering
    /// guarantee 4): coalesces bursts of writes into one flush per 100 ms
    /// of quiescence.
    fn schedule_debounced_flush(self: &std::sync::Arc<Self>) {
        {
            let mut cache = self.cache.lock().unwrap();
            if cache.flush_scheduled || cache.dirty.is_empty() {
                return;
            }
            cache.flush_scheduled = true;
        }

        let store = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;

            let pending: Vec<CacheKey> = {
                let mut cache = store.cache.lock().unwrap();
                cache.flush_scheduled = false;
                cache.dirty.drain().collect()
            };

            let _guard = store.flush_lock.lock().await;
            for (store_type, id) in pending {
                let value = store.get(Some(store_type), Some(std::slice::from_ref(&id))).remove(&id);
                if let Err(err) = store.persist_one(store_type, &id, value.as_ref()).await {
                    tracing::warn!(instance_id = %store.instance_id, ?store_type, %id, %err, "debounced flush failed, will retry on next write");
                    let mut cache = store.cache.lock().unwrap();
                    cache.dirty.insert((store_type, id));
                }
            }
        });
    }

    async fn persist_one(&self, store_type: StoreType, id: &str, value: Option<&StoreValue>) -> Result<()> {
        let pool = self.db.pool();
        match (store_type, value) {
            (StoreType::Session, Some(StoreValue::Session(record))) => {
                let (jid, device) = parse_session_id(id).ok_or(StoreError::Conflict)?;
                let record_json = serde_json::to_string(record)?;
                sqlx::query(
                    "INSERT INTO sessions (instance_id, jid, device, record, updated_at) VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
                     ON CONFLICT(instance_id, jid, device) DO UPDATE SET record = excluded.record, updated_at = CURRENT_TIMESTAMP",
                )
                .bind(&self.instance_id)
                .bind(jid.to_string())
                .bind(device as i64)
                .bind(record_json)
                .execute(pool)
                .await?;
            }
            (StoreType::Session, None) => {
                let (jid, device) = parse_session_id(id).ok_or(StoreError::Conflict)?;
                sqlx::query("DELETE FROM sessions WHERE instance_id = ? AND jid = ? AND device = ?")
                    .bind(&self.instance_id)
                    .bind(jid.to_string())
                    .bind(device as i64)
                    .execute(pool)
                    .await?;
            }
            (StoreType::Identity, Some(StoreValue::Identity(record))) => {
                sqlx::query(
                    "INSERT INTO identities (instance_id, jid, identity_key, trust_level, updated_at) VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
                     ON CONFLICT(instance_id, jid) DO UPDATE SET identity_key = excluded.identity_key, trust_level = excluded.trust_level, updated_at = CURRENT_TIMESTAMP",
                )
                .bind(&self.instance_id)
                .bind(id)
                .bind(BASE64.encode(&record.identity_key))
                .bind(record.trust_level as i64)
                .execute(pool)
                .await?;
            }
            (StoreType::Identity, None) => {
                sqlx::query("DELETE FROM identities WHERE instance_id = ? AND jid = ?")
                    .bind(&self.instance_id)
                    .bind(id)
                    .execute(pool)
                    .await?;
            }
            (StoreType::PreKey, Some(StoreValue::PreKey(pk))) => {
                sqlx::query(
                    "INSERT INTO pre_keys (instance_id, key_id, public_key, private_key, used, used_at) VALUES (?, ?, ?, ?, ?, ?)
                     ON CONFLICT(instance_id, key_id) DO UPDATE SET used = excluded.used, used_at = excluded.used_at",
                )
                .bind(&self.instance_id)
                .bind(pk.key_id as i64)
                .bind(BASE64.encode(pk.key_pair.public))
                .bind(BASE64.encode(pk.key_pair.private))
                .bind(pk.used)
                .bind(pk.used_at)
                .execute(pool)
                .await?;
            }
            (StoreType::PreKey, None) => {
                sqlx::query("DELETE FROM pre_keys WHERE instance_id = ? AND key_id = ?")
                    .bind(&self.instance_id)
                    .bind(id)
                    .execute(pool)
                    .await?;
            }
            (StoreType::SenderKey, Some(StoreValue::SenderKey(bytes))) => {
                let (group_id, sender_id) = id.split_once(':').ok_or(StoreError::Conflict)?;
                sqlx::query(
                    "INSERT INTO sender_keys (instance_id, group_id, sender_id, sender_key) VALUES (?, ?, ?, ?)
                     ON CONFLICT(instance_id, group_id, sender_id) DO UPDATE SET sender_key = excluded.sender_key",
                )
                .bind(&self.instance_id)
                .bind(group_id)
                .bind(sender_id)
                .bind(bytes)
                .execute(pool)
                .await?;
            }
            (StoreType::SenderKey, None) => {
                let (group_id, sender_id) = id.split_once(':').ok_or(StoreError::Conflict)?;
                sqlx::query("DELETE FROM sender_keys WHERE instance_id = ? AND group_id = ? AND sender_id = ?")
                    .bind(&self.instance_id)
                    .bind(group_id)
                    .bind(sender_id)
                    .execute(pool)
                    .await?;
            }
            (StoreType::AppStateSyncKey, Some(StoreValue::AppStateKey(bytes))) => {
                sqlx::query(
                    "INSERT INTO app_state_keys (instance_id, key_id, key_data) VALUES (?, ?, ?)
                     ON CONFLICT(instance_id, key_id) DO UPDATE SET key_data = excluded.key_data",
                )
                .bind(&self.instance_id)
                .bind(id)
                .bind(bytes)
                .execute(pool)
                .await?;
            }
            (StoreType::AppStateSyncKey, None) => {
                sqlx::query("DELETE FROM app_state_keys WHERE instance_id = ? AND key_id = ?")
                    .bind(&self.instance_id)
                    .bind(id)
                    .execute(pool)
                    .await?;
            }
            (StoreType::AppStateSyncVersion, Some(StoreValue::AppStateVersion(v))) => {
                sqlx::query(
                    "INSERT INTO app_state_versions (instance_id, name, version, hash) VALUES (?, ?, ?, ?)
                     ON CONFLICT(instance_id, name) DO UPDATE SET version = excluded.version, hash = excluded.hash",
                )
                .bind(&self.instance_id)
                .bind(id)
                .bind(v.version as i64)
                .bind(&v.hash)
                .execute(pool)
                .await?;
            }
            (StoreType::AppStateSyncVersion, None) => {
                sqlx::query("DELETE FROM app_state_versions WHERE instance_id = ? AND name = ?")
                    .bind(&self.instance_id)
                    .bind(id)
                    .execute(pool)
                    .await?;
            }
            _ => return Err(StoreError::Conflict.into()),
        }
        Ok(())
    }

    pub async fn load_creds(&self) -> Result<Option<Credentials>> {
        let row = sqlx::query("SELECT creds_json FROM credentials WHERE instance_id = ?")
            .bind(&self.instance_id)
            .fetch_optional(self.db.pool())
            .await?;
        match row {
            Some(row) => {
                let json: String = row.get("creds_json");
                let mut creds: Credentials = serde_json::from_str(&json)?;
                if !(1..=16383).contains(&creds.registration_id) {
                    return Err(crate::error::ConfigError::InvalidRegistrationId(creds.registration_id).into());
                }
                // Legacy revisions regenerate the pairing-ephemeral key on
                // every load (spec.md §8 round-trip note).
                creds.pairing_ephemeral_key_pair = crate::crypto::generate_key_pair();
                Ok(Some(creds))
            }
            None => Ok(None),
        }
    }

    pub async fn save_creds(&self, creds: &Credentials) -> Result<()> {
        let json = serde_json::to_string(creds)?;
        let SignedPreKey {
            key_id,
            key_pair,
            signature,
        } = &creds.signed_pre_key;

        sqlx::query(
            "INSERT INTO credentials (instance_id, registration_id, noise_key, identity_key, adv_secret_key,
                signed_pre_key_id, signed_pre_key_pub, signed_pre_key_priv, signed_pre_key_sig, companion_key, creds_json, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(instance_id) DO UPDATE SET
                registration_id = excluded.registration_id,
                noise_key = excluded.noise_key,
                identity_key = excluded.identity_key,
                adv_secret_key = excluded.adv_secret_key,
                signed_pre_key_id = excluded.signed_pre_key_id,
                signed_pre_key_pub = excluded.signed_pre_key_pub,
                signed_pre_key_priv = excluded.signed_pre_key_priv,
                signed_pre_key_sig = excluded.signed_pre_key_sig,
                companion_key = excluded.companion_key,
                creds_json = excluded.creds_json,
                updated_at = CURRENT_TIMESTAMP",
        )
        .bind(&self.instance_id)
        .bind(creds.registration_id as i64)
        .bind(serde_json::to_string(&creds.noise_key)?)
        .bind(serde_json::to_string(&creds.signed_identity_key)?)
        .bind(BASE64.encode(creds.adv_secret_key))
        .bind(*key_id as i64)
        .bind(BASE64.encode(key_pair.public))
        .bind(BASE64.encode(key_pair.private))
        .bind(BASE64.encode(signature))
        .bind(creds.companion_key.as_ref().map(|k| BASE64.encode(k)))
        .bind(json)
        .execute(self.db.pool())
        .await?;

        self.events.emit(CoreEvent::CredsUpdate(Box::new(creds.clone())));
        Ok(())
    }

    /// `markPreKeyAsUsed(keyId)` — spec.md §4.3; every 10th call triggers a
    /// GC pass.
    pub async fn mark_pre_key_as_used(&self, key_id: u32) -> Result<()> {
        let id = key_id.to_string();
        let mut entry = {
            let cache = self.cache.lock().unwrap();
            match cache.entries.get(&(StoreType::PreKey, id.clone())) {
                Some(StoreValue::PreKey(pk)) => pk.clone(),
                _ => return Ok(()),
            }
        };
        entry.used = true;
        entry.used_at = Some(chrono::Utc::now());

        // markPreKeyAsUsed flushes synchronously regardless of pre-key's
        // normal debounce, since a used flag must never be observed stale.
        {
            let mut cache = self.cache.lock().unwrap();
            cache
                .entries
                .insert((StoreType::PreKey, id.clone()), StoreValue::PreKey(entry.clone()));
        }
        self.persist_one(StoreType::PreKey, &id, Some(&StoreValue::PreKey(entry))).await?;

        let should_gc = {
            let mut count = self.pre_key_mark_count.lock().unwrap();
            *count += 1;
            *count % PRE_KEY_GC_INTERVAL == 0
        };
        if should_gc {
            self.cleanup_used_pre_keys().await?;
        }

        let available = self.count_available_pre_keys().await?;
        if available < PRE_KEY_LOW_WATERMARK {
            self.events.emit(CoreEvent::PreKeysLow { count: available });
        }
        Ok(())
    }

    pub async fn cleanup_used_pre_keys(&self) -> Result<()> {
        let used_ids: Vec<String> = sqlx::query("SELECT key_id FROM pre_keys WHERE instance_id = ? AND used = 1")
            .bind(&self.instance_id)
            .fetch_all(self.db.pool())
            .await?
            .into_iter()
            .map(|row| row.get::<i64, _>("key_id").to_string())
            .collect();

        sqlx::query("DELETE FROM pre_keys WHERE instance_id = ? AND used = 1")
            .bind(&self.instance_id)
            .execute(self.db.pool())
            .await?;

        let mut cache = self.cache.lock().unwrap();
        for id in used_ids {
            cache.entries.remove(&(StoreType::PreKey, id));
        }
        Ok(())
    }

    /// `countAvailablePreKeys() → u32` — spec.md §4.3.
    pub async fn count_available_pre_keys(&self) -> Result<u32> {
        let row = sqlx::query("SELECT COUNT(*) as n FROM pre_keys WHERE instance_id = ? AND used = 0")
            .bind(&self.instance_id)
            .fetch_one(self.db.pool())
            .await?;
        Ok(row.get::<i64, _>("n") as u32)
    }

    /// Generates a fresh batch of 30 one-time pre-keys when the server
    /// reports fewer than 5 available (spec.md §3 lifecycle).
    pub async fn replenish_pre_keys(self: &std::sync::Arc<Self>, next_key_id: &mut u32) -> Result<Vec<PreKey>> {
        let mut generated = Vec::with_capacity(PRE_KEY_BATCH_SIZE as usize);
        let mut batch = HashMap::new();
        let mut inner = HashMap::new();
        for _ in 0..PRE_KEY_BATCH_SIZE {
            let pre_key = PreKey::generate(*next_key_id);
            inner.insert(next_key_id.to_string(), Some(StoreValue::PreKey(pre_key.clone())));
            generated.push(pre_key);
            *next_key_id += 1;
        }
        batch.insert(StoreType::PreKey, inner);
        self.set(batch).await?;
        Ok(generated)
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

/// Decodes a base64-stored 32-byte key, rejecting anything that doesn't
/// round-trip to exactly 32 bytes rather than silently truncating/padding
/// a corrupted row (spec.md invariant on key sizes; `ConfigError::
/// KeySizeMismatch`).
fn decode_key32(s: String) -> std::result::Result<[u8; 32], crate::error::ConfigError> {
    let bytes = BASE64.decode(s).unwrap_or_default();
    if bytes.len() != 32 {
        return Err(crate::error::ConfigError::KeySizeMismatch {
            expected: 32,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

fn parse_session_id(id: &str) -> Option<(crate::types::Jid, u32)> {
    let (jid_part, device) = id.rsplit_once(':')?;
    let device: u32 = device.parse().ok()?;
    let jid: crate::types::Jid = jid_part.parse().ok()?;
    Some((jid, device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creds::init_auth_creds;

    async fn test_store() -> std::sync::Arc<AuthStateStore> {
        let db = Database::in_memory().await.unwrap();
        AuthStateStore::new("test-instance", db, EventEmitter::new()).await.unwrap()
    }

    #[tokio::test]
    async fn save_then_load_creds_roundtrips_modulo_ephemeral_key() {
        let store = test_store().await;
        let creds = init_auth_creds();
        store.save_creds(&creds).await.unwrap();

        let loaded = store.load_creds().await.unwrap().unwrap();
        assert_eq!(loaded.registration_id, creds.registration_id);
        assert_eq!(loaded.signed_identity_key.public, creds.signed_identity_key.public);
        assert_eq!(loaded.registered, creds.registered);
    }

    #[tokio::test]
    async fn load_creds_rejects_out_of_range_registration_id() {
        let store = test_store().await;
        let mut creds = init_auth_creds();
        creds.registration_id = 20_000; // outside [1, 16383]
        store.save_creds(&creds).await.unwrap();

        let result = store.load_creds().await;
        assert!(matches!(
            result,
            Err(crate::error::Error::Config(crate::error::ConfigError::InvalidRegistrationId(20_000)))
        ));
    }

    #[tokio::test]
    async fn mark_pre_key_as_used_removes_from_available_count() {
        let store = test_store().await;
        let mut batch = HashMap::new();
        let mut inner = HashMap::new();
        let pre_key = PreKey::generate(1);
        inner.insert("1".to_string(), Some(StoreValue::PreKey(pre_key)));
        batch.insert(StoreType::PreKey, inner);
        store.set(batch).await.unwrap();

        assert_eq!(store.count_available_pre_keys().await.unwrap(), 1);
        store.mark_pre_key_as_used(1).await.unwrap();
        assert_eq!(store.count_available_pre_keys().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn session_set_is_synchronous() {
        let store = test_store().await;
        let mut batch = HashMap::new();
        let mut inner = HashMap::new();
        inner.insert(
            "1234@s.whatsapp.net:1".to_string(),
            Some(StoreValue::Session(SessionRecord::Bytes(vec![1, 2, 3]))),
        );
        batch.insert(StoreType::Session, inner);
        store.set(batch).await.unwrap();

        let row = sqlx::query("SELECT record FROM sessions WHERE instance_id = ? AND jid = ? AND device = ?")
            .bind(store.instance_id())
            .bind("1234@s.whatsapp.net")
            .bind(1i64)
            .fetch_optional(store.db.pool())
            .await
            .unwrap();
        assert!(row.is_some());
    }

    #[tokio::test]
    async fn get_all_dumps_every_type_when_both_filters_are_omitted() {
        let store = test_store().await;
        let mut batch = HashMap::new();
        batch.insert(
            StoreType::PreKey,
            HashMap::from([("1".to_string(), Some(StoreValue::PreKey(PreKey::generate(1))))]),
        );
        batch.insert(
            StoreType::Session,
            HashMap::from([(
                "1234@s.whatsapp.net:1".to_string(),
                Some(StoreValue::Session(SessionRecord::Bytes(vec![9]))),
            )]),
        );
        store.set(batch).await.unwrap();

        let all = store.get_all();
        assert_eq!(all.len(), 2);
        assert!(all.contains_key("1"));
        assert!(all.contains_key("1234@s.whatsapp.net:1"));

        // get(None, Some(ids)) narrows by id regardless of type.
        let narrowed = store.get(None, Some(&["1".to_string()]));
        assert_eq!(narrowed.len(), 1);
    }
}
