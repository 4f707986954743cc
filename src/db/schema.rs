//! Table definitions for the auth-state store (C3), grounded on the
//! teacher's `database::schema` constant-array convention.

pub const SCHEMA_VERSION: i32 = 1;

pub const CREATE_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS credentials (
        instance_id TEXT PRIMARY KEY,
        registration_id INTEGER NOT NULL,
        noise_key TEXT NOT NULL,
        identity_key TEXT NOT NULL,
        adv_secret_key TEXT NOT NULL,
        signed_pre_key_id INTEGER,
        signed_pre_key_pub TEXT,
        signed_pre_key_priv TEXT,
        signed_pre_key_sig TEXT,
        companion_key TEXT,
        creds_json TEXT NOT NULL,
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        instance_id TEXT NOT NULL,
        jid TEXT NOT NULL,
        device INTEGER NOT NULL,
        record TEXT NOT NULL,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (instance_id, jid, device)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pre_keys (
        instance_id TEXT NOT NULL,
        key_id INTEGER NOT NULL,
        public_key TEXT NOT NULL,
        private_key TEXT NOT NULL,
        used BOOLEAN NOT NULL DEFAULT 0,
        used_at DATETIME,
        PRIMARY KEY (instance_id, key_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS identities (
        instance_id TEXT NOT NULL,
        jid TEXT NOT NULL,
        identity_key TEXT NOT NULL,
        trust_level INTEGER NOT NULL DEFAULT 0,
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (instance_id, jid)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sender_keys (
        instance_id TEXT NOT NULL,
        group_id TEXT NOT NULL,
        sender_id TEXT NOT NULL,
        sender_key BLOB NOT NULL,
        PRIMARY KEY (instance_id, group_id, sender_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS app_state_keys (
        instance_id TEXT NOT NULL,
        key_id TEXT NOT NULL,
        key_data BLOB NOT NULL,
        PRIMARY KEY (instance_id, key_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS app_state_versions (
        instance_id TEXT NOT NULL,
        name TEXT NOT NULL,
        version INTEGER NOT NULL,
        hash BLOB NOT NULL,
        PRIMARY KEY (instance_id, name)
    )
    "#,
];

pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_sessions_instance ON sessions (instance_id)",
    "CREATE INDEX IF NOT EXISTS idx_pre_keys_used ON pre_keys (instance_id, used)",
    "CREATE INDEX IF NOT EXISTS idx_identities_instance ON identities (instance_id)",
];
