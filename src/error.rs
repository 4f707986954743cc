use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Curve25519/AES primitive failures (C1).
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("signature did not verify")]
    BadSignature,

    #[error("AEAD tag did not verify")]
    BadTag,

    #[error("invalid PKCS#7 padding")]
    PadError,

    #[error("key too short: expected {expected}, got {actual}")]
    ShortKey { expected: usize, actual: usize },

    #[error("signature too short: expected {expected}, got {actual}")]
    ShortSignature { expected: usize, actual: usize },
}

/// `pair-success` stanza processing failures (C5).
#[derive(Error, Debug)]
pub enum PairError {
    #[error("malformed pair-success node: {0}")]
    MalformedNode(String),

    #[error("ADV HMAC did not verify")]
    BadHMAC,

    #[error("ADV account signature did not verify")]
    BadAccountSignature,
}

/// Message decryption failures (C6).
#[derive(Error, Debug)]
pub enum DecryptError {
    #[error("payload failed integrity check")]
    Tampered,

    #[error("ratchet state mismatch")]
    RatchetMismatch,

    #[error("no session exists for this peer")]
    NoSession,

    #[error("referenced pre-key {0} is not known")]
    UnknownPreKey(u32),

    #[error("unsupported encrypted node type: {0}")]
    UnsupportedType(String),

    #[error("duplicate delivery of an already-processed first message")]
    DuplicateMessage,
}

/// Auth-state store failures (C3).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("conflicting write")]
    Conflict,

    #[error("storage I/O failure: {0}")]
    IOFailure(String),
}

/// Instance/credential initialization failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("registration id {0} out of range [1, 16383]")]
    InvalidRegistrationId(u32),

    #[error("key size mismatch: expected {expected}, got {actual}")]
    KeySizeMismatch { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("pairing error: {0}")]
    Pair(#[from] PairError),

    #[error("decrypt error: {0}")]
    Decrypt(#[from] DecryptError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JID: {0}")]
    InvalidJid(String),
}
