//! Cryptographic session substrate for a multi-tenant WhatsApp Web
//! protocol client: the auth-state store, the Signal protocol store
//! adapter, device pairing, and message decryption.
//!
//! The transport, HTTP/WebSocket surface, and instance orchestrator are
//! external collaborators; this crate covers the pieces underneath them.

pub mod config;
pub mod creds;
pub mod crypto;
pub mod db;
pub mod decrypt;
pub mod error;
pub mod events;
pub mod node;
pub mod pairing;
pub mod ratchet;
pub mod store;
pub mod types;

pub use config::Config;
pub use creds::Credentials;
pub use error::{Error, Result};
pub use events::{CoreEvent, EventEmitter};
pub use node::Node;
pub use store::{AuthStateStore, SignalProtocolStore};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
