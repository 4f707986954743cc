//! Recognized configuration options (spec.md §6), reified as a serde
//! struct per the ambient-stack convention (a config object rather than a
//! scattered set of env lookups), grounded on the teacher's
//! `database::DatabaseConfig`-style `Default` impl.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_qr_timeout_ms() -> u64 {
    60_000
}

fn default_reconnect_attempts() -> u8 {
    3
}

fn default_batch_size() -> u8 {
    5
}

fn default_init_delay_ms() -> u64 {
    0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub auth_dir: PathBuf,

    #[serde(default = "default_qr_timeout_ms")]
    pub qr_timeout_ms: u64,

    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u8,

    #[serde(default = "default_batch_size")]
    pub batch_size: u8,

    #[serde(default = "default_init_delay_ms")]
    pub init_delay_ms: u64,

    #[serde(default)]
    pub verbose_signal_log: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth_dir: PathBuf::from("./auth"),
            qr_timeout_ms: default_qr_timeout_ms(),
            reconnect_attempts: default_reconnect_attempts(),
            batch_size: default_batch_size(),
            init_delay_ms: default_init_delay_ms(),
            verbose_signal_log: false,
        }
    }
}
