use tracing::{info, Level};

use wasession::config::Config;
use wasession::creds::init_auth_creds;
use wasession::db::Database;
use wasession::events::EventEmitter;
use wasession::store::{AuthStateStore, SignalProtocolStore};

/// Demonstrates wiring a fresh instance through credential init and store
/// construction. The Noise handshake, QR rendering, and wire transport
/// live outside this crate (see the crate-level docs).
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = Config::default();
    info!(auth_dir = %config.auth_dir.display(), "starting instance");

    let db = Database::in_memory().await?;
    let events = EventEmitter::new();
    let mut subscriber = events.subscribe();

    let auth_state = AuthStateStore::new("demo-instance", db, events).await?;

    let creds = match auth_state.load_creds().await? {
        Some(creds) => {
            info!("loaded existing credentials, registered = {}", creds.registered);
            creds
        }
        None => {
            info!("no credentials on disk, generating fresh identity");
            let creds = init_auth_creds();
            auth_state.save_creds(&creds).await?;
            creds
        }
    };

    let signal_store = SignalProtocolStore::new(
        auth_state,
        &creds.signed_identity_key,
        creds.registration_id,
        creds.signed_pre_key.key_pair,
        creds.companion_key.clone(),
    );

    info!(
        registration_id = signal_store.get_local_registration_id(),
        "ready for pairing and message decryption"
    );

    if let Ok(event) = subscriber.try_recv() {
        info!(?event, "observed event emitted during startup");
    }

    Ok(())
}
