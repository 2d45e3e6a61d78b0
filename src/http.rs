//! Mapbox access-token validation.
//!
//! One probe request against the tile API decides validity: HTTP success
//! means the key works, anything else means it does not. No retries; the
//! transport's default timeout applies. The background variant runs on its
//! own thread with a dedicated runtime and reports through a channel handle,
//! so store initialization never blocks on the network.
//!
//! Startup wiring: a key loaded from storage is re-validated off to the
//! side, and the result is applied as a regular settings mutation.
//!
//! ```no_run
//! use std::sync::Arc;
//! use veloroute::{validate_key_in_background, MemoryStore, RouteStore};
//!
//! let mut store = RouteStore::new(vec![Arc::new(MemoryStore::new())]);
//! if let Some(key) = store.initialize() {
//!     let handle = validate_key_in_background(&key);
//!     let valid = handle.recv().unwrap_or(false);
//!     store.update_settings(|s| s.mapbox_key_valid = valid);
//! }
//! ```

use std::sync::mpsc;
use std::thread;

use log::{debug, warn};

use crate::error::Error;

/// A style tile that any valid public token can fetch.
const TILE_PROBE_URL: &str = "https://api.mapbox.com/styles/v1/mapbox/streets-v11/tiles/1/1/1";

/// Handle for a background key validation.
pub struct KeyValidationHandle {
    receiver: mpsc::Receiver<bool>,
}

impl KeyValidationHandle {
    /// Check for a result without blocking.
    pub fn try_recv(&self) -> Option<bool> {
        self.receiver.try_recv().ok()
    }

    /// Wait for the result (blocking).
    pub fn recv(self) -> Option<bool> {
        self.receiver.recv().ok()
    }
}

/// Validate a Mapbox access token. An empty key is invalid without a
/// request; a failed request marks the key invalid rather than erroring.
pub async fn validate_mapbox_key(key: &str) -> bool {
    if key.is_empty() {
        return false;
    }

    let url = format!("{}?access_token={}", TILE_PROBE_URL, key);
    match reqwest::get(&url).await {
        Ok(response) => {
            let valid = response.status().is_success();
            if !valid {
                debug!("mapbox key rejected: HTTP {}", response.status());
            }
            valid
        }
        Err(err) => {
            warn!("{}", Error::network(err.to_string()));
            false
        }
    }
}

/// Spawn a validation on a background thread. The caller polls the handle
/// and applies the result to the store on its own turn.
pub fn validate_key_in_background(key: &str) -> KeyValidationHandle {
    let (sender, receiver) = mpsc::channel();
    let key = key.to_string();

    thread::spawn(move || {
        let valid = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(validate_mapbox_key(&key)),
            Err(err) => {
                warn!("failed to create validation runtime: {}", err);
                false
            }
        };
        // Receiver may be gone if the app shut down; nothing to do then.
        let _ = sender.send(valid);
    });

    KeyValidationHandle { receiver }
}

// ============================================================================
// Tests
// ============================================================================
