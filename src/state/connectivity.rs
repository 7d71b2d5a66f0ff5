//! Connectivity mode of the current connection generation.
//!
//! Published through a `watch` channel so any front end can observe it.
//! Transitions are driven only by the read loop (failure), `release`, and
//! operator-initiated `connect`.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityMode {
    Connected,
    Offline,
}

/// Snapshot of the connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub mode: ConnectivityMode,
    /// Generation the mode refers to; 0 before the first connect.
    pub generation: u64,
    /// Why the last generation went offline.
    pub reason: Option<String>,
}

impl LinkStatus {
    pub fn is_connected(&self) -> bool {
        self.mode == ConnectivityMode::Connected
    }
}

/// Shared, cloneable handle to the connectivity state.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<LinkStatus>>,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new()
    }
}

impl Connectivity {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LinkStatus {
            mode: ConnectivityMode::Offline,
            generation: 0,
            reason: None,
        });
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.tx.subscribe()
    }

    pub fn status(&self) -> LinkStatus {
        self.tx.borrow().clone()
    }

    pub fn mode(&self) -> ConnectivityMode {
        self.tx.borrow().mode
    }

    /// A new generation is live.
    pub fn mark_connected(&self, generation: u64) {
        self.tx.send_replace(LinkStatus {
            mode: ConnectivityMode::Connected,
            generation,
            reason: None,
        });
        info!(generation, "Connectivity: connected");
    }

    /// Move `generation` to Offline.
    ///
    /// Returns `true` only for the first call per generation; calls for an
    /// older generation are ignored.
    pub fn mark_offline(&self, generation: u64, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let changed = self.tx.send_if_modified(|status| {
            if status.generation != generation || status.mode == ConnectivityMode::Offline {
                return false;
            }
            status.mode = ConnectivityMode::Offline;
            status.reason = Some(reason.clone());
            true
        });
        if changed {
            warn!(generation, %reason, "Connectivity: offline");
        }
        changed
    }
}
