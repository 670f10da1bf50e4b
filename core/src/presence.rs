/// Presence registry: which users are reachable over a live connection
use crate::protocol::ServerEvent;
use crate::store::UserStore;
use crate::types::PresenceStatus;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::warn;

/// Handle to one live connection: the connection id and the outbound
/// event channel drained by that connection's writer task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub conn_id: String,
    pub sender: mpsc::UnboundedSender<ServerEvent>,
}

/// Single source of truth for "is this user reachable now". Owned and
/// injected explicitly (constructed per hub, or per test with a fake
/// user store) rather than living in a process-wide singleton.
#[derive(Clone)]
pub struct PresenceRegistry {
    entries: Arc<RwLock<HashMap<String, ConnectionHandle>>>,
    users: UserStore,
}

impl PresenceRegistry {
    pub fn new(users: UserStore) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            users,
        }
    }

    /// Bind a user to a connection, replacing any prior binding
    /// (last-writer-wins; one active connection per user is assumed).
    /// Also persists Online status best-effort: a failed status write
    /// must never block the connection lifecycle.
    pub async fn register(&self, user_id: &str, handle: ConnectionHandle) {
        let mut entries = self.entries.write().await;
        entries.insert(user_id.to_string(), handle);
        drop(entries);

        if let Err(e) = self.users.set_status(user_id, PresenceStatus::Online) {
            warn!("Failed to persist Online status for {}: {}", user_id, e);
        }
    }

    /// Remove the binding for a user. Idempotent; no error if absent.
    pub async fn unregister(&self, user_id: &str) {
        let removed = self.entries.write().await.remove(user_id);
        if removed.is_some() {
            if let Err(e) = self.users.set_status(user_id, PresenceStatus::Offline) {
                warn!("Failed to persist Offline status for {}: {}", user_id, e);
            }
        }
    }

    /// Remove the binding only if it still belongs to `conn_id`. A
    /// session closing after its user reconnected elsewhere must not
    /// clobber the newer binding.
    pub async fn unregister_conn(&self, user_id: &str, conn_id: &str) {
        let mut entries = self.entries.write().await;
        let matches = entries
            .get(user_id)
            .map(|h| h.conn_id == conn_id)
            .unwrap_or(false);
        if !matches {
            return;
        }
        entries.remove(user_id);
        drop(entries);

        if let Err(e) = self.users.set_status(user_id, PresenceStatus::Offline) {
            warn!("Failed to persist Offline status for {}: {}", user_id, e);
        }
    }

    /// Non-blocking read of the current binding.
    pub async fn lookup(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.entries.read().await.get(user_id).cloned()
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.entries.read().await.contains_key(user_id)
    }

    pub async fn online_count(&self) -> usize {
        self.entries.read().await.len()
    }
}
