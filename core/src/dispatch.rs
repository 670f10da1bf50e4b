/// Event dispatcher: best-effort fan-out to live connections
use crate::presence::PresenceRegistry;
use crate::protocol::ServerEvent;
use tracing::debug;

/// Routes outbound events through the presence registry. Delivery is
/// strictly best-effort to currently-connected recipients: an offline
/// target is a silent no-op, never an error. No queue, no retry.
#[derive(Clone)]
pub struct EventDispatcher {
    presence: PresenceRegistry,
}

impl EventDispatcher {
    pub fn new(presence: PresenceRegistry) -> Self {
        Self { presence }
    }

    pub async fn emit(&self, user_id: &str, event: ServerEvent) {
        match self.presence.lookup(user_id).await {
            Some(handle) => {
                // A closed channel means the connection is tearing
                // down; treated the same as offline.
                if let Err(e) = handle.sender.send(event) {
                    debug!("Dropped {} for {}: connection closing", e.0.event_name(), user_id);
                }
            }
            None => {
                debug!("No live connection for {}, event dropped", user_id);
            }
        }
    }
}
