use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::WsMessage;

pub type WsSender = mpsc::UnboundedSender<WsMessage>;

/// Open push connections keyed by user id. A user may hold several sockets
/// (one per tab or device); each gets its own connection id.
#[derive(Clone, Default)]
pub struct ConnectionManager {
    connections: Arc<DashMap<Uuid, Vec<(Uuid, WsSender)>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_connection(&self, user_id: Uuid, sender: WsSender) -> Uuid {
        let connection_id = Uuid::new_v4();
        self.connections
            .entry(user_id)
            .or_default()
            .push((connection_id, sender));
        connection_id
    }

    pub fn remove_connection(&self, user_id: &Uuid, connection_id: &Uuid) {
        if let Some(mut senders) = self.connections.get_mut(user_id) {
            senders.retain(|(id, _)| id != connection_id);
        }
        self.connections
            .remove_if(user_id, |_, senders| senders.is_empty());
    }

    pub fn is_online(&self, user_id: &Uuid) -> bool {
        self.connections.contains_key(user_id)
    }

    /// Best-effort delivery; closed sockets are dropped on the way.
    pub fn send_to_user(&self, user_id: &Uuid, message: WsMessage) {
        if let Some(mut senders) = self.connections.get_mut(user_id) {
            senders.retain(|(_, sender)| sender.send(message.clone()).is_ok());
        }
    }
}
