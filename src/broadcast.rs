use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::protocol::{QueuePolicy, ServerMessage};
use crate::types::WorldState;

pub const CLIENT_QUEUE_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

/// Fan-out of simulator messages to every connected transport. Each client
/// owns a bounded queue; a client that cannot keep up with a message whose
/// policy is `DisconnectOnFull` is dropped rather than left desynced.
#[derive(Debug, Default)]
pub struct BroadcastHub {
    clients: HashMap<String, mpsc::Sender<OutboundMessage>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    /// Queues the full `world_state` before anything else. A client whose
    /// queue rejects the snapshot is never registered.
    pub fn register(
        &mut self,
        client_id: &str,
        tx: mpsc::Sender<OutboundMessage>,
        snapshot: WorldState,
    ) -> bool {
        let payload = match ServerMessage::WorldState(snapshot).encode() {
            Ok(payload) => payload,
            Err(error) => {
                warn!(client = client_id, %error, "failed to encode world_state");
                return false;
            }
        };
        if tx.try_send(OutboundMessage::Text(payload)).is_err() {
            return false;
        }
        self.clients.insert(client_id.to_string(), tx);
        debug!(client = client_id, clients = self.clients.len(), "client registered");
        true
    }

    pub fn unregister(&mut self, client_id: &str) -> bool {
        let removed = self.clients.remove(client_id).is_some();
        if removed {
            debug!(client = client_id, clients = self.clients.len(), "client unregistered");
        }
        removed
    }

    /// Asks the writer to close the socket, then forgets the client.
    pub fn disconnect(&mut self, client_id: &str, reason: &str) {
        if let Some(tx) = self.clients.remove(client_id) {
            let _ = tx.try_send(OutboundMessage::Close {
                code: 1008,
                reason: reason.to_string(),
            });
            debug!(client = client_id, reason, "client disconnected");
        }
    }

    /// Encodes once and offers the payload to every client. Returns how many
    /// queues accepted it.
    pub fn broadcast(&mut self, message: &ServerMessage) -> usize {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(error) => {
                warn!(kind = message.kind(), %error, "failed to encode message");
                return 0;
            }
        };
        let policy = message.queue_policy();
        let mut delivered = 0;
        let mut overflowed = Vec::new();
        let mut closed = Vec::new();
        for (client_id, tx) in &self.clients {
            match tx.try_send(OutboundMessage::Text(payload.clone())) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    if policy == QueuePolicy::DisconnectOnFull {
                        overflowed.push(client_id.clone());
                    }
                }
                Err(TrySendError::Closed(_)) => closed.push(client_id.clone()),
            }
        }
        for client_id in overflowed {
            warn!(client = %client_id, kind = message.kind(), "dropping slow client");
            self.disconnect(&client_id, "send queue overflow");
        }
        for client_id in closed {
            self.unregister(&client_id);
        }
        delivered
    }

    pub fn broadcast_all(&mut self, messages: &[ServerMessage]) {
        for message in messages {
            if self.clients.is_empty() {
                return;
            }
            self.broadcast(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_server_message;
    use crate::types::Statistics;

    fn text(outbound: OutboundMessage) -> ServerMessage {
        match outbound {
            OutboundMessage::Text(raw) => decode_server_message(&raw).expect("decodes"),
            OutboundMessage::Close { .. } => panic!("unexpected close"),
        }
    }

    fn remove(id: &str) -> ServerMessage {
        ServerMessage::CharacterRemove {
            character_id: id.to_string(),
        }
    }

    #[test]
    fn registration_sends_world_state_first() {
        let mut hub = BroadcastHub::new();
        let (tx, mut rx) = mpsc::channel(8);
        assert!(hub.register("client_1", tx, WorldState::default()));
        hub.broadcast(&remove("soul_1"));

        let first = text(rx.try_recv().expect("snapshot"));
        assert_eq!(first.kind(), "world_state");
        assert_eq!(text(rx.try_recv().expect("event")), remove("soul_1"));
    }

    #[test]
    fn full_queue_drops_droppable_messages_but_keeps_client() {
        let mut hub = BroadcastHub::new();
        let (tx, _rx) = mpsc::channel(1);
        assert!(hub.register("client_1", tx, WorldState::default()));

        let stats = ServerMessage::StatisticsUpdate {
            statistics: Statistics::default(),
        };
        assert_eq!(hub.broadcast(&stats), 0);
        assert!(hub.contains("client_1"));
    }

    #[test]
    fn full_queue_disconnects_on_critical_messages() {
        let mut hub = BroadcastHub::new();
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        assert!(hub.register("slow", slow_tx, WorldState::default()));
        assert!(hub.register("fast", fast_tx, WorldState::default()));

        assert_eq!(hub.broadcast(&remove("soul_9")), 1);
        assert!(!hub.contains("slow"));
        assert!(hub.contains("fast"));
        fast_rx.try_recv().expect("snapshot");
        assert_eq!(text(fast_rx.try_recv().expect("event")), remove("soul_9"));
    }

    #[test]
    fn closed_receivers_are_pruned() {
        let mut hub = BroadcastHub::new();
        let (tx, rx) = mpsc::channel(8);
        assert!(hub.register("client_1", tx, WorldState::default()));
        drop(rx);
        hub.broadcast(&remove("soul_1"));
        assert!(hub.is_empty());
    }
}
