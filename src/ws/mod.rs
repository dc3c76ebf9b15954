//! Room membership for live WebSocket connections.
//!
//! The delivery core only ever consumes this through the narrow
//! [`RoomRegistry`] contract: read the room size, broadcast to the room.
//! Membership itself is mutated by the connection handler on
//! subscribe/unsubscribe/disconnect.

use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

use crate::websocket_models::ServerPush;

pub type ConnectionId = Uuid;

/// What the dispatcher needs from the connection layer, and nothing more.
pub trait RoomRegistry: Send + Sync {
    /// Current number of members subscribed to the room.
    fn room_size(&self, room: &str) -> usize;

    /// Fire-and-forget broadcast of one event to every member. Delivery is
    /// unacknowledged; members with a dead connection are pruned.
    fn broadcast(&self, room: &str, event_name: &str, payload: &serde_json::Value);
}

/// In-process registry mapping room name to member senders. Rooms are named
/// after channel names by convention.
#[derive(Default)]
pub struct WsRoomRegistry {
    rooms: DashMap<String, HashMap<ConnectionId, mpsc::UnboundedSender<ServerPush>>>,
}

impl WsRoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(
        &self,
        room: &str,
        connection_id: ConnectionId,
        sender: mpsc::UnboundedSender<ServerPush>,
    ) {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection_id, sender);
        trace!(room, connection_id = %connection_id, "connection joined room");
    }

    pub fn leave(&self, room: &str, connection_id: ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&connection_id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }

    /// Removes the connection from every room it joined.
    pub fn disconnect(&self, connection_id: ConnectionId) {
        for mut entry in self.rooms.iter_mut() {
            entry.value_mut().remove(&connection_id);
        }
        self.rooms.retain(|_, members| !members.is_empty());
    }
}

impl RoomRegistry for WsRoomRegistry {
    fn room_size(&self, room: &str) -> usize {
        self.rooms.get(room).map(|members| members.len()).unwrap_or(0)
    }

    fn broadcast(&self, room: &str, event_name: &str, payload: &serde_json::Value) {
        let Some(mut members) = self.rooms.get_mut(room) else {
            return;
        };
        let push = ServerPush::Event {
            channel: room.to_string(),
            event_name: event_name.to_string(),
            payload: payload.clone(),
        };
        // A failed send means the socket task is gone; drop the member.
        members.retain(|_, sender| sender.send(push.clone()).is_ok());
    }
}
