use std::collections::HashMap;
use std::num::Wrapping;
use std::time::{Duration, Instant};

use system::{ConnectionId, RoomId, UserIdentity};

use crate::room::Room;

/// Registry of rooms plus the connection→room binding that enforces "a
/// connection is a member of at most one room at a time". Rooms are created
/// lazily and reclaimed only after sitting empty beyond a TTL.
pub struct RoomStore {
    connection_id_source: Wrapping<ConnectionId>,
    connection_rooms: HashMap<ConnectionId, RoomId>,
    rooms: HashMap<RoomId, Room>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self {
            connection_id_source: Wrapping(0),
            connection_rooms: HashMap::new(),
            rooms: HashMap::new(),
        }
    }

    pub fn new_connection_id(&mut self) -> ConnectionId {
        self.connection_id_source += Wrapping(1);
        self.connection_id_source.0
    }

    /// Deterministic and idempotent; accepts any string as a room id.
    pub fn get_or_create(&mut self, room_id: &str, now: Instant) -> &mut Room {
        self.rooms
            .entry(room_id.to_owned())
            .or_insert_with(|| Room::new(now))
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    pub fn room_of(&self, connection_id: &ConnectionId) -> Option<&RoomId> {
        self.connection_rooms.get(connection_id)
    }

    /// Joins `connection_id` to `room_id`, leaving its previous room first.
    /// Returns the previous room id when the connection moved, so the caller
    /// can re-broadcast presence there.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        room_id: &str,
        user: UserIdentity,
        now: Instant,
    ) -> Option<RoomId> {
        let moved = self
            .connection_rooms
            .get(&connection_id)
            .map_or(false, |current| current != room_id);
        let previous = if moved {
            self.leave(connection_id, now)
        } else {
            None
        };

        self.get_or_create(room_id, now).join(connection_id, user, now);
        self.connection_rooms
            .insert(connection_id, room_id.to_owned());
        previous
    }

    /// Removes the connection from its room, if any, returning the room id.
    pub fn leave(&mut self, connection_id: ConnectionId, now: Instant) -> Option<RoomId> {
        let room_id = self.connection_rooms.remove(&connection_id)?;
        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.leave(connection_id, now);
        }
        Some(room_id)
    }

    /// Refreshes the activity clock of a joined connection; no-op otherwise.
    pub fn touch(&mut self, connection_id: ConnectionId, now: Instant) {
        if let Some(room_id) = self.connection_rooms.get(&connection_id) {
            if let Some(room) = self.rooms.get_mut(room_id) {
                room.touch(connection_id, now);
            }
        }
    }

    pub fn idle_connections(
        &self,
        now: Instant,
        timeout: Duration,
    ) -> Vec<(RoomId, ConnectionId)> {
        let mut idle = Vec::new();
        for (room_id, room) in &self.rooms {
            for connection_id in room.idle_members(now, timeout) {
                idle.push((room_id.clone(), connection_id));
            }
        }
        idle
    }

    /// Drops rooms that have sat empty beyond `ttl`; a dropped room is
    /// recreated lazily (with empty history) if ever referenced again.
    pub fn reclaim_empty_rooms(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|_, room| !room.reclaimable(now, ttl));
        before - self.rooms.len()
    }
}
