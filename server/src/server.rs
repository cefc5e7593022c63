use std::time::{Duration, Instant};

use tokio::sync::mpsc::{channel, Sender};

use system::{serde_json, ClientMessage, ConnectionId, RoomId, ServerMessage, UserIdentity};

use crate::config::ServerConfig;
use crate::connection::{ConnectionCommand, ConnectionEvent};
use crate::connection_tx_storage::{ConnectionTx, ConnectionTxStorage};
use crate::room_store::RoomStore;

pub type ServerTx = Sender<ConnectionCommand>;

/// The broker: a single task owns every room, so message handling and the
/// heartbeat sweep never run concurrently against shared state. The
/// join → history replay → presence broadcast sequence is therefore atomic
/// relative to every other connection's traffic.
struct Server {
    rooms: RoomStore,
    connections: ConnectionTxStorage,
    idle_timeout: Duration,
    room_ttl: Duration,
}

impl Server {
    fn new(idle_timeout: Duration, room_ttl: Duration) -> Self {
        Self {
            rooms: RoomStore::new(),
            connections: ConnectionTxStorage::new(),
            idle_timeout,
            room_ttl,
        }
    }

    fn handle_connection_command(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Connect { tx } => self.connect(tx),
            ConnectionCommand::Disconnect { from } => self.disconnect(&from),
            ConnectionCommand::Incoming { from, message } => {
                self.handle_client_message(&from, message)
            }
        }
    }

    fn connect(&mut self, tx: ConnectionTx) {
        let connection_id = self.rooms.new_connection_id();
        self.connections.insert(connection_id, tx);
        self.connections
            .send(&connection_id, ConnectionEvent::Connected { connection_id });
        log::info!("connection {} accepted", connection_id);
    }

    /// Graceful close and idle eviction share this departure path.
    fn disconnect(&mut self, from: &ConnectionId) {
        if let Some(room_id) = self.rooms.leave(*from, Instant::now()) {
            log::info!("connection {} left room {:?}", from, room_id);
            self.broadcast_presence(&room_id);
        }
        self.connections.remove(from);
    }

    fn handle_client_message(&mut self, from: &ConnectionId, message: ClientMessage) {
        let now = Instant::now();
        match message {
            ClientMessage::Hello { room, user } => self.handle_hello(from, room, user, now),
            ClientMessage::Draw { stroke } => {
                // Pre-handshake draws are discarded silently.
                let room_id = match self.rooms.room_of(from) {
                    Some(room_id) => room_id.clone(),
                    None => return,
                };
                self.rooms.touch(*from, now);
                if !stroke.is_well_formed() {
                    log::debug!("connection {}: rejecting malformed stroke", from);
                    return;
                }
                if let Some(room) = self.rooms.room_mut(&room_id) {
                    room.append_stroke(stroke.clone());
                }
                // No echo suppression: the sender rendered optimistically
                // and still receives its own stroke.
                self.broadcast(&room_id, &ServerMessage::Draw { stroke }, None);
            }
            ClientMessage::Clear { by } => {
                let room_id = match self.rooms.room_of(from) {
                    Some(room_id) => room_id.clone(),
                    None => return,
                };
                self.rooms.touch(*from, now);
                if let Some(room) = self.rooms.room_mut(&room_id) {
                    room.clear();
                }
                log::info!("room {:?} cleared by connection {}", room_id, from);
                self.broadcast(&room_id, &ServerMessage::Clear { by }, None);
            }
            ClientMessage::Ping => {
                if self.rooms.room_of(from).is_none() {
                    return;
                }
                self.rooms.touch(*from, now);
                self.send(from, &ServerMessage::Pong);
            }
            ClientMessage::Unknown => {
                // Forward-compatible no-op; a parsed message still counts
                // as activity.
                self.rooms.touch(*from, now);
            }
        }
    }

    /// Binds (or rebinds) room and identity, replays history to the sender,
    /// then re-broadcasts presence to the whole room, sender included.
    fn handle_hello(
        &mut self,
        from: &ConnectionId,
        room_id: RoomId,
        user: Option<UserIdentity>,
        now: Instant,
    ) {
        let user = user.unwrap_or_else(UserIdentity::anonymous);
        if let Some(previous) = self.rooms.join(*from, &room_id, user, now) {
            self.broadcast_presence(&previous);
        }
        log::info!("connection {} joined room {:?}", from, room_id);

        let strokes = self
            .rooms
            .room(&room_id)
            .map(|room| room.history_snapshot())
            .unwrap_or_default();
        self.send(from, &ServerMessage::History { strokes });
        self.broadcast_presence(&room_id);
    }

    fn send(&mut self, to: &ConnectionId, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(text) => self.connections.send(to, ConnectionEvent::Outbound(text)),
            Err(err) => log::warn!("failed to encode message: {}", err),
        }
    }

    /// Serializes once, then best-effort delivery to every member except
    /// `without`; unreachable members are skipped silently.
    fn broadcast(&mut self, room_id: &RoomId, message: &ServerMessage, without: Option<&ConnectionId>) {
        let members: Vec<ConnectionId> = match self.rooms.room(room_id) {
            Some(room) => room.members().to_vec(),
            None => return,
        };
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(err) => {
                log::warn!("failed to encode broadcast: {}", err);
                return;
            }
        };
        for connection_id in members {
            if without.map_or(false, |w| *w == connection_id) {
                continue;
            }
            self.connections
                .send(&connection_id, ConnectionEvent::Outbound(text.clone()));
        }
    }

    fn broadcast_presence(&mut self, room_id: &RoomId) {
        let users = match self.rooms.room(room_id) {
            Some(room) => room.presence(),
            None => return,
        };
        self.broadcast(room_id, &ServerMessage::Presence { users }, None);
    }

    /// Heartbeat sweep: evict over-threshold connections through the same
    /// departure path as a graceful close, then reclaim long-empty rooms.
    fn sweep_idle(&mut self, now: Instant) {
        for (room_id, connection_id) in self.rooms.idle_connections(now, self.idle_timeout) {
            log::info!(
                "evicting idle connection {} from room {:?}",
                connection_id,
                room_id
            );
            self.rooms.leave(connection_id, now);
            self.connections
                .send(&connection_id, ConnectionEvent::Disconnected);
            self.connections.remove(&connection_id);
            self.broadcast_presence(&room_id);
        }

        let reclaimed = self.rooms.reclaim_empty_rooms(now, self.room_ttl);
        if reclaimed > 0 {
            log::info!("reclaimed {} empty room(s)", reclaimed);
        }
    }
}

pub fn spawn_server(config: &ServerConfig) -> ServerTx {
    let (srv_tx, mut srv_rx) = channel::<ConnectionCommand>(64);
    let idle_timeout = config.idle_timeout;
    let room_ttl = config.room_ttl;
    let sweep_interval = config.sweep_interval;

    tokio::spawn(async move {
        let mut server = Server::new(idle_timeout, room_ttl);
        let mut sweep = tokio::time::interval(sweep_interval);
        loop {
            tokio::select! {
                command = srv_rx.recv() => match command {
                    Some(command) => server.handle_connection_command(command),
                    None => break,
                },
                _ = sweep.tick() => server.sweep_idle(Instant::now()),
            }
        }
    });

    srv_tx
}
