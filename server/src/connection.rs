use actix::{Actor, ActorContext, AsyncContext, Handler, Message, Running, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;

use system::{serde_json, ClientMessage, ConnectionId};

use crate::connection_tx_storage::ConnectionTx;
use crate::server::ServerTx;

#[derive(Debug)]
pub enum ConnectionCommand {
    Connect {
        tx: ConnectionTx,
    },
    Disconnect {
        from: ConnectionId,
    },
    Incoming {
        from: ConnectionId,
        message: ClientMessage,
    },
}

/// Events the broker pushes to a single connection.
#[derive(Debug)]
pub enum ConnectionEvent {
    Connected { connection_id: ConnectionId },
    /// Pre-serialized protocol message ready for the wire.
    Outbound(String),
    /// Forced close, used by idle eviction.
    Disconnected,
}

#[derive(Message)]
#[rtype(result = "()")]
struct ConnectionActorMessage(ConnectionEvent);

enum ConnectionState {
    Idle,
    Connected(ConnectionId),
}

/// Frames held back while the broker has not yet assigned this connection
/// its id. A handshake burst is a few frames at most.
const PENDING_FRAME_LIMIT: usize = 16;

pub struct ConnectionActor {
    state: ConnectionState,
    srv_tx: ServerTx,
    pending: Vec<ClientMessage>,
}

impl ConnectionActor {
    fn new(srv_tx: ServerTx) -> Self {
        Self {
            state: ConnectionState::Idle,
            srv_tx,
            pending: Vec::new(),
        }
    }

    fn forward(&mut self, from: ConnectionId, message: ClientMessage) {
        let _ = self
            .srv_tx
            .try_send(ConnectionCommand::Incoming { from, message });
    }

    /// A frame can race the broker's `Connected` round-trip; it is buffered
    /// and replayed once the id lands, so a fast client's `hello` is not
    /// lost.
    fn accept_frame(&mut self, message: ClientMessage) {
        match self.state {
            ConnectionState::Connected(from) => self.forward(from, message),
            ConnectionState::Idle => {
                if self.pending.len() < PENDING_FRAME_LIMIT {
                    self.pending.push(message);
                } else {
                    log::debug!("dropping frame received before connection setup");
                }
            }
        }
    }

    fn bind(&mut self, connection_id: ConnectionId) {
        self.state = ConnectionState::Connected(connection_id);
        for message in std::mem::take(&mut self.pending) {
            self.forward(connection_id, message);
        }
    }
}

impl Actor for ConnectionActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<ConnectionEvent>(32);

        if self
            .srv_tx
            .try_send(ConnectionCommand::Connect { tx })
            .is_err()
        {
            log::warn!("broker unavailable, refusing connection");
            ctx.stop();
            return;
        }

        let addr = ctx.address().recipient();
        let mut srv_tx = self.srv_tx.clone();
        tokio::spawn(async move {
            let mut connection_id = None;
            while let Some(event) = rx.recv().await {
                if let ConnectionEvent::Connected { connection_id: id } = &event {
                    connection_id = Some(*id);
                }
                if addr.try_send(ConnectionActorMessage(event)).is_err() {
                    break;
                }
            }
            // The actor is gone or the broker dropped our egress; either
            // way the broker must forget this connection. Disconnect is
            // idempotent, so overlapping with `stopping` is harmless.
            if let Some(from) = connection_id {
                let _ = srv_tx.try_send(ConnectionCommand::Disconnect { from });
            }
        });
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        if let ConnectionState::Connected(id) = self.state {
            let _ = self.srv_tx.try_send(ConnectionCommand::Disconnect { from: id });
        }
        Running::Stop
    }
}

/// Ingress: decode JSON text frames. Anything undecodable is dropped without
/// closing the connection; one bad frame must never disrupt a shared room.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ConnectionActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => ctx.pong(&payload),
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => self.accept_frame(message),
                Err(err) => log::debug!("dropping undecodable frame ({})", err),
            },
            Ok(ws::Message::Close(_)) => ctx.stop(),
            _ => (),
        }
    }
}

/// Egress
impl Handler<ConnectionActorMessage> for ConnectionActor {
    type Result = ();

    fn handle(&mut self, msg: ConnectionActorMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match msg.0 {
            ConnectionEvent::Connected { connection_id } => self.bind(connection_id),
            ConnectionEvent::Outbound(text) => ctx.text(text),
            ConnectionEvent::Disconnected => {
                ctx.close(None);
                ctx.stop();
            }
        }
    }
}

pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    srv_tx: web::Data<ServerTx>,
) -> Result<HttpResponse, Error> {
    ws::start(ConnectionActor::new(srv_tx.get_ref().clone()), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{channel, Receiver};

    fn actor_with_broker() -> (ConnectionActor, Receiver<ConnectionCommand>) {
        let (srv_tx, srv_rx) = channel(PENDING_FRAME_LIMIT + 8);
        (ConnectionActor::new(srv_tx), srv_rx)
    }

    #[test]
    fn it_replays_frames_buffered_before_the_id_arrives() {
        let (mut actor, mut srv_rx) = actor_with_broker();

        actor.accept_frame(ClientMessage::Ping);
        assert!(srv_rx.try_recv().is_err());

        actor.bind(42);
        match srv_rx.try_recv() {
            Ok(ConnectionCommand::Incoming { from, message }) => {
                assert_eq!(from, 42);
                assert!(matches!(message, ClientMessage::Ping));
            }
            other => panic!("expected replayed frame, got {:?}", other),
        }
    }

    #[test]
    fn it_forwards_directly_once_bound() {
        let (mut actor, mut srv_rx) = actor_with_broker();
        actor.bind(7);

        actor.accept_frame(ClientMessage::Ping);
        assert!(matches!(
            srv_rx.try_recv(),
            Ok(ConnectionCommand::Incoming { from: 7, .. })
        ));
    }

    #[test]
    fn it_caps_the_pre_bind_buffer() {
        let (mut actor, mut srv_rx) = actor_with_broker();
        for _ in 0..(PENDING_FRAME_LIMIT + 5) {
            actor.accept_frame(ClientMessage::Ping);
        }

        actor.bind(7);
        let mut replayed = 0;
        while srv_rx.try_recv().is_ok() {
            replayed += 1;
        }
        assert_eq!(replayed, PENDING_FRAME_LIMIT);
    }
}
