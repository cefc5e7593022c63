use serde::{Deserialize, Serialize};

use super::types::*;

fn default_room() -> RoomId {
    DEFAULT_ROOM.into()
}

/// Inbound protocol messages, tagged by `type`. An unrecognized tag parses
/// to `Unknown` so a forward-compatible client still counts as alive;
/// unknown fields are ignored everywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Hello {
        #[serde(default = "default_room")]
        room: RoomId,
        #[serde(default)]
        user: Option<UserIdentity>,
    },
    Draw {
        stroke: Stroke,
    },
    Clear {
        #[serde(default)]
        by: Option<String>,
    },
    Ping,
    #[serde(other)]
    Unknown,
}

/// Outbound protocol messages, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Full replay sent once, immediately after an accepted `hello`.
    History { strokes: Vec<Stroke> },
    Draw { stroke: Stroke },
    Clear { by: Option<String> },
    /// Whole-room membership snapshot, identities in join order.
    Presence { users: Vec<UserIdentity> },
    Pong,
}
