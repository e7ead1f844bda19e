//! Wire commands.
//!
//! Every message is a JSON array `[tag, arg1, arg2, ...]`. Tags are small
//! integers in two namespaces (client→server and server→client); the
//! pre-handshake nickname message keeps its historical string tag. Handlers
//! dispatch purely by tag; unknown tags are logged and ignored.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::ecs::{ComponentBundle, EntityId};
use crate::game::components::{ChaseGoal, Component, Position};
use crate::game::player::{PlayerInfo, TeamId, Wallet};
use crate::util::vec2::Vec2;

/// Transport connection identifier.
pub type ConnId = u64;

/// Where an outbound message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    One(ConnId),
}

/// A queued outbound message.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub to: Recipient,
    pub cmd: ServerCommand,
}

/// Events surfaced to the simulation by the server transport.
#[derive(Debug)]
pub enum Inbound {
    Connected(ConnId),
    Command(ConnId, ClientCommand),
    /// Synthetic: pushed when a reader task ends, for any reason.
    Disconnected(ConnId),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("message is not a JSON array")]
    NotAnArray,
    #[error("message has no tag")]
    MissingTag,
    #[error("unknown command tag {0}")]
    UnknownTag(Value),
    #[error("missing argument {0}")]
    MissingArg(usize),
    #[error("bad argument {index}: {source}")]
    BadArg {
        index: usize,
        source: serde_json::Error,
    },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Commands a client sends to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    PlaceUnit { building: String, pos: Vec2 },
    SetTargetMove { ids: Vec<EntityId>, pos: Vec2 },
    ProduceUnit { producer: EntityId, unit: String },
    /// Pre-handshake nickname announcement; string-tagged.
    Nick { name: String },
}

mod client_tag {
    pub const PLACE_UNIT: u8 = 0;
    pub const SET_TARGET_MOVE: u8 = 1;
    pub const PRODUCE_UNIT: u8 = 2;
    pub const NICK: &str = "nick";
}

/// Commands the server sends to clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerCommand {
    /// Full component snapshot of a newly created entity.
    Create {
        id: EntityId,
        components: ComponentBundle,
    },
    /// Steady-state position delta.
    Update { id: EntityId, position: Position },
    TargetChange {
        id: EntityId,
        goal: Option<ChaseGoal>,
    },
    ResourceInfo { team: TeamId, wallet: Wallet },
    /// Any other single-component delta.
    ComponentInfo { id: EntityId, component: Component },
    Dead { id: EntityId },
    Sound {
        name: String,
        pos: Option<Vec2>,
    },
    Popup {
        text: String,
        pos: Vec2,
        color: [u8; 3],
    },
    Defeat,
    Victory,
    Start {
        team: TeamId,
        players: Vec<PlayerInfo>,
    },
    Players { players: Vec<PlayerInfo> },
    Disconnect { team: TeamId },
}

mod server_tag {
    pub const CREATE: u8 = 0;
    pub const UPDATE: u8 = 1;
    pub const TARGET_CHANGE: u8 = 2;
    pub const RESOURCE_INFO: u8 = 3;
    pub const COMPONENT_INFO: u8 = 4;
    pub const DEAD: u8 = 5;
    pub const SOUND: u8 = 6;
    pub const POPUP: u8 = 7;
    pub const DEFEAT: u8 = 8;
    pub const VICTORY: u8 = 9;
    pub const START: u8 = 10;
    pub const PLAYERS: u8 = 11;
    pub const DISCONNECT: u8 = 12;
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn arg<T: DeserializeOwned>(args: &[Value], index: usize) -> Result<T, ProtocolError> {
    let value = args.get(index).ok_or(ProtocolError::MissingArg(index))?;
    serde_json::from_value(value.clone()).map_err(|source| ProtocolError::BadArg { index, source })
}

fn split_tag(message: &Value) -> Result<(&Value, &[Value]), ProtocolError> {
    let items = message.as_array().ok_or(ProtocolError::NotAnArray)?;
    let tag = items.first().ok_or(ProtocolError::MissingTag)?;
    Ok((tag, &items[1..]))
}

impl ClientCommand {
    pub fn encode(&self) -> Value {
        match self {
            ClientCommand::PlaceUnit { building, pos } => {
                json!([client_tag::PLACE_UNIT, building, to_value(pos)])
            }
            ClientCommand::SetTargetMove { ids, pos } => {
                json!([client_tag::SET_TARGET_MOVE, ids, to_value(pos)])
            }
            ClientCommand::ProduceUnit { producer, unit } => {
                json!([client_tag::PRODUCE_UNIT, producer, unit])
            }
            ClientCommand::Nick { name } => json!([client_tag::NICK, name]),
        }
    }

    pub fn decode(message: &Value) -> Result<Self, ProtocolError> {
        let (tag, args) = split_tag(message)?;
        if tag.as_str() == Some(client_tag::NICK) {
            return Ok(ClientCommand::Nick {
                name: arg(args, 0)?,
            });
        }
        match tag.as_u64() {
            Some(t) if t == client_tag::PLACE_UNIT as u64 => Ok(ClientCommand::PlaceUnit {
                building: arg(args, 0)?,
                pos: arg(args, 1)?,
            }),
            Some(t) if t == client_tag::SET_TARGET_MOVE as u64 => Ok(ClientCommand::SetTargetMove {
                ids: arg(args, 0)?,
                pos: arg(args, 1)?,
            }),
            Some(t) if t == client_tag::PRODUCE_UNIT as u64 => Ok(ClientCommand::ProduceUnit {
                producer: arg(args, 0)?,
                unit: arg(args, 1)?,
            }),
            _ => Err(ProtocolError::UnknownTag(tag.clone())),
        }
    }
}

impl ServerCommand {
    pub fn encode(&self) -> Value {
        match self {
            ServerCommand::Create { id, components } => {
                let parts: Vec<Value> = components.iter().map(to_value).collect();
                json!([server_tag::CREATE, id, parts])
            }
            ServerCommand::Update { id, position } => {
                json!([server_tag::UPDATE, id, to_value(position)])
            }
            ServerCommand::TargetChange { id, goal } => {
                json!([server_tag::TARGET_CHANGE, id, to_value(goal)])
            }
            ServerCommand::ResourceInfo { team, wallet } => {
                json!([server_tag::RESOURCE_INFO, team, to_value(wallet)])
            }
            ServerCommand::ComponentInfo { id, component } => {
                json!([server_tag::COMPONENT_INFO, id, to_value(component)])
            }
            ServerCommand::Dead { id } => json!([server_tag::DEAD, id]),
            ServerCommand::Sound { name, pos } => {
                json!([server_tag::SOUND, name, to_value(pos)])
            }
            ServerCommand::Popup { text, pos, color } => {
                json!([server_tag::POPUP, text, to_value(pos), color])
            }
            ServerCommand::Defeat => json!([server_tag::DEFEAT]),
            ServerCommand::Victory => json!([server_tag::VICTORY]),
            ServerCommand::Start { team, players } => {
                json!([server_tag::START, team, to_value(players)])
            }
            ServerCommand::Players { players } => {
                json!([server_tag::PLAYERS, to_value(players)])
            }
            ServerCommand::Disconnect { team } => json!([server_tag::DISCONNECT, team]),
        }
    }

    pub fn decode(message: &Value) -> Result<Self, ProtocolError> {
        let (tag, args) = split_tag(message)?;
        let tag_num = match tag.as_u64() {
            Some(t) => t,
            None => return Err(ProtocolError::UnknownTag(tag.clone())),
        };
        match tag_num {
            t if t == server_tag::CREATE as u64 => Ok(ServerCommand::Create {
                id: arg(args, 0)?,
                components: arg::<Vec<Component>>(args, 1)?.into_iter().collect(),
            }),
            t if t == server_tag::UPDATE as u64 => Ok(ServerCommand::Update {
                id: arg(args, 0)?,
                position: arg(args, 1)?,
            }),
            t if t == server_tag::TARGET_CHANGE as u64 => Ok(ServerCommand::TargetChange {
                id: arg(args, 0)?,
                goal: arg(args, 1)?,
            }),
            t if t == server_tag::RESOURCE_INFO as u64 => Ok(ServerCommand::ResourceInfo {
                team: arg(args, 0)?,
                wallet: arg(args, 1)?,
            }),
            t if t == server_tag::COMPONENT_INFO as u64 => Ok(ServerCommand::ComponentInfo {
                id: arg(args, 0)?,
                component: arg(args, 1)?,
            }),
            t if t == server_tag::DEAD as u64 => Ok(ServerCommand::Dead { id: arg(args, 0)? }),
            t if t == server_tag::SOUND as u64 => Ok(ServerCommand::Sound {
                name: arg(args, 0)?,
                pos: arg(args, 1)?,
            }),
            t if t == server_tag::POPUP as u64 => Ok(ServerCommand::Popup {
                text: arg(args, 0)?,
                pos: arg(args, 1)?,
                color: arg(args, 2)?,
            }),
            t if t == server_tag::DEFEAT as u64 => Ok(ServerCommand::Defeat),
            t if t == server_tag::VICTORY as u64 => Ok(ServerCommand::Victory),
            t if t == server_tag::START as u64 => Ok(ServerCommand::Start {
                team: arg(args, 0)?,
                players: arg(args, 1)?,
            }),
            t if t == server_tag::PLAYERS as u64 => Ok(ServerCommand::Players {
                players: arg(args, 0)?,
            }),
            t if t == server_tag::DISCONNECT as u64 => Ok(ServerCommand::Disconnect {
                team: arg(args, 0)?,
            }),
            _ => Err(ProtocolError::UnknownTag(tag.clone())),
        }
    }
}
