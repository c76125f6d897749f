//! Typed gateway events.
//!
//! The gateway driver turns every raw [`GatewayPayload`] into a
//! [`GatewayEvent`]; handlers only ever match on this enum.

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::types::*;

/// Gateway opcodes we act on.
pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RESUME: u8 = 6;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// A parsed event coming off the gateway.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// Op 10; carries the heartbeat interval in milliseconds.
    Hello(u64),

    Ready(ReadyEvent),

    /// Full guild object, sent lazily after READY and on join.
    GuildCreate(Guild),

    /// A user joined a guild. Needs the GUILD_MEMBERS intent.
    GuildMemberAdd(GuildMemberAdd),

    InteractionCreate(Interaction),

    HeartbeatAck,

    /// The gateway wants a heartbeat right now.
    HeartbeatRequest,

    Reconnect,

    /// `true` when the session may be resumed.
    InvalidSession(bool),

    /// Anything without a typed variant, or a payload that failed to parse.
    Unknown {
        event_name: Option<String>,
        op: u8,
        data: Option<serde_json::Value>,
    },
}

impl GatewayEvent {
    /// Never fails; unrecognised or malformed payloads become
    /// [`GatewayEvent::Unknown`].
    pub fn from_payload(payload: GatewayPayload) -> Self {
        match payload.op {
            opcode::DISPATCH => Self::parse_dispatch(payload.t, payload.d),
            opcode::HEARTBEAT => GatewayEvent::HeartbeatRequest,
            opcode::RECONNECT => GatewayEvent::Reconnect,
            opcode::INVALID_SESSION => GatewayEvent::InvalidSession(
                payload.d.as_ref().and_then(|v| v.as_bool()).unwrap_or(false),
            ),
            opcode::HELLO => match payload
                .d
                .as_ref()
                .and_then(|d| d.get("heartbeat_interval"))
                .and_then(|v| v.as_u64())
            {
                Some(interval) => GatewayEvent::Hello(interval),
                None => GatewayEvent::Unknown {
                    event_name: None,
                    op: payload.op,
                    data: payload.d,
                },
            },
            opcode::HEARTBEAT_ACK => GatewayEvent::HeartbeatAck,
            op => GatewayEvent::Unknown {
                event_name: payload.t,
                op,
                data: payload.d,
            },
        }
    }

    fn parse_dispatch(event_name: Option<String>, data: Option<serde_json::Value>) -> Self {
        let (Some(name), Some(d)) = (event_name.as_deref(), data.as_ref()) else {
            return GatewayEvent::Unknown {
                event_name,
                op: opcode::DISPATCH,
                data,
            };
        };

        let parsed = match name {
            "READY" => typed(name, d, GatewayEvent::Ready),
            "GUILD_CREATE" => typed(name, d, GatewayEvent::GuildCreate),
            "GUILD_MEMBER_ADD" => typed(name, d, GatewayEvent::GuildMemberAdd),
            "INTERACTION_CREATE" => typed(name, d, GatewayEvent::InteractionCreate),
            _ => None,
        };

        parsed.unwrap_or(GatewayEvent::Unknown {
            event_name,
            op: opcode::DISPATCH,
            data,
        })
    }

    /// Name for logging: the dispatch name, or the opcode.
    pub fn name(&self) -> String {
        match self {
            GatewayEvent::Hello(_) => "HELLO".into(),
            GatewayEvent::Ready(_) => "READY".into(),
            GatewayEvent::GuildCreate(_) => "GUILD_CREATE".into(),
            GatewayEvent::GuildMemberAdd(_) => "GUILD_MEMBER_ADD".into(),
            GatewayEvent::InteractionCreate(_) => "INTERACTION_CREATE".into(),
            GatewayEvent::HeartbeatAck => "HEARTBEAT_ACK".into(),
            GatewayEvent::HeartbeatRequest => "HEARTBEAT".into(),
            GatewayEvent::Reconnect => "RECONNECT".into(),
            GatewayEvent::InvalidSession(_) => "INVALID_SESSION".into(),
            GatewayEvent::Unknown {
                event_name: Some(name),
                ..
            } => name.clone(),
            GatewayEvent::Unknown { op, .. } => format!("op {}", op),
        }
    }
}

fn typed<T, F>(name: &str, data: &serde_json::Value, wrap: F) -> Option<GatewayEvent>
where
    T: DeserializeOwned,
    F: FnOnce(T) -> GatewayEvent,
{
    match serde_json::from_value::<T>(data.clone()) {
        Ok(value) => Some(wrap(value)),
        Err(e) => {
            warn!(event = name, error = %e, "failed to parse dispatch payload");
            None
        }
    }
}
