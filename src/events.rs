//! Typed gateway events.
//!
//! The gateway deserialises payloads into [`GatewayEvent`] so the bot loop
//! pattern-matches on typed data instead of raw `(op, t, Value)` tuples.

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::types::{GatewayPayload, Interaction, ReadyEvent};

/// A parsed event coming off the Discord gateway.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// Identify succeeded.
    Ready(Box<ReadyEvent>),

    /// A resume replayed missed events and the session continues.
    Resumed,

    /// Slash command, ping, or any other interaction.
    InteractionCreate(Box<Interaction>),

    /// Heartbeat ACK (op 11).
    HeartbeatAck,

    /// The gateway wants a heartbeat right now (op 1).
    HeartbeatRequest,

    /// Reconnect requested (op 7).
    Reconnect,

    /// Session invalidated (op 9). `true` if it can be resumed.
    InvalidSession(bool),

    /// Anything without a typed variant, including payloads that failed to
    /// parse.
    Unknown {
        event_name: Option<String>,
        op: u8,
    },
}

impl GatewayEvent {
    /// Convert a raw payload. Never fails: unrecognised or malformed events
    /// become [`GatewayEvent::Unknown`].
    pub fn from_payload(payload: GatewayPayload) -> Self {
        match payload.op {
            0 => Self::parse_dispatch(payload.t, payload.d),
            1 => GatewayEvent::HeartbeatRequest,
            7 => GatewayEvent::Reconnect,
            9 => GatewayEvent::InvalidSession(
                payload.d.as_ref().and_then(|v| v.as_bool()).unwrap_or(false),
            ),
            11 => GatewayEvent::HeartbeatAck,
            op => GatewayEvent::Unknown {
                event_name: payload.t,
                op,
            },
        }
    }

    fn parse_dispatch(event_name: Option<String>, data: Option<serde_json::Value>) -> Self {
        let unknown = |event_name| GatewayEvent::Unknown { event_name, op: 0 };

        let Some(name) = event_name else {
            return unknown(None);
        };
        match name.as_str() {
            "RESUMED" => GatewayEvent::Resumed,
            "READY" => match typed::<ReadyEvent>(&name, data) {
                Some(ready) => GatewayEvent::Ready(Box::new(ready)),
                None => unknown(Some(name)),
            },
            "INTERACTION_CREATE" => match typed::<Interaction>(&name, data) {
                Some(interaction) => GatewayEvent::InteractionCreate(Box::new(interaction)),
                None => unknown(Some(name)),
            },
            _ => unknown(Some(name)),
        }
    }
}

fn typed<T: DeserializeOwned>(event: &str, data: Option<serde_json::Value>) -> Option<T> {
    let data = data?;
    match serde_json::from_value(data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(event, error = %e, "failed to parse dispatch payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> GatewayPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parses_ready() {
        let event = GatewayEvent::from_payload(payload(json!({
            "op": 0, "s": 1, "t": "READY",
            "d": {
                "v": 10,
                "user": { "id": "1", "username": "fishbot", "discriminator": "0",
                          "avatar": null, "bot": true, "global_name": null },
                "session_id": "abc",
                "resume_gateway_url": "wss://resume.discord.gg",
                "guilds": [{ "id": "2", "unavailable": true }],
                "application": { "id": "3", "flags": 0 }
            }
        })));
        let GatewayEvent::Ready(ready) = event else {
            panic!("expected READY, got {event:?}");
        };
        assert_eq!(ready.session_id, "abc");
        assert_eq!(ready.application.id, "3");
        assert_eq!(ready.guilds.len(), 1);
    }

    #[test]
    fn parses_interaction_create() {
        let event = GatewayEvent::from_payload(payload(json!({
            "op": 0, "s": 2, "t": "INTERACTION_CREATE",
            "d": {
                "id": "10", "application_id": "3", "type": 2, "token": "tok",
                "data": { "name": "fish" },
                "user": { "id": "50", "username": "carol", "discriminator": "0",
                          "avatar": null, "global_name": null }
            }
        })));
        let GatewayEvent::InteractionCreate(interaction) = event else {
            panic!("expected INTERACTION_CREATE, got {event:?}");
        };
        assert_eq!(
            interaction.data.as_ref().and_then(|d| d.name.as_deref()),
            Some("fish")
        );
    }

    #[test]
    fn malformed_dispatch_becomes_unknown() {
        let event = GatewayEvent::from_payload(payload(json!({
            "op": 0, "s": 3, "t": "READY", "d": { "v": "ten" }
        })));
        assert!(matches!(
            event,
            GatewayEvent::Unknown { event_name: Some(ref n), op: 0 } if n == "READY"
        ));
    }

    #[test]
    fn control_opcodes() {
        let cases = [
            (json!({ "op": 1, "d": null }), "HeartbeatRequest"),
            (json!({ "op": 7, "d": null }), "Reconnect"),
            (json!({ "op": 11 }), "HeartbeatAck"),
        ];
        for (raw, expected) in cases {
            let event = GatewayEvent::from_payload(payload(raw));
            assert!(format!("{event:?}").starts_with(expected), "{event:?}");
        }
        assert!(matches!(
            GatewayEvent::from_payload(payload(json!({ "op": 9, "d": true }))),
            GatewayEvent::InvalidSession(true)
        ));
        assert!(matches!(
            GatewayEvent::from_payload(payload(json!({ "op": 9, "d": null }))),
            GatewayEvent::InvalidSession(false)
        ));
    }

    #[test]
    fn other_dispatches_are_unknown() {
        let event = GatewayEvent::from_payload(payload(json!({
            "op": 0, "s": 4, "t": "MESSAGE_CREATE", "d": {}
        })));
        assert!(matches!(event, GatewayEvent::Unknown { op: 0, .. }));
        assert!(matches!(
            GatewayEvent::from_payload(payload(json!({ "op": 0, "t": "RESUMED", "d": {} }))),
            GatewayEvent::Resumed
        ));
    }
}
