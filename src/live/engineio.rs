//! Engine.IO v4 / Socket.IO v4 text framing
//!
//! Only what a client on the WebSocket transport needs: the Engine.IO
//! open/ping/pong/message/close packets and the Socket.IO connect, disconnect
//! and event packets carried inside Engine.IO messages.

use serde_json::Value;
use thiserror::Error;

/// Socket.IO connect request for the default namespace
pub const CONNECT_FRAME: &str = "40";

/// Framing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Empty frame
    #[error("empty packet")]
    Empty,
    /// Leading type digit not recognised
    #[error("unknown packet type {0:?}")]
    UnknownType(char),
    /// Event payload is not a JSON array with a name first
    #[error("malformed event payload: {0}")]
    BadEvent(String),
}

/// Engine.IO packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    /// `0` handshake, carrying the JSON open payload
    Open(String),
    /// `1` transport closed by the server
    Close,
    /// `2` heartbeat from the server
    Ping(String),
    /// `3` heartbeat answer
    Pong(String),
    /// `4` Socket.IO payload
    Message(String),
    /// `5` upgrade
    Upgrade,
    /// `6` no-op
    Noop,
}

impl EnginePacket {
    /// Parse a WebSocket text frame
    pub fn parse(frame: &str) -> Result<Self, CodecError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(CodecError::Empty)?;
        let rest = chars.as_str().to_string();

        match kind {
            '0' => Ok(Self::Open(rest)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(rest)),
            '3' => Ok(Self::Pong(rest)),
            '4' => Ok(Self::Message(rest)),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(CodecError::UnknownType(other)),
        }
    }

    /// Encode as a WebSocket text frame
    pub fn encode(&self) -> String {
        match self {
            Self::Open(data) => format!("0{data}"),
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

/// Socket.IO packet (default namespace unless stated)
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// `0` namespace connected
    Connect,
    /// `1` namespace disconnected by the server
    Disconnect,
    /// `2` event with its arguments
    Event {
        /// Event name
        name: String,
        /// Arguments after the name
        args: Vec<Value>,
    },
    /// `4` connection refused
    ConnectError(String),
    /// Acks and binary packets; ignored by this client
    Other(char),
}

impl SocketPacket {
    /// Parse the payload of an Engine.IO message
    pub fn parse(payload: &str) -> Result<Self, CodecError> {
        let mut chars = payload.chars();
        let kind = chars.next().ok_or(CodecError::Empty)?;
        let body = skip_namespace_and_ack(chars.as_str());

        match kind {
            '0' => Ok(Self::Connect),
            '1' => Ok(Self::Disconnect),
            '2' => parse_event(body),
            '4' => Ok(Self::ConnectError(body.to_string())),
            '3' | '5' | '6' => Ok(Self::Other(kind)),
            other => Err(CodecError::UnknownType(other)),
        }
    }
}

/// Drop an optional `/namespace,` prefix and a numeric ack id
fn skip_namespace_and_ack(body: &str) -> &str {
    let body = if body.starts_with('/') {
        body.split_once(',').map_or("", |(_, rest)| rest)
    } else {
        body
    };
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn parse_event(body: &str) -> Result<SocketPacket, CodecError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| CodecError::BadEvent(e.to_string()))?;
    let Value::Array(mut parts) = value else {
        return Err(CodecError::BadEvent("not an array".to_string()));
    };
    if parts.is_empty() {
        return Err(CodecError::BadEvent("missing event name".to_string()));
    }

    let Value::String(name) = parts.remove(0) else {
        return Err(CodecError::BadEvent("event name is not a string".to_string()));
    };
    Ok(SocketPacket::Event { name, args: parts })
}

/// Encode an event emit as a full WebSocket text frame (`42[...]`)
pub fn encode_event(name: &str, args: &[Value]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(Value::String(name.to_string()));
    parts.extend(args.iter().cloned());
    EnginePacket::Message(format!("2{}", Value::Array(parts))).encode()
}

/// Build the WebSocket endpoint from an http(s) or ws(s) base URL
pub fn websocket_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/socket.io/?EIO=4&transport=websocket")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_engine_packets() {
        assert_eq!(
            EnginePacket::parse(r#"0{"sid":"abc","pingInterval":25000}"#),
            Ok(EnginePacket::Open(r#"{"sid":"abc","pingInterval":25000}"#.to_string()))
        );
        assert_eq!(EnginePacket::parse("2"), Ok(EnginePacket::Ping(String::new())));
        assert_eq!(EnginePacket::Pong(String::new()).encode(), "3");
        assert_eq!(EnginePacket::parse("40"), Ok(EnginePacket::Message("0".to_string())));
        assert_eq!(EnginePacket::parse(""), Err(CodecError::Empty));
        assert_eq!(EnginePacket::parse("9"), Err(CodecError::UnknownType('9')));
    }

    #[test]
    fn test_socket_connect_with_sid() {
        assert_eq!(SocketPacket::parse(r#"0{"sid":"x"}"#), Ok(SocketPacket::Connect));
        assert_eq!(SocketPacket::parse("1"), Ok(SocketPacket::Disconnect));
    }

    #[test]
    fn test_event_with_payload() {
        let packet = SocketPacket::parse(r#"2["newItem",{"id":"t1"}]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                name: "newItem".to_string(),
                args: vec![json!({"id": "t1"})],
            }
        );
    }

    #[test]
    fn test_event_with_namespace_and_ack() {
        let packet = SocketPacket::parse(r#"2/feed,17["ping",1]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                name: "ping".to_string(),
                args: vec![json!(1)],
            }
        );
    }

    #[test]
    fn test_bad_events() {
        assert!(SocketPacket::parse("2{}").is_err());
        assert!(SocketPacket::parse("2[]").is_err());
        assert!(SocketPacket::parse("2[5]").is_err());
    }

    #[test]
    fn test_encode_setup() {
        assert_eq!(encode_event("setup", &[json!("u1")]), r#"42["setup","u1"]"#);
    }

    #[test]
    fn test_websocket_url() {
        assert_eq!(
            websocket_url("https://api.example.com/"),
            "wss://api.example.com/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            websocket_url("http://127.0.0.1:3000"),
            "ws://127.0.0.1:3000/socket.io/?EIO=4&transport=websocket"
        );
    }
}
