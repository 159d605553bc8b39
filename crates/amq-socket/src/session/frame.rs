//! Engine.io v3 / socket.io v2 text packet codec.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
	#[error("Empty frame")]
	Empty,

	#[error("Unknown packet type '{0}'")]
	UnknownType(String),

	#[error("Malformed {kind} packet: {reason}")]
	Malformed { kind: &'static str, reason: String },

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

/// Parameters the server announces in the engine.io open packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
	pub sid: String,
	#[serde(default)]
	pub upgrades: Vec<String>,
	pub ping_interval: u64,
	pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
	Open(Handshake),
	Close,
	Ping(String),
	Pong(String),
	Connect,
	Disconnect,
	Event { name: String, data: Value },
	Error(String),
	Noop,
}

impl Packet {
	pub fn event(name: impl Into<String>, data: Value) -> Self {
		Self::Event { name: name.into(), data }
	}

	pub const fn kind(&self) -> &'static str {
		match self {
			Self::Open(_) => "open",
			Self::Close => "close",
			Self::Ping(_) => "ping",
			Self::Pong(_) => "pong",
			Self::Connect => "connect",
			Self::Disconnect => "disconnect",
			Self::Event { .. } => "event",
			Self::Error(_) => "error",
			Self::Noop => "noop",
		}
	}

	/// # Errors
	///
	/// [`FrameError::Json`] if a payload fails to serialize.
	pub fn encode(&self) -> Result<String, FrameError> {
		let text = match self {
			Self::Open(handshake) => format!("0{}", serde_json::to_string(handshake)?),
			Self::Close => "1".to_string(),
			Self::Ping(probe) => format!("2{probe}"),
			Self::Pong(probe) => format!("3{probe}"),
			Self::Connect => "40".to_string(),
			Self::Disconnect => "41".to_string(),
			Self::Event { name, data } => format!("42{}", serde_json::to_string(&(name, data))?),
			Self::Error(message) => format!("44{}", serde_json::to_string(message)?),
			Self::Noop => "6".to_string(),
		};
		Ok(text)
	}

	/// Parse one text frame.
	///
	/// # Errors
	///
	/// Any [`FrameError`] for empty, unknown or malformed frames.
	pub fn decode(text: &str) -> Result<Self, FrameError> {
		let mut chars = text.chars();
		let engine_type = chars.next().ok_or(FrameError::Empty)?;
		let rest = chars.as_str();

		match engine_type {
			'0' => Ok(Self::Open(serde_json::from_str(rest)?)),
			'1' => Ok(Self::Close),
			'2' => Ok(Self::Ping(rest.to_string())),
			'3' => Ok(Self::Pong(rest.to_string())),
			'4' => decode_message(rest),
			'6' => Ok(Self::Noop),
			other => Err(FrameError::UnknownType(other.to_string())),
		}
	}
}

fn decode_message(text: &str) -> Result<Packet, FrameError> {
	let mut chars = text.chars();
	let socket_type = chars.next().ok_or_else(|| FrameError::Malformed {
		kind: "message",
		reason: "missing socket.io packet type".to_string(),
	})?;
	let body = strip_namespace(chars.as_str());

	match socket_type {
		'0' => Ok(Packet::Connect),
		'1' => Ok(Packet::Disconnect),
		'2' => decode_event(body),
		'4' => {
			let message = serde_json::from_str::<Value>(body).map_or_else(
				|_| body.to_string(),
				|value| value.as_str().map_or_else(|| value.to_string(), str::to_string),
			);
			Ok(Packet::Error(message))
		}
		other => Err(FrameError::UnknownType(format!("4{other}"))),
	}
}

/// Drop an optional `/namespace,` prefix.
fn strip_namespace(body: &str) -> &str {
	if body.starts_with('/') {
		body.split_once(',').map_or("", |(_, rest)| rest)
	} else {
		body
	}
}

fn decode_event(body: &str) -> Result<Packet, FrameError> {
	// Ack ids are digits before the JSON array; this layer never acks.
	let json = body.trim_start_matches(|c: char| c.is_ascii_digit());
	let args: Vec<Value> = serde_json::from_str(json)?;
	let mut args = args.into_iter();

	let name = match args.next() {
		Some(Value::String(name)) => name,
		Some(other) => {
			return Err(FrameError::Malformed {
				kind: "event",
				reason: format!("event name must be a string, got {other}"),
			})
		}
		None => {
			return Err(FrameError::Malformed {
				kind: "event",
				reason: "empty argument list".to_string(),
			})
		}
	};

	Ok(Packet::Event {
		name,
		data: args.next().unwrap_or(Value::Null),
	})
}
