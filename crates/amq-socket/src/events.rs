use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wildcard name: listeners registered here receive every inbound envelope.
pub const ALL: &str = "*";

pub const LEADERBOARD_UPDATE: &str = "leaderboard level update";
pub const ROOM_CHANGE: &str = "Room Change";
pub const NEW_ROOMS: &str = "New Rooms";
pub const EXPAND_QUESTIONS: &str = "expandLibrary questions";
pub const ALL_ONLINE_USERS: &str = "all online users";

pub const ONLINE_PLAYER_COUNT: &str = "online player count change";
pub const GAME_CHAT_MESSAGE: &str = "game chat update";
pub const LOGIN_COMPLETE: &str = "login complete";

/// Socket.io event carrying every game envelope in both directions.
pub(crate) const COMMAND_EVENT: &str = "command";
/// Socket.io event the server uses to assign the session identity.
pub(crate) const SESSION_ID_EVENT: &str = "sessionId";

/// Inbound message routed by the registry. Only `command` is inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
	pub command: String,
	#[serde(default)]
	pub data: Value,
}

impl Envelope {
	pub fn new(command: impl Into<String>, data: Value) -> Self {
		Self { command: command.into(), data }
	}
}

/// Outbound tagged control message: `{ "type", "command", ...fields }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
	#[serde(rename = "type")]
	pub kind: String,
	pub command: String,
	#[serde(flatten)]
	pub fields: Map<String, Value>,
}

impl Command {
	pub fn new(kind: impl Into<String>, command: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			command: command.into(),
			fields: Map::new(),
		}
	}

	/// Attach the conventional `data` field.
	#[must_use]
	pub fn with_data(self, data: Value) -> Self {
		self.with_field("data", data)
	}

	#[must_use]
	pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
		self.fields.insert(key.into(), value);
		self
	}

	pub fn to_value(&self) -> Value {
		let mut map = self.fields.clone();
		map.insert("type".to_string(), Value::String(self.kind.clone()));
		map.insert("command".to_string(), Value::String(self.command.clone()));
		Value::Object(map)
	}
}
