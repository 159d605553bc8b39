mod driver;
pub mod frame;
mod retry;
mod state;
mod transport;
#[cfg(feature = "websocket")]
mod websocket;

pub(crate) use driver::SessionDriver;
pub use retry::{ReconnectConfig, ReconnectPolicy};
pub use state::{SessionState, StateError, StateTransition};
pub use transport::{Connection, Connector, Credential, Endpoint, TransportError};
#[cfg(feature = "websocket")]
pub use websocket::WsConnector;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Session-level error types
#[derive(Debug, Error)]
pub enum SessionError {
	#[error("Transport error: {0}")]
	Transport(#[from] TransportError),

	#[error("Server rejected the connection: {0}")]
	Handshake(String),

	#[error("No session id assigned within {}s", .0.as_secs())]
	ConnectTimeout(Duration),

	#[error("Reconnect attempts exhausted after {attempts} attempts")]
	ReconnectExhausted { attempts: u32 },

	#[error("Session failed: {0}")]
	Failed(String),

	#[error("Already connected")]
	AlreadyConnected,

	#[error("Session closed")]
	Closed,
}

/// Login token as returned by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketToken {
	pub port: u16,
	pub token: String,
}

/// Result of a successful connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
	pub session_id: String,
	pub port: u16,
}
