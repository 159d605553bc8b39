use super::frame::{FrameError, Packet};
use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Transport-level error types
#[derive(Debug, Error)]
pub enum TransportError {
	#[error("Invalid endpoint URL: {0}")]
	InvalidUrl(String),

	#[error("Failed to connect: {0}")]
	Connect(String),

	#[error("Frame error: {0}")]
	Frame(#[from] FrameError),

	#[error("Send failed: {0}")]
	Send(String),

	#[error("Receive failed: {0}")]
	Receive(String),

	#[error("Connection closed")]
	Closed,
}

/// What the client presents in the query string when opening the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
	/// Fresh login token from the token endpoint.
	Token(String),
	/// Identity assigned by the server on a previous connection.
	Session(String),
}

impl Credential {
	pub fn query_pair(&self) -> (&'static str, &str) {
		match self {
			Self::Token(token) => ("token", token),
			Self::Session(id) => ("session", id),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
	pub base_url: String,
	pub port: u16,
	pub path: String,
	pub credential: Credential,
}

impl Endpoint {
	#[must_use]
	pub fn with_credential(&self, credential: Credential) -> Self {
		Self {
			credential,
			..self.clone()
		}
	}

	/// # Errors
	///
	/// [`TransportError::InvalidUrl`] if `base_url` does not parse or cannot
	/// carry a port.
	pub fn url(&self) -> Result<Url, TransportError> {
		let mut url = Url::parse(&self.base_url).map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
		url.set_port(Some(self.port))
			.map_err(|()| TransportError::InvalidUrl(format!("{} cannot carry a port", self.base_url)))?;
		url.set_path(&self.path);

		let (key, value) = self.credential.query_pair();
		url.query_pairs_mut()
			.clear()
			.append_pair("EIO", "3")
			.append_pair("transport", "websocket")
			.append_pair(key, value);

		Ok(url)
	}
}

/// Opens connections to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
	async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError>;
}

/// One open socket speaking [`Packet`]s. `recv` must be cancel-safe.
#[async_trait]
pub trait Connection: Send {
	async fn send(&mut self, packet: Packet) -> Result<(), TransportError>;

	/// `None` once the remote side has closed the stream.
	async fn recv(&mut self) -> Option<Result<Packet, TransportError>>;

	async fn close(&mut self) -> Result<(), TransportError>;
}
