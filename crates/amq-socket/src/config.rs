use crate::session::{Credential, Endpoint, ReconnectConfig, SocketToken};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
	/// Socket server base URL, without port
	pub base_url: String,
	/// socket.io endpoint path
	pub path: String,
	/// Default timeout for correlated waits
	pub default_timeout: Duration,
	/// How long `connect` waits for the server to assign a session id
	pub connect_timeout: Duration,
	/// Log every inbound envelope before routing
	pub debug: bool,
	pub reconnect: ReconnectConfig,
}

impl SocketConfig {
	/// Load configuration from environment variables with defaults
	pub fn from_env() -> Self {
		let defaults = Self::default();
		let reconnect = ReconnectConfig {
			max_attempts: env_parse("AMQ_RECONNECT_ATTEMPTS").unwrap_or(defaults.reconnect.max_attempts),
			..defaults.reconnect
		};

		Self {
			base_url: std::env::var("AMQ_SOCKET_URL").unwrap_or(defaults.base_url),
			path: std::env::var("AMQ_SOCKET_PATH").unwrap_or(defaults.path),
			default_timeout: env_parse("AMQ_TIMEOUT_MS").map_or(defaults.default_timeout, Duration::from_millis),
			connect_timeout: env_parse("AMQ_CONNECT_TIMEOUT_SECS").map_or(defaults.connect_timeout, Duration::from_secs),
			debug: env_parse("AMQ_DEBUG").unwrap_or(defaults.debug),
			reconnect,
		}
	}

	pub fn endpoint(&self, token: &SocketToken) -> Endpoint {
		Endpoint {
			base_url: self.base_url.clone(),
			port: token.port,
			path: self.path.clone(),
			credential: Credential::Token(token.token.clone()),
		}
	}
}

impl Default for SocketConfig {
	fn default() -> Self {
		Self {
			base_url: "wss://socket.animemusicquiz.com".to_string(),
			path: "/socket.io/".to_string(),
			default_timeout: Duration::from_millis(5000),
			connect_timeout: Duration::from_secs(10),
			debug: false,
			reconnect: ReconnectConfig::default(),
		}
	}
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
	std::env::var(key).ok().and_then(|v| v.parse().ok())
}
