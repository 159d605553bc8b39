use amq_socket::{SocketConfig, SocketToken};
use clap::Parser;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "amq-tail")]
#[command(about = "Connects to the game socket and logs inbound events", long_about = None)]
pub struct Config {
	/// Socket port handed out with the login token
	#[arg(long, env = "AMQ_PORT")]
	pub port: u16,

	/// Login token from the token endpoint
	#[arg(long, env = "AMQ_TOKEN", hide_env_values = true)]
	pub token: String,

	/// Event names to follow. Defaults to every event.
	#[arg(long = "event", short = 'e')]
	pub events: Vec<String>,

	/// Override the socket base URL
	#[arg(long, env = "AMQ_SOCKET_URL")]
	pub socket_url: Option<String>,

	/// Default wait timeout in milliseconds
	#[arg(long, env = "AMQ_TIMEOUT_MS")]
	pub timeout_ms: Option<u64>,

	/// Log every inbound envelope inside the client as well
	#[arg(long)]
	pub debug: bool,
}

impl Config {
	pub fn token(&self) -> SocketToken {
		SocketToken {
			port: self.port,
			token: self.token.clone(),
		}
	}

	/// Environment defaults with command-line overrides on top.
	pub fn socket_config(&self) -> SocketConfig {
		let mut config = SocketConfig::from_env();
		if let Some(url) = &self.socket_url {
			config.base_url.clone_from(url);
		}
		if let Some(ms) = self.timeout_ms {
			config.default_timeout = Duration::from_millis(ms);
		}
		config.debug |= self.debug;
		config
	}
}
