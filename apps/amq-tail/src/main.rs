mod config;

use amq_socket::{events, AmqSocket, ListenerHandle};
use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
	dotenv::dotenv().ok();

	tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "amq_tail=info,amq_socket=info".into()))
		.with(tracing_subscriber::fmt::layer())
		.init();

	let config = Config::parse();
	let socket = AmqSocket::new(config.socket_config());

	let names = if config.events.is_empty() {
		vec![events::ALL.to_string()]
	} else {
		config.events.clone()
	};
	let _listeners: Vec<ListenerHandle> = names
		.into_iter()
		.map(|name| {
			socket.on(name, |data, listener, envelope| {
				info!(listener = %listener.id(), command = %envelope.command, %data, "event");
				Ok(())
			})
		})
		.collect();

	let session = socket.connect(&config.token()).await.context("failed to connect to game socket")?;
	info!(session_id = %session.session_id, port = session.port, "connected");

	tokio::select! {
		result = signal::ctrl_c() => {
			result.context("failed to listen for shutdown signal")?;
			info!("shutdown signal received");
		}
		result = socket.closed() => {
			if let Err(e) = result {
				error!(error = %e, "session ended");
				socket.disconnect().await;
				return Err(e.into());
			}
		}
	}

	socket.disconnect().await;
	info!("amq-tail shutdown complete");
	Ok(())
}
