#![allow(dead_code)]

use amq_socket::session::frame::{Handshake, Packet};
use amq_socket::session::{Connection, Connector, Endpoint, TransportError};
use amq_socket::{AmqSocket, ReconnectConfig, SocketConfig, SocketToken};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// What the next `connect` call should do.
#[derive(Debug, Clone)]
pub enum Plan {
	Accept,
	Refuse(String),
}

#[derive(Default)]
struct Script {
	plans: VecDeque<Plan>,
	attempts: Vec<Endpoint>,
	fallback_refuse: bool,
}

/// In-memory connector. Every accepted connection shows up on the
/// `ServerSide` receiver returned by [`MockConnector::new`].
#[derive(Clone)]
pub struct MockConnector {
	script: Arc<Mutex<Script>>,
	accepted: mpsc::UnboundedSender<ServerSide>,
}

impl MockConnector {
	pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerSide>) {
		let (accepted, accepted_rx) = mpsc::unbounded_channel();
		let connector = Self {
			script: Arc::new(Mutex::new(Script::default())),
			accepted,
		};
		(connector, accepted_rx)
	}

	pub fn plan(&self, plan: Plan) {
		self.script.lock().unwrap().plans.push_back(plan);
	}

	/// Refuse every connect once the scripted plans run out.
	pub fn refuse_when_unscripted(&self) {
		self.script.lock().unwrap().fallback_refuse = true;
	}

	pub fn attempts(&self) -> Vec<Endpoint> {
		self.script.lock().unwrap().attempts.clone()
	}
}

#[async_trait]
impl Connector for MockConnector {
	async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
		let plan = {
			let mut script = self.script.lock().unwrap();
			script.attempts.push(endpoint.clone());
			match script.plans.pop_front() {
				Some(plan) => plan,
				None if script.fallback_refuse => Plan::Refuse("connection refused".into()),
				None => Plan::Accept,
			}
		};

		match plan {
			Plan::Refuse(reason) => Err(TransportError::Connect(reason)),
			Plan::Accept => {
				let (to_client, incoming) = mpsc::unbounded_channel();
				let (outgoing, from_client) = mpsc::unbounded_channel();
				let _ = self.accepted.send(ServerSide {
					endpoint: endpoint.clone(),
					tx: to_client,
					rx: from_client,
				});
				Ok(Box::new(MockConnection { incoming, outgoing }))
			}
		}
	}
}

struct MockConnection {
	incoming: mpsc::UnboundedReceiver<Packet>,
	outgoing: mpsc::UnboundedSender<Packet>,
}

#[async_trait]
impl Connection for MockConnection {
	async fn send(&mut self, packet: Packet) -> Result<(), TransportError> {
		self.outgoing.send(packet).map_err(|_| TransportError::Closed)
	}

	async fn recv(&mut self) -> Option<Result<Packet, TransportError>> {
		self.incoming.recv().await.map(Ok)
	}

	async fn close(&mut self) -> Result<(), TransportError> {
		Ok(())
	}
}

/// The server's end of one accepted connection. Dropping it closes the
/// connection from the server side.
pub struct ServerSide {
	pub endpoint: Endpoint,
	pub tx: mpsc::UnboundedSender<Packet>,
	pub rx: mpsc::UnboundedReceiver<Packet>,
}

impl ServerSide {
	pub fn send(&self, packet: Packet) {
		self.tx.send(packet).expect("client connection dropped");
	}

	pub fn open(&self, ping_interval: u64, ping_timeout: u64) {
		self.send(Packet::Open(Handshake {
			sid: "engine-sid".into(),
			upgrades: vec![],
			ping_interval,
			ping_timeout,
		}));
	}

	pub fn assign_session(&self, id: &str) {
		self.send(Packet::event("sessionId", json!(id)));
	}

	pub fn envelope(&self, command: &str, data: Value) {
		self.send(Packet::event("command", json!({ "command": command, "data": data })));
	}

	/// Next packet the client sent.
	pub async fn next_packet(&mut self) -> Packet {
		tokio::time::timeout(Duration::from_secs(30), self.rx.recv())
			.await
			.expect("timed out waiting for client packet")
			.expect("client connection closed")
	}

	/// Next `command` event payload the client sent, skipping control packets.
	pub async fn next_command(&mut self) -> Value {
		loop {
			if let Packet::Event { name, data } = self.next_packet().await {
				if name == "command" {
					return data;
				}
			}
		}
	}
}

pub fn token() -> SocketToken {
	SocketToken {
		port: 4433,
		token: "login-token".into(),
	}
}

pub fn config() -> SocketConfig {
	SocketConfig {
		base_url: "wss://socket.example.test".into(),
		default_timeout: Duration::from_millis(500),
		connect_timeout: Duration::from_secs(3),
		reconnect: ReconnectConfig {
			max_attempts: 3,
			initial_delay: Duration::from_millis(100),
			max_delay: Duration::from_millis(200),
			..ReconnectConfig::default()
		},
		..SocketConfig::default()
	}
}

/// Socket plus connector handles, not yet connected.
pub fn socket() -> (AmqSocket, MockConnector, mpsc::UnboundedReceiver<ServerSide>) {
	let (connector, accepted) = MockConnector::new();
	let socket = AmqSocket::with_connector(config(), connector.clone());
	(socket, connector, accepted)
}

/// Connect `socket`, acting as the server until the session id is assigned.
pub async fn connect(socket: &AmqSocket, accepted: &mut mpsc::UnboundedReceiver<ServerSide>, session_id: &str) -> ServerSide {
	let token = token();
	let connecting = socket.connect(&token);
	let serve = async {
		let server = accepted.recv().await.expect("no connection accepted");
		server.send(Packet::Connect);
		server.assign_session(session_id);
		server
	};

	let (info, server) = tokio::join!(connecting, serve);
	let info = info.expect("connect failed");
	assert_eq!(info.session_id, session_id);
	server
}
