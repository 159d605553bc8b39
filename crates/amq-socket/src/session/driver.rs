use super::frame::{Handshake, Packet};
use super::retry::{ReconnectConfig, ReconnectPolicy};
use super::state::{SessionState, StateTransition};
use super::transport::{Connection, Connector, Credential, Endpoint, TransportError};
use super::SessionError;
use crate::events::{Command, Envelope, COMMAND_EVENT, SESSION_ID_EVENT};
use crate::registry::EventRouter;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

pub type ReadyReceiver = oneshot::Receiver<Result<String, SessionError>>;

/// Why the pump loop returned.
enum Exit {
	Cancelled,
	Lost(String),
	Failed(SessionError),
}

/// Engine.io v3 client heartbeat: ping every interval, expect a pong within the timeout.
struct Heartbeat {
	interval: Interval,
	timeout: Duration,
	awaiting_since: Option<Instant>,
}

impl Heartbeat {
	fn from_handshake(handshake: &Handshake) -> Option<Self> {
		if handshake.ping_interval == 0 {
			return None;
		}

		let period = Duration::from_millis(handshake.ping_interval);
		let mut interval = tokio::time::interval_at(Instant::now() + period, period);
		interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

		Some(Self {
			interval,
			timeout: Duration::from_millis(handshake.ping_timeout),
			awaiting_since: None,
		})
	}
}

async fn next_beat(heartbeat: &mut Option<Heartbeat>) {
	match heartbeat {
		Some(beat) => {
			beat.interval.tick().await;
		}
		None => std::future::pending().await,
	}
}

/// Owns one logical session: the live connection, reconnects, and the
/// forwarding of inbound envelopes to the router.
pub struct SessionDriver {
	connector: Arc<dyn Connector>,
	endpoint: Endpoint,
	router: EventRouter,
	outbound: Arc<Mutex<mpsc::UnboundedReceiver<Command>>>,
	state: Arc<watch::Sender<SessionState>>,
	policy: ReconnectPolicy,
	cancel: CancellationToken,
	ready: Option<oneshot::Sender<Result<String, SessionError>>>,
	session_id: Option<String>,
}

impl SessionDriver {
	pub(crate) fn new(
		connector: Arc<dyn Connector>,
		endpoint: Endpoint,
		router: EventRouter,
		outbound: Arc<Mutex<mpsc::UnboundedReceiver<Command>>>,
		state: Arc<watch::Sender<SessionState>>,
		reconnect: ReconnectConfig,
		cancel: CancellationToken,
	) -> (Self, ReadyReceiver) {
		let (ready_tx, ready_rx) = oneshot::channel();
		let driver = Self {
			connector,
			endpoint,
			router,
			outbound,
			state,
			policy: ReconnectPolicy::new(reconnect),
			cancel,
			ready: Some(ready_tx),
			session_id: None,
		};
		(driver, ready_rx)
	}

	#[instrument(name = "session", skip(self), fields(port = self.endpoint.port))]
	pub(crate) async fn run(mut self) {
		// Held for the driver's lifetime so only one session drains the queue.
		let mut outbound = Arc::clone(&self.outbound).lock_owned().await;
		self.router.resync(&mut outbound);
		self.transition(StateTransition::StartConnecting);

		let endpoint = self.endpoint.clone();
		let mut conn = match self.open(&endpoint).await {
			Ok(Some(conn)) => conn,
			Ok(None) => {
				self.finish_closed();
				return;
			}
			Err(e) => {
				error!(error = %e, "failed to connect");
				self.fail(SessionError::Transport(e));
				return;
			}
		};

		loop {
			match self.pump(conn.as_mut(), &mut outbound).await {
				Exit::Cancelled => {
					if let Err(e) = conn.send(Packet::Disconnect).await {
						debug!(error = %e, "could not send disconnect packet");
					}
					if let Err(e) = conn.close().await {
						debug!(error = %e, "error while closing connection");
					}
					info!(session_id = ?self.session_id, "disconnected");
					self.finish_closed();
					return;
				}
				Exit::Failed(err) => {
					let _ = conn.close().await;
					error!(error = %err, "session failed");
					self.fail(err);
					return;
				}
				Exit::Lost(reason) => {
					warn!(%reason, session_id = ?self.session_id, "disconnected from server, attempting to reconnect");
					self.transition(StateTransition::ConnectionLost);
					match self.reconnect().await {
						Some(next) => conn = next,
						None => return,
					}
				}
			}
		}
	}

	/// `Ok(None)` when cancelled mid-connect.
	async fn open(&self, endpoint: &Endpoint) -> Result<Option<Box<dyn Connection>>, TransportError> {
		tokio::select! {
			() = self.cancel.cancelled() => Ok(None),
			conn = self.connector.connect(endpoint) => conn.map(Some),
		}
	}

	async fn reconnect(&mut self) -> Option<Box<dyn Connection>> {
		loop {
			let Some(delay) = self.policy.next_delay() else {
				let err = SessionError::ReconnectExhausted {
					attempts: self.policy.attempts(),
				};
				error!(session_id = ?self.session_id, error = %err, "giving up on reconnect");
				self.fail(err);
				return None;
			};

			let attempt = self.policy.attempts();
			self.transition(StateTransition::RetryAttempt(attempt));

			tokio::select! {
				() = self.cancel.cancelled() => {
					self.finish_closed();
					return None;
				}
				() = tokio::time::sleep(delay) => {}
			}

			// Resume the existing identity rather than logging in again.
			let credential = self
				.session_id
				.as_ref()
				.map_or_else(|| self.endpoint.credential.clone(), |id| Credential::Session(id.clone()));
			info!(attempt, session_id = ?self.session_id, "attempting to reconnect");

			let endpoint = self.endpoint.with_credential(credential);
			match self.open(&endpoint).await {
				Ok(Some(conn)) => {
					if let Some(id) = self.session_id.clone() {
						info!(session_id = %id, "reconnected");
						self.transition(StateTransition::SessionAssigned(id));
						self.policy.reset();
					}
					return Some(conn);
				}
				Ok(None) => {
					self.finish_closed();
					return None;
				}
				Err(e) => warn!(attempt, error = %e, "reconnect attempt failed"),
			}
		}
	}

	async fn pump(&mut self, conn: &mut dyn Connection, outbound: &mut mpsc::UnboundedReceiver<Command>) -> Exit {
		let mut heartbeat: Option<Heartbeat> = None;

		loop {
			tokio::select! {
				biased;

				() = self.cancel.cancelled() => return Exit::Cancelled,

				packet = conn.recv() => {
					let packet = match packet {
						None => return Exit::Lost("connection closed by server".to_string()),
						Some(Err(e)) => return Exit::Lost(e.to_string()),
						Some(Ok(packet)) => packet,
					};
					if let Some(exit) = self.handle_packet(conn, packet, &mut heartbeat).await {
						return exit;
					}
				}

				Some(command) = outbound.recv() => {
					trace!(kind = %command.kind, command = %command.command, "sending command");
					if let Err(e) = conn.send(Packet::event(COMMAND_EVENT, command.to_value())).await {
						return Exit::Lost(format!("failed to send '{}': {e}", command.command));
					}
				}

				() = next_beat(&mut heartbeat) => {
					let Some(beat) = heartbeat.as_mut() else { continue };
					if beat.awaiting_since.is_some_and(|since| since.elapsed() > beat.timeout) {
						return Exit::Lost("heartbeat timed out".to_string());
					}
					beat.awaiting_since.get_or_insert_with(Instant::now);
					if let Err(e) = conn.send(Packet::Ping(String::new())).await {
						return Exit::Lost(e.to_string());
					}
				}
			}
		}
	}

	async fn handle_packet(&mut self, conn: &mut dyn Connection, packet: Packet, heartbeat: &mut Option<Heartbeat>) -> Option<Exit> {
		match packet {
			Packet::Open(handshake) => {
				debug!(sid = %handshake.sid, ping_interval = handshake.ping_interval, "engine.io handshake");
				*heartbeat = Heartbeat::from_handshake(&handshake);
			}
			Packet::Ping(probe) => {
				if let Err(e) = conn.send(Packet::Pong(probe)).await {
					return Some(Exit::Lost(e.to_string()));
				}
			}
			Packet::Pong(_) => {
				if let Some(beat) = heartbeat.as_mut() {
					beat.awaiting_since = None;
				}
			}
			Packet::Connect => trace!("socket.io namespace connected"),
			Packet::Noop => {}
			Packet::Close => return Some(Exit::Lost("server closed the transport".to_string())),
			Packet::Disconnect => return Some(Exit::Lost("server disconnected the socket".to_string())),
			Packet::Error(message) => {
				// Before a session exists an error packet is the server refusing us.
				if self.ready.is_some() {
					return Some(Exit::Failed(SessionError::Handshake(message)));
				}
				warn!(%message, "server reported an error");
			}
			Packet::Event { name, data } => self.handle_event(&name, data),
		}

		None
	}

	fn handle_event(&mut self, name: &str, data: Value) {
		match name {
			SESSION_ID_EVENT => {
				let id = match data {
					Value::String(id) => id,
					other => other.to_string(),
				};
				if self.session_id.as_deref() != Some(id.as_str()) {
					info!(session_id = %id, "session id assigned");
				}

				self.session_id = Some(id.clone());
				self.transition(StateTransition::SessionAssigned(id.clone()));
				self.policy.reset();

				if let Some(ready) = self.ready.take() {
					let _ = ready.send(Ok(id));
				}
			}
			COMMAND_EVENT => match serde_json::from_value::<Envelope>(data) {
				Ok(envelope) => {
					self.router.route_inbound(&envelope);
				}
				Err(e) => warn!(error = %e, "dropping malformed command envelope"),
			},
			other => trace!(event = other, "ignoring socket event"),
		}
	}

	fn transition(&self, transition: StateTransition) {
		let mut rejected = None;
		self.state.send_if_modified(|state| match state.next(transition) {
			Ok(next) => {
				let changed = *state != next;
				*state = next;
				changed
			}
			Err(e) => {
				rejected = Some(e);
				false
			}
		});

		if let Some(e) = rejected {
			warn!(error = %e, "ignoring invalid session transition");
		}
	}

	fn fail(&mut self, err: SessionError) {
		self.transition(StateTransition::ConnectionFailed(err.to_string()));
		if let Some(ready) = self.ready.take() {
			let _ = ready.send(Err(err));
		}
	}

	fn finish_closed(&mut self) {
		self.transition(StateTransition::Closed);
		if let Some(ready) = self.ready.take() {
			let _ = ready.send(Err(SessionError::Closed));
		}
	}
}
