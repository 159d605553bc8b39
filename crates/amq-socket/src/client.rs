use crate::config::SocketConfig;
use crate::correlation::PendingReply;
use crate::error::Result;
use crate::events::{Command, Envelope};
use crate::registry::{EventRouter, ListenerHandle, ListenerResult};
use crate::session::{Connector, SessionDriver, SessionError, SessionInfo, SessionState, SocketToken, StateTransition};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

struct ActiveSession {
	generation: u64,
	cancel: CancellationToken,
	task: JoinHandle<()>,
}

/// Event multiplexer over a single game-server connection.
///
/// Listeners can be registered before or after `connect`; control commands
/// they trigger are queued and sent once a connection exists.
pub struct AmqSocket {
	config: SocketConfig,
	router: EventRouter,
	connector: Arc<dyn Connector>,
	outbound: Arc<Mutex<mpsc::UnboundedReceiver<Command>>>,
	state: Arc<watch::Sender<SessionState>>,
	session: Mutex<Option<ActiveSession>>,
	generation: AtomicU64,
	default_timeout_ms: AtomicU64,
}

impl AmqSocket {
	#[cfg(feature = "websocket")]
	pub fn new(config: SocketConfig) -> Self {
		Self::with_connector(config, crate::session::WsConnector)
	}

	pub fn with_connector(config: SocketConfig, connector: impl Connector) -> Self {
		let (router, outbound) = EventRouter::new();
		router.set_debug(config.debug);
		let (state, _) = watch::channel(SessionState::Disconnected);
		let default_timeout_ms = AtomicU64::new(u64::try_from(config.default_timeout.as_millis()).unwrap_or(u64::MAX));

		Self {
			config,
			router,
			connector: Arc::new(connector),
			outbound: Arc::new(Mutex::new(outbound)),
			state: Arc::new(state),
			session: Mutex::new(None),
			generation: AtomicU64::new(0),
			default_timeout_ms,
		}
	}

	pub const fn config(&self) -> &SocketConfig {
		&self.config
	}

	pub const fn router(&self) -> &EventRouter {
		&self.router
	}

	/// Open the connection and wait for the server to assign a session id.
	///
	/// # Errors
	///
	/// [`SessionError::AlreadyConnected`] while a session is live. Otherwise
	/// the transport or handshake failure of the first attempt, or
	/// [`SessionError::ConnectTimeout`]. A failed attempt is fully torn down
	/// before this returns, so the caller may retry right away.
	#[instrument(skip(self, token), fields(port = token.port))]
	pub async fn connect(&self, token: &SocketToken) -> Result<SessionInfo> {
		let generation = self.generation.fetch_add(1, Ordering::Relaxed);
		let cancel = CancellationToken::new();
		let ready = {
			let mut session = self.session.lock().await;
			if session.as_ref().is_some_and(|active| !active.task.is_finished()) {
				return Err(SessionError::AlreadyConnected.into());
			}

			let (driver, ready) = SessionDriver::new(
				Arc::clone(&self.connector),
				self.config.endpoint(token),
				self.router.clone(),
				Arc::clone(&self.outbound),
				Arc::clone(&self.state),
				self.config.reconnect.clone(),
				cancel.clone(),
			);

			*session = Some(ActiveSession {
				generation,
				cancel: cancel.clone(),
				task: tokio::spawn(driver.run()),
			});
			ready
		};

		let outcome = match tokio::time::timeout(self.config.connect_timeout, ready).await {
			Ok(Ok(result)) => result,
			Ok(Err(_)) => Err(SessionError::Closed),
			Err(_) => {
				warn!(timeout_secs = self.config.connect_timeout.as_secs(), "no session id before connect timeout");
				Err(SessionError::ConnectTimeout(self.config.connect_timeout))
			}
		};

		match outcome {
			Ok(session_id) => Ok(SessionInfo {
				session_id,
				port: token.port,
			}),
			Err(e) => {
				self.abandon(generation).await;
				Err(e.into())
			}
		}
	}

	/// Stop and reap the session started by the connect call `generation`,
	/// unless a later connect already replaced it.
	async fn abandon(&self, generation: u64) {
		let active = {
			let mut session = self.session.lock().await;
			if session.as_ref().is_some_and(|active| active.generation == generation) {
				session.take()
			} else {
				None
			}
		};

		if let Some(active) = active {
			active.cancel.cancel();
			if let Err(e) = active.task.await {
				warn!(error = %e, "session task ended abnormally");
			}
		}
	}

	/// Close the connection. Safe to call at any time, any number of times.
	pub async fn disconnect(&self) {
		let active = self.session.lock().await.take();
		if let Some(active) = active {
			active.cancel.cancel();
			if let Err(e) = active.task.await {
				warn!(error = %e, "session task ended abnormally");
			}
		}

		self.state.send_if_modified(|state| match state.next(StateTransition::Closed) {
			Ok(next) if next != *state => {
				*state = next;
				true
			}
			_ => false,
		});
		debug!("disconnect complete");
	}

	pub fn subscribe<F>(&self, event_name: impl Into<String>, callback: F, value: Value) -> ListenerHandle
	where
		F: Fn(&Value, &ListenerHandle, &Envelope) -> ListenerResult + Send + Sync + 'static,
	{
		self.router.subscribe(event_name, callback, value)
	}

	pub fn on<F>(&self, event_name: impl Into<String>, callback: F) -> ListenerHandle
	where
		F: Fn(&Value, &ListenerHandle, &Envelope) -> ListenerResult + Send + Sync + 'static,
	{
		self.router.on(event_name, callback)
	}

	pub fn cancel(&self, handle: &ListenerHandle) -> bool {
		self.router.cancel(handle)
	}

	/// Register a one-shot wait for `event_name`. `None` uses the default timeout.
	pub fn wait_once(&self, event_name: &str, value: Value, timeout: Option<Duration>) -> PendingReply {
		PendingReply::register(&self.router, event_name, value, timeout.unwrap_or_else(|| self.default_timeout()))
	}

	/// Send `command` and wait for the first `response_event` after it.
	///
	/// Replies are matched by event name only; concurrent commands sharing a
	/// response name race for the same reply.
	///
	/// # Errors
	///
	/// [`SocketError::Timeout`](crate::SocketError::Timeout) when no reply
	/// arrives in time, or the error of [`send`](Self::send).
	pub async fn issue_command(&self, command: Command, response_event: &str, value: Value, timeout: Option<Duration>) -> Result<Value> {
		let pending = self.wait_once(response_event, value, timeout);
		self.router.send(command)?;
		pending.await
	}

	/// Fire-and-forget command.
	///
	/// # Errors
	///
	/// [`SocketError::OutboundClosed`](crate::SocketError::OutboundClosed) if
	/// the command queue is gone.
	pub fn send(&self, command: Command) -> Result<()> {
		self.router.send(command)
	}

	pub fn set_debug(&self, enabled: bool) {
		self.router.set_debug(enabled);
	}

	pub fn is_debug(&self) -> bool {
		self.router.is_debug()
	}

	pub fn default_timeout(&self) -> Duration {
		Duration::from_millis(self.default_timeout_ms.load(Ordering::Relaxed))
	}

	pub fn set_default_timeout(&self, timeout: Duration) {
		let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
		self.default_timeout_ms.store(millis, Ordering::Relaxed);
	}

	pub fn state(&self) -> SessionState {
		self.state.borrow().clone()
	}

	pub fn watch_state(&self) -> watch::Receiver<SessionState> {
		self.state.subscribe()
	}

	pub fn session_id(&self) -> Option<String> {
		self.state.borrow().session_id().map(str::to_string)
	}

	/// Wait until the session is over.
	///
	/// # Errors
	///
	/// Exhausted reconnects and failed connects surface here as
	/// [`SessionError::Failed`].
	pub async fn closed(&self) -> Result<()> {
		let mut rx = self.state.subscribe();
		let state = rx.wait_for(SessionState::is_terminal).await.map_err(|_| SessionError::Closed)?.clone();

		match state {
			SessionState::Failed { error } => Err(SessionError::Failed(error).into()),
			_ => Ok(()),
		}
	}
}

impl Drop for AmqSocket {
	fn drop(&mut self) {
		if let Some(active) = self.session.get_mut().take() {
			active.cancel.cancel();
		}
	}
}
