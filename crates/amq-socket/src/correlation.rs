//! One-shot waits used to pair an issued command with the event that answers it.
//!
//! Pairing is by event name only: every wait pending on a name receives the
//! next matching envelope, so concurrent waits on one name see the same reply.

use crate::error::{Result, SocketError};
use crate::registry::{EventRouter, ListenerHandle};
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::future::IntoFuture;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

/// Cancels the listener when the wait finishes or is dropped.
struct CancelOnDrop(ListenerHandle);

impl Drop for CancelOnDrop {
	fn drop(&mut self) {
		self.0.cancel();
	}
}

/// A registered one-shot wait. The listener exists from construction, so a
/// command sent afterwards cannot outrun it. Await it (or call
/// [`wait`](Self::wait)) to get the payload.
///
/// The deadline runs from registration. Once it passes the listener is
/// removed even if the wait has not been awaited yet.
pub struct PendingReply {
	guard: CancelOnDrop,
	_expiry: Option<DropGuard>,
	rx: oneshot::Receiver<Value>,
	deadline: Instant,
	timeout: Duration,
}

impl PendingReply {
	pub(crate) fn register(router: &EventRouter, event_name: &str, value: Value, timeout: Duration) -> Self {
		let deadline = Instant::now() + timeout;
		let (tx, rx) = oneshot::channel();
		let slot = Mutex::new(Some(tx));

		let handle = router.subscribe(
			event_name,
			move |payload, listener, _| {
				listener.cancel();
				if let Some(tx) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
					// The receiver may already have timed out.
					let _ = tx.send(payload.clone());
				}
				Ok(())
			},
			value,
		);

		let expiry = spawn_expiry(&handle, deadline);
		Self {
			guard: CancelOnDrop(handle),
			_expiry: expiry,
			rx,
			deadline,
			timeout,
		}
	}

	#[must_use]
	pub const fn handle(&self) -> &ListenerHandle {
		&self.guard.0
	}

	#[must_use]
	pub fn event_name(&self) -> &str {
		self.guard.0.event_name()
	}

	#[must_use]
	pub const fn deadline(&self) -> Instant {
		self.deadline
	}

	/// Resolve with the first matching payload.
	///
	/// # Errors
	///
	/// [`SocketError::Timeout`] once the deadline set at registration has
	/// passed, [`SocketError::Abandoned`] if the listener was cancelled
	/// before a payload arrived. The listener is gone either way.
	pub async fn wait(self) -> Result<Value> {
		let Self {
			guard,
			_expiry,
			rx,
			deadline,
			timeout,
		} = self;
		let outcome = tokio::time::timeout_at(deadline, rx).await;
		let event = guard.0.event_name().to_string();
		drop(guard);

		match outcome {
			Ok(Ok(payload)) => Ok(payload),
			Ok(Err(_)) if Instant::now() < deadline => Err(SocketError::Abandoned { event }),
			// Expired listeners drop their sender, which can beat the timer.
			_ => Err(timed_out(event, timeout)),
		}
	}
}

fn timed_out(event: String, timeout: Duration) -> SocketError {
	debug!(%event, timeout_ms = timeout.as_millis(), "correlation timed out");
	SocketError::Timeout { event, timeout }
}

/// Remove the listener at `deadline` whether or not anyone is awaiting it.
/// Without a runtime the listener is removed when the wait is awaited.
fn spawn_expiry(handle: &ListenerHandle, deadline: Instant) -> Option<DropGuard> {
	let runtime = Handle::try_current().ok()?;
	let token = CancellationToken::new();
	let stopped = token.clone();
	let listener = handle.clone();

	runtime.spawn(async move {
		tokio::select! {
			() = stopped.cancelled() => {}
			() = tokio::time::sleep_until(deadline) => {
				if listener.cancel() {
					debug!(event = listener.event_name(), "wait expired before a reply arrived");
				}
			}
		}
	});

	Some(token.drop_guard())
}

impl IntoFuture for PendingReply {
	type Output = Result<Value>;
	type IntoFuture = BoxFuture<'static, Result<Value>>;

	fn into_future(self) -> Self::IntoFuture {
		Box::pin(self.wait())
	}
}
