use super::dependency::{DependencyGroup, DependencyTracker};
use super::listener::{Callback, ListenerHandle, ListenerId, ListenerResult};
use crate::error::SocketError;
use crate::events::{self, Command, Envelope};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

#[derive(Clone)]
struct Entry {
	handle: ListenerHandle,
	callback: Callback,
}

#[derive(Default)]
struct RegistryState {
	listeners: HashMap<String, Vec<Entry>>,
	groups: DependencyTracker,
}

/// Registry state shared between the router and every listener handle.
pub struct Shared {
	state: Mutex<RegistryState>,
	outbound: mpsc::UnboundedSender<Command>,
	debug: AtomicBool,
	next_id: AtomicU64,
}

impl Shared {
	fn lock(&self) -> MutexGuard<'_, RegistryState> {
		// Callbacks never run under this lock, so a poisoned guard still
		// holds consistent state.
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn emit(&self, command: Command) {
		debug!(kind = %command.kind, command = %command.command, "queueing control command");
		if self.outbound.send(command).is_err() {
			warn!("outbound queue closed, dropping control command");
		}
	}

	pub(crate) fn remove(&self, handle: &ListenerHandle) -> bool {
		let mut state = self.lock();
		let name = handle.event_name();

		let Some(list) = state.listeners.get_mut(name) else {
			return false;
		};
		let Some(index) = list.iter().position(|entry| entry.handle.id() == handle.id()) else {
			return false;
		};

		list.remove(index);
		if list.is_empty() {
			state.listeners.remove(name);
		}
		handle.mark_inactive();
		trace!(id = %handle.id(), event = name, "listener removed");

		if let Some(group) = DependencyGroup::for_event(name) {
			if let Some(command) = state.groups.adjust(group, -1) {
				self.emit(command);
			}
		}

		true
	}
}

/// Routes inbound envelopes to listeners and derives start/stop control
/// commands from listener counts per dependency group.
///
/// Clones share the same registry.
#[derive(Clone)]
pub struct EventRouter {
	shared: Arc<Shared>,
}

impl EventRouter {
	/// Create a router and the queue its outbound commands are written to.
	pub fn new() -> (Self, mpsc::UnboundedReceiver<Command>) {
		let (outbound, outbound_rx) = mpsc::unbounded_channel();
		let shared = Arc::new(Shared {
			state: Mutex::new(RegistryState::default()),
			outbound,
			debug: AtomicBool::new(false),
			next_id: AtomicU64::new(1),
		});

		(Self { shared }, outbound_rx)
	}

	/// Register `callback` for `event_name` (or [`events::ALL`]).
	///
	/// Listeners for the same name are invoked in registration order. The
	/// first listener in a dependency group queues that group's start command.
	pub fn subscribe<F>(&self, event_name: impl Into<String>, callback: F, value: Value) -> ListenerHandle
	where
		F: Fn(&Value, &ListenerHandle, &Envelope) -> ListenerResult + Send + Sync + 'static,
	{
		let event_name = event_name.into();
		let id = ListenerId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
		let handle = ListenerHandle::new(id, event_name.clone(), value, Arc::downgrade(&self.shared));
		let entry = Entry {
			handle: handle.clone(),
			callback: Arc::new(callback),
		};

		let mut state = self.shared.lock();
		state.listeners.entry(event_name.clone()).or_default().push(entry);
		trace!(%id, event = %event_name, "listener added");

		if let Some(group) = DependencyGroup::for_event(&event_name) {
			if let Some(command) = state.groups.adjust(group, 1) {
				self.shared.emit(command);
			}
		}

		handle
	}

	/// Shorthand for [`subscribe`](Self::subscribe) with a null value.
	pub fn on<F>(&self, event_name: impl Into<String>, callback: F) -> ListenerHandle
	where
		F: Fn(&Value, &ListenerHandle, &Envelope) -> ListenerResult + Send + Sync + 'static,
	{
		self.subscribe(event_name, callback, Value::Null)
	}

	/// Remove a listener. Unknown, foreign or already-cancelled handles are a no-op.
	pub fn cancel(&self, handle: &ListenerHandle) -> bool {
		if !handle.belongs_to(&self.shared) {
			return false;
		}
		self.shared.remove(handle)
	}

	/// Deliver `envelope` to exact-name listeners, then wildcard listeners.
	///
	/// The listener list is snapshotted before any callback runs: listeners
	/// added during dispatch wait for the next envelope, and listeners
	/// cancelled during dispatch are skipped. Returns how many callbacks ran.
	pub fn route_inbound(&self, envelope: &Envelope) -> usize {
		if self.is_debug() {
			info!(command = %envelope.command, data = %envelope.data, "inbound envelope");
		}

		let snapshot: Vec<Entry> = {
			let state = self.shared.lock();
			let exact = state.listeners.get(&envelope.command).into_iter().flatten();
			let wildcard = (envelope.command != events::ALL)
				.then(|| state.listeners.get(events::ALL))
				.flatten()
				.into_iter()
				.flatten();
			exact.chain(wildcard).cloned().collect()
		};

		let mut delivered = 0;
		for entry in snapshot {
			if !entry.handle.is_active() {
				continue;
			}
			delivered += 1;

			let outcome = panic::catch_unwind(AssertUnwindSafe(|| (entry.callback)(&envelope.data, &entry.handle, envelope)));
			match outcome {
				Ok(Ok(())) => {}
				Ok(Err(e)) => {
					error!(id = %entry.handle.id(), command = %envelope.command, error = %e, "listener failed");
				}
				Err(payload) => {
					error!(
						id = %entry.handle.id(),
						command = %envelope.command,
						panic = panic_message(payload.as_ref()),
						"listener panicked"
					);
				}
			}
		}

		delivered
	}

	/// Rebuild the outbound queue for a fresh session.
	///
	/// Start/stop commands queued for an earlier session are discarded and
	/// each active group gets its start command again, ahead of any other
	/// queued commands. Returns how many stale commands were dropped.
	pub(crate) fn resync(&self, outbound: &mut mpsc::UnboundedReceiver<Command>) -> usize {
		// Held across the drain so no subscribe can interleave its own start.
		let state = self.shared.lock();

		let mut kept = Vec::new();
		let mut dropped = 0;
		while let Ok(command) = outbound.try_recv() {
			if DependencyGroup::is_control_command(&command) {
				dropped += 1;
			} else {
				kept.push(command);
			}
		}

		for group in DependencyGroup::ALL {
			if state.groups.state(group).count() > 0 {
				if let Some(start) = group.start_command() {
					self.shared.emit(start);
				}
			}
		}
		drop(state);

		for command in kept {
			if self.shared.outbound.send(command).is_err() {
				warn!("outbound queue closed, dropping command");
			}
		}

		if dropped > 0 {
			debug!(dropped, "discarded stale control commands");
		}
		dropped
	}

	/// Queue an arbitrary command on the outbound connection.
	///
	/// # Errors
	///
	/// [`SocketError::OutboundClosed`] once the session side of the queue is gone.
	pub fn send(&self, command: Command) -> Result<(), SocketError> {
		self.shared.outbound.send(command).map_err(|_| SocketError::OutboundClosed)
	}

	pub fn set_debug(&self, enabled: bool) {
		self.shared.debug.store(enabled, Ordering::Relaxed);
	}

	pub fn is_debug(&self) -> bool {
		self.shared.debug.load(Ordering::Relaxed)
	}

	pub fn contains(&self, handle: &ListenerHandle) -> bool {
		handle.belongs_to(&self.shared)
			&& self
				.shared
				.lock()
				.listeners
				.get(handle.event_name())
				.is_some_and(|list| list.iter().any(|entry| entry.handle.id() == handle.id()))
	}

	pub fn listener_count(&self, event_name: &str) -> usize {
		self.shared.lock().listeners.get(event_name).map_or(0, Vec::len)
	}

	pub fn group_count(&self, group: DependencyGroup) -> usize {
		self.shared.lock().groups.state(group).count()
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
	payload
		.downcast_ref::<&str>()
		.copied()
		.or_else(|| payload.downcast_ref::<String>().map(String::as_str))
		.unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn drain(rx: &mut mpsc::UnboundedReceiver<Command>) -> Vec<String> {
		let mut out = Vec::new();
		while let Ok(cmd) = rx.try_recv() {
			out.push(cmd.command);
		}
		out
	}

	#[test]
	fn cancel_of_foreign_handle_is_noop() {
		let (a, _rx_a) = EventRouter::new();
		let (b, mut rx_b) = EventRouter::new();

		let handle = a.on(events::LEADERBOARD_UPDATE, |_, _, _| Ok(()));
		b.on(events::LEADERBOARD_UPDATE, |_, _, _| Ok(()));
		drain(&mut rx_b);

		assert!(!b.cancel(&handle));
		assert!(a.contains(&handle));
		assert_eq!(b.group_count(DependencyGroup::Leaderboard), 1);
		assert!(drain(&mut rx_b).is_empty());
	}

	#[test]
	fn debug_flag_does_not_change_delivery() {
		let (router, _rx) = EventRouter::new();
		let hits = Arc::new(AtomicU64::new(0));
		let counter = hits.clone();
		router.on("ping", move |_, _, _| {
			counter.fetch_add(1, Ordering::SeqCst);
			Ok(())
		});

		router.set_debug(true);
		assert!(router.is_debug());
		assert_eq!(router.route_inbound(&Envelope::new("ping", json!(1))), 1);
		assert_eq!(hits.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn literal_wildcard_command_delivers_once() {
		let (router, _rx) = EventRouter::new();
		router.on(events::ALL, |_, _, _| Ok(()));
		assert_eq!(router.route_inbound(&Envelope::new(events::ALL, Value::Null)), 1);
	}

	#[test]
	fn dropped_router_deactivates_on_cancel() {
		let (router, _rx) = EventRouter::new();
		let handle = router.on("x", |_, _, _| Ok(()));
		drop(router);
		assert!(!handle.cancel());
		assert!(!handle.is_active());
	}

	#[test]
	fn panic_message_reads_str_and_string() {
		let boxed: Box<dyn Any + Send> = Box::new("boom");
		assert_eq!(panic_message(boxed.as_ref()), "boom");
		let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
		assert_eq!(panic_message(boxed.as_ref()), "bang");
	}

	#[test]
	fn resync_replaces_stale_control_commands() {
		let (router, mut rx) = EventRouter::new();
		let _board = router.on(events::LEADERBOARD_UPDATE, |_, _, _| Ok(()));
		let rooms = router.on(events::NEW_ROOMS, |_, _, _| Ok(()));
		rooms.cancel();
		router.send(Command::new("lobby", "game chat message")).unwrap();

		assert_eq!(router.resync(&mut rx), 3);
		assert_eq!(drain(&mut rx), vec!["get leaderboard level entries", "game chat message"]);
	}
}
