use super::router::Shared;
use crate::error::BoxError;
use crate::events::Envelope;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

pub type ListenerResult = Result<(), BoxError>;

/// Invoked with (payload, own handle, raw envelope).
pub type Callback = Arc<dyn Fn(&Value, &ListenerHandle, &Envelope) -> ListenerResult + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "listener-{}", self.0)
	}
}

struct HandleInner {
	id: ListenerId,
	event_name: String,
	value: Value,
	active: AtomicBool,
	registry: Weak<Shared>,
}

/// Handle to a registered listener. Clones refer to the same listener.
#[derive(Clone)]
pub struct ListenerHandle {
	inner: Arc<HandleInner>,
}

impl ListenerHandle {
	pub(crate) fn new(id: ListenerId, event_name: String, value: Value, registry: Weak<Shared>) -> Self {
		Self {
			inner: Arc::new(HandleInner {
				id,
				event_name,
				value,
				active: AtomicBool::new(true),
				registry,
			}),
		}
	}

	pub fn id(&self) -> ListenerId {
		self.inner.id
	}

	pub fn event_name(&self) -> &str {
		&self.inner.event_name
	}

	/// Caller-supplied value given at subscribe time.
	pub fn value(&self) -> &Value {
		&self.inner.value
	}

	/// False once the listener has been removed from its registry.
	pub fn is_active(&self) -> bool {
		self.inner.active.load(Ordering::Acquire)
	}

	/// Remove the listener from its registry. Returns `false` if it was
	/// already gone; calling this more than once is harmless.
	pub fn cancel(&self) -> bool {
		self.inner.registry.upgrade().map_or_else(
			|| {
				self.mark_inactive();
				false
			},
			|shared| shared.remove(self),
		)
	}

	pub(crate) fn mark_inactive(&self) {
		self.inner.active.store(false, Ordering::Release);
	}

	pub(crate) fn belongs_to(&self, shared: &Arc<Shared>) -> bool {
		std::ptr::eq(self.inner.registry.as_ptr(), Arc::as_ptr(shared))
	}
}

impl PartialEq for ListenerHandle {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl Eq for ListenerHandle {}

impl fmt::Debug for ListenerHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ListenerHandle")
			.field("id", &self.inner.id)
			.field("event_name", &self.inner.event_name)
			.field("value", &self.inner.value)
			.field("active", &self.is_active())
			.finish_non_exhaustive()
	}
}
