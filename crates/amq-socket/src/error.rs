use crate::session::SessionError;
use std::time::Duration;
use thiserror::Error;

/// Error type listener callbacks may return. Logged, never propagated.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, SocketError>;

/// Errors for the amq-socket crate
#[derive(Debug, Error)]
pub enum SocketError {
	#[error("Session error: {0}")]
	Session(#[from] SessionError),

	#[error("Timed out after {}ms waiting for '{event}'", timeout.as_millis())]
	Timeout { event: String, timeout: Duration },

	#[error("Wait for '{event}' was dropped before it resolved")]
	Abandoned { event: String },

	#[error("Outbound command queue is closed")]
	OutboundClosed,
}

impl SocketError {
	pub const fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout { .. })
	}
}
