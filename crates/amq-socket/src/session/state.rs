use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
	Disconnected,
	Connecting,
	Connected { session_id: String, since: Instant },
	Reconnecting { session_id: Option<String>, attempt: u32 },
	Failed { error: String },
}

#[derive(Debug, Clone)]
pub enum StateTransition {
	StartConnecting,
	SessionAssigned(String),
	ConnectionLost,
	RetryAttempt(u32),
	ConnectionFailed(String),
	Closed,
}

#[derive(Debug, Error)]
pub enum StateError {
	#[error("Invalid state transition from {from:?} on {transition:?}")]
	InvalidTransition { from: SessionState, transition: StateTransition },
}

impl SessionState {
	pub const fn is_connected(&self) -> bool {
		matches!(self, Self::Connected { .. })
	}

	pub const fn is_terminal(&self) -> bool {
		matches!(self, Self::Failed { .. } | Self::Disconnected)
	}

	/// Last identity the remote assigned, if any.
	pub fn session_id(&self) -> Option<&str> {
		match self {
			Self::Connected { session_id, .. } => Some(session_id),
			Self::Reconnecting { session_id, .. } => session_id.as_deref(),
			_ => None,
		}
	}

	/// Validate and compute the next state.
	///
	/// # Errors
	///
	/// [`StateError::InvalidTransition`] when `transition` does not apply to
	/// the current state.
	pub fn next(&self, transition: StateTransition) -> Result<Self, StateError> {
		use StateTransition as T;

		let next = match (self, &transition) {
			(Self::Disconnected | Self::Failed { .. }, T::StartConnecting) => Some(Self::Connecting),
			(Self::Connecting | Self::Reconnecting { .. }, T::SessionAssigned(id)) => Some(Self::Connected {
				session_id: id.clone(),
				since: Instant::now(),
			}),
			// The remote may re-send the identity on a live connection.
			(Self::Connected { since, .. }, T::SessionAssigned(id)) => Some(Self::Connected {
				session_id: id.clone(),
				since: *since,
			}),
			(Self::Connecting, T::ConnectionLost) => Some(Self::Reconnecting { session_id: None, attempt: 0 }),
			(Self::Connected { session_id, .. }, T::ConnectionLost) => Some(Self::Reconnecting {
				session_id: Some(session_id.clone()),
				attempt: 0,
			}),
			(Self::Reconnecting { session_id, .. }, T::ConnectionLost) => Some(Self::Reconnecting {
				session_id: session_id.clone(),
				attempt: self.attempt(),
			}),
			(Self::Reconnecting { session_id, .. }, T::RetryAttempt(n)) => Some(Self::Reconnecting {
				session_id: session_id.clone(),
				attempt: *n,
			}),
			(Self::Connecting | Self::Connected { .. } | Self::Reconnecting { .. }, T::ConnectionFailed(error)) => {
				Some(Self::Failed { error: error.clone() })
			}
			(_, T::Closed) => Some(Self::Disconnected),
			_ => None,
		};

		next.ok_or_else(|| StateError::InvalidTransition {
			from: self.clone(),
			transition,
		})
	}

	const fn attempt(&self) -> u32 {
		match self {
			Self::Reconnecting { attempt, .. } => *attempt,
			_ => 0,
		}
	}
}
