use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
	pub enabled: bool,
	pub max_attempts: u32,
	pub initial_delay: Duration,
	pub max_delay: Duration,
	pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			max_attempts: 3,
			initial_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(2),
			backoff_multiplier: 2.0,
		}
	}
}

/// Bounded reconnect schedule. Once `max_attempts` delays have been handed
/// out the policy is exhausted until [`reset`](Self::reset).
#[derive(Debug)]
pub struct ReconnectPolicy {
	config: ReconnectConfig,
	attempts: u32,
	current_delay: Duration,
}

impl ReconnectPolicy {
	pub const fn new(config: ReconnectConfig) -> Self {
		let current_delay = config.initial_delay;
		Self {
			config,
			attempts: 0,
			current_delay,
		}
	}

	pub const fn attempts(&self) -> u32 {
		self.attempts
	}

	pub const fn is_exhausted(&self) -> bool {
		!self.config.enabled || self.attempts >= self.config.max_attempts
	}

	/// Delay before the next attempt, or `None` when no attempts remain.
	pub fn next_delay(&mut self) -> Option<Duration> {
		if self.is_exhausted() {
			return None;
		}

		self.attempts += 1;
		let delay = self.current_delay;
		self.current_delay = self.current_delay.mul_f64(self.config.backoff_multiplier).min(self.config.max_delay);

		Some(delay)
	}

	pub const fn reset(&mut self) {
		self.attempts = 0;
		self.current_delay = self.config.initial_delay;
	}
}
