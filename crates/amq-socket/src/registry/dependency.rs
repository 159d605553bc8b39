use crate::events::{self, Command};
use std::collections::HashMap;
use std::fmt;

/// Groups of event names whose combined listener count drives a pair of
/// start/stop control commands on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyGroup {
	Leaderboard,
	Rooms,
	Expand,
	OnlineUsers,
}

impl DependencyGroup {
	pub const ALL: [Self; 4] = [Self::Leaderboard, Self::Rooms, Self::Expand, Self::OnlineUsers];

	pub fn for_event(event_name: &str) -> Option<Self> {
		match event_name {
			events::LEADERBOARD_UPDATE => Some(Self::Leaderboard),
			events::ROOM_CHANGE | events::NEW_ROOMS => Some(Self::Rooms),
			events::EXPAND_QUESTIONS => Some(Self::Expand),
			events::ALL_ONLINE_USERS => Some(Self::OnlineUsers),
			_ => None,
		}
	}

	/// Command sent when the first listener in the group appears.
	pub fn start_command(self) -> Option<Command> {
		match self {
			Self::Leaderboard => Some(Command::new("social", "get leaderboard level entries")),
			Self::Rooms => Some(Command::new("roombrowser", "get rooms")),
			Self::Expand | Self::OnlineUsers => None,
		}
	}

	/// Command sent when the last listener in the group goes away.
	pub fn stop_command(self) -> Command {
		match self {
			Self::Leaderboard => Command::new("social", "stop leaderboard listning"),
			Self::Rooms => Command::new("roombrowser", "remove roombrowser listners"),
			Self::Expand => Command::new("library", "expandLibrary closed"),
			Self::OnlineUsers => Command::new("social", "stop tracking online users"),
		}
	}

	/// True for any start or stop command of any group.
	pub fn is_control_command(command: &Command) -> bool {
		Self::ALL
			.into_iter()
			.any(|group| group.stop_command() == *command || group.start_command().as_ref() == Some(command))
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Leaderboard => "leaderboard",
			Self::Rooms => "rooms",
			Self::Expand => "expand",
			Self::OnlineUsers => "online-users",
		}
	}
}

impl fmt::Display for DependencyGroup {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupState {
	#[default]
	Idle,
	Active(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
	Started,
	Stopped,
	Unchanged,
}

impl GroupState {
	pub const fn count(self) -> usize {
		match self {
			Self::Idle => 0,
			Self::Active(n) => n,
		}
	}

	/// Apply a signed delta. The count clamps at zero, so an Idle group never
	/// reports `Stopped`.
	#[must_use]
	pub const fn apply(self, delta: isize) -> (Self, Transition) {
		let next = match self.count().saturating_add_signed(delta) {
			0 => Self::Idle,
			n => Self::Active(n),
		};

		let transition = match (self, next) {
			(Self::Idle, Self::Active(_)) => Transition::Started,
			(Self::Active(_), Self::Idle) => Transition::Stopped,
			_ => Transition::Unchanged,
		};

		(next, transition)
	}
}

/// Per-group state machines. Returns the control command a delta triggers.
#[derive(Debug, Default)]
pub struct DependencyTracker {
	groups: HashMap<DependencyGroup, GroupState>,
}

impl DependencyTracker {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn state(&self, group: DependencyGroup) -> GroupState {
		self.groups.get(&group).copied().unwrap_or_default()
	}

	pub fn adjust(&mut self, group: DependencyGroup, delta: isize) -> Option<Command> {
		let (next, transition) = self.state(group).apply(delta);
		self.groups.insert(group, next);

		match transition {
			Transition::Started => {
				tracing::debug!(%group, "dependency group activated");
				group.start_command()
			}
			Transition::Stopped => {
				tracing::debug!(%group, "dependency group released");
				Some(group.stop_command())
			}
			Transition::Unchanged => None,
		}
	}
}
