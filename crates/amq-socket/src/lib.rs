// amq-socket Library
//
// Multiplexes many logical listeners over one socket.io connection to the
// game server. Listeners are reference-counted into start/stop tracking
// commands, commands are paired with the named event that answers them, and
// the session identity survives reconnects.

mod client;
mod config;
mod correlation;
mod error;
pub mod events;
pub mod registry;
pub mod session;

pub use client::AmqSocket;
pub use config::SocketConfig;
pub use correlation::PendingReply;
pub use error::{BoxError, Result, SocketError};
pub use events::{Command, Envelope};
pub use registry::{DependencyGroup, EventRouter, ListenerHandle, ListenerId, ListenerResult};
pub use session::{ReconnectConfig, SessionError, SessionInfo, SessionState, SocketToken};
