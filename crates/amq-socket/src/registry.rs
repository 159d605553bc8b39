mod dependency;
mod listener;
mod router;

pub use dependency::{DependencyGroup, DependencyTracker, GroupState, Transition};
pub use listener::{Callback, ListenerHandle, ListenerId, ListenerResult};
pub use router::EventRouter;
