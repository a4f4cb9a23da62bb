//! Watch, rebuild and serve loop for kiln sites.
//!
//! File changes flow from [`ChangeWatcher`] through a [`Trigger`] into the
//! [`RebuildCoordinator`], which runs at most one build at a time through the
//! [`BuildRunner`]. [`StaticServer`] reads the destination tree from disk on
//! every request. [`DevServer`] wires it all together.

pub mod coordinator;
pub mod destination;
pub mod events;
pub mod lifecycle;
pub mod runner;
pub mod server;
pub mod watcher;

pub use coordinator::{
    trigger_channel, BuildRequest, CoordinatorState, RebuildCoordinator, Trigger,
};
pub use destination::Destination;
pub use events::{next_finished, BuildEvent, BuildEvents};
pub use lifecycle::{shutdown_signal, DevHandle, DevServer, DevServerConfig};
pub use runner::{BuildOutcome, BuildRunner};
pub use server::{ServerError, StaticServer};
pub use watcher::{ChangeWatcher, WatchSet, WatcherError};
