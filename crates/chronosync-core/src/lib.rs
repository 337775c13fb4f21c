//! ChronoSync Core Library
//!
//! Shared vocabulary for the ChronoSync node driver and its simulation harness.
//!
//! # Modules
//!
//! - [`types`]: Names, sessions, sequence numbers, missing ranges, data events
//! - [`runtime`]: Traits for the sync service and timer scheduler a node runs against
//! - [`events`]: Broadcast channel carrying publish/receive notifications
//! - [`error`]: Error types

pub mod error;
pub mod events;
pub mod runtime;
pub mod types;

pub use error::Error;
pub use events::EventChannel;
pub use runtime::{NodeInput, SyncService, SyncSocket, TimerScheduler, TimerToken};
pub use types::*;
