//! chronosync-node - ChronoSync per-node synchronization driver
//!
//! This crate provides:
//! - Publication scheduling at a seeded, configurable cadence
//! - Expansion of missing-data notifications into fetch requests
//! - Node lifecycle (init, run, shutdown) over a sync service and timer scheduler
//! - Publish/receive notifications on a broadcast channel

pub mod config;
pub mod delay;
pub mod dispatcher;
pub mod node;
pub mod publisher;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, NodeConfig, PublishDelay};
pub use delay::DelayGenerator;
pub use dispatcher::{DispatchStats, SyncDispatcher};
pub use node::{NodeError, NodeState, SyncNode};
pub use publisher::Publisher;
