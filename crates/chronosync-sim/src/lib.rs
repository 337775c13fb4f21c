//! chronosync-sim - Discrete-event harness for ChronoSync nodes
//!
//! This crate provides:
//! - A deterministic event queue and shared simulated timeline
//! - An in-process sync group with latency, loss, and signed content
//! - A runner that drives `SyncNode`s through the timeline
//! - Multi-node scenarios and propagation delay statistics

pub mod config;
pub mod event_queue;
pub mod keychain;
pub mod network;
pub mod runner;
pub mod scenario;
pub mod stats;

/// Position of a node in a simulation
pub type NodeIndex = u32;

pub use event_queue::{EventKey, EventQueue, SimEvent};
pub use keychain::{KeyChain, KeyChainError};
pub use network::{NetworkConfig, NetworkError, NetworkStats, NodeAction, SimNetwork};
pub use runner::{SimNode, SimulationRunner};
pub use scenario::{Scenario, ScenarioConfig, ScenarioError, ScenarioReport};
pub use stats::{PropagationStats, PropagationSummary};
