//! Multi-node scenarios
//!
//! Builds nodes `/Node1..N` in one sync group, starts them together, stops a
//! chosen number of them early, and reports how publications propagated.

use crate::network::{NetworkConfig, NetworkError, NetworkStats, SimNetwork};
use crate::runner::SimulationRunner;
use crate::stats::PropagationSummary;
use crate::NodeIndex;
use chronosync_core::Name;
use chronosync_node::{NodeConfig, NodeError, PublishDelay};
use rand::{seq::index, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Time at which every node joins and starts publishing
pub const START_TIME: Duration = Duration::from_secs(1);
/// Earliest time a leaving node may stop
pub const EARLIEST_LEAVE: Duration = Duration::from_secs(20);
/// Upper bound (inclusive) of per-node seeds drawn for unsynchronized runs
pub const MAX_NODE_SEED: u32 = 1000;

/// Scenario errors
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    #[error("Node error: {0}")]
    Node(#[from] NodeError),
    #[error("Scenario needs at least one node")]
    NoNodes,
    #[error("Run time {0:?} must be later than the start time")]
    InvalidRunTime(Duration),
    #[error("{leaving} leaving nodes requested but only {nodes} exist")]
    TooManyLeavingNodes { leaving: u32, nodes: u32 },
}

/// Everything that shapes one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub nodes: u32,
    /// End of the run; nodes still running stop here
    pub run_time: Duration,
    pub network: NetworkConfig,
    /// Every node uses seed 0, so all publish on the same schedule
    pub synchronized: bool,
    /// Nodes that stop at a random time in `[20s, run_time)`
    pub leaving_nodes: u32,
    #[serde(default)]
    pub publish_delay: PublishDelay,
    pub sync_prefix: Name,
    pub routing_prefix: Name,
    /// Drives seeds, leaving-node choice, and the network's loss decisions
    pub seed: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            nodes: 10,
            run_time: Duration::from_secs(100),
            network: NetworkConfig::default(),
            synchronized: false,
            leaving_nodes: 0,
            publish_delay: PublishDelay::default(),
            sync_prefix: Name::parse("/ndn/broadcast/sync"),
            routing_prefix: Name::root(),
            seed: 0,
        }
    }
}

impl ScenarioConfig {
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.nodes == 0 {
            return Err(ScenarioError::NoNodes);
        }
        if self.run_time <= START_TIME {
            return Err(ScenarioError::InvalidRunTime(self.run_time));
        }
        if self.leaving_nodes > self.nodes {
            return Err(ScenarioError::TooManyLeavingNodes {
                leaving: self.leaving_nodes,
                nodes: self.nodes,
            });
        }
        self.network.validate()?;
        self.publish_delay
            .validate()
            .map_err(|e| ScenarioError::Node(e.into()))?;
        Ok(())
    }
}

/// Per-node outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub name: Name,
    pub seed: u32,
    pub published: u64,
    pub fetches_issued: u64,
    pub stopped_at: Duration,
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioReport {
    pub summary: PropagationSummary,
    /// Remote receptions of payloads nobody was seen publishing
    pub unmatched: usize,
    pub network: NetworkStats,
    pub nodes: Vec<NodeReport>,
    pub events_processed: u64,
    pub end_time: Duration,
}

/// A configured, not yet executed run
#[derive(Debug)]
pub struct Scenario {
    config: ScenarioConfig,
}

impl Scenario {
    pub fn new(config: ScenarioConfig) -> Result<Self, ScenarioError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Execute the run to completion
    pub fn run(&self) -> Result<ScenarioReport, ScenarioError> {
        let config = &self.config;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

        let network = SimNetwork::new(NetworkConfig {
            seed: rng.gen(),
            ..config.network.clone()
        })?;
        let mut runner = SimulationRunner::new(network);

        let mut seeds = Vec::with_capacity(config.nodes as usize);
        for i in 0..config.nodes {
            let seed = if config.synchronized {
                0
            } else {
                rng.gen_range(0..=MAX_NODE_SEED)
            };
            let node = NodeConfig::new(format!("/Node{}", i + 1))
                .with_sync_prefix(config.sync_prefix.clone())
                .with_routing_prefix(config.routing_prefix.clone())
                .with_seed(seed)
                .with_publish_delay(config.publish_delay.clone());
            let index = runner.add_node(node)?;
            runner.start_at(index, START_TIME);
            seeds.push(seed);
        }

        let mut stop_times = vec![config.run_time; config.nodes as usize];
        // Runs too short for the usual window leave any time after start
        let earliest = if EARLIEST_LEAVE < config.run_time {
            EARLIEST_LEAVE
        } else {
            START_TIME
        };
        let window = earliest.as_millis() as u64..config.run_time.as_millis() as u64;
        for i in index::sample(&mut rng, config.nodes as usize, config.leaving_nodes as usize) {
            let at = Duration::from_millis(rng.gen_range(window.clone()));
            debug!("Node{} leaves at {:?}", i + 1, at);
            stop_times[i] = at;
        }
        for (i, at) in stop_times.iter().enumerate() {
            runner.stop_at(i as NodeIndex, *at);
        }

        info!(
            "running {} nodes until {:?} ({} leaving, synchronized: {})",
            config.nodes, config.run_time, config.leaving_nodes, config.synchronized
        );
        runner.run_until(config.run_time)?;

        let nodes = runner
            .nodes()
            .iter()
            .zip(seeds)
            .zip(&stop_times)
            .map(|((node, seed), stopped_at)| NodeReport {
                name: node.config().user_prefix.clone(),
                seed,
                published: node.published_count(),
                fetches_issued: node.dispatch_stats().fetches_issued,
                stopped_at: *stopped_at,
            })
            .collect();

        Ok(ScenarioReport {
            summary: runner.stats().summary(),
            unmatched: runner.stats().unmatched(),
            network: runner.network().stats(),
            nodes,
            events_processed: runner.events_processed(),
            end_time: runner.network().now(),
        })
    }
}
