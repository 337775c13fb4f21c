//! Deterministic simulation runner.
//!
//! Drives every node from one timeline. Each node input is handled to
//! completion before the next event is taken, and each node's data events are
//! drained into the run's [`PropagationStats`] right after it runs.

use crate::event_queue::SimEvent;
use crate::network::{NodeAction, SimNetwork, SimSyncService, SimTimers};
use crate::stats::PropagationStats;
use crate::NodeIndex;
use chronosync_core::DataEvent;
use chronosync_node::{NodeConfig, NodeError, SyncNode};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::warn;

/// A node wired to the simulated network
pub type SimNode = SyncNode<SimSyncService, SimTimers>;

/// Processes simulated events in timeline order.
pub struct SimulationRunner {
    network: SimNetwork,
    nodes: Vec<SimNode>,
    /// One subscription per node, same index
    receivers: Vec<broadcast::Receiver<DataEvent>>,
    stats: PropagationStats,
    /// Every data event seen, in emission order
    log: Vec<(NodeIndex, DataEvent)>,
    events_processed: u64,
}

impl SimulationRunner {
    pub fn new(network: SimNetwork) -> Self {
        Self {
            network,
            nodes: Vec::new(),
            receivers: Vec::new(),
            stats: PropagationStats::new(),
            log: Vec::new(),
            events_processed: 0,
        }
    }

    /// Add a node; it stays uninitialized until its start event
    pub fn add_node(&mut self, config: NodeConfig) -> Result<NodeIndex, NodeError> {
        let index = self.nodes.len() as NodeIndex;
        let node = SyncNode::new(
            config,
            self.network.service(index),
            self.network.timers(index),
        )?;
        self.receivers.push(node.subscribe());
        self.nodes.push(node);
        Ok(index)
    }

    /// Initialize and run `node` at `at`
    pub fn start_at(&self, node: NodeIndex, at: Duration) {
        self.network.schedule_at(at, SimEvent::Start { node });
    }

    /// Shut `node` down at `at`
    pub fn stop_at(&self, node: NodeIndex, at: Duration) {
        self.network.schedule_at(at, SimEvent::Stop { node });
    }

    /// Process the next event due no later than `until`; false when there is none
    pub fn step(&mut self, until: Duration) -> Result<bool, NodeError> {
        let Some((at, index, action)) = self.network.next_event(until) else {
            return Ok(false);
        };
        self.events_processed += 1;

        let Some(node) = self.nodes.get_mut(index as usize) else {
            warn!("event for unknown node {} at {:?}", index, at);
            return Ok(true);
        };

        match action {
            NodeAction::Input(input) => node.handle(input),
            NodeAction::Start => {
                node.init()?;
                node.run()?;
            }
            NodeAction::Stop => node.shutdown(),
        }

        self.drain(index);
        Ok(true)
    }

    /// Process every event due no later than `end`
    pub fn run_until(&mut self, end: Duration) -> Result<(), NodeError> {
        while self.step(end)? {}
        Ok(())
    }

    fn drain(&mut self, index: NodeIndex) {
        let Some(rx) = self.receivers.get_mut(index as usize) else {
            return;
        };
        loop {
            match rx.try_recv() {
                Ok(event) => {
                    self.stats.record(&event);
                    self.log.push((index, event));
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("node {} event stream lagged by {}", index, skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    pub fn node(&self, index: NodeIndex) -> Option<&SimNode> {
        self.nodes.get(index as usize)
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    pub fn stats(&self) -> &PropagationStats {
        &self.stats
    }

    /// Data events observed so far, tagged with the emitting node
    pub fn events(&self) -> &[(NodeIndex, DataEvent)] {
        &self.log
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }
}
