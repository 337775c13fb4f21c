//! Configuration for chronosim

use crate::network::NetworkConfig;
use crate::scenario::ScenarioConfig;
use chronosync_core::Name;
use chronosync_node::PublishDelay;
use clap::Parser;
use std::time::Duration;

/// chronosim - ChronoSync propagation simulator
#[derive(Parser, Debug, Clone)]
#[command(name = "chronosim")]
#[command(about = "Run a ChronoSync group over a simulated network and report propagation delay")]
pub struct Config {
    /// Number of nodes in the group
    #[arg(short, long, default_value = "10")]
    pub nodes: u32,

    /// Simulated run time in seconds
    #[arg(short = 't', long, default_value = "100")]
    pub run_time_secs: u64,

    /// Give every node the same delay seed so they publish in lockstep
    #[arg(long)]
    pub synchronized: bool,

    /// Probability that an announcement or fetch attempt is lost
    #[arg(long, default_value = "0.0")]
    pub loss_rate: f64,

    /// One-way delay of a single link in milliseconds
    #[arg(long, default_value = "10")]
    pub link_delay_ms: u64,

    /// Links between any two members
    #[arg(long, default_value = "2")]
    pub hops: u32,

    /// Time charged for a lost fetch attempt in milliseconds
    #[arg(long, default_value = "1000")]
    pub fetch_timeout_ms: u64,

    /// Nodes that leave the group before the end of the run
    #[arg(long, default_value = "0")]
    pub leaving_nodes: u32,

    /// Lower bound of the uniform publish delay in milliseconds
    #[arg(long, default_value = "500")]
    pub min_delay_ms: u64,

    /// Upper bound of the uniform publish delay in milliseconds
    #[arg(long, default_value = "10000")]
    pub max_delay_ms: u64,

    /// Publish at a fixed rate instead of uniform random delays
    #[arg(long)]
    pub publications_per_second: Option<f64>,

    /// Master seed for the run
    #[arg(long, env = "CHRONOSIM_SEED", default_value = "0")]
    pub seed: u64,

    /// Sync group prefix
    #[arg(long, default_value = "/ndn/broadcast/sync")]
    pub sync_prefix: String,

    /// Prefix that makes node prefixes routable
    #[arg(long, default_value = "/")]
    pub routing_prefix: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.nodes == 0 {
            anyhow::bail!("At least one node is required");
        }
        if self.leaving_nodes > self.nodes {
            anyhow::bail!(
                "Leaving nodes ({}) cannot exceed nodes ({})",
                self.leaving_nodes,
                self.nodes
            );
        }
        if !(0.0..=1.0).contains(&self.loss_rate) {
            anyhow::bail!("Loss rate must be within [0, 1]");
        }
        if self.hops == 0 {
            anyhow::bail!("Hop count must be at least 1");
        }
        if self.run_time_secs <= 1 {
            anyhow::bail!("Run time must be longer than the 1s start time");
        }
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            anyhow::bail!("Unknown log format: {}", self.log_format);
        }
        self.publish_delay().validate()?;
        Ok(())
    }

    pub fn publish_delay(&self) -> PublishDelay {
        match self.publications_per_second {
            Some(per_second) => PublishDelay::Rate { per_second },
            None => PublishDelay::UniformMs {
                min_ms: self.min_delay_ms,
                max_ms: self.max_delay_ms,
            },
        }
    }

    pub fn to_scenario(&self) -> ScenarioConfig {
        ScenarioConfig {
            nodes: self.nodes,
            run_time: Duration::from_secs(self.run_time_secs),
            network: NetworkConfig {
                link_delay: Duration::from_millis(self.link_delay_ms),
                hops: self.hops,
                loss_rate: self.loss_rate,
                fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
                seed: self.seed,
            },
            synchronized: self.synchronized,
            leaving_nodes: self.leaving_nodes,
            publish_delay: self.publish_delay(),
            sync_prefix: Name::parse(&self.sync_prefix),
            routing_prefix: Name::parse(&self.routing_prefix),
            seed: self.seed,
        }
    }
}
