//! chronosim - ChronoSync propagation simulator
//!
//! Runs a group of publishing nodes over a simulated network and reports how
//! long publications take to reach the rest of the group.

use chronosync_sim::config::Config;
use chronosync_sim::scenario::Scenario;
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging(config: &Config) {
    let level = if config.verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for target in ["chronosim", "chronosync_sim", "chronosync_node"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    let json = config.log_format == "json";
    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    // Parse configuration
    let config = Config::parse();
    init_logging(&config);

    info!(
        "chronosim v{} - ChronoSync propagation simulator",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    let scenario = match Scenario::new(config.to_scenario()) {
        Ok(scenario) => scenario,
        Err(e) => {
            error!("Failed to set up scenario: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let report = match scenario.run() {
        Ok(report) => report,
        Err(e) => {
            error!("Scenario failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    for node in &report.nodes {
        info!(
            "{} (seed {}): published {}, fetched {}, stopped at {:?}",
            node.name, node.seed, node.published, node.fetches_issued, node.stopped_at
        );
    }
    info!(
        "network: {} publications, {} announcements ({} lost), {} fetches ({} failed)",
        report.network.publications,
        report.network.announcements_sent,
        report.network.announcements_lost,
        report.network.fetches,
        report.network.fetches_failed
    );

    let summary = &report.summary;
    match summary.average_delay {
        Some(average) => info!(
            "{} publications, {} deliveries, average delay {:?} (max {:?})",
            summary.published,
            summary.delivered,
            average,
            summary.max_delay.unwrap_or_default()
        ),
        None => info!(
            "{} publications, nothing delivered",
            summary.published
        ),
    }
    if report.unmatched > 0 {
        info!("{} deliveries of unknown payloads", report.unmatched);
    }
    info!(
        "processed {} events, ended at {:?}",
        report.events_processed, report.end_time
    );

    ExitCode::SUCCESS
}
