//! Propagation delay aggregation over data events

use chronosync_core::DataEvent;
use std::collections::HashMap;
use std::time::Duration;

/// Per-payload generation and arrival times
///
/// Fed from the event channels of every node in a run; owns all aggregation
/// state for that run.
#[derive(Debug, Default)]
pub struct PropagationStats {
    generated: HashMap<String, Duration>,
    arrivals: HashMap<String, Vec<Duration>>,
}

/// Summary of a run
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationSummary {
    /// Distinct payloads published
    pub published: usize,
    /// Remote receptions across all nodes
    pub delivered: usize,
    /// Mean of (arrival - generation) over matched receptions
    pub average_delay: Option<Duration>,
    pub max_delay: Option<Duration>,
}

impl PropagationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: &DataEvent) {
        if event.is_local {
            self.generated.insert(event.content.clone(), event.at);
        } else {
            self.arrivals
                .entry(event.content.clone())
                .or_default()
                .push(event.at);
        }
    }

    /// Every matched delay, in no particular order
    pub fn delays(&self) -> Vec<Duration> {
        let mut delays = Vec::new();
        for (content, arrivals) in &self.arrivals {
            if let Some(generated) = self.generated.get(content) {
                delays.extend(arrivals.iter().map(|at| at.saturating_sub(*generated)));
            }
        }
        delays
    }

    pub fn summary(&self) -> PropagationSummary {
        let delays = self.delays();
        let delivered = self.arrivals.values().map(Vec::len).sum();
        let average_delay = mean(&delays);

        PropagationSummary {
            published: self.generated.len(),
            delivered,
            average_delay,
            max_delay: delays.iter().max().copied(),
        }
    }

    /// Remote receptions whose payload was never seen published
    pub fn unmatched(&self) -> usize {
        self.arrivals
            .iter()
            .filter(|(content, _)| !self.generated.contains_key(*content))
            .map(|(_, arrivals)| arrivals.len())
            .sum()
    }
}

/// Mean of `delays`; beyond `u32::MAX` samples the division falls back to f64
fn mean(delays: &[Duration]) -> Option<Duration> {
    if delays.is_empty() {
        return None;
    }
    let total: Duration = delays.iter().sum();
    Some(match u32::try_from(delays.len()) {
        Ok(count) => total / count,
        Err(_) => total.div_f64(delays.len() as f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_empty() {
        let stats = PropagationStats::new();
        let summary = stats.summary();
        assert_eq!(summary.published, 0);
        assert_eq!(summary.delivered, 0);
        assert_eq!(summary.average_delay, None);
    }

    #[test]
    fn test_average_delay() {
        let mut stats = PropagationStats::new();
        stats.record(&DataEvent::local("/nodeA:1", ms(1000)));
        stats.record(&DataEvent::remote("/nodeA:1", ms(1060)));
        stats.record(&DataEvent::remote("/nodeA:1", ms(1080)));
        stats.record(&DataEvent::local("/nodeB:1", ms(2000)));
        stats.record(&DataEvent::remote("/nodeB:1", ms(2100)));

        let summary = stats.summary();
        assert_eq!(summary.published, 2);
        assert_eq!(summary.delivered, 3);
        assert_eq!(summary.average_delay, Some(ms(80)));
        assert_eq!(summary.max_delay, Some(ms(100)));
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[ms(10), ms(20), ms(40)]), Some(Duration::from_nanos(23_333_333)));
        assert_eq!(mean(&vec![ms(5); 1000]), Some(ms(5)));
    }

    #[test]
    fn test_unmatched_excluded_from_mean() {
        let mut stats = PropagationStats::new();
        stats.record(&DataEvent::remote("/ghost:1", ms(500)));
        stats.record(&DataEvent::local("/nodeA:1", ms(1000)));
        stats.record(&DataEvent::remote("/nodeA:1", ms(1040)));

        let summary = stats.summary();
        assert_eq!(summary.delivered, 2);
        assert_eq!(summary.average_delay, Some(ms(40)));
        assert_eq!(stats.unmatched(), 1);
    }
}
