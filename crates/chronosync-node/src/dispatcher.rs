//! Missing-data dispatch
//!
//! Every sequence number of every advertised range becomes one fetch request,
//! in input order. Ranges are not deduplicated against each other or against
//! fetches still in flight.

use chronosync_core::*;
use std::time::Duration;
use tracing::{debug, trace};

/// Retry budget handed to the sync service with every fetch
pub const FETCH_RETRIES: u32 = 2;

/// Dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Non-empty update batches handled
    pub updates: u64,
    pub fetches_issued: u64,
    pub fetches_completed: u64,
}

/// Turns sync updates into fetches and fetched content into data events
#[derive(Debug, Default)]
pub struct SyncDispatcher {
    stats: DispatchStats,
}

impl SyncDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue one fetch per missing sequence number; returns the number issued
    pub fn on_sync_update<S: SyncSocket>(&mut self, ranges: &[MissingRange], socket: &mut S) -> usize {
        if ranges.is_empty() {
            return 0;
        }
        self.stats.updates += 1;

        let mut issued = 0;
        for range in ranges {
            trace!(
                "missing {}#[{}, {}]",
                range.session,
                range.low,
                range.high
            );
            for seq in range.seqs() {
                socket.fetch(&range.session, seq, FETCH_RETRIES);
                issued += 1;
            }
        }

        self.stats.fetches_issued += issued as u64;
        debug!("{} ranges -> {} fetches", ranges.len(), issued);
        issued
    }

    /// Surface fetched content as a remote data event
    pub fn on_fetch_complete(&mut self, data: FetchedData, at: Duration, events: &EventChannel) {
        self.stats.fetches_completed += 1;
        let content = String::from_utf8_lossy(&data.content).into_owned();
        debug!("received {} from {}#{}", content, data.session, data.seq);
        events.emit(DataEvent::remote(content, at));
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }
}
