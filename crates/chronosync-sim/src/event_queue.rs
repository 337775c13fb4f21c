//! Event queue with deterministic ordering.

use crate::NodeIndex;
use chronosync_core::{NodeInput, SeqNo, SessionId};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

/// Key for ordering events in the queue.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Sequence number (submission order for equal times)
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EventKey {
    /// When this event should be processed.
    pub time: Duration,
    /// Sequence number for deterministic FIFO ordering.
    pub sequence: u64,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.cmp(&other.time) {
            Ordering::Equal => {}
            ord => return ord,
        }
        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Something that happens on the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// Deliver an input to a node's mailbox.
    Input { node: NodeIndex, input: NodeInput },
    /// A publication announcement reaches a group member. Resolved against the
    /// member's knowledge into a missing range when it is processed.
    Announce {
        to: NodeIndex,
        session: SessionId,
        seq: SeqNo,
    },
    /// Initialize and run a node.
    Start { node: NodeIndex },
    /// Shut a node down.
    Stop { node: NodeIndex },
}

/// Timeline of pending events.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: BTreeMap<EventKey, SimEvent>,
    sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event at `time`, after anything already queued for that time.
    pub fn push(&mut self, time: Duration, event: SimEvent) -> EventKey {
        self.sequence += 1;
        let key = EventKey {
            time,
            sequence: self.sequence,
        };
        self.events.insert(key, event);
        key
    }

    /// Remove and return the earliest event.
    pub fn pop(&mut self) -> Option<(EventKey, SimEvent)> {
        self.events.pop_first()
    }

    pub fn remove(&mut self, key: &EventKey) -> Option<SimEvent> {
        self.events.remove(key)
    }

    /// Time of the earliest event.
    pub fn peek_time(&self) -> Option<Duration> {
        self.events.keys().next().map(|k| k.time)
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }
}
