//! Publication scheduling

use crate::delay::DelayGenerator;
use chronosync_core::*;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Freshness lifetime attached to every publication
pub const DATA_FRESHNESS: Duration = Duration::from_millis(4000);

/// Publisher errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublisherError {
    #[error("Publisher already started")]
    AlreadyStarted,
}

/// Drives local content production
///
/// At most one tick is pending at any time. Ticks carrying any other token
/// (cancelled or superseded) are ignored.
#[derive(Debug)]
pub struct Publisher {
    identity: Name,
    delays: DelayGenerator,
    /// Last published counter value
    counter: u64,
    pending: Option<TimerToken>,
    started: bool,
}

impl Publisher {
    pub fn new(identity: Name, delays: DelayGenerator) -> Self {
        Self {
            identity,
            delays,
            counter: 0,
            pending: None,
            started: false,
        }
    }

    /// Schedule the first tick; valid once per publisher lifetime
    pub fn start<T: TimerScheduler>(&mut self, timers: &mut T) -> Result<(), PublisherError> {
        if self.started {
            return Err(PublisherError::AlreadyStarted);
        }
        self.started = true;
        self.schedule_next(timers);
        Ok(())
    }

    /// Handle a timer tick: publish, notify, reschedule
    ///
    /// Returns the published counter value, or `None` for a stale tick.
    pub fn on_tick<S: SyncSocket, T: TimerScheduler>(
        &mut self,
        token: TimerToken,
        socket: &mut S,
        timers: &mut T,
        events: &EventChannel,
    ) -> Option<u64> {
        if self.pending != Some(token) {
            trace!("{}: ignoring stale tick {:?}", self.identity, token);
            return None;
        }
        self.pending = None;

        self.counter += 1;
        let message = self.message(self.counter);
        let seq = socket.publish(message.clone().into_bytes(), DATA_FRESHNESS);
        debug!(
            "{}: published {} as {}#{}",
            self.identity,
            message,
            socket.session(),
            seq
        );
        events.emit(DataEvent::local(message, timers.now()));

        self.schedule_next(timers);
        Some(self.counter)
    }

    /// Cancel the pending tick, if any
    pub fn stop<T: TimerScheduler>(&mut self, timers: &mut T) {
        if let Some(token) = self.pending.take() {
            timers.cancel(token);
        }
    }

    /// Payload text for a counter value
    pub fn message(&self, counter: u64) -> String {
        format!("{}:{}", self.identity, counter)
    }

    pub fn published_count(&self) -> u64 {
        self.counter
    }

    pub fn is_scheduled(&self) -> bool {
        self.pending.is_some()
    }

    fn schedule_next<T: TimerScheduler>(&mut self, timers: &mut T) {
        let delay = self.delays.next_delay();
        self.pending = Some(timers.schedule_after(delay));
        trace!("{}: next publication in {:?}", self.identity, delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PublishDelay;
    use crate::testing::{ManualTimers, RecordingSocket};

    fn publisher(identity: &str, delay: PublishDelay, seed: u32) -> Publisher {
        Publisher::new(
            Name::parse(identity),
            DelayGenerator::new(&delay, seed).unwrap(),
        )
    }

    fn uniform() -> PublishDelay {
        PublishDelay::UniformMs {
            min_ms: 500,
            max_ms: 10_000,
        }
    }

    #[test]
    fn test_counter_is_monotonic() {
        let mut publisher = publisher("/nodeA", uniform(), 1);
        let mut timers = ManualTimers::default();
        let mut socket = RecordingSocket::new("/nodeA/0");
        let events = EventChannel::default();
        let mut rx = events.subscribe();

        publisher.start(&mut timers).unwrap();
        let mut published = Vec::new();
        for _ in 0..5 {
            let token = timers.fire_next().unwrap();
            published.push(
                publisher
                    .on_tick(token, &mut socket, &mut timers, &events)
                    .unwrap(),
            );
        }

        assert_eq!(published, vec![1, 2, 3, 4, 5]);
        assert_eq!(
            socket.published(),
            vec!["/nodeA:1", "/nodeA:2", "/nodeA:3", "/nodeA:4", "/nodeA:5"]
        );
        for expected in 1..=5 {
            let event = rx.try_recv().unwrap();
            assert!(event.is_local);
            assert_eq!(event.content, format!("/nodeA:{}", expected));
        }
        // Always exactly one tick outstanding
        assert_eq!(timers.pending(), 1);
    }

    #[test]
    fn test_freshness_is_constant() {
        let mut publisher = publisher("/nodeA", uniform(), 1);
        let mut timers = ManualTimers::default();
        let mut socket = RecordingSocket::new("/nodeA/0");
        let events = EventChannel::default();

        publisher.start(&mut timers).unwrap();
        for _ in 0..3 {
            let token = timers.fire_next().unwrap();
            publisher.on_tick(token, &mut socket, &mut timers, &events);
        }
        assert!(socket
            .log
            .borrow()
            .published
            .iter()
            .all(|(_, freshness)| *freshness == DATA_FRESHNESS));
    }

    #[test]
    fn test_double_start_rejected() {
        let mut publisher = publisher("/nodeA", uniform(), 1);
        let mut timers = ManualTimers::default();

        publisher.start(&mut timers).unwrap();
        assert_eq!(
            publisher.start(&mut timers),
            Err(PublisherError::AlreadyStarted)
        );
        assert_eq!(timers.pending(), 1);
    }

    #[test]
    fn test_scheduled_delays_match_seed() {
        let run = |seed| {
            let mut publisher = publisher("/nodeA", uniform(), seed);
            let mut timers = ManualTimers::default();
            let mut socket = RecordingSocket::new("/nodeA/0");
            let events = EventChannel::default();
            publisher.start(&mut timers).unwrap();
            for _ in 0..10 {
                let token = timers.fire_next().unwrap();
                publisher.on_tick(token, &mut socket, &mut timers, &events);
            }
            timers.delays()
        };

        let first = run(17);
        assert_eq!(first.len(), 11);
        assert_eq!(first, run(17));
        assert!(first
            .iter()
            .all(|d| *d >= Duration::from_millis(500) && *d <= Duration::from_millis(10_000)));
    }

    #[test]
    fn test_rate_cadence() {
        let mut publisher = publisher("/nodeA", PublishDelay::Rate { per_second: 2.0 }, 5);
        let mut timers = ManualTimers::default();
        let mut socket = RecordingSocket::new("/nodeA/0");
        let events = EventChannel::default();
        let mut rx = events.subscribe();

        publisher.start(&mut timers).unwrap();
        for _ in 0..4 {
            let token = timers.fire_next().unwrap();
            publisher.on_tick(token, &mut socket, &mut timers, &events);
        }

        assert!(timers
            .delays()
            .iter()
            .all(|d| *d == Duration::from_millis(500)));
        let times: Vec<Duration> = (0..4).map(|_| rx.try_recv().unwrap().at).collect();
        assert_eq!(
            times,
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(1500),
                Duration::from_millis(2000),
            ]
        );
    }

    #[test]
    fn test_stop_cancels_and_ignores_stale_tick() {
        let mut publisher = publisher("/nodeA", uniform(), 1);
        let mut timers = ManualTimers::default();
        let mut socket = RecordingSocket::new("/nodeA/0");
        let events = EventChannel::default();

        // Stopping before start is a no-op
        publisher.stop(&mut timers);
        assert!(timers.0.borrow().cancelled.is_empty());

        publisher.start(&mut timers).unwrap();
        let token = timers.0.borrow().pending[0].0;
        publisher.stop(&mut timers);
        publisher.stop(&mut timers);
        assert_eq!(timers.0.borrow().cancelled, vec![token]);
        assert!(!publisher.is_scheduled());

        assert_eq!(publisher.on_tick(token, &mut socket, &mut timers, &events), None);
        assert_eq!(publisher.published_count(), 0);
        assert!(socket.published().is_empty());
    }
}
