//! Recording fakes for the runtime traits

use chronosync_core::*;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct TimerLog {
    pub now: Duration,
    pub next_token: u64,
    /// (token, due time)
    pub pending: Vec<(TimerToken, Duration)>,
    /// Every delay ever requested, in order
    pub delays: Vec<Duration>,
    pub cancelled: Vec<TimerToken>,
}

/// Timers that only fire when the test says so
#[derive(Clone, Default)]
pub struct ManualTimers(pub Rc<RefCell<TimerLog>>);

impl ManualTimers {
    /// Advance to the earliest pending timer and return its token
    pub fn fire_next(&self) -> Option<TimerToken> {
        let mut log = self.0.borrow_mut();
        let index = log
            .pending
            .iter()
            .enumerate()
            .min_by_key(|(_, (_, due))| *due)
            .map(|(i, _)| i)?;
        let (token, due) = log.pending.remove(index);
        log.now = due;
        Some(token)
    }

    pub fn pending(&self) -> usize {
        self.0.borrow().pending.len()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.0.borrow().delays.clone()
    }
}

impl TimerScheduler for ManualTimers {
    fn now(&self) -> Duration {
        self.0.borrow().now
    }

    fn schedule_after(&mut self, delay: Duration) -> TimerToken {
        let mut log = self.0.borrow_mut();
        log.next_token += 1;
        let token = TimerToken(log.next_token);
        let due = log.now + delay;
        log.pending.push((token, due));
        log.delays.push(delay);
        token
    }

    fn cancel(&mut self, token: TimerToken) {
        let mut log = self.0.borrow_mut();
        log.pending.retain(|(t, _)| *t != token);
        log.cancelled.push(token);
    }
}

#[derive(Debug, Default)]
pub struct SocketLog {
    /// (sync prefix, routable prefix)
    pub joined: Vec<(Name, Name)>,
    pub published: Vec<(String, Duration)>,
    /// (session, seq, retries)
    pub fetches: Vec<(SessionId, SeqNo, u32)>,
    pub left: usize,
}

/// Sync service that records every call
#[derive(Clone, Default)]
pub struct RecordingService(pub Rc<RefCell<SocketLog>>);

impl SyncService for RecordingService {
    type Socket = RecordingSocket;

    fn join(&mut self, sync_prefix: &Name, routable_prefix: &Name) -> RecordingSocket {
        self.0
            .borrow_mut()
            .joined
            .push((sync_prefix.clone(), routable_prefix.clone()));
        RecordingSocket {
            session: SessionId::new(format!("{}/0", routable_prefix)),
            log: self.0.clone(),
            next_seq: 0,
        }
    }
}

pub struct RecordingSocket {
    pub session: SessionId,
    pub log: Rc<RefCell<SocketLog>>,
    next_seq: SeqNo,
}

impl RecordingSocket {
    pub fn new(session: &str) -> Self {
        Self {
            session: SessionId::new(session),
            log: Rc::default(),
            next_seq: 0,
        }
    }

    pub fn fetches(&self) -> Vec<(SessionId, SeqNo, u32)> {
        self.log.borrow().fetches.clone()
    }

    pub fn published(&self) -> Vec<String> {
        self.log
            .borrow()
            .published
            .iter()
            .map(|(content, _)| content.clone())
            .collect()
    }
}

impl SyncSocket for RecordingSocket {
    fn session(&self) -> &SessionId {
        &self.session
    }

    fn publish(&mut self, content: Vec<u8>, freshness: Duration) -> SeqNo {
        self.next_seq += 1;
        self.log
            .borrow_mut()
            .published
            .push((String::from_utf8_lossy(&content).into_owned(), freshness));
        self.next_seq
    }

    fn fetch(&mut self, session: &SessionId, seq: SeqNo, retries: u32) {
        self.log
            .borrow_mut()
            .fetches
            .push((session.clone(), seq, retries));
    }

    fn leave(&mut self) {
        self.log.borrow_mut().left += 1;
    }
}
