//! Runtime seams a node is driven through
//!
//! A node never registers callbacks. Everything the outside world has to say
//! to it arrives as a [`NodeInput`] through its mailbox, in timeline order:
//! - timer expiry from a [`TimerScheduler`]
//! - missing-data notifications and fetch completions from a [`SyncSocket`]

use crate::types::{FetchedData, MissingRange, Name, SeqNo, SessionId};
use std::time::Duration;

/// Handle for a scheduled timer, unique per scheduler
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(pub u64);

/// Inputs delivered to a node's mailbox
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeInput {
    /// A timer scheduled through [`TimerScheduler::schedule_after`] expired
    Tick(TimerToken),
    /// The sync service learned about content this node has not fetched
    SyncUpdate(Vec<MissingRange>),
    /// A fetch issued through [`SyncSocket::fetch`] succeeded
    FetchComplete(FetchedData),
}

/// Single-timeline timer service
///
/// Expiry is delivered later as [`NodeInput::Tick`], never inline.
pub trait TimerScheduler {
    /// Current position on the timeline
    fn now(&self) -> Duration;

    /// Schedule a tick after `delay`
    fn schedule_after(&mut self, delay: Duration) -> TimerToken;

    /// Cancel a pending tick; unknown or already-fired tokens are ignored
    fn cancel(&mut self, token: TimerToken);
}

/// A joined session in a sync group
pub trait SyncSocket {
    /// Session assigned at join time
    fn session(&self) -> &SessionId;

    /// Make `content` discoverable under the next sequence number of this session
    fn publish(&mut self, content: Vec<u8>, freshness: Duration) -> SeqNo;

    /// Request one piece of content; success arrives as [`NodeInput::FetchComplete`],
    /// exhaustion of `retries` is silent
    fn fetch(&mut self, session: &SessionId, seq: SeqNo, retries: u32);

    /// Leave the group; no further sync updates are generated for this member
    fn leave(&mut self);
}

/// Group synchronization service a node joins at init
pub trait SyncService {
    type Socket: SyncSocket;

    /// Join the group under `sync_prefix`, publishing as `routable_prefix`
    fn join(&mut self, sync_prefix: &Name, routable_prefix: &Name) -> Self::Socket;
}
