//! In-process sync group and timer service on a shared simulated timeline
//!
//! Every member sits `hops` links away from every other member. Announcements
//! and fetch attempts are lost independently with `loss_rate`.

use crate::event_queue::{EventKey, EventQueue, SimEvent};
use crate::keychain::{DataPacket, KeyChain, SignedData};
use crate::NodeIndex;
use chronosync_core::*;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Network configuration errors
#[derive(Debug, Error, PartialEq)]
pub enum NetworkError {
    #[error("Loss rate must be within [0, 1], got {0}")]
    InvalidLossRate(f64),
    #[error("Hop count must be at least 1")]
    ZeroHops,
}

/// Latency and loss model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// One-way delay of a single link
    pub link_delay: Duration,
    /// Links between any two members
    pub hops: u32,
    /// Probability that an announcement or fetch attempt is lost
    pub loss_rate: f64,
    /// Time charged for a lost fetch attempt before the next one
    pub fetch_timeout: Duration,
    /// Seed for loss decisions
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            link_delay: Duration::from_millis(10),
            hops: 2,
            loss_rate: 0.0,
            fetch_timeout: Duration::from_secs(1),
            seed: 0,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), NetworkError> {
        if !(0.0..=1.0).contains(&self.loss_rate) {
            return Err(NetworkError::InvalidLossRate(self.loss_rate));
        }
        if self.hops == 0 {
            return Err(NetworkError::ZeroHops);
        }
        Ok(())
    }

    /// One-way latency between two members
    pub fn path_delay(&self) -> Duration {
        self.link_delay * self.hops
    }
}

/// Work for one node, as handed out by [`SimNetwork::next_event`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeAction {
    Input(NodeInput),
    Start,
    Stop,
}

/// Traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub publications: u64,
    pub announcements_sent: u64,
    pub announcements_lost: u64,
    /// Announcements that told the receiver nothing new
    pub announcements_redundant: u64,
    pub fetches: u64,
    pub fetch_attempts_lost: u64,
    pub fetches_failed: u64,
    pub fetches_delivered: u64,
}

#[derive(Debug)]
struct Member {
    sync_prefix: Name,
    /// Highest sequence number announced to this member, per session
    known: HashMap<SessionId, SeqNo>,
}

#[derive(Debug)]
struct SessionState {
    sync_prefix: Name,
    signer: [u8; 32],
    last_seq: SeqNo,
}

#[derive(Debug)]
struct World {
    config: NetworkConfig,
    now: Duration,
    queue: EventQueue,
    next_timer: u64,
    timers: HashMap<TimerToken, EventKey>,
    members: BTreeMap<NodeIndex, Member>,
    sessions: HashMap<SessionId, SessionState>,
    store: HashMap<(SessionId, SeqNo), SignedData>,
    rng: ChaCha8Rng,
    stats: NetworkStats,
}

impl World {
    fn lost(&mut self) -> bool {
        self.config.loss_rate > 0.0 && self.rng.gen_bool(self.config.loss_rate)
    }

    fn join(&mut self, node: NodeIndex, sync_prefix: &Name, routable_prefix: &Name, signer: [u8; 32]) -> SessionId {
        let base = format!("{}/{}", routable_prefix, self.now.as_millis());
        let mut session = SessionId::new(base.clone());
        let mut n = 1;
        while self.sessions.contains_key(&session) {
            session = SessionId::new(format!("{}-{}", base, n));
            n += 1;
        }

        self.sessions.insert(
            session.clone(),
            SessionState {
                sync_prefix: sync_prefix.clone(),
                signer,
                last_seq: 0,
            },
        );
        self.members.insert(
            node,
            Member {
                sync_prefix: sync_prefix.clone(),
                known: HashMap::new(),
            },
        );
        session
    }

    fn publish(&mut self, node: NodeIndex, session: &SessionId, keys: &KeyChain, content: Vec<u8>, freshness: Duration) -> SeqNo {
        let Some(state) = self.sessions.get_mut(session) else {
            warn!("publish on unknown session {}", session);
            return 0;
        };
        state.last_seq += 1;
        let seq = state.last_seq;
        let sync_prefix = state.sync_prefix.clone();

        let packet = DataPacket {
            name: format!("{}/{}", session, seq),
            content,
            freshness_ms: freshness.as_millis() as u64,
        };
        match keys.sign(packet) {
            Ok(signed) => {
                self.store.insert((session.clone(), seq), signed);
            }
            Err(e) => warn!("failed to sign {}#{}: {}", session, seq, e),
        }
        self.stats.publications += 1;

        let peers: Vec<NodeIndex> = self
            .members
            .iter()
            .filter(|(index, member)| **index != node && member.sync_prefix == sync_prefix)
            .map(|(index, _)| *index)
            .collect();
        let arrival = self.now + self.config.path_delay();
        for peer in peers {
            if self.lost() {
                self.stats.announcements_lost += 1;
                trace!("announcement {}#{} to node {} lost", session, seq, peer);
                continue;
            }
            self.stats.announcements_sent += 1;
            self.queue.push(
                arrival,
                SimEvent::Announce {
                    to: peer,
                    session: session.clone(),
                    seq,
                },
            );
        }

        // The publisher's own digest change comes back as an update with nothing missing
        self.queue.push(
            self.now,
            SimEvent::Input {
                node,
                input: NodeInput::SyncUpdate(Vec::new()),
            },
        );
        seq
    }

    fn fetch(&mut self, node: NodeIndex, session: &SessionId, seq: SeqNo, retries: u32) {
        self.stats.fetches += 1;
        let signer = self.sessions.get(session).map(|s| s.signer);
        let data = self.store.get(&(session.clone(), seq)).cloned();

        let (Some(signer), Some(data)) = (signer, data) else {
            debug!("node {} fetch {}#{}: no such content", node, session, seq);
            self.stats.fetches_failed += 1;
            return;
        };

        let round_trip = self.config.path_delay() * 2;
        let mut elapsed = Duration::ZERO;
        for attempt in 0..=retries {
            if self.lost() {
                self.stats.fetch_attempts_lost += 1;
                elapsed += self.config.fetch_timeout;
                trace!(
                    "node {} fetch {}#{} attempt {} lost",
                    node,
                    session,
                    seq,
                    attempt
                );
                continue;
            }
            elapsed += round_trip;

            if let Err(e) = data.verify(&signer) {
                warn!("node {} fetch {}#{}: {}", node, session, seq, e);
                self.stats.fetches_failed += 1;
                return;
            }
            self.stats.fetches_delivered += 1;
            self.queue.push(
                self.now + elapsed,
                SimEvent::Input {
                    node,
                    input: NodeInput::FetchComplete(FetchedData {
                        session: session.clone(),
                        seq,
                        content: data.packet.content,
                    }),
                },
            );
            return;
        }

        debug!(
            "node {} fetch {}#{}: gave up after {} attempts",
            node,
            session,
            seq,
            retries + 1
        );
        self.stats.fetches_failed += 1;
    }

    /// Turn an announcement into the range the receiver is missing
    fn resolve_announcement(&mut self, to: NodeIndex, session: SessionId, seq: SeqNo) -> Option<MissingRange> {
        let Some(member) = self.members.get_mut(&to) else {
            trace!("announcement {}#{} for departed node {}", session, seq, to);
            return None;
        };
        let known = member.known.entry(session.clone()).or_insert(0);
        if seq <= *known {
            self.stats.announcements_redundant += 1;
            return None;
        }
        let low = *known + 1;
        *known = seq;
        Some(MissingRange {
            session,
            low,
            high: seq,
        })
    }
}

/// Shared simulated world
///
/// Cheap to clone; every handle refers to the same timeline.
#[derive(Clone)]
pub struct SimNetwork {
    world: Arc<Mutex<World>>,
}

impl SimNetwork {
    pub fn new(config: NetworkConfig) -> Result<Self, NetworkError> {
        config.validate()?;
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Ok(Self {
            world: Arc::new(Mutex::new(World {
                config,
                now: Duration::ZERO,
                queue: EventQueue::new(),
                next_timer: 0,
                timers: HashMap::new(),
                members: BTreeMap::new(),
                sessions: HashMap::new(),
                store: HashMap::new(),
                rng,
                stats: NetworkStats::default(),
            })),
        })
    }

    /// Timer service for one node
    pub fn timers(&self, node: NodeIndex) -> SimTimers {
        SimTimers {
            node,
            world: self.world.clone(),
        }
    }

    /// Sync service for one node
    pub fn service(&self, node: NodeIndex) -> SimSyncService {
        SimSyncService {
            node,
            world: self.world.clone(),
        }
    }

    pub fn now(&self) -> Duration {
        self.world.lock().now
    }

    /// Queue an event at an absolute time
    pub fn schedule_at(&self, time: Duration, event: SimEvent) {
        self.world.lock().queue.push(time, event);
    }

    /// Time of the next pending event
    pub fn next_time(&self) -> Option<Duration> {
        self.world.lock().queue.peek_time()
    }

    /// Advance to the next node-facing event due no later than `until`
    ///
    /// Announcements are resolved here; those that carry nothing new for the
    /// receiver never reach it.
    pub fn next_event(&self, until: Duration) -> Option<(Duration, NodeIndex, NodeAction)> {
        let mut world = self.world.lock();
        loop {
            if world.queue.peek_time()? > until {
                return None;
            }
            let (key, event) = world.queue.pop()?;
            world.now = key.time;
            match event {
                SimEvent::Announce { to, session, seq } => {
                    if let Some(range) = world.resolve_announcement(to, session, seq) {
                        let input = NodeInput::SyncUpdate(vec![range]);
                        return Some((key.time, to, NodeAction::Input(input)));
                    }
                }
                SimEvent::Input { node, input } => {
                    if let NodeInput::Tick(token) = &input {
                        world.timers.remove(token);
                    }
                    return Some((key.time, node, NodeAction::Input(input)));
                }
                SimEvent::Start { node } => return Some((key.time, node, NodeAction::Start)),
                SimEvent::Stop { node } => return Some((key.time, node, NodeAction::Stop)),
            }
        }
    }

    /// Nodes currently in a group
    pub fn member_count(&self) -> usize {
        self.world.lock().members.len()
    }

    pub fn pending_events(&self) -> usize {
        self.world.lock().queue.len()
    }

    pub fn stats(&self) -> NetworkStats {
        self.world.lock().stats
    }
}

/// [`TimerScheduler`] for one node on the shared timeline
pub struct SimTimers {
    node: NodeIndex,
    world: Arc<Mutex<World>>,
}

impl TimerScheduler for SimTimers {
    fn now(&self) -> Duration {
        self.world.lock().now
    }

    fn schedule_after(&mut self, delay: Duration) -> TimerToken {
        let mut world = self.world.lock();
        world.next_timer += 1;
        let token = TimerToken(world.next_timer);
        let at = world.now + delay;
        let key = world.queue.push(
            at,
            SimEvent::Input {
                node: self.node,
                input: NodeInput::Tick(token),
            },
        );
        world.timers.insert(token, key);
        token
    }

    fn cancel(&mut self, token: TimerToken) {
        let mut world = self.world.lock();
        if let Some(key) = world.timers.remove(&token) {
            world.queue.remove(&key);
        }
    }
}

/// [`SyncService`] for one node
pub struct SimSyncService {
    node: NodeIndex,
    world: Arc<Mutex<World>>,
}

impl SyncService for SimSyncService {
    type Socket = SimSocket;

    fn join(&mut self, sync_prefix: &Name, routable_prefix: &Name) -> SimSocket {
        let keys = KeyChain::for_identity(routable_prefix);
        let session = self
            .world
            .lock()
            .join(self.node, sync_prefix, routable_prefix, keys.public_key());
        debug!(
            "node {} joined {} as {} (key {})",
            self.node,
            sync_prefix,
            session,
            keys.fingerprint()
        );
        SimSocket {
            node: self.node,
            session,
            keys,
            world: self.world.clone(),
        }
    }
}

/// A node's membership in the simulated group
pub struct SimSocket {
    node: NodeIndex,
    session: SessionId,
    keys: KeyChain,
    world: Arc<Mutex<World>>,
}

impl SyncSocket for SimSocket {
    fn session(&self) -> &SessionId {
        &self.session
    }

    fn publish(&mut self, content: Vec<u8>, freshness: Duration) -> SeqNo {
        self.world
            .lock()
            .publish(self.node, &self.session, &self.keys, content, freshness)
    }

    fn fetch(&mut self, session: &SessionId, seq: SeqNo, retries: u32) {
        self.world.lock().fetch(self.node, session, seq, retries);
    }

    fn leave(&mut self) {
        self.world.lock().members.remove(&self.node);
        debug!("node {} left ({})", self.node, self.session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(loss_rate: f64) -> SimNetwork {
        SimNetwork::new(NetworkConfig {
            loss_rate,
            ..NetworkConfig::default()
        })
        .unwrap()
    }

    fn drain(net: &SimNetwork) -> Vec<(Duration, NodeIndex, NodeAction)> {
        std::iter::from_fn(|| net.next_event(Duration::MAX)).collect()
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(
            SimNetwork::new(NetworkConfig {
                loss_rate: 1.5,
                ..NetworkConfig::default()
            })
            .err(),
            Some(NetworkError::InvalidLossRate(1.5))
        );
        assert_eq!(
            SimNetwork::new(NetworkConfig {
                hops: 0,
                ..NetworkConfig::default()
            })
            .err(),
            Some(NetworkError::ZeroHops)
        );
    }

    #[test]
    fn test_timers_fire_in_order_and_cancel() {
        let net = network(0.0);
        let mut a = net.timers(0);
        let mut b = net.timers(1);

        let t1 = a.schedule_after(Duration::from_millis(30));
        let t2 = b.schedule_after(Duration::from_millis(10));
        let t3 = a.schedule_after(Duration::from_millis(10));
        a.cancel(t1);
        a.cancel(t1);

        let events = drain(&net);
        assert_eq!(
            events,
            vec![
                (
                    Duration::from_millis(10),
                    1,
                    NodeAction::Input(NodeInput::Tick(t2))
                ),
                (
                    Duration::from_millis(10),
                    0,
                    NodeAction::Input(NodeInput::Tick(t3))
                ),
            ]
        );
        assert_eq!(a.now(), Duration::from_millis(10));
    }

    #[test]
    fn test_publish_announces_to_group() {
        let net = network(0.0);
        let sync = Name::parse("/sync");
        let mut a = net.service(0).join(&sync, &Name::parse("/nodeA"));
        let _b = net.service(1).join(&sync, &Name::parse("/nodeB"));
        let _other = net.service(2).join(&Name::parse("/elsewhere"), &Name::parse("/nodeC"));

        assert_eq!(a.session().as_str(), "/nodeA/0");
        assert_eq!(a.publish(b"/nodeA:1".to_vec(), Duration::from_secs(4)), 1);

        let events = drain(&net);
        assert_eq!(
            events,
            vec![
                (
                    Duration::ZERO,
                    0,
                    NodeAction::Input(NodeInput::SyncUpdate(vec![]))
                ),
                (
                    Duration::from_millis(20),
                    1,
                    NodeAction::Input(NodeInput::SyncUpdate(vec![MissingRange::single(
                        a.session().clone(),
                        1
                    )]))
                ),
            ]
        );
    }

    #[test]
    fn test_lost_announcement_widens_next_range() {
        let net = network(0.0);
        let sync = Name::parse("/sync");
        let mut a = net.service(0).join(&sync, &Name::parse("/nodeA"));
        let _b = net.service(1).join(&sync, &Name::parse("/nodeB"));

        // Announcements for 1 and 2 go missing: only 3 is delivered
        a.publish(b"/nodeA:1".to_vec(), Duration::from_secs(4));
        a.publish(b"/nodeA:2".to_vec(), Duration::from_secs(4));
        {
            let mut world = net.world.lock();
            let mut kept = EventQueue::new();
            while let Some((key, event)) = world.queue.pop() {
                if !matches!(event, SimEvent::Announce { .. }) {
                    kept.push(key.time, event);
                }
            }
            world.queue = kept;
        }
        a.publish(b"/nodeA:3".to_vec(), Duration::from_secs(4));

        let updates: Vec<NodeInput> = drain(&net)
            .into_iter()
            .filter_map(|(_, node, action)| match (node, action) {
                (1, NodeAction::Input(input)) => Some(input),
                _ => None,
            })
            .collect();
        assert_eq!(
            updates,
            vec![NodeInput::SyncUpdate(vec![MissingRange::new(
                a.session().clone(),
                1,
                3
            )
            .unwrap()])]
        );
    }

    #[test]
    fn test_fetch_round_trip() {
        let net = network(0.0);
        let sync = Name::parse("/sync");
        let mut a = net.service(0).join(&sync, &Name::parse("/nodeA"));
        let mut b = net.service(1).join(&sync, &Name::parse("/nodeB"));
        a.publish(b"/nodeA:1".to_vec(), Duration::from_secs(4));
        drain(&net);

        b.fetch(a.session(), 1, 2);
        let events = drain(&net);
        assert_eq!(
            events,
            vec![(
                Duration::from_millis(60),
                1,
                NodeAction::Input(NodeInput::FetchComplete(FetchedData {
                    session: a.session().clone(),
                    seq: 1,
                    content: b"/nodeA:1".to_vec(),
                }))
            )]
        );
        assert_eq!(net.stats().fetches_delivered, 1);
    }

    #[test]
    fn test_fetch_exhaustion_is_silent() {
        let net = network(1.0);
        let sync = Name::parse("/sync");
        let mut a = net.service(0).join(&sync, &Name::parse("/nodeA"));
        let mut b = net.service(1).join(&sync, &Name::parse("/nodeB"));
        a.publish(b"/nodeA:1".to_vec(), Duration::from_secs(4));
        drain(&net);

        b.fetch(a.session(), 1, 2);
        b.fetch(&SessionId::new("/nobody/0"), 1, 2);
        assert!(drain(&net).is_empty());

        let stats = net.stats();
        assert_eq!(stats.fetch_attempts_lost, 3);
        assert_eq!(stats.fetches_failed, 2);
        assert_eq!(stats.announcements_lost, 1);
    }

    #[test]
    fn test_tampered_content_not_delivered() {
        let net = network(0.0);
        let sync = Name::parse("/sync");
        let mut a = net.service(0).join(&sync, &Name::parse("/nodeA"));
        let mut b = net.service(1).join(&sync, &Name::parse("/nodeB"));
        a.publish(b"/nodeA:1".to_vec(), Duration::from_secs(4));
        drain(&net);

        net.world
            .lock()
            .store
            .get_mut(&(a.session().clone(), 1))
            .unwrap()
            .packet
            .content = b"forged".to_vec();

        b.fetch(a.session(), 1, 2);
        assert!(drain(&net).is_empty());
        assert_eq!(net.stats().fetches_failed, 1);
    }

    #[test]
    fn test_left_member_gets_no_announcements() {
        let net = network(0.0);
        let sync = Name::parse("/sync");
        let mut a = net.service(0).join(&sync, &Name::parse("/nodeA"));
        let mut b = net.service(1).join(&sync, &Name::parse("/nodeB"));
        a.publish(b"/nodeA:1".to_vec(), Duration::from_secs(4));
        b.leave();
        assert_eq!(net.member_count(), 1);

        let to_b = drain(&net)
            .into_iter()
            .filter(|(_, node, _)| *node == 1)
            .count();
        assert_eq!(to_b, 0);
    }
}
