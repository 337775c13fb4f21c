//! Node lifecycle: init, run, shutdown, and the input mailbox

use crate::config::{ConfigError, NodeConfig};
use crate::delay::DelayGenerator;
use crate::dispatcher::{DispatchStats, SyncDispatcher};
use crate::publisher::{Publisher, PublisherError};
use chronosync_core::*;
use std::fmt;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Node errors
#[derive(Debug, Error, PartialEq)]
pub enum NodeError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Publisher error: {0}")]
    Publisher(#[from] PublisherError),
    #[error("Node not initialized")]
    NotInitialized,
    #[error("Node already initialized")]
    AlreadyInitialized,
    #[error("Cannot {operation} in state {state}")]
    InvalidState {
        operation: &'static str,
        state: NodeState,
    },
}

/// Node lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Uninitialized,
    Initialized,
    Running,
    /// Terminal
    Stopped,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Uninitialized => "uninitialized",
            NodeState::Initialized => "initialized",
            NodeState::Running => "running",
            NodeState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// One ChronoSync participant
///
/// All interaction after construction goes through [`SyncNode::handle`],
/// which drops every input unless the node is running.
pub struct SyncNode<S: SyncService, T: TimerScheduler> {
    config: NodeConfig,
    state: NodeState,
    service: S,
    timers: T,
    /// Joined session (present between init and shutdown)
    socket: Option<S::Socket>,
    routable_prefix: Name,
    publisher: Publisher,
    dispatcher: SyncDispatcher,
    events: EventChannel,
}

impl<S: SyncService, T: TimerScheduler> SyncNode<S, T> {
    /// Create a node; nothing is scheduled or joined until [`init`](Self::init)
    pub fn new(config: NodeConfig, service: S, timers: T) -> Result<Self, NodeError> {
        config.validate()?;
        let delays = DelayGenerator::new(&config.publish_delay, config.seed)?;
        let publisher = Publisher::new(config.user_prefix.clone(), delays);
        let routable_prefix = config.routable_prefix();

        Ok(Self {
            config,
            state: NodeState::Uninitialized,
            service,
            timers,
            socket: None,
            routable_prefix,
            publisher,
            dispatcher: SyncDispatcher::new(),
            events: EventChannel::default(),
        })
    }

    /// Join the sync group under the routable prefix
    pub fn init(&mut self) -> Result<(), NodeError> {
        match self.state {
            NodeState::Uninitialized => {}
            NodeState::Initialized | NodeState::Running => {
                return Err(NodeError::AlreadyInitialized)
            }
            NodeState::Stopped => {
                return Err(NodeError::InvalidState {
                    operation: "init",
                    state: self.state,
                })
            }
        }

        let socket = self
            .service
            .join(&self.config.sync_prefix, &self.routable_prefix);
        info!(
            "{} joined {} (session {})",
            self.routable_prefix,
            self.config.sync_prefix,
            socket.session()
        );
        self.socket = Some(socket);
        self.state = NodeState::Initialized;
        Ok(())
    }

    /// Start publishing
    pub fn run(&mut self) -> Result<(), NodeError> {
        match self.state {
            NodeState::Initialized => {}
            NodeState::Uninitialized => return Err(NodeError::NotInitialized),
            NodeState::Running | NodeState::Stopped => {
                return Err(NodeError::InvalidState {
                    operation: "run",
                    state: self.state,
                })
            }
        }

        self.publisher.start(&mut self.timers)?;
        self.state = NodeState::Running;
        debug!("{} running", self.config.user_prefix);
        Ok(())
    }

    /// Leave the group and stop publishing; idempotent
    pub fn shutdown(&mut self) {
        if self.state == NodeState::Stopped {
            return;
        }

        self.publisher.stop(&mut self.timers);
        if let Some(mut socket) = self.socket.take() {
            socket.leave();
        }
        if self.state != NodeState::Uninitialized {
            info!(
                "{} stopped after {} publications",
                self.config.user_prefix,
                self.publisher.published_count()
            );
        }
        self.state = NodeState::Stopped;
    }

    /// Mailbox entry point for timer, sync update, and fetch inputs
    pub fn handle(&mut self, input: NodeInput) {
        if self.state != NodeState::Running {
            trace!(
                "{}: dropping {:?} while {}",
                self.config.user_prefix,
                input,
                self.state
            );
            return;
        }
        let Some(socket) = self.socket.as_mut() else {
            return;
        };

        match input {
            NodeInput::Tick(token) => {
                self.publisher
                    .on_tick(token, socket, &mut self.timers, &self.events);
            }
            NodeInput::SyncUpdate(ranges) => {
                self.dispatcher.on_sync_update(&ranges, socket);
            }
            NodeInput::FetchComplete(data) => {
                let now = self.timers.now();
                self.dispatcher.on_fetch_complete(data, now, &self.events);
            }
        }
    }

    /// Subscribe to publish/receive events
    pub fn subscribe(&self) -> broadcast::Receiver<DataEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn routable_prefix(&self) -> &Name {
        &self.routable_prefix
    }

    /// Session assigned at init; `None` before init and after shutdown
    pub fn session(&self) -> Option<&SessionId> {
        self.socket.as_ref().map(|s| s.session())
    }

    pub fn published_count(&self) -> u64 {
        self.publisher.published_count()
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }
}

impl<S: SyncService, T: TimerScheduler> Drop for SyncNode<S, T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
