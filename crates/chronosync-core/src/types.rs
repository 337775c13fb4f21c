//! Core types shared by the node driver and the sync service
//!
//! Names and session identifiers are opaque to the node driver: it builds
//! names by concatenation and hands session ids back to the sync service
//! untouched.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

/// Per-session sequence number
pub type SeqNo = u64;

// =============================================================================
// NAMES
// =============================================================================

/// Hierarchical name (`/ndn/broadcast/sync`, `/Node1`, ...)
///
/// The root name has no components and renders as `/`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Name {
    components: Vec<String>,
}

impl Name {
    /// The root name `/`
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a name, ignoring empty components (`//a/` == `/a`)
    pub fn parse(uri: &str) -> Self {
        Self {
            components: uri
                .split('/')
                .filter(|c| !c.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    /// Append every component of another name
    pub fn append(&mut self, other: &Name) -> &mut Self {
        self.components.extend(other.components.iter().cloned());
        self
    }

    /// Concatenate two names into a new one
    pub fn join(&self, other: &Name) -> Name {
        let mut joined = self.clone();
        joined.append(other);
        joined
    }

    /// Components in order
    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// True if every component of `prefix` leads this name
    pub fn starts_with(&self, prefix: &Name) -> bool {
        self.components.starts_with(&prefix.components)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl FromStr for Name {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.to_string()
    }
}

// =============================================================================
// SESSIONS
// =============================================================================

/// Opaque session token assigned by the sync service
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// MISSING DATA
// =============================================================================

/// Closed range of sequence numbers from one session not yet fetched locally
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MissingRange {
    pub session: SessionId,
    pub low: SeqNo,
    pub high: SeqNo,
}

impl MissingRange {
    pub fn new(session: SessionId, low: SeqNo, high: SeqNo) -> Result<Self> {
        if low > high {
            return Err(Error::InvalidRange { low, high });
        }
        Ok(Self { session, low, high })
    }

    /// Range covering a single sequence number
    pub fn single(session: SessionId, seq: SeqNo) -> Self {
        Self {
            session,
            low: seq,
            high: seq,
        }
    }

    pub fn seqs(&self) -> RangeInclusive<SeqNo> {
        self.low..=self.high
    }
}

/// Content returned by the sync service for one fetch request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedData {
    pub session: SessionId,
    pub seq: SeqNo,
    pub content: Vec<u8>,
}

// =============================================================================
// DATA EVENTS
// =============================================================================

/// Notification emitted for every local publish and every remote fetch completion
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEvent {
    /// Payload text
    pub content: String,
    /// True for the node's own publication, false for content fetched from a peer
    pub is_local: bool,
    /// Timeline position when the event was emitted
    pub at: Duration,
}

impl DataEvent {
    pub fn local(content: impl Into<String>, at: Duration) -> Self {
        Self {
            content: content.into(),
            is_local: true,
            at,
        }
    }

    pub fn remote(content: impl Into<String>, at: Duration) -> Self {
        Self {
            content: content.into(),
            is_local: false,
            at,
        }
    }
}
