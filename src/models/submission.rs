//! Submission records and their identifiers.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Content-addressed identifier for a subgraph deployment (IPFS CID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(String);

impl DeploymentId {
    /// Creates a new deployment ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeploymentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeploymentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// On-chain address of a network indexer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexerId(String);

impl IndexerId {
    /// Creates a new indexer ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for IndexerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IndexerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A Proof-of-Indexing hash: 32 bytes, `0x`-prefixed lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoiHash(String);

impl PoiHash {
    /// Parses and normalizes a POI hash.
    ///
    /// Accepts an optional `0x` prefix and mixed case; the stored form is
    /// always `0x` + 64 lowercase hex digits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedSubmission`] if the input is not a valid
    /// 32-byte hex string.
    pub fn parse(raw: &str) -> Result<Self> {
        let digits = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes = hex::decode(digits).map_err(|e| Error::MalformedSubmission {
            reason: format!("POI hash is not valid hex: {e}"),
        })?;
        if bytes.len() != 32 {
            return Err(Error::MalformedSubmission {
                reason: format!("POI hash is {} bytes, expected 32", bytes.len()),
            });
        }
        Ok(Self(format!("0x{}", hex::encode(bytes))))
    }

    /// Returns the normalized hash as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PoiHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single POI submission observed on the feed.
///
/// Immutable once observed; produced by the feed, never mutated by this
/// system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// The deployment the POI was computed for.
    pub deployment: DeploymentId,
    /// The block height the POI was computed at.
    pub block_number: u64,
    /// The submitted POI hash.
    pub poi: PoiHash,
    /// The indexer that submitted it.
    pub indexer: IndexerId,
    /// When the submission was first observed.
    pub observed_at: DateTime<Utc>,
}
