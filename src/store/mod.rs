//! Versioned, partitioned response store
//!
//! The store is a durable map from [`RequestKey`] to [`CachedEntry`], split into
//! named partitions. Exactly two partitions are live at a time, the static and
//! the dynamic one, both tagged with the running version. Anything else found
//! in the store is stale and gets removed on activation.
//!
//! Two backends are provided: [`MemoryStore`] for tests and throwaway runs, and
//! [`DiskStore`] which persists entries under a cache directory.

mod disk;
mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::{Request, Response, ResponseKind};

/// Errors that can occur in a store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying filesystem failure
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An entry exists but cannot be decoded
    #[error("corrupt entry for {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// A partition name does not have the `<kind>-<version>` shape
    #[error("invalid partition name: {0}")]
    InvalidPartition(String),
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The two partition roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionKind {
    /// Fixed asset set written at install time
    Static,
    /// Responses captured opportunistically while serving requests
    Dynamic,
}

impl PartitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
        }
    }
}

/// A partition identity: its role plus the version it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionName {
    pub kind: PartitionKind,
    pub version: String,
}

impl PartitionName {
    pub fn new(kind: PartitionKind, version: impl Into<String>) -> Self {
        Self {
            kind,
            version: version.into(),
        }
    }

    pub fn static_for(version: &str) -> Self {
        Self::new(PartitionKind::Static, version)
    }

    pub fn dynamic_for(version: &str) -> Self {
        Self::new(PartitionKind::Dynamic, version)
    }

    /// The two partitions that are live for `version`
    pub fn live(version: &str) -> [Self; 2] {
        [Self::static_for(version), Self::dynamic_for(version)]
    }

    pub fn is_current(&self, version: &str) -> bool {
        self.version == version
    }
}

impl fmt::Display for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind.as_str(), self.version)
    }
}

impl FromStr for PartitionName {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StoreError::InvalidPartition(s.to_string());
        let (kind, version) = s.split_once('-').ok_or_else(invalid)?;
        let kind = match kind {
            "static" => PartitionKind::Static,
            "dynamic" => PartitionKind::Dynamic,
            _ => return Err(invalid()),
        };
        if version.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(kind, version))
    }
}

/// Identity of a cached entry: method plus absolute URL, headers ignored
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_ascii_uppercase(),
            url: url.to_string(),
        }
    }

    pub fn get(url: &Url) -> Self {
        Self::new(&Method::GET, url)
    }
}

impl From<&Request> for RequestKey {
    fn from(request: &Request) -> Self {
        Self::new(&request.method, &request.url)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Immutable snapshot of a response taken at write time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub status: u16,
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Bytes,
    /// Basic for same-origin captures, Cors for allow-listed hosts
    pub kind: ResponseKind,
    /// When the snapshot was taken
    pub cached_at: DateTime<Utc>,
}

impl CachedEntry {
    /// Snapshots `response` now
    pub fn from_response(response: &Response) -> Self {
        Self {
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            kind: response.kind,
            cached_at: Utc::now(),
        }
    }

    /// Rebuilds a response to hand back to the caller
    pub fn to_response(&self) -> Response {
        Response {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            kind: self.kind,
        }
    }
}

/// Storage interface for partitioned response caching
///
/// Single-key `get`/`put` are atomic; there are no multi-key transactions.
#[async_trait]
pub trait Store: Send + Sync {
    /// Creates the partition if it does not exist yet
    async fn open(&self, partition: &PartitionName) -> StoreResult<()>;

    /// Looks up `key`. A missing partition is a miss, not an error.
    async fn get(
        &self,
        partition: &PartitionName,
        key: &RequestKey,
    ) -> StoreResult<Option<CachedEntry>>;

    /// Writes `entry` under `key`, replacing any previous entry
    async fn put(
        &self,
        partition: &PartitionName,
        key: &RequestKey,
        entry: CachedEntry,
    ) -> StoreResult<()>;

    /// Raw names of every partition present, including stale and foreign ones
    async fn list_partitions(&self) -> StoreResult<Vec<String>>;

    /// Removes a partition and all of its entries.
    ///
    /// Returns `false` if there was nothing to delete.
    async fn delete(&self, name: &str) -> StoreResult<bool>;
}
