//! Install / activate lifecycle
//!
//! Installing precaches the static asset set into `static-<version>`. Activating
//! removes every partition that does not belong to the running version. Bumping
//! the version token is therefore the only way static assets get invalidated.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError};
use crate::network::{Network, Request};
use crate::store::{CachedEntry, PartitionName, RequestKey, Store, StoreError};

/// Errors raised by lifecycle transitions
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A static asset could not be fetched or was not cacheable
    #[error("failed to precache {url}: {reason}")]
    Precache { url: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The requested transition is not allowed from the current state
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        state: WorkerState,
        action: &'static str,
    },
}

/// Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Where the worker is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Nothing installed for this version yet
    Parsed,
    Installing,
    /// Installed and waiting for activation
    Installed,
    Activating,
    Activated,
    /// Install failed or the worker was torn down
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed (waiting)",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

/// Control messages sent to the worker by the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Activate a waiting update without waiting for old clients to go away
    SkipWaiting,
}

impl FromStr for ControlMessage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SKIP_WAITING" | "skip-waiting" | "skipWaiting" => Ok(Self::SkipWaiting),
            other => Err(format!("unknown control message '{}'", other)),
        }
    }
}

/// Drives install, activation and teardown for one version
pub struct Lifecycle {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    network: Arc<dyn Network>,
    state: WorkerState,
}

impl Lifecycle {
    /// A fresh worker that has not been installed yet
    pub fn new(config: Arc<Config>, store: Arc<dyn Store>, network: Arc<dyn Network>) -> Self {
        Self {
            config,
            store,
            network,
            state: WorkerState::Parsed,
        }
    }

    /// Reconstructs the state left behind by a previous process
    ///
    /// The live static partition present means installed; with no stale
    /// partitions left over it is also activated.
    pub async fn resume(
        config: Arc<Config>,
        store: Arc<dyn Store>,
        network: Arc<dyn Network>,
    ) -> Result<Self> {
        let names = store.list_partitions().await?;
        let [live_static, live_dynamic] = PartitionName::live(&config.version)
            .map(|p| p.to_string());

        let state = if !names.contains(&live_static) {
            WorkerState::Parsed
        } else if names.iter().any(|n| *n != live_static && *n != live_dynamic) {
            WorkerState::Installed
        } else {
            WorkerState::Activated
        };
        debug!(version = %config.version, %state, "resumed lifecycle");

        let mut lifecycle = Self::new(config, store, network);
        lifecycle.state = state;
        Ok(lifecycle)
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Precaches the static assets
    ///
    /// All assets are fetched before anything is written; one failure fails the
    /// whole install and the worker becomes redundant.
    pub async fn install(&mut self) -> Result<usize> {
        if !matches!(self.state, WorkerState::Parsed | WorkerState::Installed) {
            return Err(self.invalid("install"));
        }
        self.state = WorkerState::Installing;

        match self.precache().await {
            Ok(count) => {
                self.state = WorkerState::Installed;
                info!(version = %self.config.version, assets = count, "installed");
                Ok(count)
            }
            Err(e) => {
                self.state = WorkerState::Redundant;
                warn!(version = %self.config.version, error = %e, "install failed");
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize> {
        let mut requests = Vec::with_capacity(self.config.static_assets.len());
        for asset in &self.config.static_assets {
            requests.push(Request::get(self.config.resolve(asset)?));
        }

        let fetches = requests.iter().map(|r| self.network.fetch(r));
        let results = join_all(fetches).await;

        let mut entries = Vec::with_capacity(results.len());
        for (request, result) in requests.iter().zip(results) {
            let response = result.map_err(|e| LifecycleError::Precache {
                url: request.url.to_string(),
                reason: e.to_string(),
            })?;
            if !response.is_cacheable() {
                return Err(LifecycleError::Precache {
                    url: request.url.to_string(),
                    reason: format!("status {}", response.status),
                });
            }
            entries.push((RequestKey::from(request), CachedEntry::from_response(&response)));
        }

        let [static_partition, dynamic_partition] = PartitionName::live(&self.config.version);
        self.store.open(&static_partition).await?;
        self.store.open(&dynamic_partition).await?;

        let count = entries.len();
        for (key, entry) in entries {
            self.store.put(&static_partition, &key, entry).await?;
        }
        Ok(count)
    }

    /// Activates an installed worker and deletes stale partitions
    ///
    /// # Returns
    /// * `Ok(Vec<String>)` - names of the partitions that were removed
    pub async fn activate(&mut self) -> Result<Vec<String>> {
        if !matches!(self.state, WorkerState::Installed | WorkerState::Activated) {
            return Err(self.invalid("activate"));
        }
        self.state = WorkerState::Activating;

        let removed = match self.collect_garbage().await {
            Ok(removed) => removed,
            Err(e) => {
                // Still installed; activation can be retried
                self.state = WorkerState::Installed;
                return Err(e);
            }
        };

        self.state = WorkerState::Activated;
        info!(version = %self.config.version, removed = removed.len(), "activated");
        Ok(removed)
    }

    async fn collect_garbage(&self) -> Result<Vec<String>> {
        let live: Vec<String> = PartitionName::live(&self.config.version)
            .iter()
            .map(ToString::to_string)
            .collect();

        let mut removed = Vec::new();
        for name in self.store.list_partitions().await? {
            if live.contains(&name) {
                continue;
            }
            if self.store.delete(&name).await? {
                debug!(partition = %name, "deleted stale partition");
                removed.push(name);
            }
        }
        Ok(removed)
    }

    /// Handles a control message from a client
    pub async fn handle_message(&mut self, message: ControlMessage) -> Result<()> {
        match message {
            ControlMessage::SkipWaiting => match self.state {
                WorkerState::Installed => {
                    info!("skip waiting requested");
                    self.activate().await.map(|_| ())
                }
                WorkerState::Activated => Ok(()),
                _ => Err(self.invalid("skip waiting")),
            },
        }
    }

    /// Deletes both live partitions; the worker becomes redundant
    pub async fn teardown(&mut self) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for partition in PartitionName::live(&self.config.version) {
            let name = partition.to_string();
            if self.store.delete(&name).await? {
                removed.push(name);
            }
        }
        self.state = WorkerState::Redundant;
        info!(version = %self.config.version, "torn down");
        Ok(removed)
    }

    fn invalid(&self, action: &'static str) -> LifecycleError {
        LifecycleError::InvalidTransition {
            state: self.state,
            action,
        }
    }
}
