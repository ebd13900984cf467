//! Fetch strategy engine
//!
//! Decides, for every intercepted request, whether to answer from the store,
//! the network or a synthesized fallback, and whether to write the result back.
//!
//! The policy, in order:
//!
//! 1. URLs matching a bypass pattern go straight to the network, store untouched.
//! 2. Non-GET requests and cross-origin requests to hosts outside the allow-list
//!    are left to the platform ([`Handled::Passthrough`]).
//! 3. Everything else is stale-while-revalidate: a hit is returned immediately
//!    and refreshed in the background; a miss is fetched, returned, and written
//!    to the dynamic partition if cacheable; a failed fetch degrades to the
//!    cached root document (navigations only) or a synthesized 503.

mod tasks;

pub use tasks::BackgroundTasks;

use std::fmt;
use std::sync::Arc;

use reqwest::{Method, Url};
use tracing::{debug, warn};

use crate::config::{Config, ConfigError};
use crate::network::{Destination, Network, Request, Response};
use crate::store::{CachedEntry, PartitionName, RequestKey, Store};

/// Where a response handed back to the caller came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Live response for a bypassed URL
    Bypass,
    /// Stored entry; a refresh may be running in the background
    Cache,
    /// Fresh network response after a miss
    Network,
    /// Cached root document or synthesized 503
    Fallback,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bypass => "bypass",
            Self::Cache => "cache",
            Self::Network => "network",
            Self::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

/// Outcome of handling one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// The engine answers the request
    Respond { response: Response, source: Source },
    /// The engine does not intervene; the platform's default handling applies
    Passthrough,
}

impl Handled {
    fn respond(response: Response, source: Source) -> Self {
        Self::Respond { response, source }
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Respond { response, .. } => Some(response),
            Self::Passthrough => None,
        }
    }

    pub fn source(&self) -> Option<Source> {
        match self {
            Self::Respond { source, .. } => Some(*source),
            Self::Passthrough => None,
        }
    }
}

/// Stale-while-revalidate request handler over a [`Store`] and a [`Network`]
#[derive(Clone)]
pub struct FetchStrategy {
    store: Arc<dyn Store>,
    network: Arc<dyn Network>,
    origin: Url,
    bypass_patterns: Vec<String>,
    cacheable_hosts: Vec<String>,
    fallback_key: RequestKey,
    static_partition: PartitionName,
    dynamic_partition: PartitionName,
    tasks: BackgroundTasks,
}

impl FetchStrategy {
    /// Builds the engine from the shared configuration
    ///
    /// # Returns
    /// * `Err(ConfigError)` if the origin or fallback path cannot be parsed
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        network: Arc<dyn Network>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            store,
            network,
            origin: config.origin_url()?,
            bypass_patterns: config.bypass_patterns.clone(),
            cacheable_hosts: config.cacheable_hosts.clone(),
            fallback_key: RequestKey::get(&config.fallback_url()?),
            static_partition: PartitionName::static_for(&config.version),
            dynamic_partition: PartitionName::dynamic_for(&config.version),
            tasks: BackgroundTasks::new(),
        })
    }

    /// Handles one intercepted request
    ///
    /// Never fails: store errors are logged and skipped, network errors fall
    /// back to a cached root document or a synthesized 503.
    pub async fn handle(&self, request: &Request) -> Handled {
        if self.is_bypassed(&request.url) {
            debug!(%request, "bypass");
            return match self.network.fetch(request).await {
                Ok(response) => Handled::respond(response, Source::Bypass),
                Err(e) => {
                    warn!(%request, error = %e, "bypassed request failed");
                    Handled::respond(Response::fallback(), Source::Fallback)
                }
            };
        }

        if request.method != Method::GET {
            debug!(%request, "non-GET, not intercepted");
            return Handled::Passthrough;
        }

        if !request.is_same_origin(&self.origin) && !self.is_cacheable_host(&request.url) {
            debug!(%request, "foreign origin, not intercepted");
            return Handled::Passthrough;
        }

        let key = RequestKey::from(request);
        match self.lookup(&key).await {
            Some(entry) => {
                debug!(%key, "cache hit");
                let response = entry.to_response();
                self.refresh_in_background(request.clone(), key);
                Handled::respond(response, Source::Cache)
            }
            None => {
                debug!(%key, "cache miss");
                self.fetch_and_store(request, key).await
            }
        }
    }

    /// Waits for outstanding write-backs and refreshes
    pub async fn settle(&self) {
        self.tasks.settle().await;
    }

    /// Background tasks still running
    pub fn pending_tasks(&self) -> usize {
        self.tasks.pending()
    }

    fn is_bypassed(&self, url: &Url) -> bool {
        let url = url.as_str();
        self.bypass_patterns
            .iter()
            .any(|p| !p.is_empty() && url.contains(p.as_str()))
    }

    fn is_cacheable_host(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| self.cacheable_hosts.iter().any(|h| h.eq_ignore_ascii_case(host)))
            .unwrap_or(false)
    }

    /// Static partition first, then dynamic
    async fn lookup(&self, key: &RequestKey) -> Option<CachedEntry> {
        for partition in [&self.static_partition, &self.dynamic_partition] {
            match self.store.get(partition, key).await {
                Ok(Some(entry)) => return Some(entry),
                Ok(None) => {}
                Err(e) => warn!(%partition, %key, error = %e, "store read failed"),
            }
        }
        None
    }

    async fn fetch_and_store(&self, request: &Request, key: RequestKey) -> Handled {
        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    let store = self.store.clone();
                    let partition = self.dynamic_partition.clone();
                    let entry = CachedEntry::from_response(&response);
                    self.tasks
                        .spawn(async move { write_back(store, partition, key, entry).await });
                } else {
                    debug!(%key, status = response.status, "not caching response");
                }
                Handled::respond(response, Source::Network)
            }
            Err(e) => {
                warn!(%key, error = %e, "network fetch failed, serving fallback");
                self.fallback(request).await
            }
        }
    }

    async fn fallback(&self, request: &Request) -> Handled {
        if request.destination == Destination::Document {
            if let Some(entry) = self.lookup(&self.fallback_key).await {
                return Handled::respond(entry.to_response(), Source::Fallback);
            }
        }
        Handled::respond(Response::fallback(), Source::Fallback)
    }

    /// Fetches `request` again and overwrites the dynamic entry on success.
    /// Failures stay inside the task.
    fn refresh_in_background(&self, request: Request, key: RequestKey) {
        let network = self.network.clone();
        let store = self.store.clone();
        let partition = self.dynamic_partition.clone();

        self.tasks.spawn(async move {
            match network.fetch(&request).await {
                Ok(response) if response.is_cacheable() => {
                    let entry = CachedEntry::from_response(&response);
                    write_back(store, partition, key, entry).await;
                }
                Ok(response) => {
                    debug!(%key, status = response.status, "refresh returned uncacheable response");
                }
                Err(e) => {
                    debug!(%key, error = %e, "background refresh failed");
                }
            }
        });
    }
}

async fn write_back(
    store: Arc<dyn Store>,
    partition: PartitionName,
    key: RequestKey,
    entry: CachedEntry,
) {
    if let Err(e) = store.put(&partition, &key, entry).await {
        warn!(%partition, %key, error = %e, "store write failed");
    }
}
