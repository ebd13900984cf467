//! Test doubles shared by the unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::config::Config;
use crate::network::{Network, NetworkError, Request, Response};
use crate::store::{
    CachedEntry, MemoryStore, PartitionName, RequestKey, Store, StoreError, StoreResult,
};

pub const ORIGIN: &str = "https://app.example";

pub fn url(path_or_url: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path_or_url).unwrap()
}

/// Default config pointed at [`ORIGIN`]
pub fn test_config() -> Config {
    Config {
        origin: ORIGIN.to_string(),
        ..Default::default()
    }
}

/// Network with canned per-URL responses; unknown URLs answer 404
#[derive(Default)]
pub struct FakeNetwork {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<String>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &Url, response: Response) {
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls_to(&self, url: &Url) -> usize {
        let target = url.to_string();
        self.calls.lock().unwrap().iter().filter(|u| **u == target).count()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        self.calls.lock().unwrap().push(request.url.to_string());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::RequestFailed {
                url: request.url.to_string(),
                reason: "offline".to_string(),
            });
        }

        let routed = self.routes.lock().unwrap().get(request.url.as_str()).cloned();
        Ok(routed.unwrap_or_else(|| Response::new(404, "not found")))
    }
}

/// Memory store that counts every read and write
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
}

impl CountingStore {
    pub fn touches(&self) -> usize {
        self.gets.load(Ordering::SeqCst) + self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for CountingStore {
    async fn open(&self, partition: &PartitionName) -> StoreResult<()> {
        self.inner.open(partition).await
    }

    async fn get(
        &self,
        partition: &PartitionName,
        key: &RequestKey,
    ) -> StoreResult<Option<CachedEntry>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(partition, key).await
    }

    async fn put(
        &self,
        partition: &PartitionName,
        key: &RequestKey,
        entry: CachedEntry,
    ) -> StoreResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(partition, key, entry).await
    }

    async fn list_partitions(&self) -> StoreResult<Vec<String>> {
        self.inner.list_partitions().await
    }

    async fn delete(&self, name: &str) -> StoreResult<bool> {
        self.inner.delete(name).await
    }
}

/// Store whose every operation fails
pub struct BrokenStore;

fn broken() -> StoreError {
    StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"))
}

#[async_trait]
impl Store for BrokenStore {
    async fn open(&self, _partition: &PartitionName) -> StoreResult<()> {
        Err(broken())
    }

    async fn get(
        &self,
        _partition: &PartitionName,
        _key: &RequestKey,
    ) -> StoreResult<Option<CachedEntry>> {
        Err(broken())
    }

    async fn put(
        &self,
        _partition: &PartitionName,
        _key: &RequestKey,
        _entry: CachedEntry,
    ) -> StoreResult<()> {
        Err(broken())
    }

    async fn list_partitions(&self) -> StoreResult<Vec<String>> {
        Err(broken())
    }

    async fn delete(&self, _name: &str) -> StoreResult<bool> {
        Err(broken())
    }
}
