//! Disk-backed store
//!
//! Each partition is a directory under the store root and each entry is a single
//! file named by the hex SHA-256 of its key. The file is a one-line JSON header
//! followed by the raw body bytes. Writes land in a temp file that is then
//! renamed over the target, so readers see either the old or the new entry,
//! never a mix.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use super::{CachedEntry, PartitionName, RequestKey, Store, StoreError, StoreResult};
use crate::network::ResponseKind;

const ENTRY_EXT: &str = "entry";

/// Metadata written ahead of the body in each entry file
#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    /// Full key, checked on read to rule out hash collisions
    key: RequestKey,
    status: u16,
    headers: Vec<(String, Vec<u8>)>,
    #[serde(default = "basic_kind")]
    kind: ResponseKind,
    cached_at: DateTime<Utc>,
}

fn basic_kind() -> ResponseKind {
    ResponseKind::Basic
}

/// Persists partitions and entries to the filesystem
#[derive(Debug, Clone)]
pub struct DiskStore {
    /// Directory holding one sub-directory per partition
    root: PathBuf,
}

impl DiskStore {
    /// Creates a store rooted at `root`; nothing is created until first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn partition_dir(&self, partition: &PartitionName) -> PathBuf {
        self.root.join(partition.to_string())
    }

    /// Returns the path to the entry file for `key`
    fn entry_path(&self, partition: &PartitionName, key: &RequestKey) -> PathBuf {
        self.partition_dir(partition)
            .join(format!("{}.{}", key_digest(key), ENTRY_EXT))
    }
}

/// Hex SHA-256 of the rendered key
fn key_digest(key: &RequestKey) -> String {
    format!("{:x}", Sha256::digest(key.to_string().as_bytes()))
}

fn encode(key: &RequestKey, entry: &CachedEntry) -> StoreResult<Vec<u8>> {
    let header = EntryHeader {
        key: key.clone(),
        status: entry.status,
        headers: entry.headers.clone(),
        kind: entry.kind,
        cached_at: entry.cached_at,
    };
    // Compact JSON escapes newlines, so the first '\n' always ends the header
    let mut buf = serde_json::to_vec(&header).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    buf.push(b'\n');
    buf.extend_from_slice(&entry.body);
    Ok(buf)
}

fn decode(key: &RequestKey, raw: Vec<u8>) -> StoreResult<Option<CachedEntry>> {
    let corrupt = |reason: String| StoreError::Corrupt {
        key: key.to_string(),
        reason,
    };

    let split = raw
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| corrupt("missing header terminator".to_string()))?;
    let header: EntryHeader =
        serde_json::from_slice(&raw[..split]).map_err(|e| corrupt(e.to_string()))?;

    if &header.key != key {
        return Ok(None);
    }

    let mut raw = Bytes::from(raw);
    let body = raw.split_off(split + 1);

    Ok(Some(CachedEntry {
        status: header.status,
        headers: header.headers,
        body,
        kind: header.kind,
        cached_at: header.cached_at,
    }))
}

#[async_trait]
impl Store for DiskStore {
    async fn open(&self, partition: &PartitionName) -> StoreResult<()> {
        fs::create_dir_all(self.partition_dir(partition)).await?;
        Ok(())
    }

    async fn get(
        &self,
        partition: &PartitionName,
        key: &RequestKey,
    ) -> StoreResult<Option<CachedEntry>> {
        let raw = match fs::read(self.entry_path(partition, key)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };
        decode(key, raw)
    }

    async fn put(
        &self,
        partition: &PartitionName,
        key: &RequestKey,
        entry: CachedEntry,
    ) -> StoreResult<()> {
        self.open(partition).await?;

        let path = self.entry_path(partition, key);
        let tmp = path.with_extension(format!("{}.tmp-{}", ENTRY_EXT, ulid::Ulid::new()));

        let written = match fs::write(&tmp, encode(key, &entry)?).await {
            Ok(()) => fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::Io(e));
        }

        debug!(%partition, %key, "stored entry");
        Ok(())
    }

    async fn list_partitions(&self) -> StoreResult<Vec<String>> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut names = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            if item.file_type().await?.is_dir() {
                names.push(item.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> StoreResult<bool> {
        // Refuse anything that could escape the store root
        let escapes = name.contains(|c: char| c == '/' || c == '\\');
        if name.is_empty() || escapes || name == "." || name == ".." {
            return Err(StoreError::InvalidPartition(name.to_string()));
        }
        match fs::remove_dir_all(self.root.join(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Response;
    use reqwest::Url;
    use tempfile::TempDir;

    fn create_test_store() -> (DiskStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = DiskStore::new(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    fn key(path: &str) -> RequestKey {
        RequestKey::get(&Url::parse(&format!("https://app.example{}", path)).unwrap())
    }

    fn entry(body: &'static str) -> CachedEntry {
        CachedEntry::from_response(
            &Response::new(200, body).with_header("content-type", "text/html"),
        )
    }

    #[tokio::test]
    async fn test_put_creates_file_in_partition_directory() {
        let (store, temp_dir) = create_test_store();
        let partition = PartitionName::dynamic_for("v1");

        store.put(&partition, &key("/"), entry("<html>")).await.expect("Put should succeed");

        let dir = temp_dir.path().join("dynamic-v1");
        assert!(dir.is_dir(), "Partition directory should exist");
        let files: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(files.len(), 1, "Exactly one entry file, no leftover temp file");
    }

    #[tokio::test]
    async fn test_get_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();
        let result = store
            .get(&PartitionName::static_for("v1"), &key("/nope"))
            .await
            .expect("Get should not fail");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_entry_survives_write_and_read() {
        let (store, _temp_dir) = create_test_store();
        let partition = PartitionName::static_for("v1");
        let original = CachedEntry::from_response(
            &Response::new(200, vec![0u8, 10, 255, 10, 13])
                .with_header("content-type", "application/octet-stream"),
        );

        store.put(&partition, &key("/bin"), original.clone()).await.unwrap();
        let read = store.get(&partition, &key("/bin")).await.unwrap().expect("Should read entry");

        assert_eq!(read, original, "Body with embedded newlines must survive");
    }

    #[tokio::test]
    async fn test_overwrite_existing_entry() {
        let (store, _temp_dir) = create_test_store();
        let partition = PartitionName::dynamic_for("v1");

        store.put(&partition, &key("/a"), entry("first")).await.unwrap();
        store.put(&partition, &key("/a"), entry("second")).await.unwrap();

        let read = store.get(&partition, &key("/a")).await.unwrap().unwrap();
        assert_eq!(&read.body[..], b"second", "Store should contain latest entry");
    }

    #[tokio::test]
    async fn test_header_for_other_key_is_a_miss() {
        let (store, _temp_dir) = create_test_store();
        let partition = PartitionName::dynamic_for("v1");
        store.put(&partition, &key("/real"), entry("x")).await.unwrap();

        // Simulate a hash collision by copying the file under another key's name
        let from = store.entry_path(&partition, &key("/real"));
        let to = store.entry_path(&partition, &key("/other"));
        std::fs::copy(from, to).unwrap();

        let result = store.get(&partition, &key("/other")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_garbage_file_is_reported_corrupt() {
        let (store, _temp_dir) = create_test_store();
        let partition = PartitionName::dynamic_for("v1");
        store.open(&partition).await.unwrap();
        std::fs::write(store.entry_path(&partition, &key("/junk")), b"not a header").unwrap();

        let result = store.get(&partition, &key("/junk")).await;
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_list_partitions_on_fresh_root_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::new(temp_dir.path().join("not").join("created"));
        assert!(store.list_partitions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_and_delete_partitions() {
        let (store, temp_dir) = create_test_store();
        store.open(&PartitionName::static_for("v1")).await.unwrap();
        store.open(&PartitionName::dynamic_for("v2")).await.unwrap();
        std::fs::write(temp_dir.path().join("stray-file"), b"").unwrap();

        assert_eq!(
            store.list_partitions().await.unwrap(),
            vec!["dynamic-v2".to_string(), "static-v1".to_string()]
        );

        assert!(store.delete("static-v1").await.unwrap());
        assert!(!store.delete("static-v1").await.unwrap());
        assert_eq!(store.list_partitions().await.unwrap(), vec!["dynamic-v2".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_rejects_paths_outside_root() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.delete("../etc").await.is_err());
        assert!(store.delete("..").await.is_err());
    }

    #[test]
    fn test_key_digest_is_hex_sha256() {
        let digest = key_digest(&key("/"));
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, key_digest(&key("/")));
        assert_ne!(key_digest(&key("/a")), key_digest(&key("/b")));
    }

    #[tokio::test]
    async fn test_put_names_file_after_key_digest() {
        let (store, temp_dir) = create_test_store();
        let partition = PartitionName::static_for("v1");
        store.put(&partition, &key("/app.js"), entry("js")).await.unwrap();

        let expected = temp_dir
            .path()
            .join("static-v1")
            .join(format!("{}.entry", key_digest(&key("/app.js"))));
        assert!(expected.is_file());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_temp_file() {
        let (store, temp_dir) = create_test_store();
        let partition = PartitionName::dynamic_for("v1");
        store.open(&partition).await.unwrap();

        // A directory where the entry file belongs makes the rename fail
        let blocked = store.entry_path(&partition, &key("/blocked"));
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("occupant"), b"x").unwrap();

        let result = store.put(&partition, &key("/blocked"), entry("x")).await;
        assert!(result.is_err());

        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path().join("dynamic-v1"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty(), "Temp files left behind: {:?}", leftovers);
    }

    #[tokio::test]
    async fn test_cors_kind_and_binary_headers_survive_disk() {
        let (store, _temp_dir) = create_test_store();
        let partition = PartitionName::dynamic_for("v1");
        let original = CachedEntry::from_response(
            &Response::new(200, "font")
                .with_header("x-name", b"caf\xE9".to_vec())
                .with_kind(ResponseKind::Cors),
        );

        store.put(&partition, &key("/font"), original.clone()).await.unwrap();
        let read = store.get(&partition, &key("/font")).await.unwrap().unwrap();

        assert_eq!(read, original);
    }
}
