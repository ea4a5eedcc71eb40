//! Persistence mirror: publishes applied resources to a key-value store.
//!
//! The mirror is advisory. A separate resync pass reads it back after a
//! restart; the engine itself never reads from it, and a failed publish
//! never fails the attach or detach that triggered it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::{NetworkError, NetworkResult};
use crate::topology::{AttachmentTopology, DetachmentTopology};

/// Key prefix of every mirrored record.
pub const KEY_PREFIX: &str = "podwire";

/// Key of a host-side link record.
#[must_use]
pub fn link_key(name: &str) -> String {
    format!("{KEY_PREFIX}/link/{name}")
}

/// Key of a switch port record.
#[must_use]
pub fn port_key(name: &str) -> String {
    format!("{KEY_PREFIX}/port/{name}")
}

/// Key of a bridging domain record.
#[must_use]
pub fn domain_key(name: &str) -> String {
    format!("{KEY_PREFIX}/bd/{name}")
}

/// Key of a gateway interface record.
#[must_use]
pub fn gateway_key(name: &str) -> String {
    format!("{KEY_PREFIX}/gateway/{name}")
}

/// A key-value store the mirror writes into.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Value) -> NetworkResult<()>;

    /// Remove `key` if present.
    async fn delete(&self, key: &str) -> NetworkResult<()>;
}

#[derive(Serialize)]
struct Record<'a, T: Serialize> {
    published_at: DateTime<Utc>,
    resource: &'a T,
}

/// Publishes attachment changes into a [`MirrorStore`], logging failures.
pub struct PersistenceMirror {
    store: Box<dyn MirrorStore>,
}

impl PersistenceMirror {
    /// Create a mirror writing into `store`.
    pub fn new(store: impl MirrorStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    /// Publish a single resource. Failures are logged and swallowed.
    pub async fn publish<T: Serialize>(&self, key: &str, resource: &T) {
        let record = Record {
            published_at: Utc::now(),
            resource,
        };
        let result = match serde_json::to_value(&record) {
            Ok(value) => self.store.put(key, value).await,
            Err(e) => Err(podwire_common::PodwireError::from(e).into()),
        };
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "Failed to publish resource to mirror");
        }
    }

    /// Withdraw a single resource. Failures are logged and swallowed.
    pub async fn withdraw(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            tracing::warn!(key, error = %e, "Failed to withdraw resource from mirror");
        }
    }

    /// Publish everything an attach created.
    pub async fn publish_attachment(&self, topology: &AttachmentTopology) {
        self.publish(&link_key(&topology.link_pair.host_end.name), &topology.link_pair)
            .await;
        self.publish(&port_key(&topology.switch_port.name), &topology.switch_port)
            .await;
        if let Some(gateway) = &topology.gateway {
            self.publish(&gateway_key(&gateway.name), gateway).await;
        }
        self.publish(
            &domain_key(&topology.bridging_domain.name),
            &topology.bridging_domain,
        )
        .await;
    }

    /// Publish everything a detach removed or changed.
    pub async fn publish_detachment(&self, topology: &DetachmentTopology) {
        self.withdraw(&link_key(&topology.link_pair.host_end.name))
            .await;
        self.withdraw(&port_key(&topology.switch_port.name)).await;
        if let Some(domain) = &topology.bridging_domain {
            self.publish(&domain_key(&domain.name), domain).await;
        }
    }
}

impl std::fmt::Debug for PersistenceMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceMirror").finish_non_exhaustive()
    }
}

/// Store keeping records in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: std::sync::Arc<DashMap<String, Value>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.records.get(key).map(|v| v.value().clone())
    }

    /// All stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.records.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl MirrorStore for MemoryStore {
    async fn put(&self, key: &str, value: Value) -> NetworkResult<()> {
        self.records.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> NetworkResult<()> {
        self.records.remove(key);
        Ok(())
    }
}

/// Store keeping one JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of the store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`.
    #[must_use]
    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl MirrorStore for FileStore {
    async fn put(&self, key: &str, value: Value) -> NetworkResult<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(podwire_common::PodwireError::from)?;
        }

        let content = serde_json::to_vec_pretty(&value).map_err(podwire_common::PodwireError::from)?;

        // Temp file then rename; readers never see a partial record.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(podwire_common::PodwireError::from)?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(podwire_common::PodwireError::from)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> NetworkResult<()> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(NetworkError::from(podwire_common::PodwireError::from(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    #[async_trait]
    impl MirrorStore for BrokenStore {
        async fn put(&self, _key: &str, _value: Value) -> NetworkResult<()> {
            Err(NetworkError::backend("put", "store offline"))
        }

        async fn delete(&self, _key: &str) -> NetworkResult<()> {
            Err(NetworkError::backend("delete", "store offline"))
        }
    }

    #[test]
    fn key_layout() {
        assert_eq!(link_key("c1"), "podwire/link/c1");
        assert_eq!(port_key("afpacketc1"), "podwire/port/afpacketc1");
        assert_eq!(domain_key("bd1"), "podwire/bd/bd1");
        assert_eq!(gateway_key("loop1"), "podwire/gateway/loop1");
    }

    #[tokio::test]
    async fn memory_store_publish_and_withdraw() {
        let store = MemoryStore::new();
        let mirror = PersistenceMirror::new(store.clone());

        mirror.publish("podwire/port/afpacketc1", &"c1").await;
        let record = store.get("podwire/port/afpacketc1").unwrap();
        assert_eq!(record["resource"], "c1");
        assert!(record["published_at"].is_string());

        mirror.withdraw("podwire/port/afpacketc1").await;
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn failing_store_is_swallowed() {
        let mirror = PersistenceMirror::new(BrokenStore);
        mirror.publish("podwire/port/x", &1).await;
        mirror.withdraw("podwire/port/x").await;
    }

    #[tokio::test]
    async fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store
            .put("podwire/bd/bd1", serde_json::json!({"members": ["loop1"]}))
            .await
            .unwrap();
        let path = store.path("podwire/bd/bd1");
        assert!(path.exists());
        let value: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["members"][0], "loop1");

        store.delete("podwire/bd/bd1").await.unwrap();
        assert!(!path.exists());
        store.delete("podwire/bd/bd1").await.unwrap();
    }
}
