//! Durable State Store
//!
//! One JSON document per collection (`svms.json`, `volumes.json`,
//! `snapshots.json`), each shaped `{"items": [...]}` with the items sorted
//! by key so diffs and tests are deterministic. Writes go through an
//! in-process mutex per collection (read-modify-write) and an atomic
//! rename (no torn reads).

use crate::domain::records::{Record, SnapshotRecord, SvmRecord, VolumeRecord};
use crate::error::Result;
use crate::state::atomic;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

// =============================================================================
// Collection
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "T: Record")]
struct CollectionFile<T> {
    #[serde(default)]
    items: Vec<T>,
}

impl<T> Default for CollectionFile<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

/// A file-backed, key-sorted collection of records
pub struct Collection<T: Record> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> Collection<T> {
    fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(format!("{}.json", T::COLLECTION)),
            write_lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// Path of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<T>> {
        let file: CollectionFile<T> = atomic::read_json_or_default(&self.path).await?;
        Ok(file.items)
    }

    async fn store(&self, mut items: Vec<T>) -> Result<()> {
        items.sort_by_key(|item| item.key());
        atomic::write_json_atomic(&self.path, &CollectionFile { items }).await
    }

    /// All records matching `filter`, in key order
    pub async fn list<F>(&self, filter: F) -> Result<Vec<T>>
    where
        F: Fn(&T) -> bool,
    {
        Ok(self.load().await?.into_iter().filter(|r| filter(r)).collect())
    }

    /// The record with `key`, if any
    pub async fn get(&self, key: &T::Key) -> Result<Option<T>> {
        Ok(self.load().await?.into_iter().find(|r| &r.key() == key))
    }

    /// Replace the record with the same key, or insert it
    pub async fn upsert(&self, record: T) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let key = record.key();
        let mut items = self.load().await?;
        items.retain(|r| r.key() != key);
        items.push(record);
        self.store(items).await?;
        debug!("Upserted {} record {:?}", T::COLLECTION, key);
        Ok(())
    }

    /// Remove the record with `key`; returns whether one was removed
    pub async fn delete(&self, key: &T::Key) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let items = self.load().await?;
        let before = items.len();
        let remaining: Vec<T> = items.into_iter().filter(|r| &r.key() != key).collect();
        if remaining.len() == before {
            return Ok(false);
        }
        self.store(remaining).await?;
        debug!("Deleted {} record {:?}", T::COLLECTION, key);
        Ok(true)
    }
}

// =============================================================================
// State Store
// =============================================================================

/// Authoritative record of every SVM, volume and snapshot on this node
pub struct StateStore {
    dir: PathBuf,
    svms: Collection<SvmRecord>,
    volumes: Collection<VolumeRecord>,
    snapshots: Collection<SnapshotRecord>,
}

impl StateStore {
    /// Open the store rooted at `dir`; missing files are empty collections
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            svms: Collection::new(&dir),
            volumes: Collection::new(&dir),
            snapshots: Collection::new(&dir),
            dir,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn svms(&self) -> &Collection<SvmRecord> {
        &self.svms
    }

    pub fn volumes(&self) -> &Collection<VolumeRecord> {
        &self.volumes
    }

    pub fn snapshots(&self) -> &Collection<SnapshotRecord> {
        &self.snapshots
    }

    // -------------------------------------------------------------------------
    // SVMs
    // -------------------------------------------------------------------------

    pub async fn list_svms(&self, name: Option<&str>) -> Result<Vec<SvmRecord>> {
        self.svms
            .list(|s| name.map_or(true, |n| s.name == n))
            .await
    }

    pub async fn get_svm(&self, name: &str) -> Result<Option<SvmRecord>> {
        self.svms.get(&name.to_string()).await
    }

    pub async fn upsert_svm(&self, svm: SvmRecord) -> Result<()> {
        self.svms.upsert(svm).await
    }

    pub async fn delete_svm(&self, name: &str) -> Result<bool> {
        self.svms.delete(&name.to_string()).await
    }

    // -------------------------------------------------------------------------
    // Volumes
    // -------------------------------------------------------------------------

    pub async fn list_volumes(
        &self,
        svm: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<VolumeRecord>> {
        self.volumes
            .list(|v| svm.map_or(true, |s| v.svm == s) && name.map_or(true, |n| v.name == n))
            .await
    }

    pub async fn get_volume(&self, svm: &str, name: &str) -> Result<Option<VolumeRecord>> {
        self.volumes.get(&(svm.to_string(), name.to_string())).await
    }

    pub async fn upsert_volume(&self, volume: VolumeRecord) -> Result<()> {
        self.volumes.upsert(volume).await
    }

    pub async fn delete_volume(&self, svm: &str, name: &str) -> Result<bool> {
        self.volumes.delete(&(svm.to_string(), name.to_string())).await
    }

    // -------------------------------------------------------------------------
    // Snapshots
    // -------------------------------------------------------------------------

    pub async fn list_snapshots(
        &self,
        svm: Option<&str>,
        volume: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<SnapshotRecord>> {
        self.snapshots
            .list(|s| {
                svm.map_or(true, |v| s.svm == v)
                    && volume.map_or(true, |v| s.volume == v)
                    && name.map_or(true, |n| s.name == n)
            })
            .await
    }

    pub async fn get_snapshot(
        &self,
        svm: &str,
        volume: &str,
        name: &str,
    ) -> Result<Option<SnapshotRecord>> {
        self.snapshots
            .get(&(svm.to_string(), volume.to_string(), name.to_string()))
            .await
    }

    pub async fn upsert_snapshot(&self, snapshot: SnapshotRecord) -> Result<()> {
        self.snapshots.upsert(snapshot).await
    }

    pub async fn delete_snapshot(&self, svm: &str, volume: &str, name: &str) -> Result<bool> {
        self.snapshots
            .delete(&(svm.to_string(), volume.to_string(), name.to_string()))
            .await
    }
}
