//! Inventory snapshot and its JSON state file
//!
//! Manages the `inventory.json` file which holds every record collected
//! for every account.

use crate::error::{ReconcileError, Result};
use crate::record::StoredRecord;
use crate::store::{Backend, RecordMap, Scope, Session, Store, UnitOfWork};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

const STATE_VERSION: u32 = 1;
const STATE_FILE: &str = "inventory.json";
const STATE_BACKUP: &str = "inventory.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Locks older than this many minutes belong to a writer that crashed
const STALE_LOCK_MINUTES: i64 = 60;
const LOCK_WAIT: Duration = Duration::from_secs(10);
const LOCK_POLL: Duration = Duration::from_millis(25);

/// Staged change to the inventory
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Insert or replace a record
    Put(StoredRecord),
    /// Remove a record (by storage key) and its children
    Remove(String),
}

/// Every stored record, keyed by [`crate::record::record_key`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    pub records: BTreeMap<String, StoredRecord>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            records: BTreeMap::new(),
        }
    }
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&StoredRecord> {
        self.records.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredRecord> {
        self.records.values()
    }

    /// Add or replace a record
    pub fn put(&mut self, record: StoredRecord) {
        self.records.insert(record.key(), record.detached());
        self.updated_at = Utc::now();
    }

    /// Remove a record and its children, returning what was removed
    pub fn remove(&mut self, key: &str) -> Vec<StoredRecord> {
        let Some(record) = self.records.remove(key) else {
            return Vec::new();
        };

        let child_keys: Vec<String> = self
            .records
            .iter()
            .filter(|(_, child)| is_child_of(child, &record))
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = vec![record];
        for child_key in child_keys {
            removed.extend(self.remove(&child_key));
        }
        self.updated_at = Utc::now();
        removed
    }

    pub fn apply(&mut self, writes: Vec<Write>) {
        for write in writes {
            match write {
                Write::Put(record) => self.put(record),
                Write::Remove(key) => {
                    self.remove(&key);
                }
            }
        }
    }

    /// Records in `scope`, each with its children attached
    pub fn records_in(&self, scope: &Scope) -> RecordMap {
        let child_kind = scope.kind.child_kind();
        let mut children: HashMap<&str, Vec<StoredRecord>> = HashMap::new();
        for record in self.records.values() {
            if record.account_id != scope.account_id || Some(record.kind) != child_kind {
                continue;
            }
            if let Some(parent) = record.parent_identity.as_deref() {
                children.entry(parent).or_default().push(record.clone());
            }
        }

        self.records
            .values()
            .filter(|record| scope.contains(record))
            .map(|record| {
                let mut record = record.clone();
                record.children = children.remove(record.identity.as_str()).unwrap_or_default();
                (record.identity.clone(), record)
            })
            .collect()
    }
}

fn is_child_of(child: &StoredRecord, parent: &StoredRecord) -> bool {
    child.account_id == parent.account_id
        && Some(child.kind) == parent.kind.child_kind()
        && child.parent_identity.as_deref() == Some(parent.identity.as_str())
}

/// Inventory kept as `inventory.json` in a state directory
///
/// Commits from any number of sessions, in this process or another one,
/// are serialized through `lock.json`. The file is created with
/// `create_new`, so at most one writer holds it at a time.
#[derive(Debug, Clone)]
pub struct FileStore {
    state_dir: PathBuf,
    lock_wait: Duration,
}

impl FileStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
            lock_wait: LOCK_WAIT,
        }
    }

    /// How long a commit waits for another writer before giving up
    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn file(&self, name: &str) -> PathBuf {
        self.state_dir.join(name)
    }

    async fn create_state_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir).await?;
            tracing::debug!("Created state directory {}", self.state_dir.display());
        }
        Ok(())
    }

    /// Read the last committed inventory; empty when nothing was saved yet
    pub async fn load(&self) -> Result<Inventory> {
        let content = match fs::read_to_string(self.file(STATE_FILE)).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!("No inventory in {}, starting empty", self.state_dir.display());
                return Ok(Inventory::new());
            }
            Err(err) => return Err(err.into()),
        };

        let inventory: Inventory = serde_json::from_str(&content)?;
        if inventory.version > STATE_VERSION {
            return Err(ReconcileError::StateError(format!(
                "inventory format {} is newer than this build understands ({})",
                inventory.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded {} inventory records", inventory.len());
        Ok(inventory)
    }

    /// Replace `inventory.json` atomically
    ///
    /// The previous file is copied to `inventory.json.backup` first. The new
    /// content goes to a temp file that is renamed over the old one, so
    /// readers never see a partial document.
    pub async fn save(&self, inventory: &Inventory) -> Result<()> {
        self.create_state_dir().await?;

        let path = self.file(STATE_FILE);
        match fs::copy(&path, self.file(STATE_BACKUP)).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let staging = self.file(&format!("{}.{}.tmp", STATE_FILE, std::process::id()));
        fs::write(&staging, serde_json::to_vec_pretty(inventory)?).await?;
        fs::rename(&staging, &path).await?;

        tracing::debug!("Saved {} inventory records", inventory.len());
        Ok(())
    }

    /// Take the write lock, failing at once if someone else holds it
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.create_state_dir().await?;

        match self.create_lock().await {
            Err(ReconcileError::LockError(held)) => {
                if self.remove_stale_lock().await {
                    self.create_lock().await
                } else {
                    Err(ReconcileError::LockError(held))
                }
            }
            other => other,
        }
    }

    async fn create_lock(&self) -> Result<StateLock> {
        let path = self.file(LOCK_FILE);
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(ReconcileError::LockError(format!(
                    "inventory in {} is being written by another session",
                    self.state_dir.display()
                )));
            }
            Err(err) => return Err(err.into()),
        };

        // From here on the guard owns the file, even if writing the holder fails
        let lock = StateLock {
            path,
            released: false,
        };
        file.write_all(&serde_json::to_vec(&LockHolder::current())?)
            .await?;
        file.flush().await?;
        Ok(lock)
    }

    /// Remove a lock left behind by a crashed writer
    ///
    /// A lock file that cannot be read or parsed is treated as live: its
    /// owner may still be writing the holder line.
    async fn remove_stale_lock(&self) -> bool {
        let path = self.file(LOCK_FILE);
        let Ok(content) = fs::read(&path).await else {
            return false;
        };
        let Ok(holder) = serde_json::from_slice::<LockHolder>(&content) else {
            return false;
        };
        let age = Utc::now().signed_duration_since(holder.acquired_at);
        if age.num_minutes() < STALE_LOCK_MINUTES {
            return false;
        }

        tracing::warn!(
            "Removing lock of {} taken at {}",
            holder.holder,
            holder.acquired_at
        );
        fs::remove_file(&path).await.is_ok()
    }

    /// Take the write lock, polling until `lock_wait` runs out
    async fn wait_for_lock(&self) -> Result<StateLock> {
        let deadline = Instant::now() + self.lock_wait;
        loop {
            match self.acquire_lock().await {
                Err(ReconcileError::LockError(_)) if Instant::now() < deadline => {
                    tokio::time::sleep(LOCK_POLL).await;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl Backend for FileStore {
    async fn load(&self) -> Result<Inventory> {
        FileStore::load(self).await
    }

    async fn apply(&self, writes: Vec<Write>) -> Result<()> {
        let lock = self.wait_for_lock().await?;
        let result = async {
            let mut inventory = FileStore::load(self).await?;
            inventory.apply(writes);
            self.save(&inventory).await
        }
        .await;
        lock.release().await?;
        result
    }
}

#[async_trait]
impl Store for FileStore {
    async fn begin(&self) -> Result<Box<dyn Session>> {
        Ok(Box::new(UnitOfWork::open(self.clone()).await?))
    }
}

/// Content of `lock.json`
#[derive(Debug, Serialize, Deserialize)]
struct LockHolder {
    /// `host:pid` of the writer
    holder: String,
    acquired_at: DateTime<Utc>,
}

impl LockHolder {
    fn current() -> Self {
        let host = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("HOST"))
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            holder: format!("{}:{}", host, std::process::id()),
            acquired_at: Utc::now(),
        }
    }
}

/// Held write lock; dropping it without [`StateLock::release`] still
/// removes the lock file
pub struct StateLock {
    path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Properties, RemoteRecord, ResourceKind};
    use serde_json::json;
    use tempfile::tempdir;

    fn bucket(name: &str) -> StoredRecord {
        let mut properties = Properties::new();
        properties.insert("location".to_string(), json!("us-east-1"));
        StoredRecord::new(
            ResourceKind::S3Bucket,
            "123456789012",
            RemoteRecord::new(name, properties),
        )
    }

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::new(temp_dir.path());

        let mut inventory = Inventory::new();
        inventory.put(bucket("logs"));
        store.save(&inventory).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains("123456789012:s3_bucket:logs"));
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::new(temp_dir.path());

        let inventory = store.load().await.unwrap();
        assert!(inventory.is_empty());
    }

    #[tokio::test]
    async fn test_newer_state_version_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::new(temp_dir.path());
        let inventory = Inventory {
            version: STATE_VERSION + 1,
            ..Inventory::new()
        };
        store.save(&inventory).await.unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, ReconcileError::StateError(_)));
    }

    #[tokio::test]
    async fn test_save_keeps_backup() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::new(temp_dir.path());

        store.save(&Inventory::new()).await.unwrap();
        store.save(&Inventory::new()).await.unwrap();

        assert!(temp_dir.path().join(STATE_BACKUP).exists());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::new(temp_dir.path());

        let lock = store.acquire_lock().await.unwrap();
        let err = store.acquire_lock().await.err().unwrap();
        assert!(matches!(err, ReconcileError::LockError(_)));
        assert!(err.is_transient());

        lock.release().await.unwrap();
        assert!(store.acquire_lock().await.is_ok());
    }

    #[tokio::test]
    async fn test_session_commit_reaches_file() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::new(temp_dir.path());
        let scope = Scope::family("123456789012", ResourceKind::S3Bucket);

        let mut session = store.begin().await.unwrap();
        session
            .create(&scope, RemoteRecord::new("logs", Properties::new()))
            .await
            .unwrap();
        session.commit().await.unwrap();

        let reopened = FileStore::new(temp_dir.path());
        assert_eq!(reopened.load().await.unwrap().len(), 1);
        assert!(!temp_dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn test_remove_cascades() {
        let mut inventory = Inventory::new();
        let zone = StoredRecord::new(
            ResourceKind::DnsZone,
            "123456789012",
            RemoteRecord::new("r53z-1", Properties::new()),
        );
        let record = StoredRecord::new(
            ResourceKind::DnsRecord,
            "123456789012",
            RemoteRecord::new("r53r-1", Properties::new()).with_parent("r53z-1"),
        );
        inventory.put(zone.clone());
        inventory.put(record);
        inventory.put(bucket("logs"));

        let removed = inventory.remove(&zone.key());

        assert_eq!(removed.len(), 2);
        assert_eq!(inventory.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_commits_are_all_durable() {
        let temp_dir = tempdir().unwrap();
        let scope = Scope::family("123456789012", ResourceKind::S3Bucket);

        let mut tasks = Vec::new();
        for i in 0..16 {
            let dir = temp_dir.path().to_path_buf();
            let scope = scope.clone();
            tasks.push(tokio::spawn(async move {
                let mut session = FileStore::new(dir).begin().await?;
                session
                    .create(&scope, RemoteRecord::new(format!("bucket-{}", i), Properties::new()))
                    .await?;
                session.commit().await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let inventory = FileStore::new(temp_dir.path()).load().await.unwrap();
        assert_eq!(inventory.len(), 16);
        assert!(!temp_dir.path().join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_unreadable_lock_counts_as_held() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::new(temp_dir.path()).with_lock_wait(Duration::from_millis(50));
        std::fs::write(temp_dir.path().join(LOCK_FILE), "{\"holder\": \"hal").unwrap();

        let err = store.acquire_lock().await.err().unwrap();
        assert!(matches!(err, ReconcileError::LockError(_)));

        let err = store
            .apply(vec![Write::Put(bucket("logs"))])
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_lock_is_replaced() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::new(temp_dir.path());
        let crashed = LockHolder {
            holder: "build-host:4242".to_string(),
            acquired_at: Utc::now() - chrono::Duration::hours(2),
        };
        std::fs::write(
            temp_dir.path().join(LOCK_FILE),
            serde_json::to_vec(&crashed).unwrap(),
        )
        .unwrap();

        let lock = store.acquire_lock().await.unwrap();
        let content = std::fs::read_to_string(temp_dir.path().join(LOCK_FILE)).unwrap();
        assert!(!content.contains("build-host:4242"));

        lock.release().await.unwrap();
        assert!(!temp_dir.path().join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_save_leaves_no_staging_file() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::new(temp_dir.path());

        store.save(&Inventory::new()).await.unwrap();

        let mut names: Vec<String> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![STATE_FILE.to_string()]);
    }
}
