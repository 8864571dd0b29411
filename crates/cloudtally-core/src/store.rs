//! Persistence seam for the reconciliation loops
//!
//! A [`Store`] hands out [`Session`]s. A session is a unit of work: reads
//! see the session's own staged writes, and nothing reaches the backend
//! until [`Session::commit`]. [`Session::rollback`] drops everything staged
//! since the last commit.

use crate::error::{ReconcileError, Result};
use crate::record::{RemoteRecord, ResourceKind, StoredRecord, record_key};
use crate::state::{Inventory, Write};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Records matching a scope, keyed by identity
pub type RecordMap = BTreeMap<String, StoredRecord>;

/// Which records a lookup covers: one kind within one account,
/// optionally narrowed to the children of one parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub account_id: String,
    pub kind: ResourceKind,
    pub parent_identity: Option<String>,
}

impl Scope {
    /// Top-level records of a family
    pub fn family(account_id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            account_id: account_id.into(),
            kind,
            parent_identity: None,
        }
    }

    /// Children of one parent record
    pub fn children(
        account_id: impl Into<String>,
        kind: ResourceKind,
        parent_identity: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            kind,
            parent_identity: Some(parent_identity.into()),
        }
    }

    pub fn contains(&self, record: &StoredRecord) -> bool {
        record.account_id == self.account_id
            && record.kind == self.kind
            && record.parent_identity == self.parent_identity
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.parent_identity {
            Some(parent) => write!(f, "{}/{}/{}", self.account_id, parent, self.kind),
            None => write!(f, "{}/{}", self.account_id, self.kind),
        }
    }
}

/// Unit of work over the inventory
#[async_trait]
pub trait Session: Send {
    /// All records in `scope`, with their children populated
    async fn get_all(&mut self, scope: &Scope) -> Result<RecordMap>;

    /// Stage a new record in `scope`
    async fn create(&mut self, scope: &Scope, record: RemoteRecord) -> Result<StoredRecord>;

    /// Stage the current values of an existing record
    async fn save(&mut self, record: &StoredRecord) -> Result<()>;

    /// Stage removal of a record and its children
    async fn delete(&mut self, record: &StoredRecord) -> Result<()>;

    /// Make staged writes durable
    async fn commit(&mut self) -> Result<()>;

    /// Drop staged writes
    async fn rollback(&mut self) -> Result<()>;
}

/// Factory for sessions
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Session>>;
}

/// Durable side of a [`UnitOfWork`]
#[async_trait]
pub trait Backend: Clone + Send + Sync + 'static {
    /// Current committed inventory
    async fn load(&self) -> Result<Inventory>;

    /// Apply writes on top of the latest committed inventory
    async fn apply(&self, writes: Vec<Write>) -> Result<()>;
}

/// [`Session`] that stages writes in memory and applies them to a
/// [`Backend`] on commit
pub struct UnitOfWork<B: Backend> {
    backend: B,
    working: Inventory,
    pending: Vec<Write>,
}

impl<B: Backend> UnitOfWork<B> {
    pub async fn open(backend: B) -> Result<Self> {
        let working = backend.load().await?;
        Ok(Self {
            backend,
            working,
            pending: Vec::new(),
        })
    }
}

#[async_trait]
impl<B: Backend> Session for UnitOfWork<B> {
    async fn get_all(&mut self, scope: &Scope) -> Result<RecordMap> {
        Ok(self.working.records_in(scope))
    }

    async fn create(&mut self, scope: &Scope, mut record: RemoteRecord) -> Result<StoredRecord> {
        let key = record_key(&scope.account_id, scope.kind, &record.identity);
        if self.working.contains(&key) {
            return Err(ReconcileError::RecordAlreadyExists(key));
        }
        if scope.parent_identity.is_some() {
            record.parent_identity = scope.parent_identity.clone();
        }

        let stored = StoredRecord::new(scope.kind, scope.account_id.clone(), record);
        self.working.put(stored.clone());
        self.pending.push(Write::Put(stored.detached()));
        Ok(stored)
    }

    async fn save(&mut self, record: &StoredRecord) -> Result<()> {
        let key = record.key();
        if !self.working.contains(&key) {
            return Err(ReconcileError::RecordNotFound(key));
        }
        self.working.put(record.clone());
        self.pending.push(Write::Put(record.detached()));
        Ok(())
    }

    async fn delete(&mut self, record: &StoredRecord) -> Result<()> {
        let key = record.key();
        if self.working.remove(&key).is_empty() {
            return Err(ReconcileError::RecordNotFound(key));
        }
        self.pending.push(Write::Remove(key));
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let writes = std::mem::take(&mut self.pending);
        tracing::trace!("Committing {} staged writes", writes.len());
        self.backend.apply(writes).await
    }

    async fn rollback(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            tracing::debug!("Rolling back {} staged writes", self.pending.len());
        }
        self.pending.clear();
        self.working = self.backend.load().await?;
        Ok(())
    }
}

/// In-process store, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inventory: Arc<Mutex<Inventory>>,
    commits: Arc<Mutex<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `inventory`
    pub fn with_inventory(inventory: Inventory) -> Self {
        Self {
            inventory: Arc::new(Mutex::new(inventory)),
            commits: Arc::default(),
        }
    }

    /// Copy of the committed inventory
    pub fn snapshot(&self) -> Result<Inventory> {
        self.inventory
            .lock()
            .map(|inventory| inventory.clone())
            .map_err(|_| ReconcileError::StateError("inventory lock poisoned".to_string()))
    }

    /// Number of commits that carried at least one write
    pub fn commit_count(&self) -> usize {
        self.commits.lock().map(|count| *count).unwrap_or_default()
    }
}

#[async_trait]
impl Backend for MemoryStore {
    async fn load(&self) -> Result<Inventory> {
        self.snapshot()
    }

    async fn apply(&self, writes: Vec<Write>) -> Result<()> {
        let mut inventory = self
            .inventory
            .lock()
            .map_err(|_| ReconcileError::StateError("inventory lock poisoned".to_string()))?;
        inventory.apply(writes);
        if let Ok(mut commits) = self.commits.lock() {
            *commits += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Session>> {
        Ok(Box::new(UnitOfWork::open(self.clone()).await?))
    }
}
