//! Reconciliation of a fetched remote set against the inventory
//!
//! A pass moves through [`PassState`] in order. Creates and updates are
//! committed before any delete is applied, so a failure in the delete phase
//! never loses records that still exist remotely.

use crate::error::Result;
use crate::fetch::RemoteSet;
use crate::record::{ResourceKind, StoredRecord};
use crate::report::{ChangeType, PassReport};
use crate::store::{RecordMap, Scope, Session};
use async_trait::async_trait;
use std::future::Future;
use std::time::Instant;

/// Phase of a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Fetching,
    IndexingExisting,
    Diffing,
    ApplyingUpserts,
    ApplyingDeletes,
    Committed,
}

impl std::fmt::Display for PassState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassState::Fetching => write!(f, "fetching"),
            PassState::IndexingExisting => write!(f, "indexing existing"),
            PassState::Diffing => write!(f, "diffing"),
            PassState::ApplyingUpserts => write!(f, "applying upserts"),
            PassState::ApplyingDeletes => write!(f, "applying deletes"),
            PassState::Committed => write!(f, "committed"),
        }
    }
}

/// One fetch → diff → apply pass over a single scope
pub struct ReconciliationLoop<'a> {
    session: &'a mut dyn Session,
    scope: Scope,
    state: PassState,
}

impl<'a> ReconciliationLoop<'a> {
    pub fn new(session: &'a mut dyn Session, scope: Scope) -> Self {
        Self {
            session,
            scope,
            state: PassState::Fetching,
        }
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    /// Run the pass, reading the existing records from the session
    pub async fn run<F>(mut self, fetch: F) -> Result<PassReport>
    where
        F: Future<Output = Result<RemoteSet>>,
    {
        let result = self.execute(fetch, None).await;
        self.finish(result)
    }

    /// Run the pass against an already loaded existing set
    pub async fn run_with_existing<F>(mut self, fetch: F, existing: RecordMap) -> Result<PassReport>
    where
        F: Future<Output = Result<RemoteSet>>,
    {
        let result = self.execute(fetch, Some(existing)).await;
        self.finish(result)
    }

    fn finish(self, result: Result<PassReport>) -> Result<PassReport> {
        if let Err(err) = &result {
            tracing::debug!("Pass for {} failed while {}: {}", self.scope, self.state, err);
        }
        result
    }

    async fn execute<F>(&mut self, fetch: F, existing: Option<RecordMap>) -> Result<PassReport>
    where
        F: Future<Output = Result<RemoteSet>>,
    {
        let started = Instant::now();

        self.state = PassState::Fetching;
        let remote = fetch.await?;

        self.state = PassState::IndexingExisting;
        let existing = match existing {
            Some(existing) => existing,
            None => self.session.get_all(&self.scope).await?,
        };

        let mut report = self.converge(remote, existing).await?;
        report.duration_ms = started.elapsed().as_millis() as u64;

        let summary = report.summary();
        if self.scope.parent_identity.is_none() {
            tracing::info!("Reconciled {}: {}", self.scope, summary);
        } else {
            tracing::debug!("Reconciled {}: {}", self.scope, summary);
        }
        Ok(report)
    }

    async fn converge(&mut self, remote: RemoteSet, mut existing: RecordMap) -> Result<PassReport> {
        let kind = self.scope.kind;
        let mut report = PassReport::new(kind, self.scope.to_string());

        self.state = PassState::Diffing;
        let stale: Vec<String> = existing
            .keys()
            .filter(|identity| !remote.contains(identity))
            .cloned()
            .collect();

        self.state = PassState::ApplyingUpserts;
        for record in remote {
            match existing.remove(&record.identity) {
                Some(mut stored) => {
                    let tags = kind.has_tags().then_some(&record.tags);
                    if stored.update(&record.properties, tags) {
                        self.session.save(&stored).await?;
                        tracing::debug!(
                            "Updated {} {} in {}",
                            kind,
                            stored.display_name(),
                            self.scope
                        );
                        report.record(ChangeType::Update, &stored);
                    } else {
                        report.record(ChangeType::NoOp, &stored);
                    }
                }
                None => {
                    let stored = self.session.create(&self.scope, record).await?;
                    tracing::debug!("Created {} {} in {}", kind, stored.display_name(), self.scope);
                    report.record(ChangeType::Create, &stored);
                }
            }
        }
        self.session.commit().await?;

        self.state = PassState::ApplyingDeletes;
        for identity in stale {
            if let Some(stored) = existing.remove(&identity) {
                self.session.delete(&stored).await?;
                tracing::debug!("Deleted {} {} from {}", kind, stored.display_name(), self.scope);
                report.record(ChangeType::Delete, &stored);
            }
        }
        self.session.commit().await?;

        self.state = PassState::Committed;
        Ok(report)
    }
}

/// Fetches the remote children of one parent record
#[async_trait]
pub trait ChildSource: Send + Sync {
    async fn fetch_children(&self, parent: &StoredRecord) -> Result<RemoteSet>;
}

/// Parent pass followed by one child pass per surviving parent
pub struct HierarchicalReconciler<'a> {
    session: &'a mut dyn Session,
    scope: Scope,
    child_kind: ResourceKind,
}

impl<'a> HierarchicalReconciler<'a> {
    pub fn new(session: &'a mut dyn Session, scope: Scope, child_kind: ResourceKind) -> Self {
        Self {
            session,
            scope,
            child_kind,
        }
    }

    /// Reconcile the parents, then the children of every parent
    ///
    /// Every child pass commits on its own. A failure stops the remaining
    /// parents but keeps what earlier child passes committed.
    pub async fn run<F, C>(self, fetch_parents: F, children: &C) -> Result<PassReport>
    where
        F: Future<Output = Result<RemoteSet>>,
        C: ChildSource + ?Sized,
    {
        let started = Instant::now();
        let session = self.session;

        let mut report = ReconciliationLoop::new(&mut *session, self.scope.clone())
            .run(fetch_parents)
            .await?;

        let parents = session.get_all(&self.scope).await?;
        for parent in parents.values() {
            let scope = Scope::children(
                self.scope.account_id.clone(),
                self.child_kind,
                parent.identity.clone(),
            );
            let existing: RecordMap = parent
                .children
                .iter()
                .filter(|child| child.kind == self.child_kind)
                .map(|child| (child.identity.clone(), child.clone()))
                .collect();

            let child_report = ReconciliationLoop::new(&mut *session, scope)
                .run_with_existing(children.fetch_children(parent), existing)
                .await?;
            report.merge(child_report);
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }
}
