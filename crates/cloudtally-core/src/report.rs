//! Outcome of a reconciliation pass

use crate::record::{ResourceKind, StoredRecord};
use serde::{Deserialize, Serialize};

/// What a pass did to one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Record was new and got created
    Create,
    /// Record existed and had changed
    Update,
    /// Record no longer exists remotely
    Delete,
    /// Record existed and was unchanged
    NoOp,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Create => write!(f, "create"),
            ChangeType::Update => write!(f, "update"),
            ChangeType::Delete => write!(f, "delete"),
            ChangeType::NoOp => write!(f, "no-op"),
        }
    }
}

/// One record touched by a pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub change_type: ChangeType,

    pub kind: ResourceKind,

    pub identity: String,

    /// Human readable name of the record
    pub description: String,
}

impl Change {
    pub fn new(change_type: ChangeType, record: &StoredRecord) -> Self {
        Self {
            change_type,
            kind: record.kind,
            identity: record.identity.clone(),
            description: record.display_name(),
        }
    }
}

/// Everything a pass did, for one family in one scope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    pub family: ResourceKind,

    /// Scope the pass ran for, e.g. `123456789012/dns_zone`
    pub scope: String,

    pub changes: Vec<Change>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl PassReport {
    pub fn new(family: ResourceKind, scope: impl Into<String>) -> Self {
        Self {
            family,
            scope: scope.into(),
            changes: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn record(&mut self, change_type: ChangeType, record: &StoredRecord) {
        self.changes.push(Change::new(change_type, record));
    }

    /// Fold a child pass into this one
    pub fn merge(&mut self, other: PassReport) {
        self.changes.extend(other.changes);
    }

    /// Whether the pass wrote anything
    pub fn has_changes(&self) -> bool {
        self.changes.iter().any(|c| c.change_type != ChangeType::NoOp)
    }

    /// Get changes by type
    pub fn changes_by_type(&self, change_type: ChangeType) -> Vec<&Change> {
        self.changes
            .iter()
            .filter(|c| c.change_type == change_type)
            .collect()
    }

    /// Summary of the pass
    pub fn summary(&self) -> PassSummary {
        PassSummary {
            created: self.changes_by_type(ChangeType::Create).len(),
            updated: self.changes_by_type(ChangeType::Update).len(),
            deleted: self.changes_by_type(ChangeType::Delete).len(),
            unchanged: self.changes_by_type(ChangeType::NoOp).len(),
        }
    }
}

/// Counts of a pass report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl std::fmt::Display for PassSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted, {} unchanged",
            self.created, self.updated, self.deleted, self.unchanged
        )
    }
}
