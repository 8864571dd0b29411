//! cloudtally reconciliation engine
//!
//! Keeps a persisted inventory of cloud resources in step with what a
//! provider reports. Each pass fetches one resource family for one account,
//! compares it with the stored records and applies exactly the creates,
//! updates and deletes needed to make the two match.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   tally CLI                      │
//! │            (tally collect / show)                │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               cloudtally-core                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  run_with_retry → trait Collector         │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────────────┐     │
//! │  │ Paginated    │  │ ReconciliationLoop   │     │
//! │  │ fetch        │  │ HierarchicalReconciler│    │
//! │  └──────────────┘  └──────────┬───────────┘     │
//! │  ┌──────────────┐  ┌──────────▼───────────┐     │
//! │  │ Identity     │  │ Session / Store      │     │
//! │  │ Change detect│  │ (memory, JSON file)  │     │
//! │  └──────────────┘  └──────────────────────┘     │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────────────────────────────────┐
//! │              cloudtally-aws                │
//! │  route53 · s3 · cloudfront · iam           │
//! └───────────────────────────────────────────┘
//! ```

pub mod change;
pub mod collector;
pub mod error;
pub mod fetch;
pub mod identity;
pub mod reconcile;
pub mod record;
pub mod report;
pub mod retry;
pub mod state;
pub mod store;

// Re-exports
pub use change::{apply_changes, values_equal};
pub use collector::Collector;
pub use error::{ProviderError, ReconcileError, Result};
pub use fetch::{Page, PageSource, RemoteSet, drain_into, fetch_all};
pub use identity::{IdentityField, namespace, resource_id, resource_id_for};
pub use reconcile::{ChildSource, HierarchicalReconciler, PassState, ReconciliationLoop};
pub use record::{
    Account, Properties, RemoteRecord, ResourceKind, StoredRecord, Tags, record_key,
    timestamp_value,
};
pub use report::{Change, ChangeType, PassReport, PassSummary};
pub use retry::{RetryConfig, run_with_retry};
pub use state::{FileStore, Inventory, StateLock, Write};
pub use store::{Backend, MemoryStore, RecordMap, Scope, Session, Store, UnitOfWork};
