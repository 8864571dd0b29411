//! Per-family entry point

use crate::error::Result;
use crate::record::{Account, ResourceKind};
use crate::report::PassReport;
use crate::store::Session;
use async_trait::async_trait;

/// Collects one resource family for one account
///
/// Implementations wire a provider API into [`crate::ReconciliationLoop`]
/// or [`crate::HierarchicalReconciler`] and run exactly one pass per call.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Returns the collector name (e.g., "route53", "s3")
    fn name(&self) -> &str;

    /// Top-level kind this collector reconciles
    fn family(&self) -> ResourceKind;

    /// Account the collector runs for
    fn account(&self) -> &Account;

    /// Run one pass inside `session`
    async fn collect(&self, session: &mut dyn Session) -> Result<PassReport>;
}
