//! Paginated fetching of provider listings

use crate::error::{ReconcileError, Result};
use crate::record::RemoteRecord;
use async_trait::async_trait;
use std::collections::HashMap;

/// One page of a provider listing
#[derive(Debug, Clone)]
pub struct Page<T, K> {
    pub is_truncated: bool,
    pub next_token: Option<K>,
    pub items: Vec<T>,
}

impl<T, K> Page<T, K> {
    /// Final page of a listing
    pub fn last(items: Vec<T>) -> Self {
        Self {
            is_truncated: false,
            next_token: None,
            items,
        }
    }

    /// Page followed by more results starting at `next_token`
    pub fn truncated(items: Vec<T>, next_token: K) -> Self {
        Self {
            is_truncated: true,
            next_token: Some(next_token),
            items,
        }
    }
}

/// A provider listing that can be drained page by page
#[async_trait]
pub trait PageSource: Send {
    /// Continuation token handed back to the provider
    type Token: Send;

    /// Raw item as returned by the provider
    type Item: Send;

    /// Name of the listing for log and error messages
    fn name(&self) -> &str;

    /// Request one page, starting at `token` (or the beginning)
    async fn fetch_page(
        &mut self,
        token: Option<Self::Token>,
    ) -> Result<Page<Self::Item, Self::Token>>;

    /// Turn a raw item into a record, running any per-item enrichment calls
    async fn normalize(&mut self, item: Self::Item) -> Result<RemoteRecord>;
}

/// Records fetched in one pass, keyed by identity
///
/// Iteration follows first-seen order. Inserting an identity a second time
/// replaces the earlier record in place.
#[derive(Debug, Clone, Default)]
pub struct RemoteSet {
    records: Vec<RemoteRecord>,
    index: HashMap<String, usize>,
}

impl RemoteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, returning the one it replaced
    pub fn insert(&mut self, record: RemoteRecord) -> Option<RemoteRecord> {
        match self.index.get(&record.identity) {
            Some(&position) => Some(std::mem::replace(&mut self.records[position], record)),
            None => {
                self.index.insert(record.identity.clone(), self.records.len());
                self.records.push(record);
                None
            }
        }
    }

    pub fn get(&self, identity: &str) -> Option<&RemoteRecord> {
        self.index.get(identity).map(|&position| &self.records[position])
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.index.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteRecord> {
        self.records.iter()
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.identity.as_str())
    }
}

impl IntoIterator for RemoteSet {
    type Item = RemoteRecord;
    type IntoIter = std::vec::IntoIter<RemoteRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl FromIterator<RemoteRecord> for RemoteSet {
    fn from_iter<I: IntoIterator<Item = RemoteRecord>>(iter: I) -> Self {
        let mut set = RemoteSet::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

/// Drain `source` into a fresh [`RemoteSet`]
pub async fn fetch_all<S>(source: &mut S) -> Result<RemoteSet>
where
    S: PageSource + ?Sized,
{
    let mut records = RemoteSet::new();
    drain_into(source, &mut records).await?;
    Ok(records)
}

/// Drain `source` into an existing set, returning the number of pages read
///
/// There is no page limit: a provider that keeps reporting truncated pages
/// keeps this loop going. Errors from the provider end the fetch; nothing
/// is resumed.
pub async fn drain_into<S>(source: &mut S, records: &mut RemoteSet) -> Result<usize>
where
    S: PageSource + ?Sized,
{
    let mut token = None;
    let mut pages = 0usize;

    loop {
        let Page {
            is_truncated,
            next_token,
            items,
        } = source.fetch_page(token.take()).await?;
        pages += 1;

        for item in items {
            let record = source.normalize(item).await?;
            if let Some(previous) = records.insert(record) {
                tracing::debug!(
                    "{} returned {} more than once, keeping the latest",
                    source.name(),
                    previous.identity
                );
            }
        }

        if !is_truncated {
            break;
        }
        match next_token {
            Some(next) => token = Some(next),
            None => {
                return Err(ReconcileError::Pagination(format!(
                    "{} reported a truncated page without a continuation token",
                    source.name()
                )));
            }
        }
    }

    tracing::debug!(
        "Fetched {} records from {} in {} page(s)",
        records.len(),
        source.name(),
        pages
    );
    Ok(pages)
}
