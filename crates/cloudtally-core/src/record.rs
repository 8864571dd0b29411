//! Remote and stored views of a cloud resource

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Ordered mapping of field name to value
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Resource tags; key order is irrelevant
pub type Tags = BTreeMap<String, String>;

/// Normalize a provider timestamp into the form stored in properties
pub fn timestamp_value(value: &DateTime<Utc>) -> serde_json::Value {
    serde_json::Value::String(value.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Account a reconciliation pass runs for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Human readable account name, used in logs and as record source
    pub name: String,

    /// Provider account id (e.g. the 12 digit AWS account number)
    pub account_id: String,
}

impl Account {
    pub fn new(name: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            account_id: account_id.into(),
        }
    }
}

/// Kind of resource tracked in the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    DnsZone,
    DnsRecord,
    S3Bucket,
    CloudfrontDistribution,
    IamUser,
    AccessKey,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::DnsZone,
        ResourceKind::DnsRecord,
        ResourceKind::S3Bucket,
        ResourceKind::CloudfrontDistribution,
        ResourceKind::IamUser,
        ResourceKind::AccessKey,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::DnsZone => "dns_zone",
            ResourceKind::DnsRecord => "dns_record",
            ResourceKind::S3Bucket => "s3_bucket",
            ResourceKind::CloudfrontDistribution => "cloudfront_distribution",
            ResourceKind::IamUser => "iam_user",
            ResourceKind::AccessKey => "access_key",
        }
    }

    /// Whether tag changes count as changes for this kind
    pub fn has_tags(&self) -> bool {
        !matches!(self, ResourceKind::DnsRecord | ResourceKind::AccessKey)
    }

    /// Child kind for hierarchical families
    pub fn child_kind(&self) -> Option<ResourceKind> {
        match self {
            ResourceKind::DnsZone => Some(ResourceKind::DnsRecord),
            ResourceKind::IamUser => Some(ResourceKind::AccessKey),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown resource kind: {}", s))
    }
}

/// The provider's current view of one resource, produced by a fetch
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    pub identity: String,
    pub properties: Properties,
    pub tags: Tags,
    pub parent_identity: Option<String>,
}

impl RemoteRecord {
    pub fn new(identity: impl Into<String>, properties: Properties) -> Self {
        Self {
            identity: identity.into(),
            properties,
            tags: Tags::new(),
            parent_identity: None,
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_parent(mut self, parent_identity: impl Into<String>) -> Self {
        self.parent_identity = Some(parent_identity.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }
}

/// A resource as recorded in the inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub identity: String,

    pub kind: ResourceKind,

    pub account_id: String,

    pub properties: Properties,

    #[serde(default)]
    pub tags: Tags,

    /// Identity of the owning record for child kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_identity: Option<String>,

    /// Child records, populated on lookup; never serialized with the parent
    #[serde(skip)]
    pub children: Vec<StoredRecord>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn new(kind: ResourceKind, account_id: impl Into<String>, remote: RemoteRecord) -> Self {
        let now = Utc::now();
        Self {
            identity: remote.identity,
            kind,
            account_id: account_id.into(),
            properties: remote.properties,
            tags: remote.tags,
            parent_identity: remote.parent_identity,
            children: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Storage key, unique per account
    pub fn key(&self) -> String {
        record_key(&self.account_id, self.kind, &self.identity)
    }

    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    pub fn get_property<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.properties
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Name for log lines: the `name` property when there is one
    pub fn display_name(&self) -> String {
        self.get_property::<String>("name")
            .unwrap_or_else(|| self.identity.clone())
    }

    /// Copy without the child collection, as it is written to storage
    pub fn detached(&self) -> Self {
        Self {
            children: Vec::new(),
            ..self.clone()
        }
    }
}

/// Storage key, `account:kind:identity`
///
/// The kind is part of the key because identities are only unique per
/// kind: a bucket may be named like a hashed zone identity.
pub fn record_key(account_id: &str, kind: ResourceKind, identity: &str) -> String {
    format!("{}:{}:{}", account_id, kind, identity)
}
