//! Content-addressed resource identifiers
//!
//! Providers do not always hand out a primary key we can store. A Route53
//! resource record set, for instance, is only unique by the combination of
//! its name, type and routing policy. [`resource_id`] hashes such a
//! combination into a short identifier that is stable across polls.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Number of hex characters kept from the digest
const HASH_LENGTH: usize = 16;

/// Separates encoded fields in the hash input
const FIELD_SEPARATOR: u8 = 0x1f;

/// Hash input for a field the provider did not return
const ABSENT_SENTINEL: &str = "0";

/// Namespace tags used as identifier prefixes
pub mod namespace {
    pub const DNS_ZONE: &str = "r53z";
    pub const DNS_RECORD: &str = "r53r";
    pub const CLOUDFRONT_DISTRIBUTION: &str = "cfd";
    pub const IAM_USER: &str = "iamuser";
}

/// One identity-relevant field extracted from a raw provider object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityField {
    Text(String),
    Integer(i64),
    /// Nested object, flattened to `key=value` pairs before hashing
    Structured(BTreeMap<String, String>),
    /// Field not present on the raw object; hashes like the integer `0`
    Absent,
}

impl IdentityField {
    /// Canonical string fed into the digest
    fn canonical(&self) -> String {
        match self {
            IdentityField::Text(value) => value.clone(),
            IdentityField::Integer(value) => value.to_string(),
            IdentityField::Structured(fields) => fields
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect::<Vec<_>>()
                .join(":"),
            IdentityField::Absent => ABSENT_SENTINEL.to_string(),
        }
    }
}

impl From<&str> for IdentityField {
    fn from(value: &str) -> Self {
        IdentityField::Text(value.to_string())
    }
}

impl From<String> for IdentityField {
    fn from(value: String) -> Self {
        IdentityField::Text(value)
    }
}

impl From<i64> for IdentityField {
    fn from(value: i64) -> Self {
        IdentityField::Integer(value)
    }
}

impl<T: Into<IdentityField>> From<Option<T>> for IdentityField {
    fn from(value: Option<T>) -> Self {
        value.map_or(IdentityField::Absent, Into::into)
    }
}

impl From<BTreeMap<String, String>> for IdentityField {
    fn from(value: BTreeMap<String, String>) -> Self {
        IdentityField::Structured(value)
    }
}

/// Derive a namespaced identifier from an ordered list of fields
///
/// The result looks like `r53r-3f2a9c01d4e5b6a7`. Field order matters, so
/// callers must always pass the same fields in the same positions.
pub fn resource_id(namespace: &str, fields: &[IdentityField]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    for field in fields {
        hasher.update([FIELD_SEPARATOR]);
        hasher.update(field.canonical().as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    format!("{}-{}", namespace, &digest[..HASH_LENGTH])
}

/// Identifier for a resource whose only stable key is a single provider id,
/// such as an ARN
pub fn resource_id_for(namespace: &str, key: &str) -> String {
    resource_id(namespace, &[IdentityField::from(key)])
}
