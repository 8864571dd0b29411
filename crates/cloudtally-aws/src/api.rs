//! Provider API shapes consumed by the collectors
//!
//! One trait per AWS service, returning raw response types. The SDK-backed
//! implementations live in [`crate::sdk`]; tests substitute in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudtally_core::{Page, ProviderError, Tags};
use std::collections::BTreeMap;

pub type ApiResult<T> = std::result::Result<T, ProviderError>;

/// Provider error codes the collectors degrade on
pub mod codes {
    pub const ACCESS_DENIED: &str = "AccessDenied";
    pub const NO_SUCH_WEBSITE_CONFIGURATION: &str = "NoSuchWebsiteConfiguration";
    pub const NO_SUCH_TAG_SET: &str = "NoSuchTagSet";
    pub const NO_SUCH_ENTITY: &str = "NoSuchEntity";
}

// Route53

#[derive(Debug, Clone, PartialEq)]
pub struct HostedZone {
    /// Hosted zone id as returned by the API, e.g. `/hostedzone/Z123`
    pub id: String,
    pub name: String,
    pub comment: Option<String>,
    pub private_zone: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoLocation {
    pub continent_code: Option<String>,
    pub country_code: Option<String>,
    pub subdivision_code: Option<String>,
}

impl GeoLocation {
    /// Present fields keyed by their API names
    pub fn to_map(&self) -> BTreeMap<String, String> {
        [
            ("ContinentCode", &self.continent_code),
            ("CountryCode", &self.country_code),
            ("SubdivisionCode", &self.subdivision_code),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.clone().map(|v| (key.to_string(), v)))
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceRecordSet {
    /// Record name as returned, with its trailing dot
    pub name: String,
    pub record_type: String,
    pub weight: Option<i64>,
    pub region: Option<String>,
    pub geo_location: Option<GeoLocation>,
    pub failover: Option<String>,
    pub ttl: Option<i64>,
    pub values: Vec<String>,
    /// DNS name of the alias target for alias records
    pub alias_target: Option<String>,
    pub health_check_id: Option<String>,
    pub traffic_policy_instance_id: Option<String>,
}

/// Position to resume a record set listing from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCursor {
    pub name: String,
    pub record_type: String,
    pub identifier: Option<String>,
}

#[async_trait]
pub trait Route53Api: Send + Sync {
    async fn list_hosted_zones(
        &self,
        marker: Option<String>,
    ) -> ApiResult<Page<HostedZone, String>>;

    async fn list_zone_tags(&self, zone_id: &str) -> ApiResult<Tags>;

    async fn list_record_sets(
        &self,
        zone_id: &str,
        start: Option<RecordCursor>,
    ) -> ApiResult<Page<ResourceRecordSet, RecordCursor>>;
}

// S3

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebsiteConfiguration {
    pub index_document: Option<String>,
}

#[async_trait]
pub trait S3Api: Send + Sync {
    async fn list_buckets(&self, token: Option<String>) -> ApiResult<Page<Bucket, String>>;

    /// Location constraint; `None` for buckets in us-east-1
    async fn bucket_location(&self, bucket: &str) -> ApiResult<Option<String>>;

    /// `region` routes the call to the bucket's own region when known
    async fn bucket_website(
        &self,
        bucket: &str,
        region: Option<&str>,
    ) -> ApiResult<WebsiteConfiguration>;

    async fn bucket_tags(&self, bucket: &str, region: Option<&str>) -> ApiResult<Tags>;
}

// CloudFront

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginKind {
    S3,
    Custom,
    /// Origin without either config (e.g. a VPC origin)
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    pub domain_name: String,
    pub kind: OriginKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistributionSummary {
    pub arn: String,
    pub domain_name: String,
    pub enabled: bool,
    pub origins: Vec<Origin>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamingDistributionSummary {
    pub arn: String,
    pub domain_name: String,
    pub enabled: bool,
    /// Domain name of the S3 origin
    pub s3_origin: String,
}

#[async_trait]
pub trait CloudFrontApi: Send + Sync {
    async fn list_distributions(
        &self,
        marker: Option<String>,
    ) -> ApiResult<Page<DistributionSummary, String>>;

    async fn list_streaming_distributions(
        &self,
        marker: Option<String>,
    ) -> ApiResult<Page<StreamingDistributionSummary, String>>;

    async fn distribution_tags(&self, arn: &str) -> ApiResult<Tags>;
}

// IAM

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub name: String,
    pub arn: String,
    pub path: String,
    pub create_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessKeyMetadata {
    pub access_key_id: String,
    pub status: Option<String>,
    pub create_date: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait IamApi: Send + Sync {
    async fn list_users(&self, marker: Option<String>) -> ApiResult<Page<User, String>>;

    async fn user_tags(&self, user_name: &str) -> ApiResult<Tags>;

    /// Succeeds when the user has a console password
    async fn get_login_profile(&self, user_name: &str) -> ApiResult<()>;

    async fn list_access_keys(
        &self,
        user_name: &str,
        marker: Option<String>,
    ) -> ApiResult<Page<AccessKeyMetadata, String>>;

    /// When the key was last used; `None` if never
    async fn access_key_last_used(&self, access_key_id: &str) -> ApiResult<Option<DateTime<Utc>>>;
}
