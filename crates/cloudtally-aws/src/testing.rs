//! In-memory provider fakes for collector tests

use crate::api::{
    AccessKeyMetadata, ApiResult, Bucket, CloudFrontApi, DistributionSummary, HostedZone,
    IamApi, RecordCursor, ResourceRecordSet, Route53Api, S3Api, StreamingDistributionSummary,
    User, WebsiteConfiguration, codes,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cloudtally_core::{Account, Page, ProviderError, Tags};
use std::collections::HashMap;

pub fn account() -> Account {
    Account::new("prod", "123456789012")
}

pub fn timestamp(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
}

pub fn zone(id: &str, name: &str) -> HostedZone {
    HostedZone {
        id: id.to_string(),
        name: name.to_string(),
        comment: None,
        private_zone: false,
    }
}

pub fn a_record(name: &str, values: &[&str]) -> ResourceRecordSet {
    ResourceRecordSet {
        name: name.to_string(),
        record_type: "A".to_string(),
        ttl: Some(300),
        values: values.iter().map(|v| v.to_string()).collect(),
        ..ResourceRecordSet::default()
    }
}

pub fn api_error(code: &str) -> ProviderError {
    ProviderError::api("fake", code, format!("{} raised by fake", code))
}

/// Page `index` of `pages`, with the next index as token
fn page_at<T: Clone>(pages: &[Vec<T>], index: usize) -> Page<T, usize> {
    let items = pages.get(index).cloned().unwrap_or_default();
    if index + 1 < pages.len() {
        Page::truncated(items, index + 1)
    } else {
        Page::last(items)
    }
}

fn with_string_token<T>(page: Page<T, usize>) -> Page<T, String> {
    Page {
        is_truncated: page.is_truncated,
        next_token: page.next_token.map(|t| t.to_string()),
        items: page.items,
    }
}

fn index_of(token: Option<String>) -> usize {
    token.and_then(|t| t.parse().ok()).unwrap_or(0)
}

#[derive(Default)]
pub struct FakeRoute53 {
    pub zone_pages: Vec<Vec<HostedZone>>,
    pub tags: HashMap<String, Tags>,
    /// Record set pages keyed by hosted zone id
    pub record_pages: HashMap<String, Vec<Vec<ResourceRecordSet>>>,
}

#[async_trait]
impl Route53Api for FakeRoute53 {
    async fn list_hosted_zones(
        &self,
        marker: Option<String>,
    ) -> ApiResult<Page<HostedZone, String>> {
        Ok(with_string_token(page_at(&self.zone_pages, index_of(marker))))
    }

    async fn list_zone_tags(&self, zone_id: &str) -> ApiResult<Tags> {
        Ok(self.tags.get(zone_id).cloned().unwrap_or_default())
    }

    async fn list_record_sets(
        &self,
        zone_id: &str,
        start: Option<RecordCursor>,
    ) -> ApiResult<Page<ResourceRecordSet, RecordCursor>> {
        let pages = self.record_pages.get(zone_id).map(Vec::as_slice).unwrap_or_default();
        let page = page_at(pages, index_of(start.map(|cursor| cursor.name)));
        Ok(Page {
            is_truncated: page.is_truncated,
            next_token: page.next_token.map(|index| RecordCursor {
                name: index.to_string(),
                record_type: "A".to_string(),
                identifier: None,
            }),
            items: page.items,
        })
    }
}

/// Outcome of a fake per-bucket lookup
#[derive(Clone)]
pub enum Lookup<T> {
    Ok(T),
    Fail(&'static str),
}

impl<T: Clone> Lookup<T> {
    fn result(&self) -> ApiResult<T> {
        match self {
            Lookup::Ok(value) => Ok(value.clone()),
            Lookup::Fail(code) => Err(api_error(code)),
        }
    }
}

#[derive(Clone)]
pub struct FakeBucket {
    pub name: String,
    pub location: Lookup<Option<String>>,
    pub website: Lookup<WebsiteConfiguration>,
    pub tags: Lookup<Tags>,
}

impl FakeBucket {
    /// Bucket in us-east-1 without website or tags configured
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            location: Lookup::Ok(None),
            website: Lookup::Fail(codes::NO_SUCH_WEBSITE_CONFIGURATION),
            tags: Lookup::Fail(codes::NO_SUCH_TAG_SET),
        }
    }
}

#[derive(Default)]
pub struct FakeS3 {
    pub bucket_pages: Vec<Vec<FakeBucket>>,
    /// Regions passed to the per-bucket lookups, in call order
    pub regions_seen: std::sync::Mutex<Vec<Option<String>>>,
}

impl FakeS3 {
    pub fn with_buckets(buckets: Vec<FakeBucket>) -> Self {
        Self {
            bucket_pages: vec![buckets],
            ..Self::default()
        }
    }

    fn bucket(&self, name: &str) -> ApiResult<&FakeBucket> {
        self.bucket_pages
            .iter()
            .flatten()
            .find(|b| b.name == name)
            .ok_or_else(|| api_error("NoSuchBucket"))
    }
}

#[async_trait]
impl S3Api for FakeS3 {
    async fn list_buckets(&self, token: Option<String>) -> ApiResult<Page<Bucket, String>> {
        let page = page_at(&self.bucket_pages, index_of(token));
        Ok(with_string_token(Page {
            is_truncated: page.is_truncated,
            next_token: page.next_token,
            items: page
                .items
                .into_iter()
                .map(|b| Bucket { name: b.name })
                .collect(),
        }))
    }

    async fn bucket_location(&self, bucket: &str) -> ApiResult<Option<String>> {
        self.bucket(bucket)?.location.result()
    }

    async fn bucket_website(
        &self,
        bucket: &str,
        region: Option<&str>,
    ) -> ApiResult<WebsiteConfiguration> {
        if let Ok(mut seen) = self.regions_seen.lock() {
            seen.push(region.map(str::to_string));
        }
        self.bucket(bucket)?.website.result()
    }

    async fn bucket_tags(&self, bucket: &str, _region: Option<&str>) -> ApiResult<Tags> {
        self.bucket(bucket)?.tags.result()
    }
}

#[derive(Default)]
pub struct FakeCloudFront {
    pub web_pages: Vec<Vec<DistributionSummary>>,
    pub streaming_pages: Vec<Vec<StreamingDistributionSummary>>,
    /// Tags keyed by distribution ARN
    pub tags: HashMap<String, Tags>,
}

#[async_trait]
impl CloudFrontApi for FakeCloudFront {
    async fn list_distributions(
        &self,
        marker: Option<String>,
    ) -> ApiResult<Page<DistributionSummary, String>> {
        Ok(with_string_token(page_at(&self.web_pages, index_of(marker))))
    }

    async fn list_streaming_distributions(
        &self,
        marker: Option<String>,
    ) -> ApiResult<Page<StreamingDistributionSummary, String>> {
        Ok(with_string_token(page_at(&self.streaming_pages, index_of(marker))))
    }

    async fn distribution_tags(&self, arn: &str) -> ApiResult<Tags> {
        Ok(self.tags.get(arn).cloned().unwrap_or_default())
    }
}

#[derive(Clone)]
pub struct FakeUser {
    pub user: User,
    pub tags: Tags,
    pub login_profile: Lookup<()>,
    pub keys: Vec<AccessKeyMetadata>,
}

impl FakeUser {
    /// User without password, tags or keys
    pub fn new(name: &str) -> Self {
        Self {
            user: User {
                name: name.to_string(),
                arn: format!("arn:aws:iam::123456789012:user/{}", name),
                path: "/".to_string(),
                create_date: timestamp(1),
            },
            tags: Tags::new(),
            login_profile: Lookup::Fail(codes::NO_SUCH_ENTITY),
            keys: Vec::new(),
        }
    }

    pub fn with_key(mut self, id: &str, status: &str) -> Self {
        self.keys.push(AccessKeyMetadata {
            access_key_id: id.to_string(),
            status: Some(status.to_string()),
            create_date: Some(timestamp(2)),
        });
        self
    }
}

#[derive(Default)]
pub struct FakeIam {
    pub user_pages: Vec<Vec<FakeUser>>,
    /// Last use per access key id; missing means never used
    pub last_used: HashMap<String, DateTime<Utc>>,
}

impl FakeIam {
    pub fn with_users(users: Vec<FakeUser>) -> Self {
        Self {
            user_pages: vec![users],
            ..Self::default()
        }
    }

    fn user(&self, name: &str) -> ApiResult<&FakeUser> {
        self.user_pages
            .iter()
            .flatten()
            .find(|u| u.user.name == name)
            .ok_or_else(|| api_error(codes::NO_SUCH_ENTITY))
    }
}

#[async_trait]
impl IamApi for FakeIam {
    async fn list_users(&self, marker: Option<String>) -> ApiResult<Page<User, String>> {
        let page = page_at(&self.user_pages, index_of(marker));
        Ok(with_string_token(Page {
            is_truncated: page.is_truncated,
            next_token: page.next_token,
            items: page.items.into_iter().map(|u| u.user).collect(),
        }))
    }

    async fn user_tags(&self, user_name: &str) -> ApiResult<Tags> {
        Ok(self.user(user_name)?.tags.clone())
    }

    async fn get_login_profile(&self, user_name: &str) -> ApiResult<()> {
        self.user(user_name)?.login_profile.result()
    }

    async fn list_access_keys(
        &self,
        user_name: &str,
        _marker: Option<String>,
    ) -> ApiResult<Page<AccessKeyMetadata, String>> {
        Ok(Page::last(self.user(user_name)?.keys.clone()))
    }

    async fn access_key_last_used(&self, access_key_id: &str) -> ApiResult<Option<DateTime<Utc>>> {
        Ok(self.last_used.get(access_key_id).copied())
    }
}
