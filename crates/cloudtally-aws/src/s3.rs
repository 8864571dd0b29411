//! S3 buckets

use crate::api::{Bucket, S3Api, codes};
use async_trait::async_trait;
use cloudtally_core::{
    Account, Collector, Page, PageSource, PassReport, Properties, ReconciliationLoop,
    RemoteRecord, ResourceKind, Result, Scope, Session, Tags, fetch_all,
};
use serde_json::{Value, json};

/// Region of buckets without a location constraint
const DEFAULT_REGION: &str = "us-east-1";

/// Stored location when the lookup failed
const UNAVAILABLE: &str = "Unavailable";

struct BucketSource<'a, A: ?Sized> {
    api: &'a A,
    account_name: &'a str,
}

impl<'a, A: S3Api + ?Sized> BucketSource<'a, A> {
    async fn location(&self, bucket: &str) -> Result<String> {
        match self.api.bucket_location(bucket).await {
            Ok(None) => Ok(DEFAULT_REGION.to_string()),
            // Legacy constraint of buckets created in eu-west-1
            Ok(Some(constraint)) if constraint == "EU" => Ok("eu-west-1".to_string()),
            Ok(Some(constraint)) => Ok(constraint),
            Err(err) if err.is_transient() => Err(err.into()),
            Err(err) => {
                tracing::warn!(
                    "Failed getting bucket location for {}/{}: {}",
                    self.account_name,
                    bucket,
                    err
                );
                Ok(UNAVAILABLE.to_string())
            }
        }
    }

    async fn website_enabled(&self, bucket: &str, region: Option<&str>) -> Result<Value> {
        match self.api.bucket_website(bucket, region).await {
            Ok(website) => Ok(json!(website.index_document.is_some())),
            Err(err) if err.is_code(codes::NO_SUCH_WEBSITE_CONFIGURATION) => Ok(json!(false)),
            Err(err) if err.is_code(codes::ACCESS_DENIED) => {
                tracing::debug!(
                    "Bucket policy prevents reading website configuration of {}/{}",
                    self.account_name,
                    bucket
                );
                Ok(Value::Null)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn tags(&self, bucket: &str, region: Option<&str>) -> Result<Tags> {
        match self.api.bucket_tags(bucket, region).await {
            Ok(tags) => Ok(tags),
            Err(err)
                if err.is_code(codes::NO_SUCH_TAG_SET) || err.is_code(codes::ACCESS_DENIED) =>
            {
                Ok(Tags::new())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl<'a, A: S3Api + ?Sized> PageSource for BucketSource<'a, A> {
    type Token = String;
    type Item = Bucket;

    fn name(&self) -> &str {
        "s3 buckets"
    }

    async fn fetch_page(&mut self, token: Option<String>) -> Result<Page<Bucket, String>> {
        Ok(self.api.list_buckets(token).await?)
    }

    async fn normalize(&mut self, bucket: Bucket) -> Result<RemoteRecord> {
        let location = self.location(&bucket.name).await?;
        let region = (location != UNAVAILABLE).then_some(location.as_str());
        let website_enabled = self.website_enabled(&bucket.name, region).await?;
        let tags = self.tags(&bucket.name, region).await?;

        let mut properties = Properties::new();
        properties.insert("location".to_string(), json!(location));
        properties.insert("website_enabled".to_string(), website_enabled);

        Ok(RemoteRecord::new(bucket.name, properties).with_tags(tags))
    }
}

/// Collects the buckets of an account
pub struct S3Collector<A> {
    api: A,
    account: Account,
}

impl<A: S3Api> S3Collector<A> {
    pub fn new(api: A, account: Account) -> Self {
        Self { api, account }
    }
}

#[async_trait]
impl<A: S3Api> Collector for S3Collector<A> {
    fn name(&self) -> &str {
        "s3"
    }

    fn family(&self) -> ResourceKind {
        ResourceKind::S3Bucket
    }

    fn account(&self) -> &Account {
        &self.account
    }

    async fn collect(&self, session: &mut dyn Session) -> Result<PassReport> {
        tracing::debug!("Updating S3 buckets for {}", self.account.name);

        let mut buckets = BucketSource {
            api: &self.api,
            account_name: &self.account.name,
        };
        let scope = Scope::family(&self.account.account_id, ResourceKind::S3Bucket);

        ReconciliationLoop::new(session, scope)
            .run(fetch_all(&mut buckets))
            .await
    }
}
