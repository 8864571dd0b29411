//! CloudFront web and streaming distributions

use crate::api::{
    CloudFrontApi, DistributionSummary, Origin, OriginKind, StreamingDistributionSummary,
};
use async_trait::async_trait;
use cloudtally_core::{
    Account, Collector, Page, PageSource, PassReport, Properties, ReconciliationLoop,
    RemoteRecord, RemoteSet, ResourceKind, Result, Scope, Session, Tags, drain_into, namespace,
    resource_id_for,
};
use serde_json::{Value, json};

fn origin_value(kind: &str, source: &str) -> Value {
    json!({ "type": kind, "source": source })
}

fn origins(origins: &[Origin]) -> Vec<Value> {
    origins
        .iter()
        .filter_map(|origin| match origin.kind {
            OriginKind::S3 => Some(origin_value("s3", &origin.domain_name)),
            OriginKind::Custom => Some(origin_value("custom-http", &origin.domain_name)),
            OriginKind::Other => None,
        })
        .collect()
}

fn distribution(
    arn: &str,
    domain_name: &str,
    origins: Vec<Value>,
    enabled: bool,
    kind: &str,
    tags: Tags,
) -> RemoteRecord {
    let mut properties = Properties::new();
    properties.insert("arn".to_string(), json!(arn));
    properties.insert("domain_name".to_string(), json!(domain_name));
    properties.insert("origins".to_string(), Value::Array(origins));
    properties.insert("enabled".to_string(), json!(enabled));
    properties.insert("type".to_string(), json!(kind));

    RemoteRecord::new(resource_id_for(namespace::CLOUDFRONT_DISTRIBUTION, arn), properties)
        .with_tags(tags)
}

struct WebDistributions<'a, A: ?Sized> {
    api: &'a A,
}

#[async_trait]
impl<'a, A: CloudFrontApi + ?Sized> PageSource for WebDistributions<'a, A> {
    type Token = String;
    type Item = DistributionSummary;

    fn name(&self) -> &str {
        "cloudfront distributions"
    }

    async fn fetch_page(
        &mut self,
        marker: Option<String>,
    ) -> Result<Page<DistributionSummary, String>> {
        Ok(self.api.list_distributions(marker).await?)
    }

    async fn normalize(&mut self, dist: DistributionSummary) -> Result<RemoteRecord> {
        let tags = self.api.distribution_tags(&dist.arn).await?;
        Ok(distribution(
            &dist.arn,
            &dist.domain_name,
            origins(&dist.origins),
            dist.enabled,
            "web",
            tags,
        ))
    }
}

struct StreamingDistributions<'a, A: ?Sized> {
    api: &'a A,
}

#[async_trait]
impl<'a, A: CloudFrontApi + ?Sized> PageSource for StreamingDistributions<'a, A> {
    type Token = String;
    type Item = StreamingDistributionSummary;

    fn name(&self) -> &str {
        "cloudfront streaming distributions"
    }

    async fn fetch_page(
        &mut self,
        marker: Option<String>,
    ) -> Result<Page<StreamingDistributionSummary, String>> {
        Ok(self.api.list_streaming_distributions(marker).await?)
    }

    async fn normalize(&mut self, dist: StreamingDistributionSummary) -> Result<RemoteRecord> {
        let tags = self.api.distribution_tags(&dist.arn).await?;
        Ok(distribution(
            &dist.arn,
            &dist.domain_name,
            vec![origin_value("s3", &dist.s3_origin)],
            dist.enabled,
            "rtmp",
            tags,
        ))
    }
}

/// Collects web and streaming distributions as one family
pub struct CloudFrontCollector<A> {
    api: A,
    account: Account,
}

impl<A: CloudFrontApi> CloudFrontCollector<A> {
    pub fn new(api: A, account: Account) -> Self {
        Self { api, account }
    }

    async fn fetch(&self) -> Result<RemoteSet> {
        let mut distributions = RemoteSet::new();
        drain_into(&mut WebDistributions { api: &self.api }, &mut distributions).await?;
        drain_into(&mut StreamingDistributions { api: &self.api }, &mut distributions).await?;
        Ok(distributions)
    }
}

#[async_trait]
impl<A: CloudFrontApi> Collector for CloudFrontCollector<A> {
    fn name(&self) -> &str {
        "cloudfront"
    }

    fn family(&self) -> ResourceKind {
        ResourceKind::CloudfrontDistribution
    }

    fn account(&self) -> &Account {
        &self.account
    }

    async fn collect(&self, session: &mut dyn Session) -> Result<PassReport> {
        tracing::debug!("Updating CloudFront distributions for {}", self.account.name);

        let scope = Scope::family(&self.account.account_id, ResourceKind::CloudfrontDistribution);
        ReconciliationLoop::new(session, scope).run(self.fetch()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCloudFront, account};
    use cloudtally_core::{MemoryStore, Store};
    use std::collections::HashMap;

    fn web(id: &str, enabled: bool) -> DistributionSummary {
        DistributionSummary {
            arn: format!("arn:aws:cloudfront::123456789012:distribution/{}", id),
            domain_name: format!("{}.cloudfront.net", id.to_lowercase()),
            enabled,
            origins: vec![
                Origin {
                    domain_name: "assets.s3.amazonaws.com".to_string(),
                    kind: OriginKind::S3,
                },
                Origin {
                    domain_name: "app.example.com".to_string(),
                    kind: OriginKind::Custom,
                },
            ],
        }
    }

    fn streaming(id: &str) -> StreamingDistributionSummary {
        StreamingDistributionSummary {
            arn: format!("arn:aws:cloudfront::123456789012:streaming-distribution/{}", id),
            domain_name: format!("s{}.cloudfront.net", id.to_lowercase()),
            enabled: true,
            s3_origin: "media.s3.amazonaws.com".to_string(),
        }
    }

    async fn collect(store: &MemoryStore, api: FakeCloudFront) -> PassReport {
        let collector = CloudFrontCollector::new(api, account());
        let mut session = store.begin().await.unwrap();
        collector.collect(session.as_mut()).await.unwrap()
    }

    #[tokio::test]
    async fn test_web_and_streaming_share_one_family() {
        let store = MemoryStore::new();
        let arn = web("E1", true).arn;
        let api = FakeCloudFront {
            web_pages: vec![vec![web("E1", true)], vec![web("E2", false)]],
            streaming_pages: vec![vec![streaming("S1")]],
            tags: HashMap::from([(
                arn.clone(),
                Tags::from([("env".to_string(), "prod".to_string())]),
            )]),
        };

        let report = collect(&store, api).await;

        assert_eq!(report.summary().created, 3);
        let inventory = store.snapshot().unwrap();
        let id = resource_id_for(namespace::CLOUDFRONT_DISTRIBUTION, &arn);
        let stored = inventory
            .get(&format!("123456789012:cloudfront_distribution:{}", id))
            .unwrap();
        assert_eq!(stored.property("type"), Some(&json!("web")));
        assert_eq!(
            stored.property("origins"),
            Some(&json!([
                {"type": "s3", "source": "assets.s3.amazonaws.com"},
                {"type": "custom-http", "source": "app.example.com"}
            ]))
        );
        assert_eq!(stored.tags.get("env").map(String::as_str), Some("prod"));

        let rtmp = inventory
            .iter()
            .find(|r| r.property("type") == Some(&json!("rtmp")))
            .unwrap();
        assert_eq!(
            rtmp.property("origins"),
            Some(&json!([{"type": "s3", "source": "media.s3.amazonaws.com"}]))
        );
    }

    #[tokio::test]
    async fn test_disabling_a_distribution_is_an_update() {
        let store = MemoryStore::new();
        collect(
            &store,
            FakeCloudFront {
                web_pages: vec![vec![web("E1", true)]],
                ..FakeCloudFront::default()
            },
        )
        .await;

        let report = collect(
            &store,
            FakeCloudFront {
                web_pages: vec![vec![web("E1", false)]],
                ..FakeCloudFront::default()
            },
        )
        .await;

        let summary = report.summary();
        assert_eq!((summary.updated, summary.created, summary.deleted), (1, 0, 0));
    }

    #[tokio::test]
    async fn test_removed_distribution_is_deleted() {
        let store = MemoryStore::new();
        collect(
            &store,
            FakeCloudFront {
                web_pages: vec![vec![web("E1", true)]],
                streaming_pages: vec![vec![streaming("S1")]],
                ..FakeCloudFront::default()
            },
        )
        .await;

        let report = collect(
            &store,
            FakeCloudFront {
                web_pages: vec![vec![web("E1", true)]],
                ..FakeCloudFront::default()
            },
        )
        .await;

        assert_eq!(report.summary().deleted, 1);
        assert_eq!(store.snapshot().unwrap().len(), 1);
    }
}
