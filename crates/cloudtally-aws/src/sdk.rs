//! AWS SDK backed implementations of the provider API traits

use crate::api::{
    AccessKeyMetadata, ApiResult, Bucket, CloudFrontApi, DistributionSummary, GeoLocation,
    HostedZone, IamApi, Origin, OriginKind, RecordCursor, ResourceRecordSet, Route53Api, S3Api,
    StreamingDistributionSummary, User, WebsiteConfiguration,
};
use crate::error::{classify, missing};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::primitives::DateTime as SmithyDateTime;
use chrono::{DateTime, Utc};
use cloudtally_core::{Page, Tags};
use std::collections::HashMap;
use tokio::sync::Mutex;

fn to_utc(value: &SmithyDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

/// SDK configuration for one account, shared by all service clients
#[derive(Debug, Clone)]
pub struct AwsClients {
    config: SdkConfig,
}

impl AwsClients {
    /// Resolve credentials and region the standard way, optionally from a
    /// named profile
    pub async fn load(profile: Option<&str>, region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let config = loader.load().await;

        tracing::debug!(
            "Loaded AWS configuration (profile: {}, region: {})",
            profile.unwrap_or("default"),
            config.region().map(|r| r.as_ref()).unwrap_or("unset")
        );
        Self { config }
    }

    pub fn from_config(config: SdkConfig) -> Self {
        Self { config }
    }

    pub fn route53(&self) -> SdkRoute53 {
        SdkRoute53 {
            client: aws_sdk_route53::Client::new(&self.config),
        }
    }

    pub fn s3(&self) -> SdkS3 {
        SdkS3 {
            client: aws_sdk_s3::Client::new(&self.config),
            config: self.config.clone(),
            regional: Mutex::new(HashMap::new()),
        }
    }

    pub fn cloudfront(&self) -> SdkCloudFront {
        SdkCloudFront {
            client: aws_sdk_cloudfront::Client::new(&self.config),
        }
    }

    pub fn iam(&self) -> SdkIam {
        SdkIam {
            client: aws_sdk_iam::Client::new(&self.config),
        }
    }
}

pub struct SdkRoute53 {
    client: aws_sdk_route53::Client,
}

fn record_set(set: &aws_sdk_route53::types::ResourceRecordSet) -> ResourceRecordSet {
    ResourceRecordSet {
        name: set.name().to_string(),
        record_type: set.r#type().as_str().to_string(),
        weight: set.weight(),
        region: set.region().map(|r| r.as_str().to_string()),
        geo_location: set.geo_location().map(|geo| GeoLocation {
            continent_code: geo.continent_code().map(str::to_string),
            country_code: geo.country_code().map(str::to_string),
            subdivision_code: geo.subdivision_code().map(str::to_string),
        }),
        failover: set.failover().map(|f| f.as_str().to_string()),
        ttl: set.ttl(),
        values: set
            .resource_records()
            .iter()
            .map(|r| r.value().to_string())
            .collect(),
        alias_target: set.alias_target().map(|a| a.dns_name().to_string()),
        health_check_id: set.health_check_id().map(str::to_string),
        traffic_policy_instance_id: set.traffic_policy_instance_id().map(str::to_string),
    }
}

#[async_trait]
impl Route53Api for SdkRoute53 {
    async fn list_hosted_zones(
        &self,
        marker: Option<String>,
    ) -> ApiResult<Page<HostedZone, String>> {
        let output = self
            .client
            .list_hosted_zones()
            .set_marker(marker)
            .send()
            .await
            .map_err(|e| classify("route53", e))?;

        let items = output
            .hosted_zones()
            .iter()
            .map(|zone| HostedZone {
                id: zone.id().to_string(),
                name: zone.name().to_string(),
                comment: zone.config().and_then(|c| c.comment()).map(str::to_string),
                private_zone: zone.config().is_some_and(|c| c.private_zone()),
            })
            .collect();

        Ok(Page {
            is_truncated: output.is_truncated(),
            next_token: output.next_marker().map(str::to_string),
            items,
        })
    }

    async fn list_zone_tags(&self, zone_id: &str) -> ApiResult<Tags> {
        // Tagging wants the bare id, without the /hostedzone/ prefix
        let resource_id = zone_id.rsplit('/').next().unwrap_or(zone_id);
        let output = self
            .client
            .list_tags_for_resource()
            .resource_type(aws_sdk_route53::types::TagResourceType::Hostedzone)
            .resource_id(resource_id)
            .send()
            .await
            .map_err(|e| classify("route53", e))?;

        Ok(output
            .resource_tag_set()
            .map(|set| {
                set.tags()
                    .iter()
                    .filter_map(|tag| {
                        let key = tag.key()?;
                        Some((key.to_string(), tag.value().unwrap_or_default().to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_record_sets(
        &self,
        zone_id: &str,
        start: Option<RecordCursor>,
    ) -> ApiResult<Page<ResourceRecordSet, RecordCursor>> {
        let mut request = self.client.list_resource_record_sets().hosted_zone_id(zone_id);
        if let Some(start) = start {
            request = request
                .start_record_name(start.name)
                .start_record_type(aws_sdk_route53::types::RrType::from(start.record_type.as_str()))
                .set_start_record_identifier(start.identifier);
        }
        let output = request.send().await.map_err(|e| classify("route53", e))?;

        let next_token = match (output.next_record_name(), output.next_record_type()) {
            (Some(name), Some(record_type)) => Some(RecordCursor {
                name: name.to_string(),
                record_type: record_type.as_str().to_string(),
                identifier: output.next_record_identifier().map(str::to_string),
            }),
            _ => None,
        };

        Ok(Page {
            is_truncated: output.is_truncated(),
            next_token,
            items: output.resource_record_sets().iter().map(record_set).collect(),
        })
    }
}

pub struct SdkS3 {
    client: aws_sdk_s3::Client,
    config: SdkConfig,
    regional: Mutex<HashMap<String, aws_sdk_s3::Client>>,
}

impl SdkS3 {
    /// Client pinned to `region`, or the default client
    async fn client_for(&self, region: Option<&str>) -> aws_sdk_s3::Client {
        let Some(region) = region else {
            return self.client.clone();
        };
        if self.config.region().map(|r| r.as_ref()) == Some(region) {
            return self.client.clone();
        }

        let mut regional = self.regional.lock().await;
        regional
            .entry(region.to_string())
            .or_insert_with(|| {
                let config = aws_sdk_s3::config::Builder::from(&self.config)
                    .region(Region::new(region.to_string()))
                    .build();
                aws_sdk_s3::Client::from_conf(config)
            })
            .clone()
    }
}

#[async_trait]
impl S3Api for SdkS3 {
    async fn list_buckets(&self, token: Option<String>) -> ApiResult<Page<Bucket, String>> {
        let output = self
            .client
            .list_buckets()
            .set_continuation_token(token)
            .send()
            .await
            .map_err(|e| classify("s3", e))?;

        let items = output
            .buckets()
            .iter()
            .filter_map(|bucket| {
                bucket.name().map(|name| Bucket {
                    name: name.to_string(),
                })
            })
            .collect();
        let next_token = output.continuation_token().map(str::to_string);

        Ok(Page {
            is_truncated: next_token.is_some(),
            next_token,
            items,
        })
    }

    async fn bucket_location(&self, bucket: &str) -> ApiResult<Option<String>> {
        let output = self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify("s3", e))?;

        Ok(output
            .location_constraint()
            .map(|c| c.as_str().to_string())
            .filter(|c| !c.is_empty()))
    }

    async fn bucket_website(
        &self,
        bucket: &str,
        region: Option<&str>,
    ) -> ApiResult<WebsiteConfiguration> {
        let output = self
            .client_for(region)
            .await
            .get_bucket_website()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify("s3", e))?;

        Ok(WebsiteConfiguration {
            index_document: output.index_document().map(|d| d.suffix().to_string()),
        })
    }

    async fn bucket_tags(&self, bucket: &str, region: Option<&str>) -> ApiResult<Tags> {
        let output = self
            .client_for(region)
            .await
            .get_bucket_tagging()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify("s3", e))?;

        Ok(output
            .tag_set()
            .iter()
            .map(|tag| (tag.key().to_string(), tag.value().to_string()))
            .collect())
    }
}

pub struct SdkCloudFront {
    client: aws_sdk_cloudfront::Client,
}

fn origin(origin: &aws_sdk_cloudfront::types::Origin) -> Origin {
    let kind = if origin.s3_origin_config().is_some() {
        OriginKind::S3
    } else if origin.custom_origin_config().is_some() {
        OriginKind::Custom
    } else {
        OriginKind::Other
    };
    Origin {
        domain_name: origin.domain_name().to_string(),
        kind,
    }
}

#[async_trait]
impl CloudFrontApi for SdkCloudFront {
    async fn list_distributions(
        &self,
        marker: Option<String>,
    ) -> ApiResult<Page<DistributionSummary, String>> {
        let output = self
            .client
            .list_distributions()
            .set_marker(marker)
            .send()
            .await
            .map_err(|e| classify("cloudfront", e))?;
        let list = output
            .distribution_list()
            .ok_or_else(|| missing("cloudfront", "DistributionList"))?;

        let items = list
            .items()
            .iter()
            .map(|dist| DistributionSummary {
                arn: dist.arn().to_string(),
                domain_name: dist.domain_name().to_string(),
                enabled: dist.enabled(),
                origins: dist
                    .origins()
                    .map(|o| o.items().iter().map(origin).collect())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(Page {
            is_truncated: list.is_truncated(),
            next_token: list.next_marker().map(str::to_string),
            items,
        })
    }

    async fn list_streaming_distributions(
        &self,
        marker: Option<String>,
    ) -> ApiResult<Page<StreamingDistributionSummary, String>> {
        let output = self
            .client
            .list_streaming_distributions()
            .set_marker(marker)
            .send()
            .await
            .map_err(|e| classify("cloudfront", e))?;
        let list = output
            .streaming_distribution_list()
            .ok_or_else(|| missing("cloudfront", "StreamingDistributionList"))?;

        let items = list
            .items()
            .iter()
            .map(|dist| StreamingDistributionSummary {
                arn: dist.arn().to_string(),
                domain_name: dist.domain_name().to_string(),
                enabled: dist.enabled(),
                s3_origin: dist
                    .s3_origin()
                    .map(|o| o.domain_name().to_string())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(Page {
            is_truncated: list.is_truncated(),
            next_token: list.next_marker().map(str::to_string),
            items,
        })
    }

    async fn distribution_tags(&self, arn: &str) -> ApiResult<Tags> {
        let output = self
            .client
            .list_tags_for_resource()
            .resource(arn)
            .send()
            .await
            .map_err(|e| classify("cloudfront", e))?;

        Ok(output
            .tags()
            .map(|tags| {
                tags.items()
                    .iter()
                    .map(|tag| (tag.key().to_string(), tag.value().unwrap_or_default().to_string()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub struct SdkIam {
    client: aws_sdk_iam::Client,
}

#[async_trait]
impl IamApi for SdkIam {
    async fn list_users(&self, marker: Option<String>) -> ApiResult<Page<User, String>> {
        let output = self
            .client
            .list_users()
            .set_marker(marker)
            .send()
            .await
            .map_err(|e| classify("iam", e))?;

        let items = output
            .users()
            .iter()
            .map(|user| {
                Ok(User {
                    name: user.user_name().to_string(),
                    arn: user.arn().to_string(),
                    path: user.path().to_string(),
                    create_date: to_utc(user.create_date())
                        .ok_or_else(|| missing("iam", "a valid CreateDate"))?,
                })
            })
            .collect::<ApiResult<Vec<_>>>()?;

        Ok(Page {
            is_truncated: output.is_truncated(),
            next_token: output.marker().map(str::to_string),
            items,
        })
    }

    async fn user_tags(&self, user_name: &str) -> ApiResult<Tags> {
        let mut tags = Tags::new();
        let mut marker = None;

        loop {
            let output = self
                .client
                .list_user_tags()
                .user_name(user_name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| classify("iam", e))?;
            tags.extend(
                output
                    .tags()
                    .iter()
                    .map(|tag| (tag.key().to_string(), tag.value().to_string())),
            );

            if !output.is_truncated() {
                return Ok(tags);
            }
            match output.marker() {
                Some(next) => marker = Some(next.to_string()),
                None => return Err(missing("iam", "Marker on a truncated ListUserTags page")),
            }
        }
    }

    async fn get_login_profile(&self, user_name: &str) -> ApiResult<()> {
        self.client
            .get_login_profile()
            .user_name(user_name)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify("iam", e))
    }

    async fn list_access_keys(
        &self,
        user_name: &str,
        marker: Option<String>,
    ) -> ApiResult<Page<AccessKeyMetadata, String>> {
        let output = self
            .client
            .list_access_keys()
            .user_name(user_name)
            .set_marker(marker)
            .send()
            .await
            .map_err(|e| classify("iam", e))?;

        let items = output
            .access_key_metadata()
            .iter()
            .filter_map(|key| {
                key.access_key_id().map(|id| AccessKeyMetadata {
                    access_key_id: id.to_string(),
                    status: key.status().map(|s| s.as_str().to_string()),
                    create_date: key.create_date().and_then(to_utc),
                })
            })
            .collect();

        Ok(Page {
            is_truncated: output.is_truncated(),
            next_token: output.marker().map(str::to_string),
            items,
        })
    }

    async fn access_key_last_used(&self, access_key_id: &str) -> ApiResult<Option<DateTime<Utc>>> {
        let output = self
            .client
            .get_access_key_last_used()
            .access_key_id(access_key_id)
            .send()
            .await
            .map_err(|e| classify("iam", e))?;

        Ok(output
            .access_key_last_used()
            .and_then(|used| used.last_used_date())
            .and_then(to_utc))
    }
}
