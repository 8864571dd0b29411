//! Route53 hosted zones and their resource record sets

use crate::api::{HostedZone, RecordCursor, ResourceRecordSet, Route53Api};
use async_trait::async_trait;
use cloudtally_core::{
    Account, ChildSource, Collector, HierarchicalReconciler, IdentityField, Page, PageSource,
    PassReport, Properties, ReconcileError, RemoteRecord, RemoteSet, ResourceKind, Result, Scope,
    Session, StoredRecord, fetch_all, namespace, resource_id, resource_id_for,
};
use serde_json::json;

/// Record type stored for alias record sets
const ALIAS_TYPE: &str = "ALIAS";

/// Identity of a record set within its hosted zone
///
/// Everything that distinguishes two record sets with the same name goes
/// in; the values and TTL do not, so editing them keeps the identity.
pub fn record_identity(zone_id: &str, set: &ResourceRecordSet) -> String {
    let fields = [
        IdentityField::from(zone_id),
        IdentityField::from(set.name.as_str()),
        IdentityField::from(set.record_type.as_str()),
        IdentityField::from(set.weight),
        IdentityField::from(set.region.clone()),
        IdentityField::from(set.geo_location.as_ref().map(|geo| geo.to_map())),
        IdentityField::from(set.failover.clone()),
        IdentityField::from(set.health_check_id.clone()),
        IdentityField::from(set.traffic_policy_instance_id.clone()),
    ];
    resource_id(namespace::DNS_RECORD, &fields)
}

struct ZoneSource<'a, A: ?Sized> {
    api: &'a A,
    source: String,
}

#[async_trait]
impl<'a, A: Route53Api + ?Sized> PageSource for ZoneSource<'a, A> {
    type Token = String;
    type Item = HostedZone;

    fn name(&self) -> &str {
        "route53 hosted zones"
    }

    async fn fetch_page(&mut self, marker: Option<String>) -> Result<Page<HostedZone, String>> {
        Ok(self.api.list_hosted_zones(marker).await?)
    }

    async fn normalize(&mut self, zone: HostedZone) -> Result<RemoteRecord> {
        let tags = self.api.list_zone_tags(&zone.id).await?;

        let mut properties = Properties::new();
        properties.insert("name".to_string(), json!(zone.name.trim_end_matches('.')));
        properties.insert("source".to_string(), json!(self.source));
        properties.insert("comment".to_string(), json!(zone.comment));
        properties.insert("zone_id".to_string(), json!(zone.id));
        properties.insert("private_zone".to_string(), json!(zone.private_zone));

        let identity = resource_id_for(namespace::DNS_ZONE, &zone.id);
        Ok(RemoteRecord::new(identity, properties).with_tags(tags))
    }
}

struct RecordSource<'a, A: ?Sized> {
    api: &'a A,
    zone_id: String,
    zone_identity: String,
    name: String,
}

#[async_trait]
impl<'a, A: Route53Api + ?Sized> PageSource for RecordSource<'a, A> {
    type Token = RecordCursor;
    type Item = ResourceRecordSet;

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_page(
        &mut self,
        start: Option<RecordCursor>,
    ) -> Result<Page<ResourceRecordSet, RecordCursor>> {
        Ok(self.api.list_record_sets(&self.zone_id, start).await?)
    }

    async fn normalize(&mut self, set: ResourceRecordSet) -> Result<RemoteRecord> {
        let identity = record_identity(&self.zone_id, &set);

        let (record_type, ttl, values) = match set.alias_target {
            Some(target) => (ALIAS_TYPE.to_string(), 0, vec![target]),
            None => (set.record_type, set.ttl.unwrap_or(0), set.values),
        };

        let mut properties = Properties::new();
        properties.insert("name".to_string(), json!(set.name.trim_end_matches('.')));
        properties.insert("type".to_string(), json!(record_type));
        properties.insert("ttl".to_string(), json!(ttl));
        properties.insert("value".to_string(), json!(values));

        Ok(RemoteRecord::new(identity, properties).with_parent(self.zone_identity.clone()))
    }
}

struct ZoneRecords<'a, A: ?Sized> {
    api: &'a A,
}

#[async_trait]
impl<'a, A: Route53Api + ?Sized> ChildSource for ZoneRecords<'a, A> {
    async fn fetch_children(&self, zone: &StoredRecord) -> Result<RemoteSet> {
        let zone_id: String =
            zone.get_property("zone_id")
                .ok_or_else(|| ReconcileError::MissingProperty {
                    identity: zone.identity.clone(),
                    property: "zone_id".to_string(),
                })?;

        let mut source = RecordSource {
            api: self.api,
            name: format!("route53 records of {}", zone.display_name()),
            zone_id,
            zone_identity: zone.identity.clone(),
        };
        fetch_all(&mut source).await
    }
}

/// Collects hosted zones and, per zone, its record sets
pub struct Route53Collector<A> {
    api: A,
    account: Account,
}

impl<A: Route53Api> Route53Collector<A> {
    pub fn new(api: A, account: Account) -> Self {
        Self { api, account }
    }
}

#[async_trait]
impl<A: Route53Api> Collector for Route53Collector<A> {
    fn name(&self) -> &str {
        "route53"
    }

    fn family(&self) -> ResourceKind {
        ResourceKind::DnsZone
    }

    fn account(&self) -> &Account {
        &self.account
    }

    async fn collect(&self, session: &mut dyn Session) -> Result<PassReport> {
        tracing::debug!("Updating Route53 information for {}", self.account.name);

        let mut zones = ZoneSource {
            api: &self.api,
            source: format!("AWS/{}", self.account.name),
        };
        let records = ZoneRecords { api: &self.api };
        let scope = Scope::family(&self.account.account_id, ResourceKind::DnsZone);

        HierarchicalReconciler::new(session, scope, ResourceKind::DnsRecord)
            .run(fetch_all(&mut zones), &records)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::GeoLocation;
    use crate::testing::{FakeRoute53, account, a_record, zone};
    use cloudtally_core::{ChangeType, MemoryStore, Store};
    use serde_json::Value;

    async fn collect(store: &MemoryStore, api: FakeRoute53) -> PassReport {
        let collector = Route53Collector::new(api, account());
        let mut session = store.begin().await.unwrap();
        collector.collect(session.as_mut()).await.unwrap()
    }

    fn example_zone() -> FakeRoute53 {
        let mut api = FakeRoute53::default();
        api.zone_pages = vec![vec![zone("/hostedzone/Z1", "example.com.")]];
        api.tags
            .insert("/hostedzone/Z1".to_string(), [("env".to_string(), "prod".to_string())].into());
        api.record_pages.insert(
            "/hostedzone/Z1".to_string(),
            vec![
                vec![a_record("www.example.com.", &["1.2.3.4"])],
                vec![a_record("api.example.com.", &["5.6.7.8"])],
            ],
        );
        api
    }

    fn records_of(inventory: &cloudtally_core::Inventory) -> Vec<&StoredRecord> {
        inventory
            .iter()
            .filter(|r| r.kind == ResourceKind::DnsRecord)
            .collect()
    }

    #[test]
    fn test_record_identity_ignores_value_and_ttl() {
        let mut set = a_record("www.example.com.", &["1.2.3.4"]);
        let before = record_identity("/hostedzone/Z1", &set);

        set.values = vec!["9.9.9.9".to_string()];
        set.ttl = Some(60);

        assert_eq!(record_identity("/hostedzone/Z1", &set), before);
        assert!(before.starts_with("r53r-"));
    }

    #[test]
    fn test_record_identity_separates_routing_policies() {
        let mut primary = a_record("www.example.com.", &["1.2.3.4"]);
        primary.failover = Some("PRIMARY".to_string());
        let mut secondary = primary.clone();
        secondary.failover = Some("SECONDARY".to_string());

        assert_ne!(
            record_identity("/hostedzone/Z1", &primary),
            record_identity("/hostedzone/Z1", &secondary)
        );
    }

    #[test]
    fn test_record_identity_uses_zone_id() {
        let set = a_record("www.example.com.", &["1.2.3.4"]);
        assert_ne!(
            record_identity("/hostedzone/Z1", &set),
            record_identity("/hostedzone/Z2", &set)
        );
    }

    #[test]
    fn test_geo_location_is_part_of_identity() {
        let plain = a_record("geo.example.com.", &["1.2.3.4"]);
        let mut germany = plain.clone();
        germany.geo_location = Some(GeoLocation {
            continent_code: None,
            country_code: Some("DE".to_string()),
            subdivision_code: None,
        });
        let mut europe = plain.clone();
        europe.geo_location = Some(GeoLocation {
            continent_code: Some("EU".to_string()),
            country_code: None,
            subdivision_code: None,
        });

        let ids = [
            record_identity("Z", &plain),
            record_identity("Z", &germany),
            record_identity("Z", &europe),
        ];
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_eq!(
            germany.geo_location.unwrap().to_map(),
            std::collections::BTreeMap::from([("CountryCode".to_string(), "DE".to_string())])
        );
    }

    #[tokio::test]
    async fn test_zone_and_records_are_created() {
        let store = MemoryStore::new();

        let report = collect(&store, example_zone()).await;

        assert_eq!(report.summary().created, 3);
        let inventory = store.snapshot().unwrap();
        let zone_id = resource_id_for(namespace::DNS_ZONE, "/hostedzone/Z1");
        let stored_zone = inventory.get(&format!("123456789012:dns_zone:{}", zone_id)).unwrap();
        assert_eq!(stored_zone.property("name"), Some(&json!("example.com")));
        assert_eq!(stored_zone.property("source"), Some(&json!("AWS/prod")));
        assert_eq!(stored_zone.property("comment"), Some(&Value::Null));
        assert_eq!(stored_zone.tags.get("env").map(String::as_str), Some("prod"));

        let records = records_of(&inventory);
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.parent_identity.as_deref() == Some(zone_id.as_str())));
    }

    #[tokio::test]
    async fn test_value_change_updates_one_record() {
        let store = MemoryStore::new();
        collect(&store, example_zone()).await;
        let before = store.snapshot().unwrap();
        let identities: Vec<String> =
            records_of(&before).iter().map(|r| r.identity.clone()).collect();

        let mut api = example_zone();
        api.record_pages.get_mut("/hostedzone/Z1").unwrap()[0] =
            vec![a_record("www.example.com.", &["10.0.0.1"])];
        let report = collect(&store, api).await;

        let summary = report.summary();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.created, 0);
        assert_eq!(summary.deleted, 0);
        let updated = report.changes_by_type(ChangeType::Update);
        assert_eq!(updated[0].kind, ResourceKind::DnsRecord);

        let after = store.snapshot().unwrap();
        let after_ids: Vec<String> =
            records_of(&after).iter().map(|r| r.identity.clone()).collect();
        assert_eq!(after_ids, identities);
        let www = records_of(&after)
            .into_iter()
            .find(|r| r.property("name") == Some(&json!("www.example.com")))
            .unwrap();
        assert_eq!(www.property("value"), Some(&json!(["10.0.0.1"])));
    }

    #[tokio::test]
    async fn test_alias_record_normalization() {
        let store = MemoryStore::new();
        let mut api = example_zone();
        let mut alias = a_record("cdn.example.com.", &[]);
        alias.ttl = None;
        alias.alias_target = Some("d111.cloudfront.net.".to_string());
        api.record_pages.insert("/hostedzone/Z1".to_string(), vec![vec![alias]]);

        collect(&store, api).await;

        let inventory = store.snapshot().unwrap();
        let record = records_of(&inventory)[0];
        assert_eq!(record.property("type"), Some(&json!("ALIAS")));
        assert_eq!(record.property("ttl"), Some(&json!(0)));
        assert_eq!(record.property("value"), Some(&json!(["d111.cloudfront.net."])));
    }

    #[tokio::test]
    async fn test_duplicate_record_in_listing_is_stored_once() {
        let store = MemoryStore::new();
        let mut api = example_zone();
        api.record_pages.insert(
            "/hostedzone/Z1".to_string(),
            vec![
                vec![a_record("www.example.com.", &["1.2.3.4"])],
                vec![a_record("www.example.com.", &["1.2.3.5"])],
            ],
        );

        collect(&store, api).await;

        let inventory = store.snapshot().unwrap();
        let records = records_of(&inventory);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].property("value"), Some(&json!(["1.2.3.5"])));
    }

    #[tokio::test]
    async fn test_removed_zone_takes_records_along() {
        let store = MemoryStore::new();
        collect(&store, example_zone()).await;

        let report = collect(&store, FakeRoute53::default()).await;

        assert_eq!(report.summary().deleted, 1);
        assert!(store.snapshot().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_identical_pass_changes_nothing() {
        let store = MemoryStore::new();
        collect(&store, example_zone()).await;
        let before = store.snapshot().unwrap();
        let commits = store.commit_count();

        let report = collect(&store, example_zone()).await;

        assert!(!report.has_changes());
        assert_eq!(report.summary().unchanged, 3);
        assert_eq!(store.commit_count(), commits);
        assert_eq!(store.snapshot().unwrap().records, before.records);
    }
}
