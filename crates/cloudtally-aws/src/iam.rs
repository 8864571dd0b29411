//! IAM users and their access keys

use crate::api::{AccessKeyMetadata, IamApi, User, codes};
use async_trait::async_trait;
use cloudtally_core::{
    Account, ChildSource, Collector, HierarchicalReconciler, Page, PageSource, PassReport,
    Properties, ReconcileError, RemoteRecord, RemoteSet, ResourceKind, Result, Scope, Session,
    StoredRecord, fetch_all, namespace, resource_id_for, timestamp_value,
};
use serde_json::{Value, json};

struct UserSource<'a, A: ?Sized> {
    api: &'a A,
}

impl<'a, A: IamApi + ?Sized> UserSource<'a, A> {
    async fn has_password(&self, user_name: &str) -> Result<bool> {
        match self.api.get_login_profile(user_name).await {
            Ok(()) => Ok(true),
            Err(err) if err.is_code(codes::NO_SUCH_ENTITY) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl<'a, A: IamApi + ?Sized> PageSource for UserSource<'a, A> {
    type Token = String;
    type Item = User;

    fn name(&self) -> &str {
        "iam users"
    }

    async fn fetch_page(&mut self, marker: Option<String>) -> Result<Page<User, String>> {
        Ok(self.api.list_users(marker).await?)
    }

    async fn normalize(&mut self, user: User) -> Result<RemoteRecord> {
        let has_password = self.has_password(&user.name).await?;
        let tags = self.api.user_tags(&user.name).await?;

        let mut properties = Properties::new();
        properties.insert("name".to_string(), json!(user.name));
        properties.insert("arn".to_string(), json!(user.arn));
        properties.insert("creation_time".to_string(), timestamp_value(&user.create_date));
        properties.insert("path".to_string(), json!(user.path));
        properties.insert("has_password".to_string(), json!(has_password));

        let identity = resource_id_for(namespace::IAM_USER, &user.arn);
        Ok(RemoteRecord::new(identity, properties).with_tags(tags))
    }
}

struct KeySource<'a, A: ?Sized> {
    api: &'a A,
    user_name: String,
    user_identity: String,
    name: String,
}

#[async_trait]
impl<'a, A: IamApi + ?Sized> PageSource for KeySource<'a, A> {
    type Token = String;
    type Item = AccessKeyMetadata;

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_page(
        &mut self,
        marker: Option<String>,
    ) -> Result<Page<AccessKeyMetadata, String>> {
        Ok(self.api.list_access_keys(&self.user_name, marker).await?)
    }

    async fn normalize(&mut self, key: AccessKeyMetadata) -> Result<RemoteRecord> {
        let last_used = self
            .api
            .access_key_last_used(&key.access_key_id)
            .await?
            .map(|used| timestamp_value(&used))
            .unwrap_or(Value::Null);

        let mut properties = Properties::new();
        properties.insert(
            "create_date".to_string(),
            key.create_date.as_ref().map(timestamp_value).unwrap_or(Value::Null),
        );
        properties.insert("last_used".to_string(), last_used);
        properties.insert("status".to_string(), json!(key.status));

        Ok(RemoteRecord::new(key.access_key_id, properties).with_parent(self.user_identity.clone()))
    }
}

struct UserKeys<'a, A: ?Sized> {
    api: &'a A,
}

#[async_trait]
impl<'a, A: IamApi + ?Sized> ChildSource for UserKeys<'a, A> {
    async fn fetch_children(&self, user: &StoredRecord) -> Result<RemoteSet> {
        let user_name: String = user
            .get_property("name")
            .ok_or_else(|| ReconcileError::MissingProperty {
                identity: user.identity.clone(),
                property: "name".to_string(),
            })?;

        let mut source = KeySource {
            api: self.api,
            name: format!("access keys of {}", user_name),
            user_name,
            user_identity: user.identity.clone(),
        };
        fetch_all(&mut source).await
    }
}

/// Collects IAM users and, per user, the access keys
pub struct IamCollector<A> {
    api: A,
    account: Account,
}

impl<A: IamApi> IamCollector<A> {
    pub fn new(api: A, account: Account) -> Self {
        Self { api, account }
    }
}

#[async_trait]
impl<A: IamApi> Collector for IamCollector<A> {
    fn name(&self) -> &str {
        "iam"
    }

    fn family(&self) -> ResourceKind {
        ResourceKind::IamUser
    }

    fn account(&self) -> &Account {
        &self.account
    }

    async fn collect(&self, session: &mut dyn Session) -> Result<PassReport> {
        tracing::debug!("Updating IAM users for {}", self.account.name);

        let mut users = UserSource { api: &self.api };
        let keys = UserKeys { api: &self.api };
        let scope = Scope::family(&self.account.account_id, ResourceKind::IamUser);

        HierarchicalReconciler::new(session, scope, ResourceKind::AccessKey)
            .run(fetch_all(&mut users), &keys)
            .await
    }
}
