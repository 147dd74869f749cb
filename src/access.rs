//! Kind-agnostic access to configuration objects
//!
//! The reconciler only ever talks to [`ConfigurationAccess`]. [`KindAccess`]
//! implements it once for every [`ConfigurationKind`], checking that each
//! [`Configuration`] handed in is actually of that kind.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::flowcontrol::v1::{FlowSchema, PriorityLevelConfiguration};
use kube::api::Preconditions;

use crate::client::ConfigurationClient;
use crate::defaults::semantically_equal;
use crate::object::{Configuration, ConfigurationKind};
use crate::Error;

/// Capabilities the reconciler needs to manage objects of one kind
#[async_trait]
pub trait ConfigurationAccess: Send + Sync {
    /// Kind label used in logs and errors
    fn type_name(&self) -> &'static str;

    /// Create the object, attributed to the system field manager
    async fn create(&self, obj: Configuration) -> Result<Configuration, Error>;

    /// Replace the object; it must carry the resourceVersion it was read at
    async fn update(&self, obj: Configuration) -> Result<Configuration, Error>;

    /// Read the object from the cache
    fn get(&self, name: &str) -> Result<Configuration, Error>;

    /// Read every object of the kind from the cache
    fn list(&self) -> Result<Vec<Configuration>, Error>;

    /// Delete the object if it still matches `preconditions`
    async fn delete(&self, name: &str, preconditions: Preconditions) -> Result<(), Error>;

    /// Overwrite the spec of `current` with a deep copy of the bootstrap spec
    fn copy_spec(&self, bootstrap: &Configuration, current: &mut Configuration)
        -> Result<(), Error>;

    /// Whether `current` differs from the defaulted bootstrap spec
    fn has_spec_changed(
        &self,
        bootstrap: &Configuration,
        current: &Configuration,
    ) -> Result<bool, Error>;
}

/// [`ConfigurationAccess`] for the kind `K`, backed by a store client
pub struct KindAccess<K, C> {
    client: C,
    _kind: PhantomData<fn() -> K>,
}

/// Access for `FlowSchema` objects
pub type FlowSchemaAccess<C> = KindAccess<FlowSchema, C>;

/// Access for `PriorityLevelConfiguration` objects
pub type PriorityLevelAccess<C> = KindAccess<PriorityLevelConfiguration, C>;

impl<K, C> KindAccess<K, C>
where
    K: ConfigurationKind,
    C: ConfigurationClient<K>,
{
    /// Wrap a store client
    pub fn new(client: C) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    /// Wrap a store client, ready to share between ensurers
    pub fn shared(client: C) -> Arc<dyn ConfigurationAccess>
    where
        C: 'static,
    {
        Arc::new(Self::new(client))
    }

    fn downcast(obj: Configuration) -> Result<K, Error> {
        K::try_from_configuration(obj)
            .map_err(|other| Error::kind_mismatch(K::TYPE_NAME, other.kind()))
    }

    fn downcast_ref(obj: &Configuration) -> Result<&K, Error> {
        K::from_configuration(obj).ok_or_else(|| Error::kind_mismatch(K::TYPE_NAME, obj.kind()))
    }
}

#[async_trait]
impl<K, C> ConfigurationAccess for KindAccess<K, C>
where
    K: ConfigurationKind,
    C: ConfigurationClient<K>,
{
    fn type_name(&self) -> &'static str {
        K::TYPE_NAME
    }

    async fn create(&self, obj: Configuration) -> Result<Configuration, Error> {
        let typed = Self::downcast(obj)?;
        Ok(self.client.create(typed).await?.into_configuration())
    }

    async fn update(&self, obj: Configuration) -> Result<Configuration, Error> {
        let typed = Self::downcast(obj)?;
        Ok(self.client.update(typed).await?.into_configuration())
    }

    fn get(&self, name: &str) -> Result<Configuration, Error> {
        Ok(self.client.get(name)?.into_configuration())
    }

    fn list(&self) -> Result<Vec<Configuration>, Error> {
        Ok(self
            .client
            .list()?
            .into_iter()
            .map(ConfigurationKind::into_configuration)
            .collect())
    }

    async fn delete(&self, name: &str, preconditions: Preconditions) -> Result<(), Error> {
        self.client.delete(name, preconditions).await
    }

    fn copy_spec(
        &self,
        bootstrap: &Configuration,
        current: &mut Configuration,
    ) -> Result<(), Error> {
        let spec = Self::downcast_ref(bootstrap)?.spec().cloned();
        let actual = current.kind();
        let current = K::from_configuration_mut(current)
            .ok_or_else(|| Error::kind_mismatch(K::TYPE_NAME, actual))?;
        current.set_spec(spec);
        Ok(())
    }

    fn has_spec_changed(
        &self,
        bootstrap: &Configuration,
        current: &Configuration,
    ) -> Result<bool, Error> {
        let bootstrap = Self::downcast_ref(bootstrap)?;
        let current = Self::downcast_ref(current)?;

        // Defaulting runs on a copy; the template itself stays untouched.
        let mut expected = bootstrap.spec().cloned();
        if let Some(spec) = expected.as_mut() {
            K::apply_defaults(spec);
        }

        let equal = semantically_equal(&expected, &current.spec()).map_err(|e| match e {
            Error::Serialization { message, .. } => {
                Error::serialization_for_kind(K::TYPE_NAME, message)
            }
            other => other,
        })?;
        Ok(!equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockConfigurationClient;
    use crate::FIELD_MANAGER;
    use k8s_openapi::api::flowcontrol::v1::{
        FlowSchemaSpec, GroupSubject, PolicyRulesWithSubjects, PriorityLevelConfigurationReference,
        PriorityLevelConfigurationSpec, ResourcePolicyRule, Subject,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ManagedFieldsEntry, ObjectMeta};

    fn flow_schema(name: &str, precedence: Option<i32>) -> FlowSchema {
        FlowSchema {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(FlowSchemaSpec {
                matching_precedence: precedence,
                priority_level_configuration: PriorityLevelConfigurationReference {
                    name: "workload-low".to_string(),
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    fn priority_level(name: &str) -> PriorityLevelConfiguration {
        PriorityLevelConfiguration {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(PriorityLevelConfigurationSpec {
                type_: "Exempt".to_string(),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn access(
        mock: MockConfigurationClient<FlowSchema>,
    ) -> FlowSchemaAccess<MockConfigurationClient<FlowSchema>> {
        KindAccess::new(mock)
    }

    #[test]
    fn test_type_name_comes_from_kind() {
        let fs = access(MockConfigurationClient::new());
        assert_eq!(fs.type_name(), "FlowSchema");

        let pl: PriorityLevelAccess<MockConfigurationClient<PriorityLevelConfiguration>> =
            KindAccess::new(MockConfigurationClient::new());
        assert_eq!(pl.type_name(), "PriorityLevelConfiguration");
    }

    /// Story: wiring a PriorityLevelConfiguration into the FlowSchema access
    /// fails loudly instead of writing the wrong kind
    #[tokio::test]
    async fn story_wrong_kind_is_rejected_before_any_write() {
        let mut mock = MockConfigurationClient::<FlowSchema>::new();
        mock.expect_create().never();
        mock.expect_update().never();
        let fs = access(mock);

        let wrong = Configuration::from(priority_level("exempt"));
        let err = fs.create(wrong.clone()).await.expect_err("create should fail");
        assert!(matches!(err, Error::KindMismatch { .. }));

        let err = fs.update(wrong.clone()).await.expect_err("update should fail");
        assert!(matches!(err, Error::KindMismatch { .. }));

        let right = Configuration::from(flow_schema("exempt", Some(1)));
        assert!(matches!(
            fs.has_spec_changed(&wrong, &right),
            Err(Error::KindMismatch { .. })
        ));
        let mut current = wrong.clone();
        assert!(matches!(
            fs.copy_spec(&right, &mut current),
            Err(Error::KindMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_passes_object_through() {
        let mut mock = MockConfigurationClient::<FlowSchema>::new();
        mock.expect_create().times(1).returning(|mut obj| {
            obj.metadata.resource_version = Some("1".to_string());
            obj.metadata.managed_fields = Some(vec![ManagedFieldsEntry {
                manager: Some(FIELD_MANAGER.to_string()),
                ..Default::default()
            }]);
            Ok(obj)
        });
        let fs = access(mock);

        let stored = fs
            .create(Configuration::from(flow_schema("probes", Some(2))))
            .await
            .expect("create should succeed");
        assert_eq!(stored.name(), "probes");
        assert_eq!(stored.resource_version(), Some("1"));
        assert!(stored.is_managed_by(FIELD_MANAGER));
    }

    #[test]
    fn test_get_not_found_propagates() {
        let mut mock = MockConfigurationClient::<FlowSchema>::new();
        mock.expect_get()
            .returning(|name| Err(Error::not_found("FlowSchema", name)));
        let fs = access(mock);

        assert!(fs.get("missing").expect_err("get should fail").is_not_found());
    }

    /// Story: an unchanged live object that only differs by server defaults
    /// is not reported as drifted
    #[test]
    fn story_defaulted_values_do_not_count_as_change() {
        let fs = access(MockConfigurationClient::new());
        let bootstrap = Configuration::from(flow_schema("global-default", None));
        let live = Configuration::from(flow_schema("global-default", Some(1000)));

        assert!(!fs
            .has_spec_changed(&bootstrap, &live)
            .expect("comparison should succeed"));
    }

    /// Story: the server drops `clusterScope: false` when it stores a rule
    #[test]
    fn story_omitted_false_boolean_is_not_drift() {
        let fs = access(MockConfigurationClient::new());
        let with_rule = |cluster_scope: Option<bool>| {
            let mut obj = flow_schema("service-accounts", Some(800));
            if let Some(spec) = obj.spec.as_mut() {
                spec.rules = Some(vec![PolicyRulesWithSubjects {
                    subjects: vec![Subject {
                        kind: "Group".to_string(),
                        group: Some(GroupSubject {
                            name: "system:serviceaccounts".to_string(),
                        }),
                        ..Default::default()
                    }],
                    resource_rules: Some(vec![ResourcePolicyRule {
                        api_groups: vec!["*".to_string()],
                        cluster_scope,
                        namespaces: Some(vec!["*".to_string()]),
                        resources: vec!["*".to_string()],
                        verbs: vec!["*".to_string()],
                    }]),
                    non_resource_rules: None,
                }]);
            }
            Configuration::from(obj)
        };

        assert!(!fs
            .has_spec_changed(&with_rule(Some(false)), &with_rule(None))
            .expect("comparison should succeed"));
        assert!(fs
            .has_spec_changed(&with_rule(Some(true)), &with_rule(None))
            .expect("comparison should succeed"));
    }

    #[test]
    fn test_spec_drift_is_detected_and_copied() {
        let fs = access(MockConfigurationClient::new());
        let bootstrap = Configuration::from(flow_schema("global-default", Some(9900)));
        let mut live = Configuration::from(flow_schema("global-default", Some(50)));
        live.meta_mut().resource_version = Some("7".to_string());

        assert!(fs
            .has_spec_changed(&bootstrap, &live)
            .expect("comparison should succeed"));

        fs.copy_spec(&bootstrap, &mut live)
            .expect("copy should succeed");
        assert!(!fs
            .has_spec_changed(&bootstrap, &live)
            .expect("comparison should succeed"));
        // metadata, including the concurrency token, is left alone
        assert_eq!(live.resource_version(), Some("7"));
    }

    #[test]
    fn test_has_spec_changed_does_not_mutate_bootstrap() {
        let fs = access(MockConfigurationClient::new());
        let bootstrap = Configuration::from(flow_schema("catch-all", None));
        let before = bootstrap.clone();
        let live = Configuration::from(flow_schema("catch-all", Some(10000)));

        let _ = fs.has_spec_changed(&bootstrap, &live);
        assert_eq!(bootstrap, before);
    }
}
