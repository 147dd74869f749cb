//! Configuration objects exchanged between the reconciler and the store
//!
//! [`Configuration`] wraps every flowcontrol kind the reconciler manages so a
//! single object-safe [`ConfigurationAccess`](crate::access::ConfigurationAccess)
//! can be shared by both kinds. [`BootstrapObject`] is the built-in template;
//! it only ever hands out owned copies.

use std::collections::BTreeMap;
use std::fmt::Debug;

use k8s_openapi::api::flowcontrol::v1::{
    FlowSchema, FlowSchemaSpec, PriorityLevelConfiguration, PriorityLevelConfigurationSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::defaults;
use crate::{AUTO_UPDATE_ANNOTATION_KEY, FIELD_MANAGER};

// =============================================================================
// Auto-update annotation
// =============================================================================

/// Parsed state of the auto-update annotation on an object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutoUpdate {
    /// Annotation is `"true"`
    Enabled,
    /// Annotation is `"false"`: an operator has taken ownership of the spec
    Disabled,
    /// Annotation is missing or not a boolean
    Absent,
}

impl AutoUpdate {
    /// Read the annotation from object annotations
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Self {
        match annotations
            .get(AUTO_UPDATE_ANNOTATION_KEY)
            .map(String::as_str)
            .and_then(parse_bool)
        {
            Some(true) => AutoUpdate::Enabled,
            Some(false) => AutoUpdate::Disabled,
            None => AutoUpdate::Absent,
        }
    }

    /// Whether the system may overwrite the spec
    ///
    /// A missing annotation counts as enabled.
    pub fn allows_update(self) -> bool {
        !matches!(self, AutoUpdate::Disabled)
    }
}

/// Parse a boolean annotation value
///
/// Accepts the same spellings as the API server's own annotation parsing:
/// `1`, `t`, `T`, `true`, `True`, `TRUE` and their false counterparts.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "True" | "TRUE" => Some(true),
        "0" | "f" | "F" | "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// A flowcontrol configuration object of any supported kind
#[derive(Clone, Debug, PartialEq)]
pub enum Configuration {
    /// A `FlowSchema`
    FlowSchema(FlowSchema),
    /// A `PriorityLevelConfiguration`
    PriorityLevel(PriorityLevelConfiguration),
}

impl Configuration {
    /// Kind name of the wrapped object
    pub fn kind(&self) -> &'static str {
        match self {
            Configuration::FlowSchema(_) => FlowSchema::TYPE_NAME,
            Configuration::PriorityLevel(_) => PriorityLevelConfiguration::TYPE_NAME,
        }
    }

    /// Object metadata
    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Configuration::FlowSchema(fs) => fs.meta(),
            Configuration::PriorityLevel(pl) => pl.meta(),
        }
    }

    /// Mutable object metadata
    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Configuration::FlowSchema(fs) => fs.meta_mut(),
            Configuration::PriorityLevel(pl) => pl.meta_mut(),
        }
    }

    /// Object name (empty if unset)
    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    /// Optimistic-concurrency token of the stored object
    pub fn resource_version(&self) -> Option<&str> {
        self.meta().resource_version.as_deref()
    }

    /// Server-assigned identity of the stored object
    pub fn uid(&self) -> Option<&str> {
        self.meta().uid.as_deref()
    }

    /// Current auto-update annotation state
    pub fn auto_update(&self) -> AutoUpdate {
        match self.meta().annotations.as_ref() {
            Some(annotations) => AutoUpdate::from_annotations(annotations),
            None => AutoUpdate::Absent,
        }
    }

    /// Write the auto-update annotation
    pub fn set_auto_update(&mut self, enabled: bool) {
        self.meta_mut()
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(AUTO_UPDATE_ANNOTATION_KEY.to_string(), enabled.to_string());
    }

    /// True if the object carries the auto-update annotation at all
    pub fn has_auto_update_annotation(&self) -> bool {
        self.meta()
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(AUTO_UPDATE_ANNOTATION_KEY))
    }

    /// True if any managed-fields entry was written by `manager`
    pub fn is_managed_by(&self, manager: &str) -> bool {
        self.meta()
            .managed_fields
            .as_ref()
            .is_some_and(|entries| {
                entries
                    .iter()
                    .any(|entry| entry.manager.as_deref() == Some(manager))
            })
    }

    /// True if the system created or maintains this object
    ///
    /// User-created objects of the same kind carry neither the annotation
    /// nor a managed-fields entry from the system field manager.
    pub fn is_system_owned(&self) -> bool {
        self.has_auto_update_annotation() || self.is_managed_by(FIELD_MANAGER)
    }
}

impl From<FlowSchema> for Configuration {
    fn from(fs: FlowSchema) -> Self {
        Configuration::FlowSchema(fs)
    }
}

impl From<PriorityLevelConfiguration> for Configuration {
    fn from(pl: PriorityLevelConfiguration) -> Self {
        Configuration::PriorityLevel(pl)
    }
}

// =============================================================================
// ConfigurationKind
// =============================================================================

/// Per-kind glue between a typed flowcontrol resource and [`Configuration`]
///
/// Implementing this is all a new kind needs to plug into
/// [`KindAccess`](crate::access::KindAccess).
pub trait ConfigurationKind:
    Resource<DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Spec type of the kind
    type Spec: Clone + Debug + Serialize + Send + Sync;

    /// Label used in logs and errors
    const TYPE_NAME: &'static str;

    /// Borrow the spec
    fn spec(&self) -> Option<&Self::Spec>;

    /// Replace the spec
    fn set_spec(&mut self, spec: Option<Self::Spec>);

    /// Fill in server-side defaults, the way the API server would on write
    fn apply_defaults(spec: &mut Self::Spec);

    /// Wrap into a [`Configuration`]
    fn into_configuration(self) -> Configuration;

    /// Unwrap a [`Configuration`], handing it back if it is another kind
    fn try_from_configuration(obj: Configuration) -> Result<Self, Configuration>;

    /// Borrow out of a [`Configuration`], `None` for another kind
    fn from_configuration(obj: &Configuration) -> Option<&Self>;

    /// Mutably borrow out of a [`Configuration`], `None` for another kind
    fn from_configuration_mut(obj: &mut Configuration) -> Option<&mut Self>;
}

impl ConfigurationKind for FlowSchema {
    type Spec = FlowSchemaSpec;
    const TYPE_NAME: &'static str = "FlowSchema";

    fn spec(&self) -> Option<&Self::Spec> {
        self.spec.as_ref()
    }

    fn set_spec(&mut self, spec: Option<Self::Spec>) {
        self.spec = spec;
    }

    fn apply_defaults(spec: &mut Self::Spec) {
        defaults::default_flow_schema_spec(spec);
    }

    fn into_configuration(self) -> Configuration {
        Configuration::FlowSchema(self)
    }

    fn try_from_configuration(obj: Configuration) -> Result<Self, Configuration> {
        match obj {
            Configuration::FlowSchema(fs) => Ok(fs),
            other => Err(other),
        }
    }

    fn from_configuration(obj: &Configuration) -> Option<&Self> {
        match obj {
            Configuration::FlowSchema(fs) => Some(fs),
            _ => None,
        }
    }

    fn from_configuration_mut(obj: &mut Configuration) -> Option<&mut Self> {
        match obj {
            Configuration::FlowSchema(fs) => Some(fs),
            _ => None,
        }
    }
}

impl ConfigurationKind for PriorityLevelConfiguration {
    type Spec = PriorityLevelConfigurationSpec;
    const TYPE_NAME: &'static str = "PriorityLevelConfiguration";

    fn spec(&self) -> Option<&Self::Spec> {
        self.spec.as_ref()
    }

    fn set_spec(&mut self, spec: Option<Self::Spec>) {
        self.spec = spec;
    }

    fn apply_defaults(spec: &mut Self::Spec) {
        defaults::default_priority_level_spec(spec);
    }

    fn into_configuration(self) -> Configuration {
        Configuration::PriorityLevel(self)
    }

    fn try_from_configuration(obj: Configuration) -> Result<Self, Configuration> {
        match obj {
            Configuration::PriorityLevel(pl) => Ok(pl),
            other => Err(other),
        }
    }

    fn from_configuration(obj: &Configuration) -> Option<&Self> {
        match obj {
            Configuration::PriorityLevel(pl) => Some(pl),
            _ => None,
        }
    }

    fn from_configuration_mut(obj: &mut Configuration) -> Option<&mut Self> {
        match obj {
            Configuration::PriorityLevel(pl) => Some(pl),
            _ => None,
        }
    }
}

// =============================================================================
// BootstrapObject
// =============================================================================

/// Built-in default configuration object
///
/// The template is never handed out by reference. Every caller gets its own
/// deep copy, so defaulting or annotation writes downstream cannot leak back
/// into the template shared by concurrent passes.
#[derive(Clone, Debug, PartialEq)]
pub struct BootstrapObject {
    template: Configuration,
}

impl BootstrapObject {
    /// Wrap a fully materialized default object
    pub fn new(template: impl Into<Configuration>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Object name
    pub fn name(&self) -> &str {
        self.template.name()
    }

    /// Kind name
    pub fn kind(&self) -> &'static str {
        self.template.kind()
    }

    /// Owned copy of the template
    pub fn object(&self) -> Configuration {
        self.template.clone()
    }
}

impl<K: ConfigurationKind> From<K> for BootstrapObject {
    fn from(obj: K) -> Self {
        Self {
            template: obj.into_configuration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ManagedFieldsEntry;

    fn flow_schema(name: &str) -> FlowSchema {
        FlowSchema {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(FlowSchemaSpec::default()),
            status: None,
        }
    }

    fn annotated(value: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(AUTO_UPDATE_ANNOTATION_KEY.to_string(), value.to_string())])
    }

    #[test]
    fn test_auto_update_parses_booleans() {
        assert_eq!(AutoUpdate::from_annotations(&annotated("true")), AutoUpdate::Enabled);
        assert_eq!(AutoUpdate::from_annotations(&annotated("false")), AutoUpdate::Disabled);
        assert_eq!(AutoUpdate::from_annotations(&BTreeMap::new()), AutoUpdate::Absent);
    }

    /// Story: an operator writes `"False"` instead of `"false"` to take a
    /// suggested object over
    #[test]
    fn story_every_boolean_spelling_is_honoured() {
        for value in ["1", "t", "T", "true", "True", "TRUE"] {
            assert_eq!(
                AutoUpdate::from_annotations(&annotated(value)),
                AutoUpdate::Enabled,
                "{value:?} should enable auto-update"
            );
        }
        for value in ["0", "f", "F", "false", "False", "FALSE"] {
            assert_eq!(
                AutoUpdate::from_annotations(&annotated(value)),
                AutoUpdate::Disabled,
                "{value:?} should disable auto-update"
            );
        }
    }

    #[test]
    fn test_unparseable_annotation_counts_as_absent() {
        assert_eq!(AutoUpdate::from_annotations(&annotated("yes")), AutoUpdate::Absent);
        assert_eq!(AutoUpdate::from_annotations(&annotated("tRuE")), AutoUpdate::Absent);
        assert!(AutoUpdate::Absent.allows_update());
        assert!(!AutoUpdate::Disabled.allows_update());
    }

    #[test]
    fn test_set_auto_update_creates_annotations() {
        let mut obj = Configuration::from(flow_schema("catch-all"));
        assert_eq!(obj.auto_update(), AutoUpdate::Absent);
        assert!(!obj.has_auto_update_annotation());

        obj.set_auto_update(false);
        assert_eq!(obj.auto_update(), AutoUpdate::Disabled);

        obj.set_auto_update(true);
        assert_eq!(obj.auto_update(), AutoUpdate::Enabled);
        assert!(obj.has_auto_update_annotation());
    }

    #[test]
    fn test_system_ownership_from_field_manager() {
        let mut fs = flow_schema("probes");
        fs.metadata.managed_fields = Some(vec![ManagedFieldsEntry {
            manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }]);
        let obj = Configuration::from(fs);
        assert!(obj.is_system_owned());
        assert!(!obj.has_auto_update_annotation());

        let user = Configuration::from(flow_schema("my-team"));
        assert!(!user.is_system_owned());
    }

    #[test]
    fn test_kind_round_trip_rejects_other_kind() {
        let obj = Configuration::from(flow_schema("exempt"));
        assert_eq!(obj.kind(), "FlowSchema");
        assert!(FlowSchema::from_configuration(&obj).is_some());
        assert!(PriorityLevelConfiguration::from_configuration(&obj).is_none());
    }

    /// Story: mutating the copy handed out never touches the template
    #[test]
    fn story_bootstrap_object_hands_out_independent_copies() {
        let bootstrap = BootstrapObject::from(flow_schema("global-default"));
        let mut copy = bootstrap.object();
        copy.set_auto_update(false);
        copy.meta_mut().resource_version = Some("42".to_string());

        let fresh = bootstrap.object();
        assert_eq!(fresh.auto_update(), AutoUpdate::Absent);
        assert_eq!(fresh.resource_version(), None);
        assert_eq!(bootstrap.name(), "global-default");
        assert_eq!(bootstrap.kind(), "FlowSchema");
    }
}
