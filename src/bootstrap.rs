//! Bootstrap configuration sets and the full reconciliation pass
//!
//! A release ships mandatory and suggested defaults for both flowcontrol
//! kinds. [`BootstrapReconciler`] runs one complete pass over them: ensure
//! suggested, ensure mandatory, then remove retired defaults.
//!
//! Priority levels are ensured before flow schemas so a schema never points
//! at a level that does not exist yet.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use k8s_openapi::api::flowcontrol::v1::{FlowSchema, PriorityLevelConfiguration};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::access::ConfigurationAccess;
use crate::ensurer::Ensurer;
use crate::object::BootstrapObject;
use crate::remover::Remover;
use crate::stale;
use crate::Error;

// =============================================================================
// Bootstrap sets
// =============================================================================

/// Bootstrap objects of one class (mandatory or suggested)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BootstrapSet {
    priority_levels: Vec<BootstrapObject>,
    flow_schemas: Vec<BootstrapObject>,
}

impl BootstrapSet {
    /// Build a set, rejecting duplicate names within a kind
    pub fn new(
        priority_levels: Vec<PriorityLevelConfiguration>,
        flow_schemas: Vec<FlowSchema>,
    ) -> Result<Self, Error> {
        let set = Self {
            priority_levels: priority_levels.into_iter().map(BootstrapObject::from).collect(),
            flow_schemas: flow_schemas.into_iter().map(BootstrapObject::from).collect(),
        };
        check_names(&set.priority_levels)?;
        check_names(&set.flow_schemas)?;
        Ok(set)
    }

    /// Priority level templates, in apply order
    pub fn priority_levels(&self) -> &[BootstrapObject] {
        &self.priority_levels
    }

    /// Flow schema templates, in apply order
    pub fn flow_schemas(&self) -> &[BootstrapObject] {
        &self.flow_schemas
    }

    /// True if the set holds no objects
    pub fn is_empty(&self) -> bool {
        self.priority_levels.is_empty() && self.flow_schemas.is_empty()
    }
}

fn check_names<'a>(objects: impl IntoIterator<Item = &'a BootstrapObject>) -> Result<(), Error> {
    let mut seen = BTreeSet::new();
    for obj in objects {
        if obj.name().is_empty() {
            return Err(Error::validation(format!(
                "bootstrap {} without a name",
                obj.kind()
            )));
        }
        if !seen.insert(obj.name()) {
            return Err(Error::validation(format!(
                "duplicate bootstrap {} {:?}",
                obj.kind(),
                obj.name()
            )));
        }
    }
    Ok(())
}

/// Every default the running release ships
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BootstrapConfiguration {
    mandatory: BootstrapSet,
    suggested: BootstrapSet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BootstrapSetDocument {
    #[serde(default)]
    priority_level_configurations: Vec<PriorityLevelConfiguration>,
    #[serde(default)]
    flow_schemas: Vec<FlowSchema>,
}

#[derive(Debug, Default, Deserialize)]
struct BootstrapDocument {
    #[serde(default)]
    mandatory: BootstrapSetDocument,
    #[serde(default)]
    suggested: BootstrapSetDocument,
}

impl BootstrapConfiguration {
    /// Combine mandatory and suggested sets
    ///
    /// A name may appear in only one class per kind, otherwise the two
    /// strategies would fight over the object.
    pub fn new(mandatory: BootstrapSet, suggested: BootstrapSet) -> Result<Self, Error> {
        check_names(
            mandatory
                .priority_levels
                .iter()
                .chain(&suggested.priority_levels),
        )?;
        check_names(mandatory.flow_schemas.iter().chain(&suggested.flow_schemas))?;
        Ok(Self {
            mandatory,
            suggested,
        })
    }

    /// Parse a YAML document with `mandatory` and `suggested` sections
    ///
    /// Each section holds `priorityLevelConfigurations` and `flowSchemas`
    /// lists of fully materialized objects.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let doc: BootstrapDocument = serde_yaml::from_str(yaml)
            .map_err(|e| Error::serialization(format!("invalid bootstrap configuration: {e}")))?;
        let mandatory = BootstrapSet::new(
            doc.mandatory.priority_level_configurations,
            doc.mandatory.flow_schemas,
        )?;
        let suggested = BootstrapSet::new(
            doc.suggested.priority_level_configurations,
            doc.suggested.flow_schemas,
        )?;
        Self::new(mandatory, suggested)
    }

    /// Read and parse a YAML bootstrap file
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            Error::internal_with_context(
                "bootstrap",
                format!("failed to read {}: {e}", path.display()),
            )
        })?;
        Self::from_yaml(&yaml)
    }

    /// Mandatory defaults
    pub fn mandatory(&self) -> &BootstrapSet {
        &self.mandatory
    }

    /// Suggested defaults
    pub fn suggested(&self) -> &BootstrapSet {
        &self.suggested
    }

    fn all_priority_levels(&self) -> impl Iterator<Item = &BootstrapObject> {
        self.mandatory
            .priority_levels
            .iter()
            .chain(&self.suggested.priority_levels)
    }

    fn all_flow_schemas(&self) -> impl Iterator<Item = &BootstrapObject> {
        self.mandatory
            .flow_schemas
            .iter()
            .chain(&self.suggested.flow_schemas)
    }
}

// =============================================================================
// Full pass
// =============================================================================

/// Runs complete reconciliation passes over both flowcontrol kinds
pub struct BootstrapReconciler {
    flow_schemas: Arc<dyn ConfigurationAccess>,
    priority_levels: Arc<dyn ConfigurationAccess>,
    remove_dangling: bool,
}

impl BootstrapReconciler {
    /// Create a reconciler over the two kinds' access implementations
    pub fn new(
        flow_schemas: Arc<dyn ConfigurationAccess>,
        priority_levels: Arc<dyn ConfigurationAccess>,
    ) -> Self {
        Self {
            flow_schemas,
            priority_levels,
            remove_dangling: true,
        }
    }

    /// Enable or disable removal of retired defaults (enabled by default)
    pub fn with_remove_dangling(mut self, remove_dangling: bool) -> Self {
        self.remove_dangling = remove_dangling;
        self
    }

    /// One full pass: suggested, mandatory, then dangling removal
    ///
    /// Stops at the first error; the next pass resumes from a fresh read.
    #[instrument(skip_all)]
    pub async fn ensure_bootstrap_configuration(
        &self,
        config: &BootstrapConfiguration,
    ) -> Result<(), Error> {
        let suggested = config.suggested();
        Ensurer::suggested(self.priority_levels.clone())
            .ensure(suggested.priority_levels())
            .await?;
        Ensurer::suggested(self.flow_schemas.clone())
            .ensure(suggested.flow_schemas())
            .await?;

        let mandatory = config.mandatory();
        Ensurer::mandatory(self.priority_levels.clone())
            .ensure(mandatory.priority_levels())
            .await?;
        Ensurer::mandatory(self.flow_schemas.clone())
            .ensure(mandatory.flow_schemas())
            .await?;

        if self.remove_dangling {
            self.remove_dangling_configuration(config).await?;
        }
        Ok(())
    }

    async fn remove_dangling_configuration(
        &self,
        config: &BootstrapConfiguration,
    ) -> Result<(), Error> {
        // Schemas first, so no schema is left pointing at a deleted level.
        let candidates =
            stale::remove_candidates(self.flow_schemas.as_ref(), config.all_flow_schemas())?;
        if !candidates.is_empty() {
            info!(
                kind = self.flow_schemas.type_name(),
                candidates = ?candidates,
                "Removing retired defaults"
            );
            Remover::new(self.flow_schemas.clone())
                .remove_auto_update_enabled_objects(&candidates)
                .await?;
        }

        let candidates = stale::remove_candidates(
            self.priority_levels.as_ref(),
            config.all_priority_levels(),
        )?;
        if !candidates.is_empty() {
            info!(
                kind = self.priority_levels.type_name(),
                candidates = ?candidates,
                "Removing retired defaults"
            );
            Remover::new(self.priority_levels.clone())
                .remove_auto_update_enabled_objects(&candidates)
                .await?;
        }
        Ok(())
    }
}
