//! Ensure strategies for bootstrap configuration
//!
//! There are two kinds of bootstrap objects:
//!
//! - **Mandatory** objects keep the priority-and-fairness system itself
//!   working (e.g. the catch-all and exempt levels). Operator changes to them
//!   are always overwritten.
//! - **Suggested** objects are a starting point. Operators may edit them and
//!   set the auto-update annotation to `"false"` to keep their edits, or
//!   delete them outright.
//!
//! A strategy is a pure decision: given the live object and the template it
//! returns the object to write, if any. It keeps no state between calls; the
//! only persisted state is the annotation on the live object.

use std::fmt;

use crate::access::ConfigurationAccess;
use crate::object::{AutoUpdate, Configuration};
use crate::Error;

/// Policy for converging one live object towards its bootstrap template
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnsureStrategy {
    /// Respect operator ownership signalled by the auto-update annotation
    Suggested,
    /// Always force the bootstrap spec and re-enable auto-update
    Mandatory,
}

impl EnsureStrategy {
    /// Strategy name for logging
    pub fn name(self) -> &'static str {
        match self {
            EnsureStrategy::Suggested => "suggested",
            EnsureStrategy::Mandatory => "mandatory",
        }
    }

    /// Prepare a bootstrap copy for creation
    ///
    /// Suggested objects default the annotation to enabled but keep an
    /// explicit value from the template. Mandatory objects are always enabled.
    pub fn prepare_for_create(self, mut bootstrap: Configuration) -> Configuration {
        match self {
            EnsureStrategy::Mandatory => bootstrap.set_auto_update(true),
            EnsureStrategy::Suggested => {
                if !bootstrap.has_auto_update_annotation() {
                    bootstrap.set_auto_update(true);
                }
            }
        }
        bootstrap
    }

    /// Decide whether `current` needs to be rewritten
    ///
    /// Returns the revised object (a copy of `current`, so its
    /// resourceVersion is kept for the optimistic write), or `None` when the
    /// live object is up to date or owned by the operator.
    pub fn should_update(
        self,
        access: &dyn ConfigurationAccess,
        current: &Configuration,
        bootstrap: &Configuration,
    ) -> Result<Option<Configuration>, Error> {
        let auto_update = current.auto_update();
        let update_annotation = match self {
            EnsureStrategy::Mandatory => auto_update != AutoUpdate::Enabled,
            EnsureStrategy::Suggested => {
                if !auto_update.allows_update() {
                    return Ok(None);
                }
                false
            }
        };

        let spec_changed = access.has_spec_changed(bootstrap, current)?;
        if !(update_annotation || spec_changed) {
            return Ok(None);
        }

        let mut revised = current.clone();
        if spec_changed {
            access.copy_spec(bootstrap, &mut revised)?;
        }
        revised.set_auto_update(true);
        Ok(Some(revised))
    }
}

impl fmt::Display for EnsureStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
