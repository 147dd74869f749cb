//! Removal of retired bootstrap objects
//!
//! Only objects still under system management are deleted. Every delete is
//! guarded by the uid and resourceVersion that were read, so an object that
//! was replaced or edited in the meantime is never removed by mistake.

use std::sync::Arc;

use kube::api::Preconditions;
use tracing::{debug, info, instrument};

use crate::access::ConfigurationAccess;
use crate::object::AutoUpdate;
use crate::Error;

/// Deletes named objects whose auto-update annotation is not disabled
#[derive(Clone)]
pub struct Remover {
    access: Arc<dyn ConfigurationAccess>,
}

impl Remover {
    /// Create a remover for the access's kind
    pub fn new(access: Arc<dyn ConfigurationAccess>) -> Self {
        Self { access }
    }

    /// Remove each named object unless an operator disabled auto-update on it
    ///
    /// Missing objects count as removed. A failed precondition is returned
    /// as `Conflict` and not retried. The first error stops the batch.
    #[instrument(skip(self, names), fields(kind = self.access.type_name(), count = names.len()))]
    pub async fn remove_auto_update_enabled_objects(&self, names: &[String]) -> Result<(), Error> {
        for name in names {
            self.remove_configuration(name).await?;
        }
        Ok(())
    }

    async fn remove_configuration(&self, name: &str) -> Result<(), Error> {
        let kind = self.access.type_name();

        let current = match self.access.get(name) {
            Ok(current) => current,
            Err(e) if e.is_not_found() => {
                debug!(kind, name, "Already absent");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if current.auto_update() == AutoUpdate::Disabled {
            debug!(kind, name, "Auto-update disabled, skipping deletion");
            return Ok(());
        }

        let preconditions = Preconditions {
            uid: current.uid().map(str::to_string),
            resource_version: current.resource_version().map(str::to_string),
        };

        match self.access.delete(name, preconditions).await {
            Ok(()) => {
                info!(kind, name, "Deleted retired bootstrap configuration");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(kind, name, "Deleted concurrently");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
