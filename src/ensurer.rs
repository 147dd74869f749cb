//! Bootstrap configuration ensurer
//!
//! Walks a batch of bootstrap objects in order and converges each live object
//! with the bound [`EnsureStrategy`]. The first error stops the batch; objects
//! after it are picked up by the next call, which is safe because every
//! per-object step is idempotent.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::access::ConfigurationAccess;
use crate::object::{BootstrapObject, Configuration};
use crate::strategy::EnsureStrategy;
use crate::Error;

/// How many times a lost optimistic-concurrency race is retried per object
///
/// A second lost race is returned to the caller; the next reload pass picks
/// the object up again.
pub const CONFLICT_RETRIES: u32 = 1;

/// Ensures a set of bootstrap objects of one kind exist and are current
#[derive(Clone)]
pub struct Ensurer {
    access: Arc<dyn ConfigurationAccess>,
    strategy: EnsureStrategy,
}

impl Ensurer {
    /// Create an ensurer with an explicit strategy
    pub fn new(access: Arc<dyn ConfigurationAccess>, strategy: EnsureStrategy) -> Self {
        Self { access, strategy }
    }

    /// Ensurer for suggested objects
    pub fn suggested(access: Arc<dyn ConfigurationAccess>) -> Self {
        Self::new(access, EnsureStrategy::Suggested)
    }

    /// Ensurer for mandatory objects
    pub fn mandatory(access: Arc<dyn ConfigurationAccess>) -> Self {
        Self::new(access, EnsureStrategy::Mandatory)
    }

    /// Strategy bound at construction
    pub fn strategy(&self) -> EnsureStrategy {
        self.strategy
    }

    /// Ensure every object in `bootstrap`, in order, stopping at the first error
    #[instrument(
        skip(self, bootstrap),
        fields(kind = self.access.type_name(), strategy = %self.strategy, count = bootstrap.len())
    )]
    pub async fn ensure(&self, bootstrap: &[BootstrapObject]) -> Result<(), Error> {
        for object in bootstrap {
            // Each object gets a private copy; nothing below may touch the template.
            self.ensure_configuration(object.object()).await?;
        }
        Ok(())
    }

    async fn ensure_configuration(&self, bootstrap: Configuration) -> Result<(), Error> {
        let kind = self.access.type_name();
        let strategy = self.strategy.name();
        let name = bootstrap.name().to_string();
        let mut attempt = 0u32;

        loop {
            let current = match self.access.get(&name) {
                Ok(current) => current,
                Err(e) if e.is_not_found() => {
                    let desired = self.strategy.prepare_for_create(bootstrap.clone());
                    match self.access.create(desired).await {
                        Ok(_) => {
                            info!(kind, strategy, name = %name, "Created bootstrap configuration");
                            return Ok(());
                        }
                        Err(e) if e.is_already_exists() && attempt < CONFLICT_RETRIES => {
                            debug!(
                                kind,
                                strategy,
                                name = %name,
                                "Created concurrently, re-reading"
                            );
                            attempt += 1;
                            continue;
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            };

            let Some(revised) = self.strategy.should_update(&*self.access, &current, &bootstrap)?
            else {
                debug!(kind, strategy, name = %name, "No update required");
                return Ok(());
            };

            match self.access.update(revised).await {
                Ok(_) => {
                    info!(
                        kind,
                        strategy,
                        name = %name,
                        resource_version = ?current.resource_version(),
                        "Updated bootstrap configuration"
                    );
                    return Ok(());
                }
                Err(e) if e.is_conflict() && attempt < CONFLICT_RETRIES => {
                    warn!(
                        kind,
                        strategy,
                        name = %name,
                        error = %e,
                        "Updated concurrently, retrying once"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
