//! Dangling bootstrap object detection
//!
//! A default that shipped in an earlier release and was since retired stays
//! in the cluster until something removes it. These helpers find the
//! system-owned objects whose names are no longer in the bootstrap set.

use std::collections::BTreeSet;

use crate::access::ConfigurationAccess;
use crate::object::{BootstrapObject, Configuration};
use crate::Error;

/// Names of system-owned live objects missing from `bootstrap_names`
///
/// Objects without the auto-update annotation and without a system
/// managed-fields entry are user-created and never reported. Output keeps the
/// order of `live`.
pub fn compute(live: &[Configuration], bootstrap_names: &BTreeSet<String>) -> Vec<String> {
    live.iter()
        .filter(|obj| obj.is_system_owned())
        .filter(|obj| !bootstrap_names.contains(obj.name()))
        .map(|obj| obj.name().to_string())
        .collect()
}

/// Names of live objects of the access's kind that are candidates for removal
///
/// `bootstrap` is every bootstrap object of the kind the current release
/// ships, mandatory and suggested alike.
pub fn remove_candidates<'a>(
    access: &dyn ConfigurationAccess,
    bootstrap: impl IntoIterator<Item = &'a BootstrapObject>,
) -> Result<Vec<String>, Error> {
    let live = access.list()?;
    let names = bootstrap
        .into_iter()
        .map(|obj| obj.name().to_string())
        .collect();
    Ok(compute(&live, &names))
}
