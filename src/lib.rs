//! Lattice flowcontrol - keeps API Priority and Fairness defaults in place
//!
//! The API server ships a set of built-in `FlowSchema` and
//! `PriorityLevelConfiguration` objects. This crate converges a cluster
//! towards them on every pass while respecting operator ownership.
//!
//! # Architecture
//!
//! - Reads come from a reflector cache, writes go to the API server with
//!   optimistic concurrency on resourceVersion
//! - Mandatory objects are always enforced; suggested objects step back once
//!   the operator sets the auto-update annotation to `"false"`
//! - Defaults retired by a release are removed, unless the operator took
//!   them over
//!
//! # Modules
//!
//! - [`object`] - Kind-agnostic configuration objects and bootstrap templates
//! - [`defaults`] - Server-side defaulting and semantic spec comparison
//! - [`client`] - Cached-read / direct-write store client per kind
//! - [`access`] - Kind-checked access used by the reconciler
//! - [`strategy`] - Suggested and mandatory ensure strategies
//! - [`ensurer`] - Per-object create/update loop with conflict retry
//! - [`stale`] - Detection of retired bootstrap objects
//! - [`remover`] - Precondition-guarded removal of retired objects
//! - [`bootstrap`] - Bootstrap configuration sets and the full pass
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod access;
pub mod bootstrap;
pub mod client;
pub mod defaults;
pub mod ensurer;
pub mod error;
pub mod object;
pub mod remover;
pub mod stale;
pub mod strategy;

pub use access::{ConfigurationAccess, FlowSchemaAccess, KindAccess, PriorityLevelAccess};
pub use bootstrap::{BootstrapConfiguration, BootstrapReconciler, BootstrapSet};
pub use client::{ConfigurationClient, KubeConfigurationClient};
pub use ensurer::Ensurer;
pub use error::Error;
pub use object::{AutoUpdate, BootstrapObject, Configuration, ConfigurationKind};
pub use remover::Remover;
pub use strategy::EnsureStrategy;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager recorded on every object this crate writes
///
/// Stale-object detection relies on it to tell system-created objects apart
/// from objects created by users.
pub const FIELD_MANAGER: &str = "lattice-flowcontrol-config-producer";

/// Annotation controlling whether the system keeps an object up to date
///
/// `"true"` (or absent) lets the system overwrite the spec; `"false"` hands
/// the object over to the operator. Mandatory objects ignore `"false"`.
pub const AUTO_UPDATE_ANNOTATION_KEY: &str = "apf.kubernetes.io/autoupdate-spec";
