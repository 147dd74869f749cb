//! Store access for one configuration kind
//!
//! Reads are served by a reflector cache (cheap, eventually consistent);
//! writes go straight to the API server. The trait exists so the reconciler
//! can be exercised against mocks and in-memory stores in tests.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, PostParams, Preconditions};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Client, Resource};
use tracing::trace;

#[cfg(test)]
use mockall::automock;

use crate::object::ConfigurationKind;
use crate::{Error, FIELD_MANAGER};

/// Trait abstracting store operations for one configuration kind
///
/// Every write identifies itself with [`FIELD_MANAGER`] so stale-object
/// detection can tell system-written objects from user-created ones.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigurationClient<K: Clone + Send + Sync + 'static>: Send + Sync {
    /// Get an object from the read cache, `NotFound` if absent
    fn get(&self, name: &str) -> Result<K, Error>;

    /// List every object in the read cache
    fn list(&self) -> Result<Vec<K>, Error>;

    /// Create an object
    async fn create(&self, obj: K) -> Result<K, Error>;

    /// Replace an object; `Conflict` if its resourceVersion is stale
    async fn update(&self, obj: K) -> Result<K, Error>;

    /// Delete an object guarded by uid/resourceVersion preconditions
    async fn delete(&self, name: &str, preconditions: Preconditions) -> Result<(), Error>;
}

/// Real implementation backed by kube-rs
pub struct KubeConfigurationClient<K: ConfigurationKind> {
    api: Api<K>,
    cache: Store<K>,
}

impl<K: ConfigurationKind> KubeConfigurationClient<K> {
    /// Create a client writing through `client` and reading from `cache`
    ///
    /// The cache should be fed by a reflector watching all objects of `K`.
    pub fn new(client: Client, cache: Store<K>) -> Self {
        Self {
            api: Api::all(client),
            cache,
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl<K: ConfigurationKind> ConfigurationClient<K> for KubeConfigurationClient<K> {
    fn get(&self, name: &str) -> Result<K, Error> {
        self.cache
            .get(&ObjectRef::new(name))
            .map(|obj| (*obj).clone())
            .ok_or_else(|| Error::not_found(K::TYPE_NAME, name))
    }

    fn list(&self) -> Result<Vec<K>, Error> {
        Ok(self
            .cache
            .state()
            .into_iter()
            .map(|obj| (*obj).clone())
            .collect())
    }

    async fn create(&self, obj: K) -> Result<K, Error> {
        let name = obj.meta().name.clone().unwrap_or_default();
        trace!(kind = K::TYPE_NAME, name = %name, "Creating object");
        self.api
            .create(&Self::post_params(), &obj)
            .await
            .map_err(|e| Error::from_kube(K::TYPE_NAME, &name, e))
    }

    async fn update(&self, obj: K) -> Result<K, Error> {
        let name = obj.meta().name.clone().unwrap_or_default();
        trace!(kind = K::TYPE_NAME, name = %name, "Replacing object");
        self.api
            .replace(&name, &Self::post_params(), &obj)
            .await
            .map_err(|e| Error::from_kube(K::TYPE_NAME, &name, e))
    }

    async fn delete(&self, name: &str, preconditions: Preconditions) -> Result<(), Error> {
        trace!(kind = K::TYPE_NAME, name = %name, "Deleting object");
        let params = DeleteParams {
            preconditions: Some(preconditions),
            ..Default::default()
        };
        self.api
            .delete(name, &params)
            .await
            .map(|_| ())
            .map_err(|e| Error::from_kube(K::TYPE_NAME, name, e))
    }
}
