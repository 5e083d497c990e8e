//! Kubernetes Storage Class Adapter
//!
//! Implements storage class lookup against the cluster API so a delete
//! request can re-derive the cluster connection its volume was provisioned
//! with.

use crate::domain::ports::StorageClassSource;
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::Api;
use kube::Client;
use std::collections::BTreeMap;
use tracing::debug;

/// Storage class source backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStorageClassSource {
    client: Client,
}

impl KubeStorageClassSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StorageClassSource for KubeStorageClassSource {
    async fn class_parameters(&self, name: &str) -> Result<BTreeMap<String, String>> {
        let classes: Api<StorageClass> = Api::all(self.client.clone());
        let class = classes.get(name).await?;
        debug!(name, "fetched storage class");

        Ok(class.parameters.unwrap_or_default())
    }
}
