//! Storage Class Parameter Resolution
//!
//! Validates and normalizes the free-form storage class parameter bundle
//! into the Ceph cluster connection descriptor used by the allocation agent.

use crate::domain::ports::SecretStore;
use crate::error::{Error, Result};
use crate::provisioner::credentials;
use std::collections::BTreeMap;
use tracing::debug;

const DEFAULT_CLUSTER: &str = "ceph";
const DEFAULT_ADMIN_ID: &str = "admin";
const DEFAULT_ADMIN_SECRET_NAMESPACE: &str = "default";

// =============================================================================
// Share Parameters
// =============================================================================

/// Validated storage class parameters for a CephFS share
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareParameters {
    /// Ceph cluster name
    pub cluster: String,
    /// Cephx id of the administrative user
    pub admin_id: String,
    /// Name of the secret holding the admin credential
    pub admin_secret_name: String,
    /// Namespace of the admin credential secret
    pub admin_secret_namespace: String,
    /// Monitor endpoints, at least one
    pub monitors: Vec<String>,
}

/// Resolved connection to a Ceph cluster for a single operation.
///
/// Carries the admin credential; derived per operation and never persisted.
pub struct ClusterConnection {
    /// Ceph cluster name
    pub cluster: String,
    /// Cephx id of the administrative user
    pub admin_id: String,
    /// Admin credential value, non-empty once resolved
    pub admin_key: String,
    /// Monitor endpoints, non-empty
    pub monitors: Vec<String>,
}

impl ShareParameters {
    /// Parse a storage class parameter bundle.
    ///
    /// Keys are matched case-insensitively. Any unrecognized key fails the
    /// whole bundle so a misspelled key can never silently fall back to a
    /// default.
    pub fn parse(parameters: &BTreeMap<String, String>) -> Result<Self> {
        let mut cluster = DEFAULT_CLUSTER.to_string();
        let mut admin_id = DEFAULT_ADMIN_ID.to_string();
        let mut admin_secret_namespace = DEFAULT_ADMIN_SECRET_NAMESPACE.to_string();
        let mut admin_secret_name = None;
        let mut monitors = Vec::new();

        for (key, value) in parameters {
            match key.to_lowercase().as_str() {
                "cluster" => cluster = value.clone(),
                "monitors" => {
                    monitors = value
                        .split(',')
                        .filter(|m| !m.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "adminid" => admin_id = value.clone(),
                "adminsecretname" => admin_secret_name = Some(value.clone()),
                "adminsecretnamespace" => admin_secret_namespace = value.clone(),
                _ => return Err(Error::UnknownParameter { key: key.clone() }),
            }
        }

        let admin_secret_name = admin_secret_name.ok_or(Error::MissingAdminSecretName)?;
        if monitors.is_empty() {
            return Err(Error::MissingMonitors);
        }

        Ok(Self {
            cluster,
            admin_id,
            admin_secret_name,
            admin_secret_namespace,
            monitors,
        })
    }

    /// Resolve the admin credential and build the cluster connection
    pub async fn resolve(&self, secrets: &dyn SecretStore) -> Result<ClusterConnection> {
        let admin_key = credentials::admin_secret_value(
            secrets,
            &self.admin_secret_namespace,
            &self.admin_secret_name,
        )
        .await?;

        debug!(
            cluster = %self.cluster,
            admin_id = %self.admin_id,
            monitors = self.monitors.len(),
            "resolved cluster connection"
        );

        Ok(ClusterConnection {
            cluster: self.cluster.clone(),
            admin_id: self.admin_id.clone(),
            admin_key,
            monitors: self.monitors.clone(),
        })
    }
}
