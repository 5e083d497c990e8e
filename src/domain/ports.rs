//! Domain Ports - Core trait definitions for the share provisioner
//!
//! These traits define the boundaries between the provisioning lifecycle and
//! external systems. Adapters implement these traits to provide concrete
//! functionality; the external volume controller consumes [`VolumeProvisioner`].

use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Volume Policy Types
// =============================================================================

/// What happens to the backing share when the claim is released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReclaimPolicy {
    Delete,
    Retain,
    Recycle,
}

impl std::fmt::Display for ReclaimPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReclaimPolicy::Delete => write!(f, "Delete"),
            ReclaimPolicy::Retain => write!(f, "Retain"),
            ReclaimPolicy::Recycle => write!(f, "Recycle"),
        }
    }
}

/// Access modes supported by a published volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    ReadWriteOnce,
    ReadOnlyMany,
    ReadWriteMany,
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessMode::ReadWriteOnce => write!(f, "ReadWriteOnce"),
            AccessMode::ReadOnlyMany => write!(f, "ReadOnlyMany"),
            AccessMode::ReadWriteMany => write!(f, "ReadWriteMany"),
        }
    }
}

// =============================================================================
// Provisioning Request/Descriptor
// =============================================================================

/// Request to provision a CephFS-backed volume
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// Caller-chosen name for the resulting volume object
    pub volume_name: String,
    /// Namespace of the requesting claim; the granted credential object
    /// is created here
    pub namespace: String,
    /// Requested capacity, copied through to the descriptor unmodified
    pub capacity: Quantity,
    /// Reclaim policy to record on the descriptor
    pub reclaim_policy: ReclaimPolicy,
    /// Free-form storage class parameter bundle
    pub parameters: BTreeMap<String, String>,
    /// Claim selector; must be absent, this backend does not support
    /// selector-based matching
    pub selector: Option<LabelSelector>,
}

/// The externally published record of a successful allocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeDescriptor {
    /// Volume object name
    pub name: String,
    /// Annotations, carrying the ownership stamp and (once published) the
    /// storage class reference set by the volume controller
    pub annotations: BTreeMap<String, String>,
    /// Capacity copied from the request
    pub capacity: Quantity,
    /// Reclaim policy copied from the request
    pub reclaim_policy: ReclaimPolicy,
    /// Access modes; CephFS shares are multi-attach
    pub access_modes: Vec<AccessMode>,
    /// Ceph monitor endpoints the share is reachable through
    pub monitors: Vec<String>,
    /// Share path, rooted at the filesystem root component
    pub path: String,
    /// Name of the granted credential secret in the claim namespace
    pub secret_name: String,
    /// Cephx user the share was granted to
    pub user: String,
}

/// Outcome of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The share and its grant were reversed
    Deleted,
    /// The volume belongs to another provisioner instance and was left
    /// alone; the controller must treat this as terminal success
    Ignored,
}

// =============================================================================
// Secret Store Port
// =============================================================================

/// Port for the cluster secret store
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret's data map
    async fn get(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, Vec<u8>>>;

    /// Create a new opaque secret
    async fn create(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, Vec<u8>>,
    ) -> Result<()>;
}

// =============================================================================
// Storage Class Source Port
// =============================================================================

/// Port for storage class lookup
#[async_trait]
pub trait StorageClassSource: Send + Sync {
    /// Fetch the parameter bundle of the named storage class
    async fn class_parameters(&self, name: &str) -> Result<BTreeMap<String, String>>;
}

// =============================================================================
// Volume Provisioner Port
// =============================================================================

/// Port for volume provisioning, consumed by the external volume controller
#[async_trait]
pub trait VolumeProvisioner: Send + Sync {
    /// Allocate a share and return the descriptor to publish
    async fn provision(&self, request: ProvisionRequest) -> Result<VolumeDescriptor>;

    /// Reverse the allocation backing a published volume
    async fn delete(&self, volume: &VolumeDescriptor) -> Result<DeleteOutcome>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type SecretStoreRef = Arc<dyn SecretStore>;
pub type StorageClassSourceRef = Arc<dyn StorageClassSource>;
pub type VolumeProvisionerRef = Arc<dyn VolumeProvisioner>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reclaim_policy_display() {
        assert_eq!(format!("{}", ReclaimPolicy::Delete), "Delete");
        assert_eq!(format!("{}", ReclaimPolicy::Retain), "Retain");
    }

    #[test]
    fn test_access_mode_display() {
        assert_eq!(format!("{}", AccessMode::ReadWriteOnce), "ReadWriteOnce");
        assert_eq!(format!("{}", AccessMode::ReadOnlyMany), "ReadOnlyMany");
        assert_eq!(format!("{}", AccessMode::ReadWriteMany), "ReadWriteMany");
    }
}
