//! Volume Ownership Tracking
//!
//! Stamps created volumes with the provisioner identity and share name, and
//! verifies before destructive action that a delete request belongs to this
//! instance. A volume created by a different live instance (or a prior
//! incarnation of this process) is not ours to delete.

use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Annotation recording the identity of the provisioner instance that
/// created a volume
pub const IDENTITY_ANNOTATION: &str = "cephFSProvisionerIdentity";

/// Annotation recording the backing share name
pub const SHARE_ANNOTATION: &str = "cephShare";

// =============================================================================
// Provisioner Identity
// =============================================================================

/// Process-lifetime identity of a provisioner instance.
///
/// Generated once at startup and never regenerated mid-process; used purely
/// for ownership comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionerIdentity(String);

impl ProvisionerIdentity {
    /// Generate a fresh random identity
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap a fixed identity value
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProvisionerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Ownership Check
// =============================================================================

/// Outcome of an ownership check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// The volume was created by this instance; carries the recorded share
    Owned { share: String },
    /// The volume was created by a different provisioner instance and must
    /// be left alone
    NotMine,
    /// The volume carries no usable ownership annotations
    NotFound,
}

/// Build the annotation set stamped onto a new volume descriptor
pub fn stamp(identity: &ProvisionerIdentity, share: &str) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    annotations.insert(IDENTITY_ANNOTATION.to_string(), identity.to_string());
    annotations.insert(SHARE_ANNOTATION.to_string(), share.to_string());
    annotations
}

/// Check whether a volume's annotations mark it as owned by `identity`
pub fn verify(
    annotations: &BTreeMap<String, String>,
    identity: &ProvisionerIdentity,
) -> Ownership {
    let stamped = match annotations.get(IDENTITY_ANNOTATION) {
        Some(stamped) => stamped,
        None => return Ownership::NotFound,
    };

    if stamped != identity.as_str() {
        return Ownership::NotMine;
    }

    match annotations.get(SHARE_ANNOTATION) {
        Some(share) => Ownership::Owned {
            share: share.clone(),
        },
        None => Ownership::NotFound,
    }
}
