//! CephFS Share Provisioner
//!
//! Dynamic provisioner for CephFS-backed Kubernetes persistent volumes.
//! For each provision request it allocates a uniquely named CephFS share
//! and a dedicated cephx user through an external allocation agent,
//! publishes the result as a volume descriptor, and reverses the
//! allocation when the volume is released.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                  Persistent Volume Controller                  │
//! │              (external, drives VolumeProvisioner)              │
//! └──────────────────────────────┬────────────────────────────────┘
//!                                │ Provision / Delete
//! ┌──────────────────────────────┴────────────────────────────────┐
//! │                       CephFsProvisioner                        │
//! │  parameters ──► credentials ──► agent ──► ownership stamp      │
//! ├───────────────────────────────────────────────────────────────┤
//! │   SecretStore / StorageClassSource     Allocation Agent        │
//! │        (Kubernetes API)                 (subprocess)           │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`provisioner`]: parameter resolution, credentials, the allocation
//!   agent client, ownership tracking, and the provision/delete lifecycle
//! - [`adapters`]: Kubernetes-backed secret store and storage class lookup
//! - [`domain`]: core domain types and traits
//! - [`error`]: error types and retry classification

pub mod adapters;
pub mod domain;
pub mod error;
pub mod provisioner;

// Re-export commonly used types
pub use adapters::{KubeSecretStore, KubeStorageClassSource};

pub use domain::ports::{
    AccessMode, DeleteOutcome, ProvisionRequest, ReclaimPolicy, SecretStore, SecretStoreRef,
    StorageClassSource, StorageClassSourceRef, VolumeDescriptor, VolumeProvisioner,
    VolumeProvisionerRef,
};

pub use error::{Error, ErrorAction, Result};

pub use provisioner::{
    AgentClient, AgentGrant, CephFsProvisioner, ClusterConnection, Ownership, ProvisionerIdentity,
    ShareParameters,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
