//! Provisioning Lifecycle
//!
//! Orchestrates parameter resolution, credential lookup, the allocation
//! agent, and ownership tracking into the two provisioner operations,
//! Provision and Delete.

use crate::domain::ports::{
    AccessMode, DeleteOutcome, ProvisionRequest, SecretStoreRef, StorageClassSourceRef,
    VolumeDescriptor, VolumeProvisioner,
};
use crate::error::{Error, Result};
use crate::provisioner::agent::AgentClient;
use crate::provisioner::ownership::{self, Ownership, ProvisionerIdentity};
use crate::provisioner::parameters::ShareParameters;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Annotation referencing the storage class a volume was provisioned from,
/// set on the published volume object by the volume controller
pub const CLASS_ANNOTATION: &str = "volume.beta.kubernetes.io/storage-class";

/// Annotation recording when the share was provisioned
const PROVISIONED_AT_ANNOTATION: &str = "cephFSProvisionedAt";

/// Prefix for generated share names
const SHARE_NAME_PREFIX: &str = "dyn-pvc-";

/// Prefix for generated cephx user names
const USER_NAME_PREFIX: &str = "dyn-user-";

/// Data key the granted credential is stored under
const SECRET_DATA_KEY: &str = "key";

// =============================================================================
// CephFS Provisioner
// =============================================================================

/// CephFS share provisioner.
///
/// Holds no mutable state of its own; the identity is generated once per
/// process and injected at construction.
pub struct CephFsProvisioner {
    identity: ProvisionerIdentity,
    agent: AgentClient,
    secrets: SecretStoreRef,
    classes: StorageClassSourceRef,
}

impl CephFsProvisioner {
    /// Create a provisioner with the given process identity
    pub fn new(
        identity: ProvisionerIdentity,
        agent: AgentClient,
        secrets: SecretStoreRef,
        classes: StorageClassSourceRef,
    ) -> Self {
        Self {
            identity,
            agent,
            secrets,
            classes,
        }
    }

    /// Identity stamped onto volumes created by this instance
    pub fn identity(&self) -> &ProvisionerIdentity {
        &self.identity
    }

    /// Deterministic name of the granted credential secret for a user
    fn secret_name_for(user: &str) -> String {
        format!("ceph-{user}-secret")
    }

    /// Normalize an agent-reported path to begin at the filesystem root
    /// component, discarding any export-system prefix before the first `/`
    fn rooted_path(path: &str) -> Result<&str> {
        path.find('/')
            .map(|at| &path[at..])
            .ok_or_else(|| Error::AgentOutput {
                reason: "share path has no root component".into(),
                output: path.to_string(),
            })
    }
}

#[async_trait]
impl VolumeProvisioner for CephFsProvisioner {
    /// Allocate a share plus a dedicated cephx user and return the volume
    /// descriptor to publish.
    ///
    /// If creating the granted credential secret fails after the agent has
    /// already allocated the share, the share is left in place; the
    /// controller's retry provisions a fresh share/user pair, and the
    /// orphaned one needs external cleanup.
    async fn provision(&self, request: ProvisionRequest) -> Result<VolumeDescriptor> {
        if request.selector.is_some() {
            return Err(Error::SelectorUnsupported);
        }

        let params = ShareParameters::parse(&request.parameters)?;
        let conn = params.resolve(self.secrets.as_ref()).await?;

        let share = format!("{SHARE_NAME_PREFIX}{}", Uuid::new_v4());
        let user = format!("{USER_NAME_PREFIX}{}", Uuid::new_v4());

        let grant = self.agent.create_share(&share, &user, &conn).await?;
        let path = Self::rooted_path(&grant.path)?.to_string();

        let secret_name = Self::secret_name_for(&grant.user);
        let data = BTreeMap::from([(SECRET_DATA_KEY.to_string(), grant.auth.into_bytes())]);
        if let Err(e) = self
            .secrets
            .create(&request.namespace, &secret_name, data)
            .await
        {
            warn!(
                %share,
                user = %grant.user,
                namespace = %request.namespace,
                "share left allocated after credential secret creation failed"
            );
            return Err(e);
        }

        let mut annotations = ownership::stamp(&self.identity, &share);
        annotations.insert(
            PROVISIONED_AT_ANNOTATION.to_string(),
            Utc::now().to_rfc3339(),
        );

        info!(
            volume = %request.volume_name,
            %share,
            user = %grant.user,
            path = %path,
            "provisioned CephFS share"
        );

        Ok(VolumeDescriptor {
            name: request.volume_name,
            annotations,
            capacity: request.capacity,
            reclaim_policy: request.reclaim_policy,
            access_modes: vec![
                AccessMode::ReadWriteOnce,
                AccessMode::ReadOnlyMany,
                AccessMode::ReadWriteMany,
            ],
            monitors: conn.monitors,
            path,
            secret_name,
            user: grant.user,
        })
    }

    /// Reverse the allocation backing a published volume.
    ///
    /// Cleanup of the granted credential secret stays with the outer API
    /// layer.
    async fn delete(&self, volume: &VolumeDescriptor) -> Result<DeleteOutcome> {
        let share = match ownership::verify(&volume.annotations, &self.identity) {
            Ownership::NotFound => {
                return Err(Error::MissingOwnership {
                    name: volume.name.clone(),
                })
            }
            Ownership::NotMine => {
                debug!(
                    volume = %volume.name,
                    "volume owned by another provisioner instance, leaving in place"
                );
                return Ok(DeleteOutcome::Ignored);
            }
            Ownership::Owned { share } => share,
        };

        let class = volume
            .annotations
            .get(CLASS_ANNOTATION)
            .ok_or_else(|| Error::MissingClassAnnotation {
                name: volume.name.clone(),
            })?;

        let parameters = self.classes.class_parameters(class).await?;
        let params = ShareParameters::parse(&parameters)?;
        let conn = params.resolve(self.secrets.as_ref()).await?;

        self.agent.remove_share(&share, &volume.user, &conn).await?;

        info!(volume = %volume.name, %share, user = %volume.user, "deleted CephFS share");
        Ok(DeleteOutcome::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{ReclaimPolicy, SecretStore, StorageClassSource};
    use assert_matches::assert_matches;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::RwLock;

    // =========================================================================
    // In-Memory Ports
    // =========================================================================

    #[derive(Default)]
    struct MemorySecretStore {
        secrets: RwLock<BTreeMap<(String, String), BTreeMap<String, Vec<u8>>>>,
        fail_create: bool,
    }

    impl MemorySecretStore {
        fn failing_create() -> Self {
            Self {
                fail_create: true,
                ..Default::default()
            }
        }

        async fn insert(&self, namespace: &str, name: &str, key: &str, value: &[u8]) {
            self.secrets.write().await.insert(
                (namespace.to_string(), name.to_string()),
                BTreeMap::from([(key.to_string(), value.to_vec())]),
            );
        }

        async fn data(&self, namespace: &str, name: &str) -> Option<BTreeMap<String, Vec<u8>>> {
            self.secrets
                .read()
                .await
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
        }

        async fn count_in(&self, namespace: &str) -> usize {
            self.secrets
                .read()
                .await
                .keys()
                .filter(|(ns, _)| ns == namespace)
                .count()
        }
    }

    fn not_found(what: &str) -> Error {
        Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".into(),
            message: format!("{what} not found"),
            reason: "NotFound".into(),
            code: 404,
        }))
    }

    #[async_trait]
    impl SecretStore for MemorySecretStore {
        async fn get(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, Vec<u8>>> {
            self.data(namespace, name)
                .await
                .ok_or_else(|| not_found("secret"))
        }

        async fn create(
            &self,
            namespace: &str,
            name: &str,
            data: BTreeMap<String, Vec<u8>>,
        ) -> Result<()> {
            if self.fail_create {
                return Err(Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
                    status: "Failure".into(),
                    message: "admission webhook denied the request".into(),
                    reason: "Forbidden".into(),
                    code: 403,
                })));
            }
            self.secrets
                .write()
                .await
                .insert((namespace.to_string(), name.to_string()), data);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryClassSource {
        classes: BTreeMap<String, BTreeMap<String, String>>,
    }

    #[async_trait]
    impl StorageClassSource for MemoryClassSource {
        async fn class_parameters(&self, name: &str) -> Result<BTreeMap<String, String>> {
            self.classes
                .get(name)
                .cloned()
                .ok_or_else(|| not_found("storage class"))
        }
    }

    // =========================================================================
    // Fixtures
    // =========================================================================

    fn fake_agent(dir: &TempDir, script: &str) -> AgentClient {
        let path = dir.path().join("cephfs-agent");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        AgentClient::new(path)
    }

    fn class_parameters() -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                "monitors".to_string(),
                "10.0.0.1:6789,10.0.0.2:6789".to_string(),
            ),
            ("adminSecretName".to_string(), "ceph-admin".to_string()),
        ])
    }

    fn request(parameters: BTreeMap<String, String>) -> ProvisionRequest {
        ProvisionRequest {
            volume_name: "pvc-7c9df3a1".into(),
            namespace: "tenant-a".into(),
            capacity: Quantity("5Gi".into()),
            reclaim_policy: ReclaimPolicy::Delete,
            parameters,
            selector: None,
        }
    }

    fn descriptor(annotations: BTreeMap<String, String>) -> VolumeDescriptor {
        VolumeDescriptor {
            name: "pvc-7c9df3a1".into(),
            annotations,
            capacity: Quantity("5Gi".into()),
            reclaim_policy: ReclaimPolicy::Delete,
            access_modes: vec![AccessMode::ReadWriteMany],
            monitors: vec!["10.0.0.1:6789".into()],
            path: "/volumes/vol1".into(),
            secret_name: "ceph-u1-secret".into(),
            user: "u1".into(),
        }
    }

    async fn store_with_admin_secret() -> Arc<MemorySecretStore> {
        let store = Arc::new(MemorySecretStore::default());
        store
            .insert("default", "ceph-admin", "secret", b"AQBadmin==")
            .await;
        store
    }

    fn provisioner(
        identity: &str,
        agent: AgentClient,
        secrets: Arc<MemorySecretStore>,
        classes: MemoryClassSource,
    ) -> CephFsProvisioner {
        CephFsProvisioner::new(
            ProvisionerIdentity::new(identity),
            agent,
            secrets,
            Arc::new(classes),
        )
    }

    // =========================================================================
    // Provision
    // =========================================================================

    #[tokio::test]
    async fn test_provision_happy_path() {
        let dir = TempDir::new().unwrap();
        let agent = fake_agent(
            &dir,
            "#!/bin/sh\necho '{\"path\":\"/volumes/vol1\",\"user\":\"u1\",\"auth\":\"AQA==\"}'\n",
        );
        let store = store_with_admin_secret().await;
        let p = provisioner("me", agent, store.clone(), MemoryClassSource::default());

        let volume = p.provision(request(class_parameters())).await.unwrap();

        assert_eq!(volume.name, "pvc-7c9df3a1");
        assert_eq!(volume.path, "/volumes/vol1");
        assert_eq!(volume.user, "u1");
        assert_eq!(volume.monitors.len(), 2);
        assert_eq!(volume.capacity, Quantity("5Gi".into()));
        assert_eq!(volume.reclaim_policy, ReclaimPolicy::Delete);
        assert_eq!(volume.access_modes.len(), 3);
        assert_eq!(volume.secret_name, "ceph-u1-secret");

        // ownership stamp
        let identity = ProvisionerIdentity::new("me");
        assert_matches!(
            ownership::verify(&volume.annotations, &identity),
            Ownership::Owned { share } if share.starts_with("dyn-pvc-")
        );

        // granted credential secret in the claim namespace
        let data = store.data("tenant-a", "ceph-u1-secret").await.unwrap();
        assert_eq!(data.get("key").unwrap(), b"AQA==");
    }

    #[tokio::test]
    async fn test_provision_rejects_selector() {
        let store = store_with_admin_secret().await;
        let p = provisioner(
            "me",
            AgentClient::new("/nonexistent/cephfs-agent"),
            store.clone(),
            MemoryClassSource::default(),
        );

        let mut req = request(class_parameters());
        req.selector = Some(LabelSelector::default());

        let err = p.provision(req).await.unwrap_err();

        // rejected before the agent would have been spawned
        assert_matches!(err, Error::SelectorUnsupported);
        assert_eq!(store.count_in("tenant-a").await, 0);
    }

    #[tokio::test]
    async fn test_provision_agent_failure_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let agent = fake_agent(&dir, "#!/bin/sh\nexit 3\n");
        let store = store_with_admin_secret().await;
        let p = provisioner("me", agent, store.clone(), MemoryClassSource::default());

        let err = p.provision(request(class_parameters())).await.unwrap_err();

        assert_matches!(err, Error::AgentFailed { .. });
        assert_eq!(store.count_in("tenant-a").await, 0);
    }

    #[tokio::test]
    async fn test_provision_incomplete_grant_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let agent = fake_agent(
            &dir,
            "#!/bin/sh\necho '{\"path\":\"/volumes/vol1\",\"user\":\"u1\",\"auth\":\"\"}'\n",
        );
        let store = store_with_admin_secret().await;
        let p = provisioner("me", agent, store.clone(), MemoryClassSource::default());

        let err = p.provision(request(class_parameters())).await.unwrap_err();

        assert_matches!(err, Error::AgentOutput { .. });
        assert_eq!(store.count_in("tenant-a").await, 0);
    }

    #[tokio::test]
    async fn test_provision_secret_creation_failure() {
        let dir = TempDir::new().unwrap();
        let agent = fake_agent(
            &dir,
            "#!/bin/sh\necho '{\"path\":\"/volumes/vol1\",\"user\":\"u1\",\"auth\":\"AQA==\"}'\n",
        );
        let store = Arc::new(MemorySecretStore::failing_create());
        store
            .insert("default", "ceph-admin", "secret", b"AQBadmin==")
            .await;
        let p = provisioner("me", agent, store, MemoryClassSource::default());

        let err = p.provision(request(class_parameters())).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_provision_unknown_parameter() {
        let store = store_with_admin_secret().await;
        let p = provisioner(
            "me",
            AgentClient::new("/nonexistent/cephfs-agent"),
            store,
            MemoryClassSource::default(),
        );

        let mut parameters = class_parameters();
        parameters.insert("readOnly".into(), "true".into());

        let err = p.provision(request(parameters)).await.unwrap_err();
        assert_matches!(err, Error::UnknownParameter { key } if key == "readOnly");
    }

    // =========================================================================
    // Delete
    // =========================================================================

    #[tokio::test]
    async fn test_delete_owned_volume() {
        let dir = TempDir::new().unwrap();
        let agent = fake_agent(
            &dir,
            r#"#!/bin/sh
[ "$1" = "-r" ] || exit 9
[ "$3" = "dyn-pvc-test" ] || exit 9
[ "$5" = "u1" ] || exit 9
[ "$MONITORS" = "10.0.0.1:6789,10.0.0.2:6789" ] || exit 9
exit 0
"#,
        );
        let store = store_with_admin_secret().await;
        let classes = MemoryClassSource {
            classes: BTreeMap::from([("cephfs".to_string(), class_parameters())]),
        };
        let p = provisioner("me", agent, store, classes);

        let mut annotations = ownership::stamp(&ProvisionerIdentity::new("me"), "dyn-pvc-test");
        annotations.insert(CLASS_ANNOTATION.to_string(), "cephfs".to_string());

        let outcome = p.delete(&descriptor(annotations)).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
    }

    #[tokio::test]
    async fn test_delete_foreign_volume_is_ignorable() {
        let store = store_with_admin_secret().await;
        let p = provisioner(
            "me",
            AgentClient::new("/nonexistent/cephfs-agent"),
            store,
            MemoryClassSource::default(),
        );

        let annotations = ownership::stamp(&ProvisionerIdentity::new("other"), "dyn-pvc-test");

        // no agent spawned, no error surfaced
        let outcome = p.delete(&descriptor(annotations)).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_delete_unstamped_volume_is_an_error() {
        let store = store_with_admin_secret().await;
        let p = provisioner(
            "me",
            AgentClient::new("/nonexistent/cephfs-agent"),
            store,
            MemoryClassSource::default(),
        );

        let err = p.delete(&descriptor(BTreeMap::new())).await.unwrap_err();
        assert_matches!(err, Error::MissingOwnership { .. });
    }

    #[tokio::test]
    async fn test_delete_without_class_annotation() {
        let store = store_with_admin_secret().await;
        let p = provisioner(
            "me",
            AgentClient::new("/nonexistent/cephfs-agent"),
            store,
            MemoryClassSource::default(),
        );

        let annotations = ownership::stamp(&ProvisionerIdentity::new("me"), "dyn-pvc-test");

        let err = p.delete(&descriptor(annotations)).await.unwrap_err();
        assert_matches!(err, Error::MissingClassAnnotation { .. });
    }

    #[tokio::test]
    async fn test_delete_agent_failure_is_surfaced() {
        let dir = TempDir::new().unwrap();
        let agent = fake_agent(&dir, "#!/bin/sh\necho \"mds unavailable\" >&2\nexit 1\n");
        let store = store_with_admin_secret().await;
        let classes = MemoryClassSource {
            classes: BTreeMap::from([("cephfs".to_string(), class_parameters())]),
        };
        let p = provisioner("me", agent, store, classes);

        let mut annotations = ownership::stamp(&ProvisionerIdentity::new("me"), "dyn-pvc-test");
        annotations.insert(CLASS_ANNOTATION.to_string(), "cephfs".to_string());

        let err = p.delete(&descriptor(annotations)).await.unwrap_err();
        assert_matches!(err, Error::AgentFailed { output, .. } if output.contains("mds unavailable"));
    }

    // =========================================================================
    // Path Normalization
    // =========================================================================

    #[test]
    fn test_rooted_path_strips_export_prefix() {
        assert_eq!(
            CephFsProvisioner::rooted_path("cephfs:/volumes/vol1").unwrap(),
            "/volumes/vol1"
        );
        assert_eq!(
            CephFsProvisioner::rooted_path("/volumes/vol1").unwrap(),
            "/volumes/vol1"
        );
    }

    #[test]
    fn test_rooted_path_requires_root_component() {
        let err = CephFsProvisioner::rooted_path("volumes").unwrap_err();
        assert_matches!(err, Error::AgentOutput { .. });
    }
}
