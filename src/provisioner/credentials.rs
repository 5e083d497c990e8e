//! Admin Credential Resolution
//!
//! Fetches the Ceph admin credential from the cluster secret store. The
//! credential's key name inside the secret is not standardized, so any
//! single entry is accepted; the admin secret is expected to hold exactly
//! one key.

use crate::domain::ports::SecretStore;
use crate::error::{Error, Result};

/// Fetch the admin credential value from the named secret.
///
/// Fails if the secret store is unreachable, the secret does not exist, or
/// its data map holds no non-empty entry.
pub async fn admin_secret_value(
    store: &dyn SecretStore,
    namespace: &str,
    name: &str,
) -> Result<String> {
    let data = store.get(namespace, name).await?;

    let value = data
        .into_values()
        .find(|value| !value.is_empty())
        .ok_or_else(|| Error::EmptyAdminSecret {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;

    Ok(String::from_utf8_lossy(&value).into_owned())
}
