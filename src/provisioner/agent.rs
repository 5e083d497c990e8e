//! Allocation Agent Client
//!
//! Invokes the external CephFS provisioning agent as a subprocess and
//! enforces its argument/environment/stdout contract. The agent itself is a
//! black box that performs the actual share and cephx user management on
//! the cluster.

use crate::error::{Error, Result};
use crate::provisioner::parameters::ClusterConnection;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info};

const ENV_CLUSTER_NAME: &str = "CLUSTER_NAME";
const ENV_MONITORS: &str = "MONITORS";
const ENV_AUTH_ID: &str = "AUTH_ID";
const ENV_AUTH_KEY: &str = "AUTH_KEY";

// =============================================================================
// Agent Output
// =============================================================================

/// Share grant reported by the agent on create
#[derive(Debug, Clone, Deserialize)]
pub struct AgentGrant {
    /// Export path of the share, possibly carrying an export-system prefix
    pub path: String,
    /// Cephx user the share was granted to
    pub user: String,
    /// Cephx secret granted to the user
    pub auth: String,
}

// =============================================================================
// Agent Client
// =============================================================================

/// Client for the external allocation agent executable
#[derive(Debug, Clone)]
pub struct AgentClient {
    program: PathBuf,
}

impl AgentClient {
    /// Create a client for the agent at `program`
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Path of the agent executable
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Create a share granted to a dedicated user.
    ///
    /// The agent reports the grant as a JSON object on stdout; a non-zero
    /// exit, unparseable output, or any empty grant field is fatal.
    pub async fn create_share(
        &self,
        share: &str,
        user: &str,
        conn: &ClusterConnection,
    ) -> Result<AgentGrant> {
        debug!(share, user, "invoking allocation agent");

        let mut cmd = self.command(conn);
        cmd.args(["-n", share, "-u", user]);
        let output = self.run(&mut cmd).await?;

        let grant: AgentGrant =
            serde_json::from_slice(&output.stdout).map_err(|e| Error::AgentOutput {
                reason: e.to_string(),
                output: combined_output(&output),
            })?;

        if grant.path.is_empty() || grant.user.is_empty() || grant.auth.is_empty() {
            return Err(Error::AgentOutput {
                reason: "empty path, user, or auth field".into(),
                output: combined_output(&output),
            });
        }

        info!(share, user = %grant.user, path = %grant.path, "allocation agent created share");
        Ok(grant)
    }

    /// Destroy a share and its granted user.
    ///
    /// Only the exit status is consulted; stdout is not parsed.
    pub async fn remove_share(
        &self,
        share: &str,
        user: &str,
        conn: &ClusterConnection,
    ) -> Result<()> {
        debug!(share, user, "invoking allocation agent for removal");

        let mut cmd = self.command(conn);
        cmd.args(["-r", "-n", share, "-u", user]);
        self.run(&mut cmd).await?;

        info!(share, user, "allocation agent removed share");
        Ok(())
    }

    fn command(&self, conn: &ClusterConnection) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.env(ENV_CLUSTER_NAME, &conn.cluster)
            .env(ENV_MONITORS, conn.monitors.join(","))
            .env(ENV_AUTH_ID, &conn.admin_id)
            .env(ENV_AUTH_KEY, &conn.admin_key);
        cmd
    }

    /// Run the agent to completion, capturing stdout and stderr.
    ///
    /// No timeout is imposed; deadlines belong to the caller's
    /// process-management layer.
    async fn run(&self, cmd: &mut Command) -> Result<Output> {
        let output = cmd.output().await.map_err(|source| Error::AgentLaunch {
            program: self.program.display().to_string(),
            source,
        })?;

        if !output.status.success() {
            return Err(Error::AgentFailed {
                status: output.status.to_string(),
                output: combined_output(&output),
            });
        }

        Ok(output)
    }
}

/// Combined stdout and stderr of a finished agent process, attached to
/// failures for diagnostics
fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    text
}
