//! Artifact Deployer Port
//!
//! Activation of an updated artifact. Implementations trigger the deploy and
//! poll the runtime status within their own retry/delay budget; each call is
//! independent and safe to run from parallel workers.

use async_trait::async_trait;
use skybridge_core::ArtifactType;

/// Artifact deployer port
#[async_trait]
pub trait ArtifactDeployer: Send + Sync {
    /// Deploy one artifact and wait for it to become active.
    async fn deploy(
        &self,
        artifact_id: &str,
        artifact_type: ArtifactType,
    ) -> Result<(), DeployerError>;
}

/// Deployer error
#[derive(thiserror::Error, Debug)]
pub enum DeployerError {
    #[error("deployment failed: {0}")]
    Failed(String),

    #[error("deployment not active after {attempts} checks")]
    TimedOut { attempts: u32 },

    #[error("deployment cancelled")]
    Cancelled,
}
