//! Package and Artifact Synchroniser Ports
//!
//! Two narrow handles the orchestrator drives during the update phase: one
//! for package-level metadata, one for the per-artifact upload. The upload
//! protocol itself (archive layout, upsert handshake) belongs to the adapter.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use skybridge_core::ArtifactType;

/// Package metadata pushed to the tenant
#[derive(Debug, Clone)]
pub struct PackageUpdate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub short_text: String,
}

/// Package synchroniser port
#[async_trait]
pub trait PackageSyncer: Send + Sync {
    /// Create or update the package's metadata on the tenant.
    async fn update_package(&self, update: &PackageUpdate, work_dir: &Path)
        -> Result<(), SyncerError>;
}

/// One artifact update staged and ready for upload
#[derive(Debug, Clone)]
pub struct ArtifactUpdate {
    pub artifact_id: String,
    pub display_name: String,
    pub artifact_type: ArtifactType,
    pub package_id: String,
    /// Staged working copy of the artifact directory, headers and parameters
    /// already rewritten.
    pub staging_dir: PathBuf,
    /// Run-scoped scratch directory for in-transit files.
    pub work_dir: PathBuf,
}

/// Artifact synchroniser port
#[async_trait]
pub trait ArtifactSyncer: Send + Sync {
    /// Upload a single staged artifact to the tenant.
    async fn update_artifact(&self, update: &ArtifactUpdate) -> Result<(), SyncerError>;
}

/// Synchroniser error
#[derive(thiserror::Error, Debug)]
pub enum SyncerError {
    #[error("tenant rejected the update (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("staging failure: {0}")]
    Staging(String),
}
