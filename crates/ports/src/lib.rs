//! Ports - Abstraction Layer
//!
//! This crate defines the traits the engine depends on: the tenant transport,
//! the package and artifact synchronisers, the deployment poller, and the
//! Partner Directory API. Adapters implement them against the real tenant;
//! tests implement them as fakes.

pub mod deployer;
pub mod partner_directory;
pub mod syncer;
pub mod transport;

pub use crate::deployer::{ArtifactDeployer, DeployerError};
pub use crate::partner_directory::{ParameterKey, PartnerDirectoryApi, PdApiError};
pub use crate::syncer::{
    ArtifactSyncer, ArtifactUpdate, PackageSyncer, PackageUpdate, SyncerError,
};
pub use crate::transport::{
    HttpMethod, TenantRequest, TenantResponse, TenantTransport, TransportError,
};
