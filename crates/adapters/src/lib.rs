//! Tenant Adapters
//!
//! Implementations of the ports against the real tenant: the reqwest-backed
//! transport, the multipart batch protocol client, the Partner Directory API
//! client, and the package/artifact synchroniser and deployer adapters. Also
//! hosts the ambient configuration and credential resolution used by the
//! binary.

pub mod batch;
pub mod config;
pub mod http;
pub mod partner_directory;
pub mod tenant;

pub use crate::batch::{BatchClient, BatchError, BatchOperation, BatchOperationResponse};
pub use crate::config::{AmbientConfig, AuthMethod, ServiceCredentials};
pub use crate::http::HttpTransport;
pub use crate::partner_directory::PartnerDirectoryClient;
pub use crate::tenant::{TenantArtifactDeployer, TenantArtifactSyncer, TenantPackageSyncer};
