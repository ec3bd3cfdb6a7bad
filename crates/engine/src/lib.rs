//! Delivery Engine
//!
//! The application layer of skybridge: loading and merging deployment
//! manifests, the two-phase update/deploy orchestrator, the Partner Directory
//! sync engine over its local on-disk layout, and run reporting. External
//! effects go through the ports crate; everything here is testable with
//! fakes.

pub mod config_loader;
pub mod orchestrator;
pub mod partner_directory;
pub mod pd_repository;
pub mod stats;

pub use crate::config_loader::{merge_configs, ConfigLoader, ConfigSource, LoadedConfig, LoaderAuth};
pub use crate::orchestrator::{OperationMode, Orchestrator, OrchestratorOptions, RunOutcome};
pub use crate::partner_directory::{PartnerDirectorySync, SyncOptions};
pub use crate::pd_repository::PdRepository;
pub use crate::stats::ProcessingStats;
