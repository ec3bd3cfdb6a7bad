//! Domain Core
//!
//! This crate contains the domain entities and the file-format codecs the
//! delivery pipeline is built on: the deployment manifest model, the
//! Java-properties codec, the bundle-manifest rewriter, and the
//! content-type resolver for Partner Directory binaries. It has no knowledge
//! of transports or orchestration.

pub mod content_type;
pub mod error;
pub mod fsutil;
pub mod manifest;
pub mod model;
pub mod pd;
pub mod properties;

pub use crate::error::{DomainError, Result};
pub use crate::model::{
    Artifact, ArtifactType, ConfigValue, DeployConfig, DeploymentTask, Package,
};
pub use crate::pd::{BinaryParameter, StringParameter, SyncReport};
