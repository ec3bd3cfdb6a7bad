//! Partner Directory API Port
//!
//! Remote operations over the tenant's Partner Directory: listings, single
//! item CRUD, and the high-throughput batch entry points. Single-item GETs
//! return `None` on 404 so the sync engine can distinguish "absent" from
//! "failed".

use async_trait::async_trait;
use skybridge_core::{BinaryParameter, StringParameter, SyncReport};

/// Identity of one parameter, used for deletions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterKey {
    pub pid: String,
    pub id: String,
}

impl ParameterKey {
    pub fn new(pid: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            pid: pid.into(),
            id: id.into(),
        }
    }
}

/// Partner Directory API port
#[async_trait]
pub trait PartnerDirectoryApi: Send + Sync {
    /// List all string parameters, optionally restricting the selected
    /// fields (e.g. `Pid,Id,Value`).
    async fn list_string_parameters(
        &self,
        select: Option<&str>,
    ) -> Result<Vec<StringParameter>, PdApiError>;

    /// List all binary parameters, optionally restricting selected fields.
    async fn list_binary_parameters(
        &self,
        select: Option<&str>,
    ) -> Result<Vec<BinaryParameter>, PdApiError>;

    async fn get_string_parameter(
        &self,
        pid: &str,
        id: &str,
    ) -> Result<Option<StringParameter>, PdApiError>;

    async fn get_binary_parameter(
        &self,
        pid: &str,
        id: &str,
    ) -> Result<Option<BinaryParameter>, PdApiError>;

    async fn create_string_parameter(&self, param: &StringParameter) -> Result<(), PdApiError>;

    async fn update_string_parameter(&self, param: &StringParameter) -> Result<(), PdApiError>;

    async fn delete_string_parameter(&self, pid: &str, id: &str) -> Result<(), PdApiError>;

    async fn create_binary_parameter(&self, param: &BinaryParameter) -> Result<(), PdApiError>;

    async fn update_binary_parameter(&self, param: &BinaryParameter) -> Result<(), PdApiError>;

    async fn delete_binary_parameter(&self, pid: &str, id: &str) -> Result<(), PdApiError>;

    /// Create/update string parameters through the batch protocol, chunked.
    async fn batch_sync_string_parameters(
        &self,
        params: &[StringParameter],
        batch_size: usize,
    ) -> Result<SyncReport, PdApiError>;

    /// Create/update binary parameters through the batch protocol, chunked.
    async fn batch_sync_binary_parameters(
        &self,
        params: &[BinaryParameter],
        batch_size: usize,
    ) -> Result<SyncReport, PdApiError>;

    /// Delete string parameters through the batch protocol, chunked.
    async fn batch_delete_string_parameters(
        &self,
        keys: &[ParameterKey],
        batch_size: usize,
    ) -> Result<SyncReport, PdApiError>;

    /// Delete binary parameters through the batch protocol, chunked.
    async fn batch_delete_binary_parameters(
        &self,
        keys: &[ParameterKey],
        batch_size: usize,
    ) -> Result<SyncReport, PdApiError>;
}

/// Partner Directory API error
#[derive(thiserror::Error, Debug)]
pub enum PdApiError {
    #[error("unauthorized (status {0})")]
    Unauthorized(u16),

    #[error("tenant call failed (status {status}): {message}")]
    Remote { status: u16, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport failure: {0}")]
    Transport(String),
}
