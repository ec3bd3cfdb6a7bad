//! Partner Directory entities
//!
//! The Partner Directory is a remote key/value store indexed by
//! `(partner id, parameter id)`. Field names follow the tenant's OData
//! casing on the wire.

use serde::{Deserialize, Serialize};

/// A string parameter stored in the Partner Directory
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StringParameter {
    #[serde(rename = "Pid")]
    pub pid: String,

    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "Value", default)]
    pub value: String,
}

/// A binary parameter stored in the Partner Directory
///
/// `value` carries the base64 encoding of the payload, exactly as the tenant
/// transports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BinaryParameter {
    #[serde(rename = "Pid")]
    pub pid: String,

    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "Value", default)]
    pub value: String,

    #[serde(rename = "ContentType", default)]
    pub content_type: String,
}

/// Outcome of a synchronization pass over one direction of parameters
///
/// Entries are `"{pid}/{id}"` keys; errors are human-readable reasons tied to
/// the same keys. A non-empty `errors` list never aborts the surrounding run.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
    pub deleted: Vec<String>,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.created.extend(other.created);
        self.updated.extend(other.updated);
        self.unchanged.extend(other.unchanged);
        self.deleted.extend(other.deleted);
        self.errors.extend(other.errors);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Canonical `"{pid}/{id}"` key used in reports and logs.
pub fn parameter_key(pid: &str, id: &str) -> String {
    format!("{}/{}", pid, id)
}
