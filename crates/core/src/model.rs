//! Deployment manifest model
//!
//! The YAML deployment manifest describes which packages and artifacts are
//! brought onto the tenant. Parsing is tolerant by design: unknown fields are
//! ignored, `sync`/`deploy` default to true, and the legacy field spellings
//! (`integrationSuiteId`, `artifactId`) are accepted as aliases.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Complete deployment configuration loaded from one manifest source
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    #[serde(default)]
    pub deployment_prefix: String,

    #[serde(default)]
    pub packages: Vec<Package>,
}

/// A named bag of artifacts plus tenant-side metadata
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    #[serde(alias = "integrationSuiteId")]
    pub id: String,

    #[serde(default)]
    pub package_dir: String,

    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, alias = "short_text")]
    pub short_text: String,

    #[serde(default = "default_true")]
    pub sync: bool,

    #[serde(default = "default_true")]
    pub deploy: bool,

    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl Package {
    /// Display name, falling back to the package ID when not provided.
    pub fn display_name_or_id(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }
}

/// A single deployable unit within a package
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(alias = "artifactId")]
    pub id: String,

    #[serde(default)]
    pub artifact_dir: String,

    #[serde(default)]
    pub display_name: String,

    /// Raw artifact type as written in the manifest; normalized via
    /// [`ArtifactType::parse`] at the point of use so the update and deploy
    /// paths always agree.
    #[serde(default, rename = "type")]
    pub artifact_type: String,

    #[serde(default = "default_true")]
    pub sync: bool,

    #[serde(default = "default_true")]
    pub deploy: bool,

    #[serde(default)]
    pub config_overrides: BTreeMap<String, ConfigValue>,
}

impl Artifact {
    pub fn display_name_or_id(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }
}

fn default_true() -> bool {
    true
}

/// Scalar override value for `parameters.prop` entries
///
/// The manifest allows strings, integers, booleans and floats here; anything
/// else fails parsing instead of being coerced silently.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(v) => write!(f, "{}", v),
            ConfigValue::Int(v) => write!(f, "{}", v),
            ConfigValue::Float(v) => write!(f, "{}", v),
            ConfigValue::String(v) => write!(f, "{}", v),
        }
    }
}

/// Normalized artifact type understood by the tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactType {
    Integration,
    ValueMapping,
    MessageMapping,
    ScriptCollection,
}

impl ArtifactType {
    /// Normalize a manifest type string.
    ///
    /// Accepts the spelled-out and shorthand forms case-insensitively; empty
    /// or unknown input defaults to an integration flow.
    pub fn parse(input: &str) -> Self {
        match input.trim().to_lowercase().as_str() {
            "integrationflow" | "integration flow" | "iflow" => ArtifactType::Integration,
            "valuemapping" | "value mapping" => ArtifactType::ValueMapping,
            "messagemapping" | "message mapping" => ArtifactType::MessageMapping,
            "scriptcollection" | "script collection" => ArtifactType::ScriptCollection,
            _ => ArtifactType::Integration,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Integration => "Integration",
            ArtifactType::ValueMapping => "ValueMapping",
            ArtifactType::MessageMapping => "MessageMapping",
            ArtifactType::ScriptCollection => "ScriptCollection",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An artifact queued for activation in the deploy phase
#[derive(Debug, Clone)]
pub struct DeploymentTask {
    pub artifact_id: String,
    pub artifact_type: ArtifactType,
    pub package_id: String,
    pub display_name: String,
}
