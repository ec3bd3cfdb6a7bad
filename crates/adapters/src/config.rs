//! Ambient configuration and credential resolution
//!
//! The binary can run from flags alone, but most installations keep a YAML
//! config file next to the pipeline definition. Every option resolves in the
//! same priority order: explicit flag, then config file key, then default.

use std::path::Path;

use serde::{Deserialize, Serialize};
use skybridge_core::{DomainError, Result};

/// Resolve one option from its sources in priority order: explicit value
/// first, then the ambient config's value, then the default.
pub fn resolve_option<T>(explicit: Option<T>, ambient: Option<T>, default: T) -> T {
    explicit.or(ambient).unwrap_or(default)
}

/// How the transport authenticates against the tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
}

/// Connection details for the tenant
#[derive(Debug, Clone)]
pub struct ServiceCredentials {
    /// Tenant host, with or without scheme; a bare host gets `https://`.
    pub host: String,
    pub auth: AuthMethod,
}

impl ServiceCredentials {
    /// Resolve credentials from an explicit set or the ambient config.
    ///
    /// A resolved set without a host is fatal: nothing downstream can run
    /// without knowing the tenant.
    pub fn resolve(explicit: Option<ServiceCredentials>, ambient: &AmbientConfig) -> Result<Self> {
        let credentials = match explicit {
            Some(creds) if !creds.host.is_empty() => creds,
            _ => ambient.tenant.credentials(),
        };

        if credentials.host.is_empty() {
            return Err(DomainError::InvalidInput(
                "tenant host is required: provide it via flags or the config file".to_string(),
            ));
        }

        Ok(credentials)
    }

    /// Base URL for requests, defaulting the scheme to https.
    pub fn base_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            self.host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.host.trim_end_matches('/'))
        }
    }
}

/// Ambient configuration file contents
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbientConfig {
    #[serde(default)]
    pub tenant: TenantConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorSection,

    #[serde(default, rename = "pdSnapshot")]
    pub pd_snapshot: PdSection,

    #[serde(default, rename = "pdDeploy")]
    pub pd_deploy: PdSection,
}

impl AmbientConfig {
    /// Load from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| DomainError::InvalidInput(format!("config file {:?}: {}", path, e)))
    }

    /// Load from the environment: `SKYBRIDGE_CONFIG` names a file, otherwise
    /// tenant credentials are read from `SKYBRIDGE_TENANT_*` variables.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = std::env::var("SKYBRIDGE_CONFIG") {
            return Self::from_file(Path::new(&path));
        }

        let mut config = AmbientConfig::default();
        config.tenant.host = std::env::var("SKYBRIDGE_TENANT_HOST").unwrap_or_default();
        config.tenant.username = std::env::var("SKYBRIDGE_TENANT_USER").ok();
        config.tenant.password = std::env::var("SKYBRIDGE_TENANT_PASSWORD").ok();
        config.tenant.token = std::env::var("SKYBRIDGE_TENANT_TOKEN").ok();
        Ok(config)
    }
}

/// Tenant connection section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConfig {
    #[serde(default)]
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

impl TenantConfig {
    /// Credentials from this section; a token wins over basic auth.
    pub fn credentials(&self) -> ServiceCredentials {
        let auth = if let Some(token) = &self.token {
            AuthMethod::Bearer {
                token: token.clone(),
            }
        } else if let (Some(username), Some(password)) = (&self.username, &self.password) {
            AuthMethod::Basic {
                username: username.clone(),
                password: password.clone(),
            }
        } else {
            AuthMethod::None
        };

        ServiceCredentials {
            host: self.host.clone(),
            auth,
        }
    }
}

/// `orchestrator:` section of the config file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorSection {
    pub packages_dir: Option<String>,
    pub deploy_config: Option<String>,
    pub deployment_prefix: Option<String>,
    pub package_filter: Option<String>,
    pub artifact_filter: Option<String>,
    pub config_pattern: Option<String>,
    pub merge_configs: Option<bool>,
    pub keep_temp: Option<bool>,
    pub mode: Option<String>,
    pub deploy_retries: Option<u32>,
    pub deploy_delay_seconds: Option<u64>,
    pub parallel_deployments: Option<usize>,
}

/// `pdSnapshot:` / `pdDeploy:` sections of the config file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdSection {
    pub resources_path: Option<String>,
    pub replace: Option<bool>,
    pub full_sync: Option<bool>,
    pub dry_run: Option<bool>,
    pub pids: Option<Vec<String>>,
}
