//! Deployment configuration loading and merging
//!
//! A deployment manifest can come from a single file, from every matching
//! file under a folder (recursively, processed in alphabetical order), or
//! from a URL. Multiple loaded manifests can be merged into one deployment,
//! folding each manifest's prefix into its package and artifact IDs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use glob::Pattern;
use skybridge_core::{DeployConfig, DomainError, Result};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Default filename pattern for folder sources; matches `.yml` and `.yaml`.
pub const DEFAULT_FILE_PATTERN: &str = "*.y*ml";

/// Classified configuration source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Folder(PathBuf),
    Url(String),
}

/// Credentials for URL sources
#[derive(Debug, Clone)]
pub enum LoaderAuth {
    Bearer(String),
    Basic { username: String, password: String },
}

/// One successfully loaded manifest with its provenance
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: DeployConfig,
    /// Original path or URL.
    pub source: String,
    /// Display name: base name, or path relative to the folder root.
    pub file_name: String,
    /// Position in processing order.
    pub order: usize,
}

/// Loader for deployment configurations
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub file_pattern: String,
    pub auth: Option<LoaderAuth>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            file_pattern: DEFAULT_FILE_PATTERN.to_string(),
            auth: None,
        }
    }
}

impl ConfigLoader {
    /// Classify a source string: URL, existing folder, or existing file.
    pub fn detect_source(path: &str) -> Result<ConfigSource> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(ConfigSource::Url(path.to_string()));
        }

        let fs_path = Path::new(path);
        if fs_path.is_dir() {
            Ok(ConfigSource::Folder(fs_path.to_path_buf()))
        } else if fs_path.is_file() {
            Ok(ConfigSource::File(fs_path.to_path_buf()))
        } else {
            Err(DomainError::NotFound(format!(
                "config source does not exist: {}",
                path
            )))
        }
    }

    /// Load every manifest the source yields.
    pub async fn load(&self, source: &ConfigSource) -> Result<Vec<LoadedConfig>> {
        match source {
            ConfigSource::File(path) => self.load_file(path),
            ConfigSource::Folder(path) => self.load_folder(path),
            ConfigSource::Url(url) => self.load_url(url).await,
        }
    }

    fn load_file(&self, path: &Path) -> Result<Vec<LoadedConfig>> {
        let config = parse_yaml_file(path)?;
        Ok(vec![LoadedConfig {
            config,
            source: path.display().to_string(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            order: 0,
        }])
    }

    fn load_folder(&self, root: &Path) -> Result<Vec<LoadedConfig>> {
        let pattern = Pattern::new(&self.file_pattern).map_err(|e| {
            DomainError::InvalidInput(format!("invalid file pattern '{}': {}", self.file_pattern, e))
        })?;

        debug!("Scanning {} recursively for {}", root.display(), self.file_pattern);

        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| pattern.matches(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.into_path())
            .collect();

        if files.is_empty() {
            return Err(DomainError::NotFound(format!(
                "no config files matching '{}' found under {}",
                self.file_pattern,
                root.display()
            )));
        }

        files.sort();

        let mut loaded = Vec::new();
        for (order, path) in files.iter().enumerate() {
            let relative = path
                .strip_prefix(root)
                .unwrap_or(path)
                .display()
                .to_string();

            match parse_yaml_file(path) {
                Ok(config) => {
                    debug!("Loaded config file {} (order {})", relative, order);
                    loaded.push(LoadedConfig {
                        config,
                        source: path.display().to_string(),
                        file_name: relative,
                        order,
                    });
                }
                Err(e) => {
                    warn!("Skipping config file {}: {}", relative, e);
                }
            }
        }

        if loaded.is_empty() {
            return Err(DomainError::InvalidInput(format!(
                "found {} config file(s) under {} but none parsed successfully",
                files.len(),
                root.display()
            )));
        }

        info!("Loaded {}/{} config file(s) from {}", loaded.len(), files.len(), root.display());
        Ok(loaded)
    }

    async fn load_url(&self, url: &str) -> Result<Vec<LoadedConfig>> {
        debug!("Fetching config from {}", url);

        let client = reqwest::Client::new();
        let mut request = client.get(url);

        request = match &self.auth {
            Some(LoaderAuth::Bearer(token)) => request.bearer_auth(token),
            Some(LoaderAuth::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| DomainError::Remote(format!("failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        match status.as_u16() {
            200 => {}
            401 | 403 => {
                return Err(DomainError::Unauthorized(format!(
                    "fetching {} returned status {}",
                    url, status
                )));
            }
            code => {
                return Err(DomainError::Remote(format!(
                    "fetching {} returned status {}",
                    url, code
                )));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| DomainError::Remote(format!("failed to read {}: {}", url, e)))?;

        let config: DeployConfig = serde_yaml::from_str(&body)
            .map_err(|e| DomainError::InvalidInput(format!("config from {}: {}", url, e)))?;

        let file_name = url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("remote-config.yml")
            .to_string();

        Ok(vec![LoadedConfig {
            config,
            source: url.to_string(),
            file_name,
            order: 0,
        }])
    }
}

fn parse_yaml_file(path: &Path) -> Result<DeployConfig> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content)
        .map_err(|e| DomainError::InvalidInput(format!("{}: {}", path.display(), e)))
}

/// Merge loaded manifests into a single deployment.
///
/// Each manifest's prefix is folded into its packages: package IDs get the
/// prefix with no separator, display names get `"<prefix> - "`, artifact IDs
/// get `"<prefix>_"`. The merged result itself carries no prefix. Colliding
/// fully-qualified package IDs are a hard conflict naming both sources.
pub fn merge_configs(configs: &[LoadedConfig]) -> Result<DeployConfig> {
    if configs.is_empty() {
        return Err(DomainError::InvalidInput("no configs to merge".to_string()));
    }

    let mut merged = DeployConfig {
        deployment_prefix: String::new(),
        packages: Vec::new(),
    };

    // Fully qualified package ID -> source file that contributed it.
    let mut seen: HashMap<String, String> = HashMap::new();

    for loaded in configs {
        let prefix = loaded.config.deployment_prefix.as_str();

        for package in &loaded.config.packages {
            let mut merged_package = package.clone();

            if !prefix.is_empty() {
                merged_package.id = format!("{}{}", prefix, package.id);
                merged_package.display_name =
                    format!("{} - {}", prefix, package.display_name_or_id());
                for artifact in &mut merged_package.artifacts {
                    artifact.id = format!("{}_{}", prefix, artifact.id);
                }
            }

            if let Some(existing) = seen.get(&merged_package.id) {
                return Err(DomainError::Conflict(format!(
                    "duplicate package ID '{}' found in {} (already exists from {})",
                    merged_package.id, loaded.file_name, existing
                )));
            }

            seen.insert(merged_package.id.clone(), loaded.file_name.clone());
            merged.packages.push(merged_package);
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skybridge_core::{Artifact, Package};
    use std::fs;
    use tempfile::tempdir;

    const MINIMAL: &str = "packages:\n  - id: Pkg1\n    packageDir: Pkg1\n";

    fn loaded(prefix: &str, package_ids: &[&str], file_name: &str) -> LoadedConfig {
        let packages = package_ids
            .iter()
            .map(|id| Package {
                id: id.to_string(),
                package_dir: id.to_string(),
                display_name: String::new(),
                description: String::new(),
                short_text: String::new(),
                sync: true,
                deploy: true,
                artifacts: vec![Artifact {
                    id: format!("{}Artifact", id),
                    artifact_dir: format!("{}Artifact", id),
                    display_name: String::new(),
                    artifact_type: String::new(),
                    sync: true,
                    deploy: true,
                    config_overrides: Default::default(),
                }],
            })
            .collect();

        LoadedConfig {
            config: DeployConfig {
                deployment_prefix: prefix.to_string(),
                packages,
            },
            source: file_name.to_string(),
            file_name: file_name.to_string(),
            order: 0,
        }
    }

    #[test]
    fn test_detect_source_kinds() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("config.yml");
        fs::write(&file, MINIMAL).unwrap();

        assert_eq!(
            ConfigLoader::detect_source(file.to_str().unwrap()).unwrap(),
            ConfigSource::File(file.clone())
        );
        assert_eq!(
            ConfigLoader::detect_source(dir.path().to_str().unwrap()).unwrap(),
            ConfigSource::Folder(dir.path().to_path_buf())
        );
        assert_eq!(
            ConfigLoader::detect_source("https://example.com/config.yml").unwrap(),
            ConfigSource::Url("https://example.com/config.yml".to_string())
        );
        assert!(matches!(
            ConfigLoader::detect_source("/nonexistent/path.yml"),
            Err(DomainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_single_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("deploy.yml");
        fs::write(&file, MINIMAL).unwrap();

        let loader = ConfigLoader::default();
        let configs = loader.load(&ConfigSource::File(file)).await.unwrap();

        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].file_name, "deploy.yml");
        assert_eq!(configs[0].order, 0);
        assert_eq!(configs[0].config.packages[0].id, "Pkg1");
    }

    #[tokio::test]
    async fn test_load_folder_sorted_and_recursive() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.yml"), MINIMAL.replace("Pkg1", "PkgB")).unwrap();
        fs::write(dir.path().join("a.yaml"), MINIMAL.replace("Pkg1", "PkgA")).unwrap();
        fs::write(
            dir.path().join("nested").join("c.yml"),
            MINIMAL.replace("Pkg1", "PkgC"),
        )
        .unwrap();
        fs::write(dir.path().join("ignored.txt"), "not yaml").unwrap();

        let loader = ConfigLoader::default();
        let configs = loader
            .load(&ConfigSource::Folder(dir.path().to_path_buf()))
            .await
            .unwrap();

        assert_eq!(configs.len(), 3);
        assert_eq!(configs[0].file_name, "a.yaml");
        assert_eq!(configs[1].file_name, "b.yml");
        assert_eq!(configs[2].file_name, "nested/c.yml");
        assert_eq!(configs[2].order, 2);
        assert_eq!(configs[0].config.packages[0].id, "PkgA");
    }

    #[tokio::test]
    async fn test_load_folder_skips_unparsable_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bad.yml"), "packages: [not: closed").unwrap();
        fs::write(dir.path().join("good.yml"), MINIMAL).unwrap();

        let loader = ConfigLoader::default();
        let configs = loader
            .load(&ConfigSource::Folder(dir.path().to_path_buf()))
            .await
            .unwrap();

        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].file_name, "good.yml");
    }

    #[tokio::test]
    async fn test_load_folder_fails_when_all_unparsable_or_empty() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bad.yml"), "packages: [not: closed").unwrap();

        let loader = ConfigLoader::default();
        let result = loader
            .load(&ConfigSource::Folder(dir.path().to_path_buf()))
            .await;
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));

        let empty = tempdir().unwrap();
        let result = loader
            .load(&ConfigSource::Folder(empty.path().to_path_buf()))
            .await;
        assert!(matches!(result, Err(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_load_folder_custom_pattern() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("deploy-a.yml"), MINIMAL).unwrap();
        fs::write(dir.path().join("other.yml"), MINIMAL).unwrap();

        let loader = ConfigLoader {
            file_pattern: "deploy-*.yml".to_string(),
            auth: None,
        };
        let configs = loader
            .load(&ConfigSource::Folder(dir.path().to_path_buf()))
            .await
            .unwrap();

        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].file_name, "deploy-a.yml");
    }

    #[tokio::test]
    async fn test_load_url_success_and_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/configs/deploy.yml")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_body(MINIMAL)
            .create_async()
            .await;

        let loader = ConfigLoader {
            file_pattern: DEFAULT_FILE_PATTERN.to_string(),
            auth: Some(LoaderAuth::Bearer("tok".to_string())),
        };
        let url = format!("{}/configs/deploy.yml", server.url());
        let configs = loader.load(&ConfigSource::Url(url)).await.unwrap();

        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].file_name, "deploy.yml");
        assert_eq!(configs[0].config.packages[0].id, "Pkg1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_load_url_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/deploy.yml")
            .match_header("authorization", "Basic dXNlcjpwYXNz")
            .with_status(200)
            .with_body(MINIMAL)
            .create_async()
            .await;

        let loader = ConfigLoader {
            file_pattern: DEFAULT_FILE_PATTERN.to_string(),
            auth: Some(LoaderAuth::Basic {
                username: "user".to_string(),
                password: "pass".to_string(),
            }),
        };
        let url = format!("{}/deploy.yml", server.url());
        loader.load(&ConfigSource::Url(url)).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_load_url_non_200_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/deploy.yml")
            .with_status(500)
            .create_async()
            .await;

        let loader = ConfigLoader::default();
        let url = format!("{}/deploy.yml", server.url());
        let result = loader.load(&ConfigSource::Url(url)).await;
        assert!(matches!(result, Err(DomainError::Remote(_))));
    }

    #[tokio::test]
    async fn test_load_url_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/deploy.yml")
            .with_status(401)
            .create_async()
            .await;

        let loader = ConfigLoader::default();
        let url = format!("{}/deploy.yml", server.url());
        let result = loader.load(&ConfigSource::Url(url)).await;
        assert!(matches!(result, Err(DomainError::Unauthorized(_))));
    }

    #[test]
    fn test_merge_empty_fails() {
        let result = merge_configs(&[]);
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));
    }

    #[test]
    fn test_merge_distinct_prefixes() {
        let configs = vec![
            loaded("DEV", &["P1"], "a.yml"),
            loaded("QA", &["P1"], "b.yml"),
        ];

        let merged = merge_configs(&configs).unwrap();
        assert_eq!(merged.deployment_prefix, "");
        assert_eq!(merged.packages.len(), 2);
        assert_eq!(merged.packages[0].id, "DEVP1");
        assert_eq!(merged.packages[0].display_name, "DEV - P1");
        assert_eq!(merged.packages[1].id, "QAP1");
        assert_eq!(merged.packages[1].display_name, "QA - P1");
    }

    #[test]
    fn test_merge_without_prefix_leaves_ids_untouched() {
        let configs = vec![loaded("", &["P1", "P2"], "a.yml")];

        let merged = merge_configs(&configs).unwrap();
        assert_eq!(merged.packages[0].id, "P1");
        assert_eq!(merged.packages[0].display_name, "");
        assert_eq!(merged.packages[0].artifacts[0].id, "P1Artifact");
    }

    #[test]
    fn test_merge_duplicate_fully_qualified_id() {
        let configs = vec![
            loaded("DEV", &["P1"], "a.yml"),
            loaded("DEV", &["P1"], "b.yml"),
        ];

        let err = merge_configs(&configs).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("DEVP1"));
        assert!(message.contains("a.yml"));
        assert!(message.contains("b.yml"));
    }

    #[test]
    fn test_merge_applies_artifact_prefix() {
        let configs = vec![loaded("DEV", &["P1"], "a.yml")];

        let merged = merge_configs(&configs).unwrap();
        assert_eq!(merged.packages[0].artifacts[0].id, "DEV_P1Artifact");
    }

    #[test]
    fn test_merge_display_name_falls_back_to_id() {
        let mut config = loaded("DEV", &["P1"], "a.yml");
        config.config.packages[0].display_name = "Named".to_string();

        let merged = merge_configs(&[config]).unwrap();
        assert_eq!(merged.packages[0].display_name, "DEV - Named");
    }

    #[test]
    fn test_merge_preserves_input_order() {
        let configs = vec![
            loaded("B", &["P2", "P1"], "b.yml"),
            loaded("A", &["P3"], "a.yml"),
        ];

        let merged = merge_configs(&configs).unwrap();
        let ids: Vec<&str> = merged.packages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["BP2", "BP1", "AP3"]);
    }
}
