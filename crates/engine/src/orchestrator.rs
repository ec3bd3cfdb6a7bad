//! Two-phase update/deploy orchestrator
//!
//! Phase 1 walks the effective manifest sequentially: package metadata is
//! pushed first, then each artifact is staged into the run's temp workspace,
//! its bundle headers and parameters rewritten, and handed to the artifact
//! synchroniser. Phase 2 deploys the collected tasks per package with bounded
//! parallelism. Failures accumulate in the stats and never abort the run;
//! only loader and validation problems are fatal.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use skybridge_core::{
    fsutil, manifest, properties, ArtifactType, DeployConfig, DeploymentTask, DomainError,
    Package, Result,
};
use skybridge_ports::{ArtifactSyncer, ArtifactUpdate, ArtifactDeployer, PackageSyncer, PackageUpdate};
use tempfile::TempDir;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config_loader::{merge_configs, LoadedConfig};
use crate::stats::ProcessingStats;

/// Orchestrator operation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    UpdateAndDeploy,
    UpdateOnly,
    DeployOnly,
}

impl FromStr for OperationMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "update-and-deploy" => Ok(OperationMode::UpdateAndDeploy),
            "update-only" => Ok(OperationMode::UpdateOnly),
            "deploy-only" => Ok(OperationMode::DeployOnly),
            other => Err(DomainError::InvalidInput(format!(
                "unknown operation mode: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for OperationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationMode::UpdateAndDeploy => "update-and-deploy",
            OperationMode::UpdateOnly => "update-only",
            OperationMode::DeployOnly => "deploy-only",
        };
        f.write_str(name)
    }
}

/// Resolved orchestrator options
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub mode: OperationMode,
    pub packages_dir: PathBuf,
    pub deployment_prefix: String,
    /// Package IDs to include; empty means everything.
    pub package_filter: Vec<String>,
    /// Artifact IDs to include; empty means everything.
    pub artifact_filter: Vec<String>,
    pub keep_temp: bool,
    pub merge_configs: bool,
    pub parallel_deployments: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            mode: OperationMode::UpdateAndDeploy,
            packages_dir: PathBuf::from("."),
            deployment_prefix: String::new(),
            package_filter: Vec::new(),
            artifact_filter: Vec::new(),
            keep_temp: false,
            merge_configs: false,
            parallel_deployments: 3,
        }
    }
}

/// Overall run outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Clean,
    CompletedWithFailures,
}

/// Run-scoped temp workspace; removal is disabled when the operator asked to
/// keep it, but creation always happens.
enum WorkDir {
    Scoped(TempDir),
    Kept(PathBuf),
}

impl WorkDir {
    fn create(keep: bool) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("skybridge-orchestrator-")
            .tempdir()?;

        if keep {
            let path = dir.keep();
            info!("Keeping temporary directory: {}", path.display());
            Ok(WorkDir::Kept(path))
        } else {
            Ok(WorkDir::Scoped(dir))
        }
    }

    fn path(&self) -> &Path {
        match self {
            WorkDir::Scoped(dir) => dir.path(),
            WorkDir::Kept(path) => path,
        }
    }
}

/// The two-phase update/deploy pipeline
pub struct Orchestrator<P, A, D> {
    package_syncer: Arc<P>,
    artifact_syncer: Arc<A>,
    deployer: Arc<D>,
    options: OrchestratorOptions,
}

impl<P, A, D> Orchestrator<P, A, D>
where
    P: PackageSyncer + 'static,
    A: ArtifactSyncer + 'static,
    D: ArtifactDeployer + 'static,
{
    pub fn new(
        package_syncer: Arc<P>,
        artifact_syncer: Arc<A>,
        deployer: Arc<D>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            package_syncer,
            artifact_syncer,
            deployer,
            options,
        }
    }

    /// Execute the pipeline over the loaded configs.
    pub async fn run(&self, configs: Vec<LoadedConfig>) -> Result<(ProcessingStats, RunOutcome)> {
        info!("Starting orchestrator run in {} mode", self.options.mode);

        fsutil::validate_deployment_prefix(&self.options.deployment_prefix)?;

        let mut stats = ProcessingStats::new();

        let work_dir = if self.options.mode != OperationMode::DeployOnly {
            Some(WorkDir::create(self.options.keep_temp)?)
        } else {
            None
        };

        let mut tasks: Vec<DeploymentTask> = Vec::new();

        if self.options.merge_configs && configs.len() > 1 {
            info!("Merging {} configs into a single deployment", configs.len());
            if !self.options.deployment_prefix.is_empty() {
                warn!("Deployment prefix is ignored when merging configs with their own prefixes");
            }

            let merged = merge_configs(&configs)?;
            tasks.extend(
                self.process_packages(&merged, false, work_dir.as_ref(), &mut stats)
                    .await,
            );
        } else {
            for loaded in &configs {
                if configs.len() > 1 {
                    info!("Processing config: {}", loaded.file_name);
                }

                let mut config = loaded.config.clone();
                if !self.options.deployment_prefix.is_empty() {
                    config.deployment_prefix = self.options.deployment_prefix.clone();
                }
                debug!("Deployment prefix: '{}'", config.deployment_prefix);

                tasks.extend(
                    self.process_packages(&config, true, work_dir.as_ref(), &mut stats)
                        .await,
                );
            }
        }

        if self.options.mode != OperationMode::UpdateOnly && !tasks.is_empty() {
            info!(
                "Phase 2: deploying {} artifact(s), max {} concurrent",
                tasks.len(),
                self.options.parallel_deployments
            );
            self.deploy_all(tasks, &mut stats).await;
        }

        stats.log_summary();

        let outcome = if stats.has_failures() {
            RunOutcome::CompletedWithFailures
        } else {
            RunOutcome::Clean
        };
        Ok((stats, outcome))
    }

    /// Phase 1 over one effective config; returns the Phase-2 task queue.
    async fn process_packages(
        &self,
        config: &DeployConfig,
        apply_prefix: bool,
        work_dir: Option<&WorkDir>,
        stats: &mut ProcessingStats,
    ) -> Vec<DeploymentTask> {
        let mut tasks = Vec::new();
        let prefix = config.deployment_prefix.as_str();

        for package in &config.packages {
            if !included(&package.id, &self.options.package_filter) {
                debug!("Skipping package {} (filtered)", package.id);
                stats.packages_filtered += 1;
                continue;
            }

            if !package.sync && !package.deploy {
                info!("Skipping package {} (sync=false, deploy=false)", package.id);
                continue;
            }

            let mut final_package_id = package.id.clone();
            let mut final_package_name = package.display_name_or_id().to_string();
            if apply_prefix && !prefix.is_empty() {
                final_package_id = format!("{}{}", prefix, package.id);
                final_package_name = format!("{} - {}", prefix, final_package_name);
            }

            info!("Package: {} ({})", final_package_id, final_package_name);

            let package_dir = self.options.packages_dir.join(&package.package_dir);
            if !fsutil::dir_exists(&package_dir) {
                warn!("Package directory not found: {}", package_dir.display());
                continue;
            }

            if self.options.mode != OperationMode::DeployOnly {
                let work_dir = work_dir.expect("phase 1 requires a work directory");

                let description = if package.description.is_empty() {
                    final_package_name.clone()
                } else {
                    package.description.clone()
                };
                let short_text = if package.short_text.is_empty() {
                    final_package_name.clone()
                } else {
                    package.short_text.clone()
                };

                let update = PackageUpdate {
                    id: final_package_id.clone(),
                    name: final_package_name.clone(),
                    description,
                    short_text,
                };

                if let Err(e) = self
                    .package_syncer
                    .update_package(&update, work_dir.path())
                    .await
                {
                    error!("Failed to update package {}: {}", package.id, e);
                    stats.failed_package_updates.insert(package.id.clone());
                    stats.packages_failed += 1;
                    continue;
                }
                stats.successful_package_updates.insert(package.id.clone());
                stats.packages_updated += 1;

                if package.sync {
                    self.update_artifacts(
                        package,
                        &package_dir,
                        &final_package_id,
                        prefix,
                        work_dir.path(),
                        stats,
                    )
                    .await;
                }
            }

            if package.deploy && self.options.mode != OperationMode::UpdateOnly {
                tasks.extend(collect_deployment_tasks(
                    package,
                    &final_package_id,
                    prefix,
                    &self.options.artifact_filter,
                    stats,
                ));
            }
        }

        tasks
    }

    /// Stage and upload every syncable artifact of one package.
    async fn update_artifacts(
        &self,
        package: &Package,
        package_dir: &Path,
        final_package_id: &str,
        prefix: &str,
        work_dir: &Path,
        stats: &mut ProcessingStats,
    ) {
        let mut updated = 0;

        for artifact in &package.artifacts {
            if !included(&artifact.id, &self.options.artifact_filter) {
                debug!("Skipping artifact {} (filtered)", artifact.id);
                stats.artifacts_filtered += 1;
                continue;
            }

            if !artifact.sync {
                debug!("Skipping artifact {} (sync=false)", artifact.id);
                continue;
            }

            stats.artifacts_total += 1;

            let artifact_dir = package_dir.join(&artifact.artifact_dir);
            if !fsutil::dir_exists(&artifact_dir) {
                warn!("Artifact directory not found: {}", artifact_dir.display());
                continue;
            }

            let final_artifact_id = if prefix.is_empty() {
                artifact.id.clone()
            } else {
                format!("{}_{}", prefix, artifact.id)
            };
            let final_artifact_name = artifact.display_name_or_id().to_string();
            let artifact_type = ArtifactType::parse(&artifact.artifact_type);

            info!("Updating artifact: {}", final_artifact_id);

            let staging_dir = work_dir.join(&artifact.id);
            if let Err(e) = fsutil::copy_dir_recursive(&artifact_dir, &staging_dir) {
                error!("Failed to stage artifact {}: {}", artifact.id, e);
                stats.failed_artifact_updates.insert(artifact.id.clone());
                continue;
            }

            if let Err(e) = self.rewrite_staged_artifact(
                artifact,
                &staging_dir,
                &final_artifact_id,
                &final_artifact_name,
                work_dir,
            ) {
                warn!("Failed to rewrite staged artifact {}: {}", artifact.id, e);
            }

            let update = ArtifactUpdate {
                artifact_id: final_artifact_id.clone(),
                display_name: final_artifact_name,
                artifact_type,
                package_id: final_package_id.to_string(),
                staging_dir,
                work_dir: work_dir.to_path_buf(),
            };

            match self.artifact_syncer.update_artifact(&update).await {
                Ok(()) => {
                    updated += 1;
                    stats.successful_artifact_updates.insert(final_artifact_id);
                }
                Err(e) => {
                    error!("Update failed for {}: {}", update.display_name, e);
                    stats.update_failures += 1;
                    stats.failed_artifact_updates.insert(artifact.id.clone());
                }
            }
        }

        if updated > 0 {
            info!("Updated {} artifact(s) in package {}", updated, final_package_id);
        }
    }

    /// Rewrite the staged copy: bundle headers, then parameter overrides.
    /// Modified files are produced under `<work>/modified/<artifact>` and
    /// copied back over the staging copy.
    fn rewrite_staged_artifact(
        &self,
        artifact: &skybridge_core::Artifact,
        staging_dir: &Path,
        final_artifact_id: &str,
        final_artifact_name: &str,
        work_dir: &Path,
    ) -> Result<()> {
        let manifest_path = staging_dir.join("META-INF").join("MANIFEST.MF");
        if fsutil::file_exists(&manifest_path) {
            let modified_manifest = work_dir
                .join("modified")
                .join(&artifact.id)
                .join("META-INF")
                .join("MANIFEST.MF");
            manifest::update_bundle_headers(
                &manifest_path,
                final_artifact_id,
                final_artifact_name,
                &modified_manifest,
            )?;
            std::fs::copy(&modified_manifest, &manifest_path)?;
        }

        let params_path = fsutil::find_parameters_file(staging_dir);
        if fsutil::file_exists(&params_path) {
            let modified_params = work_dir
                .join("modified")
                .join(&artifact.id)
                .join("parameters.prop");

            if artifact.config_overrides.is_empty() {
                if let Some(parent) = modified_params.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(&params_path, &modified_params)?;
            } else {
                let overrides: Vec<(String, String)> = artifact
                    .config_overrides
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_string()))
                    .collect();
                properties::merge_properties(&params_path, &overrides, &modified_params)?;
                std::fs::copy(&modified_params, &params_path)?;
                debug!(
                    "Applied {} config override(s) to {}",
                    overrides.len(),
                    artifact.id
                );
            }
        }

        Ok(())
    }

    /// Phase 2: deploy tasks grouped by package with a bounded worker pool.
    async fn deploy_all(&self, tasks: Vec<DeploymentTask>, stats: &mut ProcessingStats) {
        let mut by_package: HashMap<String, Vec<DeploymentTask>> = HashMap::new();
        for task in tasks {
            by_package.entry(task.package_id.clone()).or_default().push(task);
        }

        for (package_id, group) in by_package {
            info!("Deploying {} artifact(s) for package {}", group.len(), package_id);

            let semaphore = Arc::new(Semaphore::new(self.options.parallel_deployments));
            let (tx, mut rx) = mpsc::channel(group.len());

            let mut handles = Vec::with_capacity(group.len());
            for task in group {
                let semaphore = Arc::clone(&semaphore);
                let deployer = Arc::clone(&self.deployer);
                let tx = tx.clone();
                let artifact_id = task.artifact_id.clone();

                let handle = tokio::spawn(async move {
                    // The owned permit is released on every exit path,
                    // including a panic inside the deployer.
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };

                    info!("Deploying: {} ({})", task.artifact_id, task.artifact_type);
                    let result = deployer.deploy(&task.artifact_id, task.artifact_type).await;
                    let _ = tx.send((task, result)).await;
                });
                handles.push((artifact_id, handle));
            }
            drop(tx);

            let mut failures = 0;
            for (artifact_id, handle) in handles {
                if handle.await.is_err() {
                    error!("Deploy worker for {} panicked", artifact_id);
                    stats.artifacts_deployed_failed += 1;
                    stats.deploy_failures += 1;
                    stats.failed_artifact_deploys.insert(artifact_id);
                    failures += 1;
                }
            }

            while let Some((task, result)) = rx.recv().await {
                match result {
                    Ok(()) => {
                        info!("Deployed: {}", task.artifact_id);
                        stats.artifacts_deployed_success += 1;
                        stats.successful_artifact_deploys.insert(task.artifact_id);
                    }
                    Err(e) => {
                        error!("Deploy failed: {} - {}", task.artifact_id, e);
                        stats.artifacts_deployed_failed += 1;
                        stats.deploy_failures += 1;
                        stats.failed_artifact_deploys.insert(task.artifact_id);
                        failures += 1;
                    }
                }
            }

            if failures == 0 {
                stats.packages_deployed += 1;
            } else {
                stats.packages_failed += 1;
            }
        }
    }
}

/// Deploy tasks for one package, excluding Phase-1 failures and filtered or
/// non-deployable artifacts.
fn collect_deployment_tasks(
    package: &Package,
    final_package_id: &str,
    prefix: &str,
    artifact_filter: &[String],
    stats: &ProcessingStats,
) -> Vec<DeploymentTask> {
    let mut tasks = Vec::new();

    for artifact in &package.artifacts {
        if stats.failed_artifact_updates.contains(&artifact.id) {
            debug!("Skipping artifact {} (update failed)", artifact.id);
            continue;
        }

        if !included(&artifact.id, artifact_filter) {
            debug!("Skipping artifact {} (filtered)", artifact.id);
            continue;
        }

        if !artifact.deploy {
            debug!("Skipping artifact {} (deploy=false)", artifact.id);
            continue;
        }

        let artifact_id = if prefix.is_empty() {
            artifact.id.clone()
        } else {
            format!("{}_{}", prefix, artifact.id)
        };

        tasks.push(DeploymentTask {
            artifact_id,
            artifact_type: ArtifactType::parse(&artifact.artifact_type),
            package_id: final_package_id.to_string(),
            display_name: artifact.display_name_or_id().to_string(),
        });
    }

    tasks
}

fn included(id: &str, filter: &[String]) -> bool {
    filter.is_empty() || filter.iter().any(|entry| entry == id)
}
