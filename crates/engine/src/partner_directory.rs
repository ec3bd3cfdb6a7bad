//! Partner Directory sync engine
//!
//! Mirrors parameters between the tenant's Partner Directory and the local
//! on-disk layout. Snapshot pulls remote state down; deploy pushes local
//! state up through a per-parameter state machine (create / update /
//! unchanged); full-sync additionally deletes remote records that vanished
//! locally, strictly scoped to partner IDs that exist on disk. Dry-run
//! reports the transitions that would happen without mutating anything.

use std::collections::{BTreeMap, HashMap, HashSet};

use skybridge_core::pd::parameter_key;
use skybridge_core::{BinaryParameter, DomainError, Result, StringParameter, SyncReport};
use skybridge_ports::{ParameterKey, PartnerDirectoryApi};
use tracing::{debug, info, warn};

use crate::pd_repository::PdRepository;

/// Options shared by the snapshot and deploy directions
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Replace differing values; false means add-only.
    pub replace: bool,
    /// Delete remote records absent locally (deploy direction only).
    pub full_sync: bool,
    /// Report intended transitions without mutating anything.
    pub dry_run: bool,
    /// Partner ID allowlist; empty means all.
    pub pids: Vec<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            replace: true,
            full_sync: false,
            dry_run: false,
            pids: Vec::new(),
        }
    }
}

/// Counts written by a snapshot run
#[derive(Debug, Clone, Default)]
pub struct SnapshotSummary {
    pub string_parameters: usize,
    pub binary_parameters: usize,
}

/// Reports produced by a deploy run
#[derive(Debug, Clone, Default)]
pub struct DeploySummary {
    pub strings: SyncReport,
    pub binaries: SyncReport,
    pub deletions: Option<SyncReport>,
}

impl DeploySummary {
    pub fn has_errors(&self) -> bool {
        self.strings.has_errors()
            || self.binaries.has_errors()
            || self
                .deletions
                .as_ref()
                .map(|d| d.has_errors())
                .unwrap_or(false)
    }
}

/// Sync engine over the Partner Directory port and the local repository
pub struct PartnerDirectorySync<'a, A: PartnerDirectoryApi> {
    api: &'a A,
    repo: &'a PdRepository,
}

impl<'a, A: PartnerDirectoryApi> PartnerDirectorySync<'a, A> {
    pub fn new(api: &'a A, repo: &'a PdRepository) -> Self {
        Self { api, repo }
    }

    /// Remote -> local. Returns the number of parameters written per kind.
    pub async fn snapshot(&self, options: &SyncOptions) -> Result<SnapshotSummary> {
        info!("Starting Partner Directory snapshot");

        let mut summary = SnapshotSummary::default();

        let strings = self
            .api
            .list_string_parameters(Some("Pid,Id,Value"))
            .await
            .map_err(|e| DomainError::Remote(e.to_string()))?;
        let strings = filter_by_pid(strings, &options.pids, |p: &StringParameter| p.pid.as_str());
        summary.string_parameters = strings.len();

        let mut strings_by_pid: BTreeMap<String, Vec<StringParameter>> = BTreeMap::new();
        for param in strings {
            strings_by_pid.entry(param.pid.clone()).or_default().push(param);
        }
        for (pid, params) in &strings_by_pid {
            debug!("Writing {} string parameter(s) for PID {}", params.len(), pid);
            self.repo
                .write_string_parameters(pid, params, options.replace)?;
        }

        let binaries = self
            .api
            .list_binary_parameters(None)
            .await
            .map_err(|e| DomainError::Remote(e.to_string()))?;
        let binaries = filter_by_pid(binaries, &options.pids, |p: &BinaryParameter| p.pid.as_str());
        summary.binary_parameters = binaries.len();

        let mut binaries_by_pid: BTreeMap<String, Vec<BinaryParameter>> = BTreeMap::new();
        for param in binaries {
            binaries_by_pid.entry(param.pid.clone()).or_default().push(param);
        }
        for (pid, params) in &binaries_by_pid {
            debug!("Writing {} binary parameter(s) for PID {}", params.len(), pid);
            self.repo
                .write_binary_parameters(pid, params, options.replace)?;
        }

        info!(
            "Snapshot complete: {} string, {} binary parameter(s)",
            summary.string_parameters, summary.binary_parameters
        );
        Ok(summary)
    }

    /// Local -> remote through per-item probes and single-item mutations.
    pub async fn deploy(&self, options: &SyncOptions) -> Result<DeploySummary> {
        info!("Starting Partner Directory deploy");

        let managed = self.managed_pids(options)?;

        if options.full_sync && !managed.is_empty() {
            warn!(
                "Full sync will delete remote parameters not in local files for PIDs: {}",
                managed.join(", ")
            );
            if options.dry_run {
                info!("Dry-run mode: no deletions will be performed");
            }
        }

        let mut summary = DeploySummary {
            strings: self.deploy_strings(&managed, options).await?,
            binaries: self.deploy_binaries(&managed, options).await?,
            deletions: None,
        };

        if options.full_sync && !options.dry_run {
            info!("Full sync: deleting remote entries not present locally");
            summary.deletions = Some(self.delete_remote_absent(&managed, false).await?);
        } else if options.full_sync && options.dry_run {
            info!(
                "Dry-run: would delete remote parameters not in local for PIDs: {}",
                managed.join(", ")
            );
        }

        log_deploy_summary(&summary);
        Ok(summary)
    }

    /// Local -> remote through the batch protocol. Existence is still probed
    /// per item; the mutations travel in chunked batches.
    pub async fn batch_deploy(
        &self,
        options: &SyncOptions,
        batch_size: usize,
    ) -> Result<DeploySummary> {
        if options.dry_run {
            return Err(DomainError::InvalidInput(
                "dry-run is not supported with batch sync".to_string(),
            ));
        }

        info!("Starting Partner Directory batch deploy");

        let managed = self.managed_pids(options)?;

        let mut all_strings = Vec::new();
        let mut all_binaries = Vec::new();
        for pid in &managed {
            all_strings.extend(self.repo.read_string_parameters(pid)?);
            all_binaries.extend(self.repo.read_binary_parameters(pid)?);
        }

        let strings = self
            .api
            .batch_sync_string_parameters(&all_strings, batch_size)
            .await
            .map_err(|e| DomainError::Remote(e.to_string()))?;
        let binaries = self
            .api
            .batch_sync_binary_parameters(&all_binaries, batch_size)
            .await
            .map_err(|e| DomainError::Remote(e.to_string()))?;

        let deletions = if options.full_sync {
            Some(self.delete_remote_absent(&managed, true).await?)
        } else {
            None
        };

        let summary = DeploySummary {
            strings,
            binaries,
            deletions,
        };
        log_deploy_summary(&summary);
        Ok(summary)
    }

    /// Locally managed PIDs after applying the allowlist. An allowlist that
    /// matches nothing is an error: the caller asked for PIDs that are not
    /// there.
    fn managed_pids(&self, options: &SyncOptions) -> Result<Vec<String>> {
        let locals = self.repo.local_pids()?;
        if options.pids.is_empty() {
            return Ok(locals);
        }

        let filtered: Vec<String> = locals
            .into_iter()
            .filter(|pid| options.pids.contains(pid))
            .collect();

        if filtered.is_empty() {
            return Err(DomainError::NotFound(format!(
                "no local PIDs match the filter: {}",
                options.pids.join(", ")
            )));
        }
        Ok(filtered)
    }

    async fn deploy_strings(
        &self,
        managed: &[String],
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for pid in managed {
            let params = match self.repo.read_string_parameters(pid) {
                Ok(params) => params,
                Err(e) => {
                    report.errors.push(format!("failed to read {}: {}", pid, e));
                    continue;
                }
            };

            for param in params {
                let key = parameter_key(&param.pid, &param.id);

                let existing = match self.api.get_string_parameter(&param.pid, &param.id).await {
                    Ok(existing) => existing,
                    Err(e) => {
                        report.errors.push(format!("{}: {}", key, e));
                        continue;
                    }
                };

                match existing {
                    None => {
                        if options.dry_run {
                            info!("[dry-run] Would create: {}", key);
                            report.created.push(key);
                        } else if let Err(e) = self.api.create_string_parameter(&param).await {
                            report.errors.push(format!("{}: {}", key, e));
                        } else {
                            debug!("Created: {}", key);
                            report.created.push(key);
                        }
                    }
                    Some(existing) if options.replace && existing.value != param.value => {
                        if options.dry_run {
                            info!("[dry-run] Would update: {}", key);
                            report.updated.push(key);
                        } else if let Err(e) = self.api.update_string_parameter(&param).await {
                            report.errors.push(format!("{}: {}", key, e));
                        } else {
                            debug!("Updated: {}", key);
                            report.updated.push(key);
                        }
                    }
                    Some(_) => report.unchanged.push(key),
                }
            }
        }

        Ok(report)
    }

    async fn deploy_binaries(
        &self,
        managed: &[String],
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for pid in managed {
            let params = match self.repo.read_binary_parameters(pid) {
                Ok(params) => params,
                Err(e) => {
                    report.errors.push(format!("failed to read {}: {}", pid, e));
                    continue;
                }
            };

            for param in params {
                let key = parameter_key(&param.pid, &param.id);

                let existing = match self.api.get_binary_parameter(&param.pid, &param.id).await {
                    Ok(existing) => existing,
                    Err(e) => {
                        report.errors.push(format!("{}: {}", key, e));
                        continue;
                    }
                };

                let differs = |existing: &BinaryParameter| {
                    existing.value != param.value || existing.content_type != param.content_type
                };

                match existing {
                    None => {
                        if options.dry_run {
                            info!("[dry-run] Would create: {}", key);
                            report.created.push(key);
                        } else if let Err(e) = self.api.create_binary_parameter(&param).await {
                            report.errors.push(format!("{}: {}", key, e));
                        } else {
                            debug!("Created: {}", key);
                            report.created.push(key);
                        }
                    }
                    Some(existing) if options.replace && differs(&existing) => {
                        if options.dry_run {
                            info!("[dry-run] Would update: {}", key);
                            report.updated.push(key);
                        } else if let Err(e) = self.api.update_binary_parameter(&param).await {
                            report.errors.push(format!("{}: {}", key, e));
                        } else {
                            debug!("Updated: {}", key);
                            report.updated.push(key);
                        }
                    }
                    Some(_) => report.unchanged.push(key),
                }
            }
        }

        Ok(report)
    }

    /// Delete remote records whose PID is managed locally but whose ID is
    /// absent from the local state. Remote records under unmanaged PIDs are
    /// never touched.
    async fn delete_remote_absent(
        &self,
        managed: &[String],
        use_batch: bool,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        let mut local_strings: HashMap<&str, HashSet<String>> = HashMap::new();
        let mut local_binaries: HashMap<&str, HashSet<String>> = HashMap::new();

        for pid in managed {
            match self.repo.read_string_parameters(pid) {
                Ok(params) => {
                    local_strings
                        .insert(pid.as_str(), params.into_iter().map(|p| p.id).collect());
                }
                Err(e) => warn!("Failed to read string parameters for PID {}: {}", pid, e),
            }
            match self.repo.read_binary_parameters(pid) {
                Ok(params) => {
                    local_binaries
                        .insert(pid.as_str(), params.into_iter().map(|p| p.id).collect());
                }
                Err(e) => warn!("Failed to read binary parameters for PID {}: {}", pid, e),
            }
        }

        let remote_strings = self
            .api
            .list_string_parameters(Some("Pid,Id"))
            .await
            .map_err(|e| DomainError::Remote(e.to_string()))?;
        let string_victims: Vec<ParameterKey> = remote_strings
            .iter()
            .filter(|param| managed.iter().any(|pid| pid == &param.pid))
            .filter(|param| {
                !local_strings
                    .get(param.pid.as_str())
                    .map(|ids| ids.contains(&param.id))
                    .unwrap_or(false)
            })
            .map(|param| ParameterKey::new(param.pid.clone(), param.id.clone()))
            .collect();

        let remote_binaries = self
            .api
            .list_binary_parameters(Some("Pid,Id"))
            .await
            .map_err(|e| DomainError::Remote(e.to_string()))?;
        let binary_victims: Vec<ParameterKey> = remote_binaries
            .iter()
            .filter(|param| managed.iter().any(|pid| pid == &param.pid))
            .filter(|param| {
                !local_binaries
                    .get(param.pid.as_str())
                    .map(|ids| ids.contains(&param.id))
                    .unwrap_or(false)
            })
            .map(|param| ParameterKey::new(param.pid.clone(), param.id.clone()))
            .collect();

        if use_batch {
            if !string_victims.is_empty() {
                let deleted = self
                    .api
                    .batch_delete_string_parameters(&string_victims, 0)
                    .await
                    .map_err(|e| DomainError::Remote(e.to_string()))?;
                report.merge(deleted);
            }
            if !binary_victims.is_empty() {
                let deleted = self
                    .api
                    .batch_delete_binary_parameters(&binary_victims, 0)
                    .await
                    .map_err(|e| DomainError::Remote(e.to_string()))?;
                report.merge(deleted);
            }
            return Ok(report);
        }

        for victim in &string_victims {
            let key = parameter_key(&victim.pid, &victim.id);
            if let Err(e) = self.api.delete_string_parameter(&victim.pid, &victim.id).await {
                report
                    .errors
                    .push(format!("failed to delete string {}: {}", key, e));
            } else {
                debug!("Deleted string parameter: {}", key);
                report.deleted.push(key);
            }
        }

        for victim in &binary_victims {
            let key = parameter_key(&victim.pid, &victim.id);
            if let Err(e) = self.api.delete_binary_parameter(&victim.pid, &victim.id).await {
                report
                    .errors
                    .push(format!("failed to delete binary {}: {}", key, e));
            } else {
                debug!("Deleted binary parameter: {}", key);
                report.deleted.push(key);
            }
        }

        Ok(report)
    }
}

fn filter_by_pid<T>(params: Vec<T>, allowlist: &[String], pid_of: impl Fn(&T) -> &str) -> Vec<T> {
    if allowlist.is_empty() {
        return params;
    }
    params
        .into_iter()
        .filter(|param| allowlist.iter().any(|pid| pid == pid_of(param)))
        .collect()
}

fn log_deploy_summary(summary: &DeploySummary) {
    info!(
        "String parameters - created: {}, updated: {}, unchanged: {}, errors: {}",
        summary.strings.created.len(),
        summary.strings.updated.len(),
        summary.strings.unchanged.len(),
        summary.strings.errors.len()
    );
    info!(
        "Binary parameters - created: {}, updated: {}, unchanged: {}, errors: {}",
        summary.binaries.created.len(),
        summary.binaries.updated.len(),
        summary.binaries.unchanged.len(),
        summary.binaries.errors.len()
    );
    if let Some(deletions) = &summary.deletions {
        info!(
            "Full sync - deleted: {}, errors: {}",
            deletions.deleted.len(),
            deletions.errors.len()
        );
        for deleted in &deletions.deleted {
            info!("  deleted {}", deleted);
        }
    }
    for error in summary
        .strings
        .errors
        .iter()
        .chain(summary.binaries.errors.iter())
    {
        warn!("{}", error);
    }
}
