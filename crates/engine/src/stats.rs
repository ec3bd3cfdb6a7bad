//! Run statistics and the final summary

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

const RULE: &str = "===============================================================";
const THIN_RULE: &str = "---------------------------------------------------------------";

/// Counters and ID sets accumulated across both orchestrator phases
///
/// The reporter only observes: nothing here feeds back into scheduling or
/// failure handling.
#[derive(Debug, Clone)]
pub struct ProcessingStats {
    pub packages_updated: usize,
    pub packages_deployed: usize,
    pub packages_failed: usize,
    pub packages_filtered: usize,

    pub artifacts_total: usize,
    pub artifacts_deployed_success: usize,
    pub artifacts_deployed_failed: usize,
    pub artifacts_filtered: usize,

    pub update_failures: usize,
    pub deploy_failures: usize,

    pub successful_package_updates: BTreeSet<String>,
    pub successful_artifact_updates: BTreeSet<String>,
    pub successful_artifact_deploys: BTreeSet<String>,
    pub failed_package_updates: BTreeSet<String>,
    pub failed_artifact_updates: BTreeSet<String>,
    pub failed_artifact_deploys: BTreeSet<String>,

    pub started_at: DateTime<Utc>,
}

impl Default for ProcessingStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStats {
    pub fn new() -> Self {
        Self {
            packages_updated: 0,
            packages_deployed: 0,
            packages_failed: 0,
            packages_filtered: 0,
            artifacts_total: 0,
            artifacts_deployed_success: 0,
            artifacts_deployed_failed: 0,
            artifacts_filtered: 0,
            update_failures: 0,
            deploy_failures: 0,
            successful_package_updates: BTreeSet::new(),
            successful_artifact_updates: BTreeSet::new(),
            successful_artifact_deploys: BTreeSet::new(),
            failed_package_updates: BTreeSet::new(),
            failed_artifact_updates: BTreeSet::new(),
            failed_artifact_deploys: BTreeSet::new(),
            started_at: Utc::now(),
        }
    }

    pub fn has_failures(&self) -> bool {
        self.packages_failed > 0 || self.update_failures > 0 || self.deploy_failures > 0
    }

    /// Print the fixed-layout run summary.
    pub fn log_summary(&self) {
        let elapsed = Utc::now().signed_duration_since(self.started_at);

        info!("{}", RULE);
        info!("DEPLOYMENT SUMMARY");
        info!("{}", RULE);
        info!("Packages Updated:   {}", self.packages_updated);
        info!("Packages Deployed:  {}", self.packages_deployed);
        info!("Packages Failed:    {}", self.packages_failed);
        info!("Packages Filtered:  {}", self.packages_filtered);
        info!("{}", THIN_RULE);
        info!("Artifacts Total:         {}", self.artifacts_total);
        info!("Artifacts Updated:       {}", self.successful_artifact_updates.len());
        info!("Artifacts Deployed OK:   {}", self.artifacts_deployed_success);
        info!("Artifacts Deployed Fail: {}", self.artifacts_deployed_failed);
        info!("Artifacts Filtered:      {}", self.artifacts_filtered);
        info!("{}", THIN_RULE);

        if self.update_failures > 0 {
            warn!("Update Failures: {}", self.update_failures);
            for artifact_id in &self.failed_artifact_updates {
                warn!("  - {}", artifact_id);
            }
        }

        if self.deploy_failures > 0 {
            warn!("Deploy Failures: {}", self.deploy_failures);
            for artifact_id in &self.failed_artifact_deploys {
                warn!("  - {}", artifact_id);
            }
        }

        if !self.failed_package_updates.is_empty() {
            warn!("Failed Package Updates:");
            for package_id in &self.failed_package_updates {
                warn!("  - {}", package_id);
            }
        }

        if !self.has_failures() {
            info!("All operations completed successfully");
        }

        info!("Elapsed: {}s", elapsed.num_seconds());
        info!("{}", RULE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_failures() {
        let mut stats = ProcessingStats::new();
        assert!(!stats.has_failures());

        stats.update_failures = 1;
        assert!(stats.has_failures());

        let mut stats = ProcessingStats::new();
        stats.packages_failed = 1;
        assert!(stats.has_failures());

        let mut stats = ProcessingStats::new();
        stats.deploy_failures = 1;
        assert!(stats.has_failures());
    }

    #[test]
    fn test_id_sets_are_ordered() {
        let mut stats = ProcessingStats::new();
        stats.failed_artifact_deploys.insert("b".to_string());
        stats.failed_artifact_deploys.insert("a".to_string());

        let ids: Vec<&String> = stats.failed_artifact_deploys.iter().collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
