//! Tenant synchroniser and deployer adapters
//!
//! Implementations of the orchestrator's three external handles: package
//! metadata upsert, staged artifact upload, and deployment with activation
//! polling. The upload ships the staged directory as a gzipped tar archive in
//! the upsert envelope's base64 `ArtifactContent` field.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::{json, Value};
use skybridge_core::ArtifactType;
use skybridge_ports::{
    ArtifactDeployer, ArtifactSyncer, ArtifactUpdate, DeployerError, HttpMethod, PackageSyncer,
    PackageUpdate, SyncerError, TenantRequest, TenantTransport,
};
use tracing::{debug, info, warn};

const PACKAGES: &str = "/api/v1/IntegrationPackages";

fn escape(segment: &str) -> String {
    utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string()
}

fn designtime_collection(artifact_type: ArtifactType) -> &'static str {
    match artifact_type {
        ArtifactType::Integration => "IntegrationDesigntimeArtifacts",
        ArtifactType::ValueMapping => "ValueMappingDesigntimeArtifacts",
        ArtifactType::MessageMapping => "MessageMappingDesigntimeArtifacts",
        ArtifactType::ScriptCollection => "ScriptCollectionDesigntimeArtifacts",
    }
}

fn deploy_action(artifact_type: ArtifactType) -> &'static str {
    match artifact_type {
        ArtifactType::Integration => "DeployIntegrationDesigntimeArtifact",
        ArtifactType::ValueMapping => "DeployValueMappingDesigntimeArtifact",
        ArtifactType::MessageMapping => "DeployMessageMappingDesigntimeArtifact",
        ArtifactType::ScriptCollection => "DeployScriptCollectionDesigntimeArtifact",
    }
}

/// Package-level synchroniser against the tenant
pub struct TenantPackageSyncer<T: TenantTransport> {
    transport: T,
}

impl<T: TenantTransport> TenantPackageSyncer<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: TenantTransport> PackageSyncer for TenantPackageSyncer<T> {
    async fn update_package(
        &self,
        update: &PackageUpdate,
        work_dir: &Path,
    ) -> Result<(), SyncerError> {
        let body = json!({
            "d": {
                "Id": update.id,
                "Name": update.name,
                "Description": update.description,
                "ShortText": update.short_text,
            }
        });

        // Keep the submitted metadata in the work directory for inspection.
        let snapshot = work_dir
            .join("modified")
            .join(format!("package_{}.json", update.id));
        if let Some(parent) = snapshot.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncerError::Staging(e.to_string()))?;
        }
        std::fs::write(&snapshot, serde_json::to_vec_pretty(&body).unwrap_or_default())
            .map_err(|e| SyncerError::Staging(e.to_string()))?;

        let probe = TenantRequest::new(
            HttpMethod::Get,
            format!("{}('{}')", PACKAGES, escape(&update.id)),
        )
        .with_header("Accept", "application/json");

        let probe_response = self
            .transport
            .execute(probe)
            .await
            .map_err(|e| SyncerError::Transport(e.to_string()))?;

        let request = match probe_response.status {
            404 => {
                info!("Package {} not found, creating it", update.id);
                TenantRequest::new(HttpMethod::Post, PACKAGES)
            }
            200 => TenantRequest::new(
                HttpMethod::Put,
                format!("{}('{}')", PACKAGES, escape(&update.id)),
            ),
            status => {
                return Err(SyncerError::Rejected {
                    status,
                    message: String::from_utf8_lossy(&probe_response.body).into_owned(),
                });
            }
        };

        let response = self
            .transport
            .execute(
                request
                    .with_header("Content-Type", "application/json")
                    .with_header("Accept", "application/json")
                    .with_body(body.to_string().into_bytes()),
            )
            .await
            .map_err(|e| SyncerError::Transport(e.to_string()))?;

        match response.status {
            200 | 201 | 204 => Ok(()),
            status => Err(SyncerError::Rejected {
                status,
                message: String::from_utf8_lossy(&response.body).into_owned(),
            }),
        }
    }
}

/// Artifact upload adapter against the tenant
pub struct TenantArtifactSyncer<T: TenantTransport> {
    transport: T,
}

impl<T: TenantTransport> TenantArtifactSyncer<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Pack the staged artifact directory into a gzipped tar archive.
    fn pack_archive(staging_dir: &Path) -> Result<Vec<u8>, SyncerError> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder
            .append_dir_all(".", staging_dir)
            .map_err(|e| SyncerError::Staging(format!("failed to pack artifact: {}", e)))?;
        let encoder = builder
            .into_inner()
            .map_err(|e| SyncerError::Staging(format!("failed to pack artifact: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| SyncerError::Staging(format!("failed to pack artifact: {}", e)))
    }
}

#[async_trait]
impl<T: TenantTransport> ArtifactSyncer for TenantArtifactSyncer<T> {
    async fn update_artifact(&self, update: &ArtifactUpdate) -> Result<(), SyncerError> {
        let archive = Self::pack_archive(&update.staging_dir)?;
        debug!(
            "Packed artifact {} ({} bytes compressed)",
            update.artifact_id,
            archive.len()
        );

        // In-transit copy under the run's work directory.
        let transit = update
            .work_dir
            .join("upload")
            .join(format!("{}.tgz", update.artifact_id));
        if let Some(parent) = transit.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncerError::Staging(e.to_string()))?;
        }
        std::fs::write(&transit, &archive).map_err(|e| SyncerError::Staging(e.to_string()))?;

        let collection = designtime_collection(update.artifact_type);
        let entity = format!(
            "/api/v1/{}(Id='{}',Version='active')",
            collection,
            escape(&update.artifact_id)
        );

        let probe = TenantRequest::new(HttpMethod::Get, entity.clone())
            .with_header("Accept", "application/json");
        let probe_response = self
            .transport
            .execute(probe)
            .await
            .map_err(|e| SyncerError::Transport(e.to_string()))?;

        let content = BASE64.encode(&archive);
        let request = match probe_response.status {
            404 => {
                info!("Artifact {} not found, creating it", update.artifact_id);
                let body = json!({
                    "Id": update.artifact_id,
                    "Name": update.display_name,
                    "PackageId": update.package_id,
                    "ArtifactContent": content,
                });
                TenantRequest::new(HttpMethod::Post, format!("/api/v1/{}", collection))
                    .with_body(body.to_string().into_bytes())
            }
            200 => {
                let body = json!({
                    "Name": update.display_name,
                    "ArtifactContent": content,
                });
                TenantRequest::new(HttpMethod::Put, entity).with_body(body.to_string().into_bytes())
            }
            status => {
                return Err(SyncerError::Rejected {
                    status,
                    message: String::from_utf8_lossy(&probe_response.body).into_owned(),
                });
            }
        };

        let response = self
            .transport
            .execute(
                request
                    .with_header("Content-Type", "application/json")
                    .with_header("Accept", "application/json"),
            )
            .await
            .map_err(|e| SyncerError::Transport(e.to_string()))?;

        match response.status {
            200 | 201 | 204 => Ok(()),
            status => Err(SyncerError::Rejected {
                status,
                message: String::from_utf8_lossy(&response.body).into_owned(),
            }),
        }
    }
}

/// Deployment adapter: triggers activation and polls the runtime status
pub struct TenantArtifactDeployer<T: TenantTransport> {
    transport: T,
    retries: u32,
    delay: Duration,
}

impl<T: TenantTransport> TenantArtifactDeployer<T> {
    pub fn new(transport: T, retries: u32, delay: Duration) -> Self {
        Self {
            transport,
            retries,
            delay,
        }
    }

    async fn runtime_status(&self, artifact_id: &str) -> Result<Option<String>, DeployerError> {
        let request = TenantRequest::new(
            HttpMethod::Get,
            format!("/api/v1/IntegrationRuntimeArtifacts('{}')", escape(artifact_id)),
        )
        .with_header("Accept", "application/json");

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| DeployerError::Failed(e.to_string()))?;

        if response.status == 404 {
            // Runtime artifact not registered yet.
            return Ok(None);
        }
        if response.status != 200 {
            return Err(DeployerError::Failed(format!(
                "runtime status check failed with status {}",
                response.status
            )));
        }

        let value: Value = serde_json::from_slice(&response.body)
            .map_err(|e| DeployerError::Failed(format!("unreadable runtime status: {}", e)))?;
        Ok(value["d"]["Status"].as_str().map(|s| s.to_string()))
    }
}

#[async_trait]
impl<T: TenantTransport> ArtifactDeployer for TenantArtifactDeployer<T> {
    async fn deploy(
        &self,
        artifact_id: &str,
        artifact_type: ArtifactType,
    ) -> Result<(), DeployerError> {
        let trigger = TenantRequest::new(
            HttpMethod::Post,
            format!(
                "/api/v1/{}?Id='{}'&Version='active'",
                deploy_action(artifact_type),
                escape(artifact_id)
            ),
        )
        .with_header("Accept", "application/json");

        let response = self
            .transport
            .execute(trigger)
            .await
            .map_err(|e| DeployerError::Failed(e.to_string()))?;

        match response.status {
            200 | 202 => {}
            status => {
                return Err(DeployerError::Failed(format!(
                    "deploy trigger rejected with status {}: {}",
                    status,
                    String::from_utf8_lossy(&response.body)
                )));
            }
        }

        for attempt in 1..=self.retries {
            tokio::time::sleep(self.delay).await;

            match self.runtime_status(artifact_id).await? {
                Some(status) if status == "STARTED" => {
                    info!("Artifact {} active after {} check(s)", artifact_id, attempt);
                    return Ok(());
                }
                Some(status) if status == "ERROR" || status == "FAILED" => {
                    return Err(DeployerError::Failed(format!(
                        "artifact {} entered status {}",
                        artifact_id, status
                    )));
                }
                Some(status) => {
                    debug!(
                        "Artifact {} status {} (check {}/{})",
                        artifact_id, status, attempt, self.retries
                    );
                }
                None => {
                    debug!(
                        "Artifact {} not in runtime yet (check {}/{})",
                        artifact_id, attempt, self.retries
                    );
                }
            }
        }

        warn!(
            "Artifact {} not active after {} checks",
            artifact_id, self.retries
        );
        Err(DeployerError::TimedOut {
            attempts: self.retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMethod, ServiceCredentials};
    use crate::http::HttpTransport;
    use mockito::{Matcher, Server};
    use tempfile::tempdir;

    fn transport_for(server: &Server) -> HttpTransport {
        let credentials = ServiceCredentials {
            host: server.url(),
            auth: AuthMethod::None,
        };
        HttpTransport::new(&credentials).unwrap()
    }

    #[tokio::test]
    async fn test_package_created_when_absent() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/IntegrationPackages('Pkg1')")
            .with_status(404)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/api/v1/IntegrationPackages")
            .match_body(Matcher::PartialJsonString(
                r#"{"d":{"Id":"Pkg1","Name":"Package One"}}"#.to_string(),
            ))
            .with_status(201)
            .create_async()
            .await;

        let syncer = TenantPackageSyncer::new(transport_for(&server));
        let work_dir = tempdir().unwrap();
        let update = PackageUpdate {
            id: "Pkg1".to_string(),
            name: "Package One".to_string(),
            description: "Package One".to_string(),
            short_text: "Package One".to_string(),
        };

        syncer
            .update_package(&update, work_dir.path())
            .await
            .unwrap();
        create.assert_async().await;

        // The submitted metadata snapshot lands in the work directory.
        assert!(work_dir
            .path()
            .join("modified")
            .join("package_Pkg1.json")
            .is_file());
    }

    #[tokio::test]
    async fn test_package_updated_when_present() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/IntegrationPackages('Pkg1')")
            .with_status(200)
            .with_body(r#"{"d":{"Id":"Pkg1"}}"#)
            .create_async()
            .await;
        let update_mock = server
            .mock("PUT", "/api/v1/IntegrationPackages('Pkg1')")
            .with_status(204)
            .create_async()
            .await;

        let syncer = TenantPackageSyncer::new(transport_for(&server));
        let work_dir = tempdir().unwrap();
        let update = PackageUpdate {
            id: "Pkg1".to_string(),
            name: "Package One".to_string(),
            description: "desc".to_string(),
            short_text: "short".to_string(),
        };

        syncer
            .update_package(&update, work_dir.path())
            .await
            .unwrap();
        update_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_artifact_upload_creates_when_absent() {
        let mut server = Server::new_async().await;
        server
            .mock(
                "GET",
                "/api/v1/IntegrationDesigntimeArtifacts(Id='A1',Version='active')",
            )
            .with_status(404)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/api/v1/IntegrationDesigntimeArtifacts")
            .match_body(Matcher::PartialJsonString(
                r#"{"Id":"A1","PackageId":"Pkg1"}"#.to_string(),
            ))
            .with_status(201)
            .create_async()
            .await;

        let staging = tempdir().unwrap();
        std::fs::create_dir_all(staging.path().join("META-INF")).unwrap();
        std::fs::write(
            staging.path().join("META-INF").join("MANIFEST.MF"),
            "Bundle-Name: A1\n",
        )
        .unwrap();
        let work = tempdir().unwrap();

        let syncer = TenantArtifactSyncer::new(transport_for(&server));
        let update = ArtifactUpdate {
            artifact_id: "A1".to_string(),
            display_name: "A1".to_string(),
            artifact_type: ArtifactType::Integration,
            package_id: "Pkg1".to_string(),
            staging_dir: staging.path().to_path_buf(),
            work_dir: work.path().to_path_buf(),
        };

        syncer.update_artifact(&update).await.unwrap();
        create.assert_async().await;
        assert!(work.path().join("upload").join("A1.tgz").is_file());
    }

    #[tokio::test]
    async fn test_deploy_polls_until_started() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/v1/DeployIntegrationDesigntimeArtifact")
            .match_query(Matcher::Any)
            .with_status(202)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/IntegrationRuntimeArtifacts('A1')")
            .with_status(200)
            .with_body(r#"{"d":{"Status":"STARTING"}}"#)
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/IntegrationRuntimeArtifacts('A1')")
            .with_status(200)
            .with_body(r#"{"d":{"Status":"STARTED"}}"#)
            .create_async()
            .await;

        let deployer =
            TenantArtifactDeployer::new(transport_for(&server), 5, Duration::from_millis(1));
        deployer
            .deploy("A1", ArtifactType::Integration)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deploy_fails_on_error_status() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/v1/DeployIntegrationDesigntimeArtifact")
            .match_query(Matcher::Any)
            .with_status(202)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/IntegrationRuntimeArtifacts('A1')")
            .with_status(200)
            .with_body(r#"{"d":{"Status":"ERROR"}}"#)
            .create_async()
            .await;

        let deployer =
            TenantArtifactDeployer::new(transport_for(&server), 3, Duration::from_millis(1));
        let result = deployer.deploy("A1", ArtifactType::Integration).await;
        assert!(matches!(result, Err(DeployerError::Failed(_))));
    }

    #[tokio::test]
    async fn test_deploy_times_out_after_retries() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/v1/DeployIntegrationDesigntimeArtifact")
            .match_query(Matcher::Any)
            .with_status(202)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/IntegrationRuntimeArtifacts('A1')")
            .with_status(200)
            .with_body(r#"{"d":{"Status":"STARTING"}}"#)
            .expect(2)
            .create_async()
            .await;

        let deployer =
            TenantArtifactDeployer::new(transport_for(&server), 2, Duration::from_millis(1));
        let result = deployer.deploy("A1", ArtifactType::Integration).await;
        assert!(matches!(
            result,
            Err(DeployerError::TimedOut { attempts: 2 })
        ));
    }
}
