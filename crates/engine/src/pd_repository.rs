//! Local Partner Directory repository
//!
//! On-disk layout per partner ID under the resources path:
//!
//! ```text
//! <PID>/String.properties        one key=value per line, keys sorted
//! <PID>/Binary/<id>[.<ext>]      one file per binary parameter
//! <PID>/Binary/_metadata.json    filename -> full content-type, only for
//!                                content types carrying parameters
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use skybridge_core::{content_type, properties, BinaryParameter, DomainError, Result, StringParameter};
use tracing::{debug, warn};

const STRING_PROPERTIES_FILE: &str = "String.properties";
const BINARY_DIR: &str = "Binary";
const METADATA_FILE: &str = "_metadata.json";
const DEFAULT_BINARY_EXT: &str = "bin";

/// Filesystem-backed Partner Directory state
#[derive(Debug, Clone)]
pub struct PdRepository {
    resources_path: PathBuf,
}

impl PdRepository {
    pub fn new(resources_path: impl Into<PathBuf>) -> Self {
        Self {
            resources_path: resources_path.into(),
        }
    }

    /// Partner IDs with a local directory, sorted ascending. A missing
    /// resources path yields an empty list.
    pub fn local_pids(&self) -> Result<Vec<String>> {
        if !self.resources_path.is_dir() {
            return Ok(Vec::new());
        }

        let mut pids: Vec<String> = fs::read_dir(&self.resources_path)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        pids.sort();
        Ok(pids)
    }

    /// Write string parameters into the partner's properties file. Returns
    /// the number of keys written (replace) or newly added (merge).
    pub fn write_string_parameters(
        &self,
        pid: &str,
        params: &[StringParameter],
        replace: bool,
    ) -> Result<usize> {
        let pid_dir = self.resources_path.join(pid);
        fs::create_dir_all(&pid_dir)?;

        let entries: Vec<(String, String)> = params
            .iter()
            .map(|p| (p.id.clone(), p.value.clone()))
            .collect();

        let written =
            properties::write_properties(&pid_dir.join(STRING_PROPERTIES_FILE), &entries, replace)?;
        debug!("Wrote {} string parameter(s) for PID {}", written, pid);
        Ok(written)
    }

    /// Read the partner's string parameters; absent file yields empty.
    pub fn read_string_parameters(&self, pid: &str) -> Result<Vec<StringParameter>> {
        let path = self.resources_path.join(pid).join(STRING_PROPERTIES_FILE);
        if !path.is_file() {
            return Ok(Vec::new());
        }

        let entries = properties::read_properties(&path)?;
        Ok(entries
            .into_iter()
            .map(|(id, value)| StringParameter {
                pid: pid.to_string(),
                id,
                value,
            })
            .collect())
    }

    /// Write binary parameters as files under `<PID>/Binary`.
    ///
    /// Existing files are skipped when `replace` is false. Content types
    /// carrying parameters are recorded in the sidecar after each write.
    pub fn write_binary_parameters(
        &self,
        pid: &str,
        params: &[BinaryParameter],
        replace: bool,
    ) -> Result<()> {
        let binary_dir = self.resources_path.join(pid).join(BINARY_DIR);
        fs::create_dir_all(&binary_dir)?;

        for param in params {
            let filename = content_type::parameter_filename(&param.id, &param.content_type);
            let path = binary_dir.join(&filename);

            if !replace && path.is_file() {
                debug!("Skipping existing binary parameter {}/{}", pid, param.id);
                continue;
            }

            let data = BASE64.decode(&param.value).map_err(|e| {
                DomainError::InvalidInput(format!(
                    "binary parameter {}/{} is not valid base64: {}",
                    pid, param.id, e
                ))
            })?;

            fs::write(&path, &data)?;
            debug!(
                "Saved binary parameter {} ({}, {} bytes)",
                filename,
                param.content_type,
                data.len()
            );

            write_sidecar(&binary_dir, &param.id, &param.content_type)?;
        }

        Ok(())
    }

    /// Read the partner's binary parameters back from disk.
    ///
    /// The full content type comes from the sidecar when present, otherwise
    /// it is inferred from the file extension. Files sharing a stem are
    /// duplicates: the first encountered wins, the rest are skipped with a
    /// warning.
    pub fn read_binary_parameters(&self, pid: &str) -> Result<Vec<BinaryParameter>> {
        let binary_dir = self.resources_path.join(pid).join(BINARY_DIR);
        if !binary_dir.is_dir() {
            return Ok(Vec::new());
        }

        let metadata = read_sidecar(&binary_dir)?;

        let mut params = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for entry in fs::read_dir(&binary_dir)? {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir() || filename == METADATA_FILE {
                continue;
            }

            let id = content_type::strip_extension(&filename).to_string();
            if !seen.insert(id.clone()) {
                warn!(
                    "Duplicate binary parameter {}/{} - skipping file {}",
                    pid, id, filename
                );
                continue;
            }

            let data = match fs::read(entry.path()) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Failed to read binary file {}: {}", filename, e);
                    continue;
                }
            };

            let content_type = metadata.get(&filename).cloned().unwrap_or_else(|| {
                let ext = filename.rsplit('.').next().filter(|_| filename.contains('.'));
                match ext {
                    Some(ext) if !ext.is_empty() => ext.to_string(),
                    _ => DEFAULT_BINARY_EXT.to_string(),
                }
            });

            debug!(
                "Loaded binary parameter {}/{} ({}, {} bytes)",
                pid,
                id,
                content_type,
                data.len()
            );

            params.push(BinaryParameter {
                pid: pid.to_string(),
                id,
                value: BASE64.encode(&data),
                content_type,
            });
        }

        Ok(params)
    }
}

/// Record a parameterised content type in the sidecar; plain types are a
/// no-op.
fn write_sidecar(binary_dir: &Path, id: &str, full_content_type: &str) -> Result<()> {
    if !content_type::needs_sidecar(full_content_type) {
        return Ok(());
    }

    let path = binary_dir.join(METADATA_FILE);
    let mut metadata = read_sidecar(binary_dir)?;

    let filename = content_type::parameter_filename(id, full_content_type);
    metadata.insert(filename, full_content_type.to_string());

    let json = serde_json::to_vec_pretty(&metadata)
        .map_err(|e| DomainError::Protocol(format!("failed to encode sidecar: {}", e)))?;
    fs::write(&path, json)?;

    Ok(())
}

/// Stored sidecar mapping, empty when the sidecar is absent.
fn read_sidecar(binary_dir: &Path) -> Result<BTreeMap<String, String>> {
    let path = binary_dir.join(METADATA_FILE);
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }

    let data = fs::read(&path)?;
    serde_json::from_slice(&data)
        .map_err(|e| DomainError::Protocol(format!("failed to parse sidecar: {}", e)))
}
