//! Filesystem helpers shared by the staging and sync paths

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{DomainError, Result};

pub fn file_exists(path: &Path) -> bool {
    path.is_file()
}

pub fn dir_exists(path: &Path) -> bool {
    path.is_dir()
}

/// Recursively copy a directory tree into `dst`, creating it as needed.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| DomainError::Io(e.into()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .expect("walked path is under src");
        let target = dst.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Locate an artifact's `parameters.prop`, trying the conventional locations
/// in order. Returns the first candidate even when none exists so callers can
/// use it as the default write target.
pub fn find_parameters_file(artifact_dir: &Path) -> PathBuf {
    let candidates = [
        artifact_dir
            .join("src")
            .join("main")
            .join("resources")
            .join("parameters.prop"),
        artifact_dir
            .join("src")
            .join("main")
            .join("resources")
            .join("script")
            .join("parameters.prop"),
        artifact_dir.join("parameters.prop"),
    ];

    for candidate in &candidates {
        if file_exists(candidate) {
            return candidate.clone();
        }
    }

    candidates[0].clone()
}

/// Validate a deployment prefix: empty, or alphanumeric/underscore only.
pub fn validate_deployment_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Ok(());
    }

    if !prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(DomainError::InvalidInput(format!(
            "deployment prefix '{}' may only contain alphanumeric characters and underscores",
            prefix
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_copy_dir_recursive() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(src.join("subdir")).unwrap();
        fs::write(src.join("file1.txt"), "content1").unwrap();
        fs::write(src.join("subdir").join("file2.txt"), "content2").unwrap();

        copy_dir_recursive(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("file1.txt")).unwrap(), "content1");
        assert_eq!(
            fs::read_to_string(dst.join("subdir").join("file2.txt")).unwrap(),
            "content2"
        );
    }

    #[test]
    fn test_find_parameters_file_priority() {
        let dir = tempdir().unwrap();
        let artifact = dir.path();

        // No file present: default candidate returned.
        let default = find_parameters_file(artifact);
        assert!(default.ends_with("src/main/resources/parameters.prop"));

        // Root-level file found when resource variants absent.
        fs::write(artifact.join("parameters.prop"), "").unwrap();
        assert_eq!(find_parameters_file(artifact), artifact.join("parameters.prop"));

        // Script variant outranks the root file.
        let script_dir = artifact.join("src/main/resources/script");
        fs::create_dir_all(&script_dir).unwrap();
        fs::write(script_dir.join("parameters.prop"), "").unwrap();
        assert_eq!(
            find_parameters_file(artifact),
            script_dir.join("parameters.prop")
        );

        // Primary location outranks everything.
        let resources = artifact.join("src/main/resources");
        fs::write(resources.join("parameters.prop"), "").unwrap();
        assert_eq!(
            find_parameters_file(artifact),
            resources.join("parameters.prop")
        );
    }

    #[test]
    fn test_validate_deployment_prefix() {
        assert!(validate_deployment_prefix("").is_ok());
        assert!(validate_deployment_prefix("DEV").is_ok());
        assert!(validate_deployment_prefix("dev_01").is_ok());
        assert!(validate_deployment_prefix("DEV-01").is_err());
        assert!(validate_deployment_prefix("DEV 01").is_err());
        assert!(validate_deployment_prefix("DEV.01").is_err());
    }
}
