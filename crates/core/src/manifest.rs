//! Bundle manifest rewriter
//!
//! Artifacts carry a `META-INF/MANIFEST.MF` whose `Bundle-Name` and
//! `Bundle-SymbolicName` headers must match the effective artifact identity
//! before upload. Only those two headers are rewritten; every other line is
//! preserved verbatim, including the file's line-ending style.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::fsutil;

/// Rewrite the bundle identity headers of a manifest file.
///
/// Matching is case-insensitive on the trimmed line prefix. Headers absent
/// from the input are appended at the end. The detected line ending (CRLF or
/// LF) is used throughout and a trailing terminator is guaranteed.
pub fn update_bundle_headers(
    input: &Path,
    symbolic_name: &str,
    bundle_name: &str,
    output: &Path,
) -> Result<()> {
    let data = fs::read_to_string(input)?;

    let line_ending = if data.contains("\r\n") { "\r\n" } else { "\n" };

    let mut result: Vec<String> = Vec::new();
    let mut name_found = false;
    let mut symbolic_name_found = false;

    for line in data.split(line_ending) {
        let trimmed_lower = line.trim().to_lowercase();
        if trimmed_lower.starts_with("bundle-name:") {
            result.push(format!("Bundle-Name: {}", bundle_name));
            name_found = true;
        } else if trimmed_lower.starts_with("bundle-symbolicname:") {
            result.push(format!("Bundle-SymbolicName: {}", symbolic_name));
            symbolic_name_found = true;
        } else {
            result.push(line.to_string());
        }
    }

    if !name_found {
        result.push(format!("Bundle-Name: {}", bundle_name));
    }
    if !symbolic_name_found {
        result.push(format!("Bundle-SymbolicName: {}", symbolic_name));
    }

    let mut content = result.join(line_ending);
    if !content.ends_with(line_ending) {
        content.push_str(line_ending);
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, content)?;

    Ok(())
}

/// Parse a manifest file into a header map.
///
/// Follows the JAR manifest continuation rule: a line starting with a space
/// or tab extends the previous header's value, joined by a single space. A
/// missing file yields an empty map.
pub fn manifest_headers(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut headers = BTreeMap::new();

    if !fsutil::file_exists(path) {
        return Ok(headers);
    }

    let data = fs::read_to_string(path)?;

    let mut current_key: Option<String> = None;
    let mut current_value = String::new();

    for line in data.lines() {
        let continuation = line.starts_with(' ') || line.starts_with('\t');
        let trimmed = line.trim();

        if !continuation && trimmed.contains(':') {
            if let Some(key) = current_key.take() {
                headers.insert(key, current_value.trim().to_string());
            }
            if let Some((key, value)) = trimmed.split_once(':') {
                current_key = Some(key.trim().to_string());
                current_value = value.trim().to_string();
            }
        } else if continuation && current_key.is_some() {
            current_value.push(' ');
            current_value.push_str(trimmed);
        }
    }

    if let Some(key) = current_key {
        headers.insert(key, current_value.trim().to_string());
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_update_replaces_both_headers() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("MANIFEST.MF");
        let output = dir.path().join("out").join("MANIFEST.MF");
        fs::write(
            &input,
            "Manifest-Version: 1.0\nBundle-Name: OldName\nBundle-SymbolicName: OldSymbolic\nBundle-Version: 1.0.0\n",
        )
        .unwrap();

        update_bundle_headers(&input, "NewSymbolic", "NewName", &output).unwrap();

        let content = fs::read_to_string(&output).unwrap();
        assert!(content.contains("Bundle-Name: NewName"));
        assert!(content.contains("Bundle-SymbolicName: NewSymbolic"));
        assert!(!content.contains("OldName"));
        assert!(!content.contains("OldSymbolic"));
        assert!(content.contains("Bundle-Version: 1.0.0"));
        assert_eq!(content.matches("Bundle-Name:").count(), 1);
    }

    #[test]
    fn test_update_appends_missing_headers() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("MANIFEST.MF");
        let output = dir.path().join("out.MF");
        fs::write(&input, "Manifest-Version: 1.0\n").unwrap();

        update_bundle_headers(&input, "Sym", "Name", &output).unwrap();

        let content = fs::read_to_string(&output).unwrap();
        assert!(content.contains("Bundle-Name: Name"));
        assert!(content.contains("Bundle-SymbolicName: Sym"));
    }

    #[test]
    fn test_update_preserves_lf() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("MANIFEST.MF");
        let output = dir.path().join("out.MF");
        fs::write(&input, "Bundle-Name: Old\nBundle-SymbolicName: Old\n").unwrap();

        update_bundle_headers(&input, "S", "N", &output).unwrap();

        let content = fs::read_to_string(&output).unwrap();
        assert!(content.contains('\n'));
        assert!(!content.contains("\r\n"));
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_update_preserves_crlf() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("MANIFEST.MF");
        let output = dir.path().join("out.MF");
        fs::write(&input, "Bundle-Name: Old\r\nBundle-SymbolicName: Old\r\n").unwrap();

        update_bundle_headers(&input, "S", "N", &output).unwrap();

        let content = fs::read_to_string(&output).unwrap();
        assert!(content.contains("\r\n"));
        assert!(content.ends_with("\r\n"));
    }

    #[test]
    fn test_update_matches_case_insensitively() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("MANIFEST.MF");
        let output = dir.path().join("out.MF");
        fs::write(&input, "bundle-name: Old\nBUNDLE-SYMBOLICNAME: Old\n").unwrap();

        update_bundle_headers(&input, "Sym", "Name", &output).unwrap();

        let content = fs::read_to_string(&output).unwrap();
        assert!(content.contains("Bundle-Name: Name"));
        assert!(content.contains("Bundle-SymbolicName: Sym"));
    }

    #[test]
    fn test_headers_with_continuation_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("MANIFEST.MF");
        fs::write(
            &path,
            "Manifest-Version: 1.0\nImport-Package: org.example.first,\n org.example.second\nBundle-Name: Demo\n",
        )
        .unwrap();

        let headers = manifest_headers(&path).unwrap();
        assert_eq!(headers["Manifest-Version"], "1.0");
        assert_eq!(
            headers["Import-Package"],
            "org.example.first, org.example.second"
        );
        assert_eq!(headers["Bundle-Name"], "Demo");
    }

    #[test]
    fn test_headers_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let headers = manifest_headers(&dir.path().join("absent")).unwrap();
        assert!(headers.is_empty());
    }
}
