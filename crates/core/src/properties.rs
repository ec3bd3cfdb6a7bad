//! Java-properties codec
//!
//! Partner Directory string parameters and artifact `parameters.prop` files
//! share the same `key=value` line format. Only backslash, LF and CR are
//! escaped; escaping order is fixed so that round-trips are exact.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::fsutil;

/// Escape a property value for writing.
pub fn escape_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// Unescape a property value read from disk. Exact inverse of
/// [`escape_value`].
pub fn unescape_value(value: &str) -> String {
    value
        .replace("\\n", "\n")
        .replace("\\r", "\r")
        .replace("\\\\", "\\")
}

/// Write `entries` to a properties file.
///
/// In replace mode (or when the file does not exist yet) the file is written
/// from scratch with keys in ascending order. Otherwise the existing file is
/// merged: keys already present keep their current raw value, only missing
/// keys are added. Returns the number of newly written keys.
pub fn write_properties(path: &Path, entries: &[(String, String)], replace: bool) -> Result<usize> {
    if replace || !fsutil::file_exists(path) {
        let mut sorted: Vec<&(String, String)> = entries.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut content = String::new();
        for (key, value) in sorted {
            content.push_str(key);
            content.push('=');
            content.push_str(&escape_value(value));
            content.push('\n');
        }
        fs::write(path, content)?;
        return Ok(entries.len());
    }

    // Merge mode: existing values are preserved verbatim, raw as on disk.
    let mut existing: BTreeMap<String, String> = BTreeMap::new();
    let data = fs::read_to_string(path)?;
    for line in data.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = trimmed.split_once('=') {
            existing.insert(key.to_string(), value.to_string());
        }
    }

    let mut added = 0;
    for (key, value) in entries {
        if !existing.contains_key(key) {
            existing.insert(key.clone(), escape_value(value));
            added += 1;
        }
    }

    let mut content = String::new();
    for (key, value) in &existing {
        content.push_str(key);
        content.push('=');
        content.push_str(value);
        content.push('\n');
    }
    fs::write(path, content)?;

    Ok(added)
}

/// Read a properties file into `(key, value)` pairs in file order.
///
/// Blank lines and `#` comments are skipped; values are unescaped.
pub fn read_properties(path: &Path) -> Result<Vec<(String, String)>> {
    let data = fs::read_to_string(path)?;

    let mut entries = Vec::new();
    for line in data.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = trimmed.split_once('=') {
            entries.push((key.to_string(), unescape_value(value)));
        }
    }

    Ok(entries)
}

/// Merge `overrides` into a properties file, writing the result to
/// `output_path`.
///
/// Existing keys are updated in place, new keys are appended, and the
/// original line-ending style (CRLF or LF) is preserved. Values travel raw:
/// `parameters.prop` files are not subject to the escape rules above.
pub fn merge_properties(
    path: &Path,
    overrides: &[(String, String)],
    output_path: &Path,
) -> Result<()> {
    let mut line_ending = "\n";
    let mut values: BTreeMap<String, String> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();

    if fsutil::file_exists(path) {
        let data = fs::read_to_string(path)?;
        if data.contains("\r\n") {
            line_ending = "\r\n";
        }

        for line in data.split(line_ending) {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = trimmed.split_once('=') {
                let key = key.trim().to_string();
                if !values.contains_key(&key) {
                    order.push(key.clone());
                }
                values.insert(key, value.trim().to_string());
            }
        }
    }

    for (key, value) in overrides {
        if !values.contains_key(key) {
            order.push(key.clone());
        }
        values.insert(key.clone(), value.clone());
    }

    let mut content = order
        .iter()
        .map(|key| format!("{}={}", key, values[key]))
        .collect::<Vec<_>>()
        .join(line_ending);
    if !content.ends_with(line_ending) {
        content.push_str(line_ending);
    }

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_path, content)?;

    Ok(())
}
