//! Content-type resolution for binary parameters
//!
//! The tenant reports binary parameter content types either as simple tokens
//! (`xml`, `zip`), as MIME types (`application/json`), or with parameters
//! appended (`xml; encoding=UTF-8`). Locally a parameter becomes a file whose
//! extension is derived here; content types carrying parameters additionally
//! need a sidecar entry because the extension alone cannot reproduce them.

const DEFAULT_EXTENSION: &str = "bin";

const KNOWN_EXTENSIONS: [&str; 9] = [
    "xml", "xsl", "xsd", "json", "txt", "zip", "gz", "zlib", "crt",
];

/// Derive the local file extension for a content-type string.
pub fn resolve_extension(content_type: &str) -> String {
    let base = match content_type.find(';') {
        Some(idx) => content_type[..idx].trim(),
        None => content_type,
    };

    let candidate = match base.split_once('/') {
        Some((_, subtype)) => {
            if subtype == "octet-stream" {
                return DEFAULT_EXTENSION.to_string();
            }
            subtype
        }
        None => base,
    };

    if KNOWN_EXTENSIONS.contains(&candidate.to_lowercase().as_str()) {
        return candidate.to_string();
    }
    if (2..=5).contains(&candidate.len()) && candidate.chars().all(|c| c.is_ascii_alphanumeric()) {
        return candidate.to_string();
    }

    DEFAULT_EXTENSION.to_string()
}

/// Whether the content type carries parameters that require a sidecar entry.
pub fn needs_sidecar(content_type: &str) -> bool {
    content_type.contains(';')
}

/// Local filename for a binary parameter.
///
/// The resolved extension is appended unless the ID already ends with it
/// (case-insensitively), so re-snapshotting never stacks extensions.
pub fn parameter_filename(id: &str, content_type: &str) -> String {
    let ext = resolve_extension(content_type);
    let suffix = format!(".{}", ext);
    if id.to_lowercase().ends_with(&suffix.to_lowercase()) {
        id.to_string()
    } else {
        format!("{}{}", id, suffix)
    }
}

/// Strip the final extension from a filename, yielding the parameter ID.
pub fn strip_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_tokens() {
        for token in KNOWN_EXTENSIONS {
            assert_eq!(resolve_extension(token), token);
        }
    }

    #[test]
    fn test_tokens_with_parameters() {
        assert_eq!(resolve_extension("xml; encoding=UTF-8"), "xml");
        assert_eq!(resolve_extension("json;charset=utf-8"), "json");
        assert!(needs_sidecar("xml; encoding=UTF-8"));
        assert!(!needs_sidecar("xml"));
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(resolve_extension("text/xml"), "xml");
        assert_eq!(resolve_extension("application/json"), "json");
        assert_eq!(resolve_extension("application/octet-stream"), "bin");
        assert_eq!(resolve_extension("application/octet-stream; x=y"), "bin");
    }

    #[test]
    fn test_unrecognized_candidates() {
        // Alphanumeric and 2-5 chars passes through.
        assert_eq!(resolve_extension("yaml"), "yaml");
        assert_eq!(resolve_extension("p12"), "p12");
        // Everything else falls back to bin.
        assert_eq!(resolve_extension(""), "bin");
        assert_eq!(resolve_extension("x"), "bin");
        assert_eq!(resolve_extension("toolong"), "bin");
        assert_eq!(resolve_extension("has-dash"), "bin");
    }

    #[test]
    fn test_filename_avoids_double_extension() {
        assert_eq!(parameter_filename("cert", "crt"), "cert.crt");
        assert_eq!(parameter_filename("cert.crt", "crt"), "cert.crt");
        assert_eq!(parameter_filename("CERT.CRT", "crt"), "CERT.CRT");
        assert_eq!(parameter_filename("payload", "application/json"), "payload.json");
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("file.xml"), "file");
        assert_eq!(strip_extension("noext"), "noext");
        assert_eq!(strip_extension("archive.tar.gz"), "archive.tar");
        assert_eq!(strip_extension(".hidden"), ".hidden");
    }
}
