//! File-Reference Resolver (spec.md §4.4).
//!
//! Expands `content: "@relative/path"` into the parsed content of the
//! referenced file, resolved against the config file's own directory with a
//! path-traversal guard.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::merge::ContentValue;

#[derive(Error, Debug)]
pub enum FileRefError {
    #[error("path escapes the config directory: {0}")]
    PathEscape(String),

    #[error("failed to read referenced file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse referenced file {path} as {format}: {source}")]
    Parse {
        path: String,
        format: &'static str,
        source: String,
    },
}

/// Check if a reference path would escape the boundary of its config
/// directory. Adapted from the teacher's `path_escapes_boundary`.
pub fn path_escapes_boundary(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    normalized.starts_with("..") || normalized.starts_with('/') || normalized.contains("/../")
}

/// Resolve a single `@path` reference against `config_dir`, returning its
/// parsed content.
pub fn resolve_ref(reference: &str, config_dir: &Path) -> Result<ContentValue, FileRefError> {
    let rel = reference
        .strip_prefix('@')
        .expect("resolve_ref called on a non-@ string");

    if path_escapes_boundary(rel) {
        return Err(FileRefError::PathEscape(rel.to_string()));
    }

    let full_path = config_dir.join(rel);
    let bytes = std::fs::read_to_string(&full_path).map_err(|e| FileRefError::Io {
        path: rel.to_string(),
        source: e,
    })?;

    parse_by_extension(&bytes, rel)
}

fn parse_by_extension(bytes: &str, path: &str) -> Result<ContentValue, FileRefError> {
    let ext = PathBuf::from(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "json" => serde_json::from_str::<ContentValue>(bytes).map_err(|e| FileRefError::Parse {
            path: path.to_string(),
            format: "json",
            source: e.to_string(),
        }),
        "json5" => json5::from_str::<ContentValue>(bytes).map_err(|e| FileRefError::Parse {
            path: path.to_string(),
            format: "json5",
            source: e.to_string(),
        }),
        "yaml" | "yml" => serde_yaml::from_str::<ContentValue>(bytes).map_err(|e| FileRefError::Parse {
            path: path.to_string(),
            format: "yaml",
            source: e.to_string(),
        }),
        _ => Ok(ContentValue::String(bytes.to_string())),
    }
}

/// Is this a file-reference content string?
pub fn is_ref(s: &str) -> bool {
    s.starts_with('@')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rejects_parent_escape() {
        assert!(path_escapes_boundary("../secret"));
        assert!(path_escapes_boundary("/etc/passwd"));
        assert!(path_escapes_boundary("foo/../../etc"));
        assert!(!path_escapes_boundary("foo/bar.json"));
        assert!(!path_escapes_boundary("./foo.json"));
    }

    #[test]
    fn resolves_json_reference() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("base.json"), r#"{"semi": false}"#).unwrap();
        let resolved = resolve_ref("@base.json", dir.path()).unwrap();
        match resolved {
            ContentValue::Object(m) => assert_eq!(m.get("semi"), Some(&ContentValue::Bool(false))),
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn resolves_text_reference_for_unknown_extension() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("script.sh"), "#!/bin/sh\necho hi\n").unwrap();
        let resolved = resolve_ref("@script.sh", dir.path()).unwrap();
        assert_eq!(resolved, ContentValue::String("#!/bin/sh\necho hi\n".to_string()));
    }

    #[test]
    fn rejects_traversal_reference() {
        let dir = TempDir::new().unwrap();
        let err = resolve_ref("@../secret.json", dir.path()).unwrap_err();
        assert!(matches!(err, FileRefError::PathEscape(_)));
    }
}
