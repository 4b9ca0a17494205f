//! Manifest Manager (spec.md §4.9).
//!
//! Reads/writes the on-disk `.xfg.json` sync manifest that each repo
//! carries: a map from config ID to the sorted set of paths that config
//! wrote with `deleteOrphaned:true` in its most recent sync. Used to
//! compute orphans (files this config previously wrote but no longer
//! plans to) without touching any other config's namespace.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MANIFEST_FILE: &str = ".xfg.json";
const MANIFEST_VERSION: u32 = 2;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse manifest JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OnDiskManifest {
    version: u32,
    configs: BTreeMap<String, Vec<String>>,
}

impl Default for OnDiskManifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            configs: BTreeMap::new(),
        }
    }
}

/// A repo's `.xfg.json`, loaded once at reconciliation start.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    inner: OnDiskManifest,
}

impl Manifest {
    /// Load `.xfg.json` from `repo_root`, or start an empty one if absent.
    /// A manifest written by an older version is upgraded in place: its flat
    /// list of paths is wrapped under `config_id`, the active config
    /// (spec.md §6).
    pub fn load(repo_root: &Path, config_id: &str) -> Result<Self, ManifestError> {
        let path = repo_root.join(MANIFEST_FILE);
        let inner = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            let version = value.get("version").and_then(|v| v.as_u64()).unwrap_or(1);
            if version < MANIFEST_VERSION as u64 {
                migrate_to_current(value, config_id)
            } else {
                serde_json::from_value(value)?
            }
        } else {
            OnDiskManifest::default()
        };
        Ok(Self { path, inner })
    }

    /// The set of paths this config tracked in the previous sync, `∅` if
    /// this config has no prior entry.
    pub fn tracked_paths(&self, config_id: &str) -> Vec<String> {
        self.inner.configs.get(config_id).cloned().unwrap_or_default()
    }

    /// Orphans to delete: paths this config previously tracked that are not
    /// in `planned`, restricted to paths that currently exist under
    /// `repo_root`.
    pub fn compute_orphans(&self, config_id: &str, planned: &[String], repo_root: &Path) -> Vec<String> {
        let planned: std::collections::HashSet<&str> = planned.iter().map(String::as_str).collect();
        self.tracked_paths(config_id)
            .into_iter()
            .filter(|p| !planned.contains(p.as_str()))
            .filter(|p| repo_root.join(p).exists())
            .collect()
    }

    /// Replace this config's entry with `planned` (sorted, deduplicated).
    /// Empty `planned` removes the config's key entirely. If `--no-delete`
    /// is set the caller still calls this so the next run without the flag
    /// can delete the now-absent files.
    pub fn update(&mut self, config_id: &str, mut planned: Vec<String>) {
        planned.sort();
        planned.dedup();
        if planned.is_empty() {
            self.inner.configs.remove(config_id);
        } else {
            self.inner.configs.insert(config_id.to_string(), planned);
        }
    }

    /// Write the manifest back, or remove the file entirely if no configs
    /// remain. Other configs' namespaces are untouched since `inner` was
    /// loaded from the same file and only this config's key was mutated.
    pub fn save(&self) -> Result<(), ManifestError> {
        if self.inner.configs.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }
        let json = serde_json::to_string_pretty(&self.inner)?;
        std::fs::write(&self.path, format!("{json}\n"))?;
        Ok(())
    }
}

/// Upgrade a pre-v2 manifest (a flat `"files"` list, no per-config
/// namespace) into the current schema by wrapping that list under the
/// active `config_id`. Any other shape is treated as empty, since earlier
/// versions weren't namespaced and can't be attributed to another config.
fn migrate_to_current(value: serde_json::Value, config_id: &str) -> OnDiskManifest {
    let files: Vec<String> = value
        .get("files")
        .and_then(|f| f.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    let mut inner = OnDiskManifest::default();
    if !files.is_empty() {
        inner.configs.insert(config_id.to_string(), files);
    }
    inner
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loads_empty_when_absent() {
        let dir = TempDir::new().unwrap();
        let m = Manifest::load(dir.path(), "s1").unwrap();
        assert!(m.tracked_paths("s1").is_empty());
    }

    #[test]
    fn orphans_are_previously_tracked_minus_planned_and_existing_on_disk() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("old.txt"), "x").unwrap();
        let manifest_json = r#"{"version":2,"configs":{"s1":["old.txt","gone.txt"]}}"#;
        std::fs::write(dir.path().join(".xfg.json"), manifest_json).unwrap();

        let m = Manifest::load(dir.path(), "s1").unwrap();
        let orphans = m.compute_orphans("s1", &["new.txt".to_string()], dir.path());
        // "gone.txt" isn't actually on disk, so only "old.txt" qualifies.
        assert_eq!(orphans, vec!["old.txt".to_string()]);
    }

    #[test]
    fn other_configs_preserved_byte_for_byte_in_namespace() {
        let dir = TempDir::new().unwrap();
        let manifest_json = r#"{"version":2,"configs":{"other":["keep.txt"]}}"#;
        std::fs::write(dir.path().join(".xfg.json"), manifest_json).unwrap();

        let mut m = Manifest::load(dir.path(), "s1").unwrap();
        m.update("s1", vec!["a.txt".to_string()]);
        m.save().unwrap();

        let reloaded = Manifest::load(dir.path(), "s1").unwrap();
        assert_eq!(reloaded.tracked_paths("other"), vec!["keep.txt".to_string()]);
        assert_eq!(reloaded.tracked_paths("s1"), vec!["a.txt".to_string()]);
    }

    #[test]
    fn empty_planned_removes_config_key_and_file_when_last() {
        let dir = TempDir::new().unwrap();
        let manifest_json = r#"{"version":2,"configs":{"s1":["a.txt"]}}"#;
        std::fs::write(dir.path().join(".xfg.json"), manifest_json).unwrap();

        let mut m = Manifest::load(dir.path(), "s1").unwrap();
        m.update("s1", Vec::new());
        m.save().unwrap();

        assert!(!dir.path().join(".xfg.json").exists());
    }

    #[test]
    fn sorted_and_deduplicated_on_update() {
        let dir = TempDir::new().unwrap();
        let mut m = Manifest::load(dir.path(), "s1").unwrap();
        m.update("s1", vec!["b.txt".to_string(), "a.txt".to_string(), "a.txt".to_string()]);
        assert_eq!(m.tracked_paths("s1"), vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[test]
    fn v1_flat_manifest_is_migrated_under_active_config() {
        let dir = TempDir::new().unwrap();
        let manifest_json = r#"{"version":1,"files":["a.json","b.json"]}"#;
        std::fs::write(dir.path().join(".xfg.json"), manifest_json).unwrap();

        let m = Manifest::load(dir.path(), "s1").unwrap();
        assert_eq!(m.tracked_paths("s1"), vec!["a.json".to_string(), "b.json".to_string()]);
    }

    #[test]
    fn versionless_manifest_is_treated_as_v1_and_migrated() {
        let dir = TempDir::new().unwrap();
        let manifest_json = r#"{"files":["a.json"]}"#;
        std::fs::write(dir.path().join(".xfg.json"), manifest_json).unwrap();

        let m = Manifest::load(dir.path(), "s1").unwrap();
        assert_eq!(m.tracked_paths("s1"), vec!["a.json".to_string()]);
    }
}
