//! Configuration spec types and the normalization entry point.
//!
//! A sync run starts from one YAML document (the [`Spec`]) naming the files
//! to place and the repositories to place them in. [`load_spec_file`] drives
//! the full pipeline described in each submodule: file-reference resolution,
//! validation, git-array expansion, inheritance, and environment
//! interpolation.

pub mod env;
pub mod fileref;
pub mod merge;
pub mod normalize;
pub mod template;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use merge::ContentValue;
pub use normalize::{NormalizedSpec, RepoPlan, ResolvedFile};

/// Errors that abort the whole run before any repository is touched.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read spec file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse spec YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("required environment variable {name} is unset or empty: {message}")]
    RequiredEnv { name: String, message: String },

    #[error("path escapes the config directory: {0}")]
    PathEscape(String),

    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("content type mismatch for '{path}': {reason}")]
    ContentTypeMismatch { path: String, reason: String },

    #[error("unknown $arrayMerge strategy: {0}")]
    UnknownArrayMergeStrategy(String),

    #[error(transparent)]
    FileRef(#[from] fileref::FileRefError),

    #[error(transparent)]
    Template(#[from] template::TemplateError),

    #[error("repo '{git_url}' targets Azure DevOps with prOptions.merge: force but no bypassReason")]
    MissingBypassReason { git_url: String },
}

/// Merge array strategy, shared by file-level `mergeStrategy` and inline
/// `$arrayMerge` directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum MergeStrategy {
    #[default]
    Replace,
    Append,
    Prepend,
}

impl std::str::FromStr for MergeStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(MergeStrategy::Replace),
            "append" => Ok(MergeStrategy::Append),
            "prepend" => Ok(MergeStrategy::Prepend),
            other => Err(ConfigError::UnknownArrayMergeStrategy(other.to_string())),
        }
    }
}

/// PR/MR merge mode (spec.md §3 PROptions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    Manual,
    #[default]
    Auto,
    Force,
    Direct,
}

/// PR/MR merge strategy once approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrMergeStrategy {
    Merge,
    #[default]
    Squash,
    Rebase,
}

/// Effective PR/MR options for a repo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrOptions {
    pub merge: MergeMode,
    pub merge_strategy: PrMergeStrategy,
    pub delete_branch: bool,
    pub bypass_reason: Option<String>,
}

impl Default for PrOptions {
    fn default() -> Self {
        Self {
            merge: MergeMode::Auto,
            merge_strategy: PrMergeStrategy::Squash,
            delete_branch: true,
            bypass_reason: None,
        }
    }
}

/// One target file's specification, as it appears at root level or as a
/// per-repo override (see [`RepoFileOverride`]).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FileSpec {
    pub content: Option<ContentValue>,
    pub merge_strategy: MergeStrategy,
    pub create_only: bool,
    pub executable: Option<bool>,
    pub header: Option<ContentValue>,
    pub schema_url: Option<String>,
    pub template: bool,
    pub vars: HashMap<String, String>,
    pub delete_orphaned: bool,
}

impl FileSpec {
    /// Whether the file should have the executable bit set, falling back to
    /// the `.sh`-suffix default when `executable` wasn't set explicitly.
    pub fn is_executable(&self, path: &str) -> bool {
        self.executable.unwrap_or_else(|| path.ends_with(".sh"))
    }
}

/// A per-repo override of a root [`FileSpec`]. `None` in a field means
/// "inherit from base"; the raw YAML value `false` in place of this
/// structure means "exclude this file from this repo" and is represented by
/// the `Exclude` variant of [`RepoFileEntry`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RepoFileOverride {
    pub content: Option<ContentValue>,
    pub merge_strategy: Option<MergeStrategy>,
    pub create_only: Option<bool>,
    pub executable: Option<bool>,
    pub header: Option<ContentValue>,
    pub schema_url: Option<String>,
    pub template: Option<bool>,
    pub vars: Option<HashMap<String, String>>,
    pub delete_orphaned: Option<bool>,
    #[serde(rename = "override")]
    pub override_content: bool,
}

/// A `files` entry for a single repo: either an override or an exclusion.
#[derive(Debug, Clone)]
pub enum RepoFileEntry {
    Override(RepoFileOverride),
    Exclude,
}

impl<'de> Deserialize<'de> for RepoFileEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        if let serde_yaml::Value::Bool(false) = value {
            return Ok(RepoFileEntry::Exclude);
        }
        let over = RepoFileOverride::deserialize(value).map_err(serde::de::Error::custom)?;
        Ok(RepoFileEntry::Override(over))
    }
}

impl Serialize for RepoFileEntry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            RepoFileEntry::Exclude => serializer.serialize_bool(false),
            RepoFileEntry::Override(o) => o.serialize(serializer),
        }
    }
}

/// One or more git URLs sharing the same `files`/`prOptions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GitUrls {
    One(String),
    Many(Vec<String>),
}

/// One repository entry in `repos`, before multi-URL expansion.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RepoSpec {
    pub git: Option<GitUrls>,
    pub files: IndexMap<String, RepoFileEntry>,
    pub pr_options: Option<PrOptions>,
}

/// Root spec document (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    pub id: String,
    pub files: IndexMap<String, FileSpec>,
    pub repos: Vec<RepoSpec>,
    #[serde(default)]
    pub pr_options: PrOptions,
    pub pr_template: Option<String>,
    #[serde(default)]
    pub github_hosts: Vec<String>,
    #[serde(default = "default_delete_orphaned")]
    pub delete_orphaned: bool,
}

fn default_delete_orphaned() -> bool {
    false
}

/// A single expanded repo entry (post git-array expansion): one URL, the
/// files map it came with, and its own `prOptions` override.
#[derive(Debug, Clone)]
pub struct ExpandedRepoSpec {
    pub git_url: String,
    pub files: IndexMap<String, RepoFileEntry>,
    pub pr_options: Option<PrOptions>,
}

/// Load and fully normalize a spec file: parse, resolve file references,
/// validate, expand multi-URL repos, resolve inheritance, and
/// environment-interpolate. Mirrors the teacher's `Manifest::load` /
/// `Manifest::parse` / `Manifest::validate` composition.
pub fn load_spec_file(path: &Path, env: &HashMap<String, String>) -> Result<NormalizedSpec, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let config_dir = path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    normalize::normalize(&raw, &config_dir, env)
}
