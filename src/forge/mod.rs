//! ForgeDriver contract (spec.md §4.7).
//!
//! A `ForgeDriver` wraps one hosting platform's CLI (`gh`, `az repos`,
//! `glab`). The Reconciler only ever talks to this trait; it never knows
//! which platform a repo lives on beyond what [`detect`] tells it.

pub mod azure;
mod cli;
pub mod detect;
pub mod github;
pub mod gitlab;

use async_trait::async_trait;
use thiserror::Error;

pub use detect::{detect_repo_info, Platform, RepoInfo};

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("{binary} not found on PATH: {source}")]
    MissingBinary {
        binary: &'static str,
        #[source]
        source: which::Error,
    },

    #[error("{binary} exited with status {status}: {stderr}")]
    CommandFailed {
        binary: &'static str,
        status: i32,
        stderr: String,
    },

    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {binary} output: {reason}")]
    Parse { binary: &'static str, reason: String },

    #[error("{binary} authentication failed: {stderr}")]
    AuthFailed { binary: &'static str, stderr: String },

    #[error("{binary} denied permission: {stderr}")]
    PermissionDenied { binary: &'static str, stderr: String },

    #[error("{binary}: not found: {stderr}")]
    NotFound { binary: &'static str, stderr: String },

    #[error("auto-merge is disabled for this repository upstream")]
    AutoMergeDisabled,

    #[error("{binary} transient failure: {stderr}")]
    Transient { binary: &'static str, stderr: String },

    #[error("force merge on Azure DevOps requires prOptions.bypassReason")]
    BypassReasonRequired,
}

impl ForgeError {
    /// Whether this error kind should be retried with backoff (spec.md §7:
    /// "`Transient` triggers retry").
    pub fn is_transient(&self) -> bool {
        matches!(self, ForgeError::Transient { .. })
    }
}

/// Outcome of creating or reusing a PR/MR.
#[derive(Debug, Clone)]
pub struct PrHandle {
    pub url: String,
    pub number: u64,
}

/// One platform's wrapper over its review-request workflow. Every method
/// that shells a CLI argv-escapes all caller-provided strings; none build a
/// shell command line by concatenation.
#[async_trait]
pub trait ForgeDriver: Send + Sync {
    fn platform(&self) -> Platform;

    /// Look up an existing open PR/MR for `branch`, if any.
    async fn existing_pr(&self, repo: &RepoInfo, branch: &str) -> Result<Option<PrHandle>, ForgeError>;

    /// Close `pr` without merging it, for the fresh-start policy (spec.md
    /// §4.10 step 3). The caller deletes the remote branch separately
    /// through the Git Workspace.
    async fn close_pr(&self, repo: &RepoInfo, pr: &PrHandle) -> Result<(), ForgeError>;

    /// Create a PR/MR from `branch` into `base`, with a body read from
    /// `body_path` (kept out of argv to dodge shell/CLI length limits and
    /// accidental shell interpretation).
    async fn create_pr(
        &self,
        repo: &RepoInfo,
        branch: &str,
        base: &str,
        title: &str,
        body_path: &std::path::Path,
    ) -> Result<PrHandle, ForgeError>;

    /// Merge an existing PR/MR per the repo's effective `PrOptions`. `force`
    /// reports whether the repo's merge mode is `force` (as opposed to
    /// `auto`), which Azure DevOps requires a `bypass_reason` for.
    async fn merge_pr(
        &self,
        repo: &RepoInfo,
        pr: &PrHandle,
        strategy: crate::config::PrMergeStrategy,
        delete_branch: bool,
        force: bool,
        bypass_reason: Option<&str>,
    ) -> Result<(), ForgeError>;
}

/// Resolve the concrete driver for a detected platform. `retries` bounds the
/// number of backoff attempts each CLI invocation gets on a transient
/// failure (spec.md §5, `--retries`).
pub fn driver_for(platform: Platform, retries: u32) -> Box<dyn ForgeDriver> {
    match platform {
        Platform::GitHub => Box::new(github::GitHubDriver::new(retries)),
        Platform::AzureDevOps => Box::new(azure::AzureDriver::new(retries)),
        Platform::GitLab => Box::new(gitlab::GitLabDriver::new(retries)),
    }
}
