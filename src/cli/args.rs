//! Command-line flag contract (spec.md §6).

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::{MergeMode, PrMergeStrategy};

#[derive(Parser, Debug)]
#[command(name = "xfg")]
#[command(author, version, about = "Declarative config-file sync across Git forges", long_about = None)]
pub struct Cli {
    /// Path to the sync spec YAML file.
    #[arg(long)]
    pub config: PathBuf,

    /// Compute and print what would change without writing, committing,
    /// pushing, or calling any forge CLI.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Directory repos are cloned into. Defaults to a temp directory.
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Number of transient-failure retries for git/forge operations.
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Override the sync branch name (default: `chore/sync-<configId>`).
    #[arg(long)]
    pub branch: Option<String>,

    /// Override every repo's PR/MR merge mode.
    #[arg(long, value_enum)]
    pub merge: Option<ArgMergeMode>,

    /// Override every repo's PR/MR merge strategy.
    #[arg(long, value_enum)]
    pub merge_strategy: Option<ArgMergeStrategy>,

    /// Override whether the sync branch is deleted after merge.
    #[arg(long)]
    pub delete_branch: Option<bool>,

    /// Disable deletion of files orphaned by a spec change.
    #[arg(long, default_value_t = false)]
    pub no_delete: bool,

    /// Number of repos to reconcile concurrently. Omit for sequential.
    #[arg(long)]
    pub parallel: Option<usize>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ArgMergeMode {
    Manual,
    Auto,
    Force,
    Direct,
}

impl From<ArgMergeMode> for MergeMode {
    fn from(value: ArgMergeMode) -> Self {
        match value {
            ArgMergeMode::Manual => MergeMode::Manual,
            ArgMergeMode::Auto => MergeMode::Auto,
            ArgMergeMode::Force => MergeMode::Force,
            ArgMergeMode::Direct => MergeMode::Direct,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ArgMergeStrategy {
    Merge,
    Squash,
    Rebase,
}

impl From<ArgMergeStrategy> for PrMergeStrategy {
    fn from(value: ArgMergeStrategy) -> Self {
        match value {
            ArgMergeStrategy::Merge => PrMergeStrategy::Merge,
            ArgMergeStrategy::Squash => PrMergeStrategy::Squash,
            ArgMergeStrategy::Rebase => PrMergeStrategy::Rebase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_invocation() {
        let cli = Cli::parse_from(["xfg", "--config", "sync.yaml"]);
        assert_eq!(cli.config, PathBuf::from("sync.yaml"));
        assert!(!cli.dry_run);
        assert_eq!(cli.retries, 3);
    }

    #[test]
    fn parses_full_flag_set() {
        let cli = Cli::parse_from([
            "xfg",
            "--config",
            "sync.yaml",
            "--dry-run",
            "--work-dir",
            "/tmp/xfg",
            "--retries",
            "5",
            "--branch",
            "custom-branch",
            "--merge",
            "force",
            "--merge-strategy",
            "rebase",
            "--delete-branch",
            "false",
            "--no-delete",
            "--parallel",
            "4",
        ]);
        assert!(cli.dry_run);
        assert_eq!(cli.work_dir, Some(PathBuf::from("/tmp/xfg")));
        assert_eq!(cli.retries, 5);
        assert_eq!(cli.branch.as_deref(), Some("custom-branch"));
        assert!(matches!(cli.merge, Some(ArgMergeMode::Force)));
        assert!(matches!(cli.merge_strategy, Some(ArgMergeStrategy::Rebase)));
        assert_eq!(cli.delete_branch, Some(false));
        assert!(cli.no_delete);
        assert_eq!(cli.parallel, Some(4));
    }
}
