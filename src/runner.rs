//! Runner (spec.md §2.12 / §5).
//!
//! Drives the Reconciler over every repo in a [`NormalizedSpec`], in input
//! order by default, or with bounded concurrency under `--parallel <n>`.
//! Per-repo failures are caught here and turned into a `failed` summary line
//! rather than aborting the run; only a `ConfigError` (caught earlier, at
//! normalization) short-circuits before any repo is touched.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cli::output::{Output, Table};
use crate::config::normalize::NormalizedSpec;
use crate::git::GitError;
use crate::reconcile::{reconcile_repo, ReconcileError, ReconcileOptions, ReconcileOutcome};

/// One repo's final, user-visible status (spec.md §7: "every repo produces
/// exactly one summary line with status ∈ {created-pr, updated-pr,
/// direct-pushed, no-change, skipped, failed}"). `--dry-run` adds
/// `would-sync`, reported instead of mutating anything.
#[derive(Debug, Clone)]
pub struct RepoSummary {
    pub git_url: String,
    pub status: &'static str,
    pub url: Option<String>,
    pub error: Option<String>,
}

impl RepoSummary {
    fn from_result(git_url: String, result: Result<ReconcileOutcome, ReconcileError>) -> Self {
        match result {
            Ok(ReconcileOutcome::CreatedPr { url }) => Self {
                git_url,
                status: "created-pr",
                url: Some(url),
                error: None,
            },
            Ok(ReconcileOutcome::UpdatedPr { url }) => Self {
                git_url,
                status: "updated-pr",
                url: Some(url),
                error: None,
            },
            Ok(ReconcileOutcome::DirectPushed) => Self {
                git_url,
                status: "direct-pushed",
                url: None,
                error: None,
            },
            Ok(ReconcileOutcome::NoChange) => Self {
                git_url,
                status: "no-change",
                url: None,
                error: None,
            },
            Ok(ReconcileOutcome::DryRun { changed: true }) => Self {
                git_url,
                status: "would-sync",
                url: None,
                error: None,
            },
            Ok(ReconcileOutcome::DryRun { changed: false }) => Self {
                git_url,
                status: "no-change",
                url: None,
                error: None,
            },
            Err(ReconcileError::NothingToDo) => Self {
                git_url,
                status: "skipped",
                url: None,
                error: None,
            },
            Err(other) => Self {
                git_url,
                status: "failed",
                url: None,
                error: Some(other.to_string()),
            },
        }
    }

    fn is_failure(&self) -> bool {
        self.status == "failed"
    }
}

/// The whole run's outcome, including the exit code policy of spec.md §6:
/// `0` success, `1` at least one repo failed.
#[derive(Debug)]
pub struct RunSummary {
    pub repos: Vec<RepoSummary>,
}

impl RunSummary {
    pub fn exit_code(&self) -> i32 {
        if self.repos.iter().any(RepoSummary::is_failure) {
            1
        } else {
            0
        }
    }
}

pub struct Runner<'a> {
    spec: &'a NormalizedSpec,
    reconcile_opts: ReconcileOptions,
    parallel: Option<usize>,
}

impl<'a> Runner<'a> {
    pub fn new(spec: &'a NormalizedSpec, reconcile_opts: ReconcileOptions, parallel: Option<usize>) -> Self {
        Self {
            spec,
            reconcile_opts,
            parallel,
        }
    }

    pub async fn run(&self) -> RunSummary {
        let repos = match self.parallel {
            Some(limit) if limit > 1 => self.run_parallel(limit).await,
            _ => self.run_sequential().await,
        };
        print_summary(&repos);
        RunSummary { repos }
    }

    /// Sequential mode additionally races each repo against SIGINT (spec.md
    /// §5): an interrupt marks the in-flight repo `Failed` with kind
    /// `Cancelled` and stops the run before any further repo starts.
    async fn run_sequential(&self) -> Vec<RepoSummary> {
        let mut out = Vec::with_capacity(self.spec.repos.len());
        for repo in &self.spec.repos {
            let result = tokio::select! {
                r = reconcile_repo(repo, &self.reconcile_opts) => r,
                _ = tokio::signal::ctrl_c() => Err(GitError::Cancelled.into()),
            };
            let cancelled = matches!(result, Err(ReconcileError::Git(GitError::Cancelled)));
            let summary = RepoSummary::from_result(repo.git_url.clone(), result);
            if summary.is_failure() {
                Output::error(&format!("{}: {}", summary.git_url, summary.error.as_deref().unwrap_or("unknown error")));
            }
            out.push(summary);
            if cancelled {
                break;
            }
        }
        out
    }

    /// Bounded-concurrency fan-out. Each task owns a clone of its
    /// [`RepoPlan`][crate::config::normalize::RepoPlan] and the shared
    /// [`ReconcileOptions`], so results come back in completion order; they
    /// are re-sorted into input order before the summary prints, so
    /// `--parallel` output is indistinguishable from sequential output.
    async fn run_parallel(&self, limit: usize) -> Vec<RepoSummary> {
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut join_set: JoinSet<(usize, RepoSummary)> = JoinSet::new();

        for (index, repo) in self.spec.repos.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let opts = self.reconcile_opts.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                let git_url = repo.git_url.clone();
                let result = reconcile_repo(&repo, &opts).await;
                (index, RepoSummary::from_result(git_url, result))
            });
        }

        let mut ordered: Vec<Option<RepoSummary>> = vec![None; self.spec.repos.len()];
        while let Some(joined) = join_set.join_next().await {
            let (index, summary) = joined.expect("reconcile task panicked");
            if summary.is_failure() {
                Output::error(&format!("{}: {}", summary.git_url, summary.error.as_deref().unwrap_or("unknown error")));
            }
            ordered[index] = Some(summary);
        }

        ordered.into_iter().map(|s| s.expect("every index filled by its task")).collect()
    }
}

fn print_summary(repos: &[RepoSummary]) {
    println!();
    Output::header("Sync summary");

    let mut table = Table::new(vec!["Repo", "Status", "URL"]);
    for repo in repos {
        table.add_row(vec![&repo.git_url, repo.status, repo.url.as_deref().unwrap_or("-")]);
    }
    table.print();

    let failed = repos.iter().filter(|r| r.is_failure()).count();
    println!();
    if failed == 0 {
        Output::success(&format!("{} repo(s) synced.", repos.len()));
    } else {
        Output::warning(&format!("{} repo(s) synced, {} failed.", repos.len() - failed, failed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_to_do_maps_to_skipped_not_failed() {
        let summary = RepoSummary::from_result("git@github.com:org/a.git".to_string(), Err(ReconcileError::NothingToDo));
        assert_eq!(summary.status, "skipped");
        assert!(!summary.is_failure());
    }

    #[test]
    fn created_pr_carries_url() {
        let summary = RepoSummary::from_result(
            "git@github.com:org/a.git".to_string(),
            Ok(ReconcileOutcome::CreatedPr {
                url: "https://github.com/org/a/pull/1".to_string(),
            }),
        );
        assert_eq!(summary.status, "created-pr");
        assert_eq!(summary.url.as_deref(), Some("https://github.com/org/a/pull/1"));
    }

    #[test]
    fn exit_code_is_one_iff_any_repo_failed() {
        let clean = RunSummary {
            repos: vec![RepoSummary {
                git_url: "a".to_string(),
                status: "no-change",
                url: None,
                error: None,
            }],
        };
        assert_eq!(clean.exit_code(), 0);

        let dirty = RunSummary {
            repos: vec![RepoSummary {
                git_url: "a".to_string(),
                status: "failed",
                url: None,
                error: Some("boom".to_string()),
            }],
        };
        assert_eq!(dirty.exit_code(), 1);
    }
}
