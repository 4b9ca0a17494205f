//! Git Workspace (spec.md §4.8).
//!
//! The handful of repo-lifecycle operations the Reconciler drives directly,
//! on top of the lower-level `branch`/`remote`/`status` helpers: cleaning a
//! stale checkout, cloning, default-branch detection, branch reuse, change
//! detection, committing, marking files executable, and pushing.

use std::path::Path;
use std::process::Command;

use git2::Repository;

use super::{clone_repo, delete_remote_branch, force_push_branch, open_repo, push_branch, GitError};
use crate::util::log_cmd;
use crate::util::retry::{retry_with_backoff_if_sync, RetryOptions};

/// Remove a workspace directory tree, if present.
pub fn clean(path: &Path) -> Result<(), GitError> {
    if path.exists() {
        std::fs::remove_dir_all(path)?;
    }
    Ok(())
}

/// Clone `url` into `dir`, preserving the remote as `origin`. Transient
/// failures are retried with backoff up to `retries` attempts (spec.md §5).
pub fn clone(url: &str, dir: &Path, retries: u32) -> Result<Repository, GitError> {
    clone_repo(url, dir, None, retries)
}

/// Detect the repo's default branch: parse `remote show origin`'s HEAD
/// line, else probe `origin/main`, else `origin/master`, else fall back to
/// `main`. First success wins.
pub fn default_branch(repo: &Repository) -> Result<String, GitError> {
    let repo_path = super::get_workdir(repo);

    let mut cmd = Command::new("git");
    cmd.args(["remote", "show", "origin"]).current_dir(repo_path);
    log_cmd(&cmd);
    if let Ok(output) = cmd.output() {
        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            for line in stdout.lines() {
                let trimmed = line.trim();
                if let Some(branch) = trimmed.strip_prefix("HEAD branch: ") {
                    if branch != "(unknown)" {
                        return Ok(branch.to_string());
                    }
                }
            }
        }
    }

    for candidate in ["main", "master"] {
        if remote_ref_exists(repo_path, &format!("origin/{candidate}")) {
            return Ok(candidate.to_string());
        }
    }

    Ok("main".to_string())
}

fn remote_ref_exists(repo_path: &Path, reference: &str) -> bool {
    let mut cmd = Command::new("git");
    cmd.args(["show-ref", "--verify", "--quiet", &format!("refs/remotes/{reference}")])
        .current_dir(repo_path);
    log_cmd(&cmd);
    cmd.status().map(|s| s.success()).unwrap_or(false)
}

/// Check out `name` tracking `origin/<name>` if it exists remotely, else
/// create it fresh from HEAD.
pub fn ensure_branch(repo: &Repository, name: &str) -> Result<(), GitError> {
    let repo_path = super::get_workdir(repo);

    if remote_ref_exists(repo_path, name) {
        let mut cmd = Command::new("git");
        cmd.args(["checkout", "-B", name, "--track", &format!("origin/{name}")])
            .current_dir(repo_path);
        log_cmd(&cmd);
        let output = cmd.output().map_err(|e| GitError::OperationFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(GitError::OperationFailed(String::from_utf8_lossy(&output.stderr).to_string()));
        }
        return Ok(());
    }

    super::create_and_checkout_branch(repo, name)
}

/// Whether the working tree has any uncommitted changes (status porcelain
/// nonempty).
pub fn has_changes(repo: &Repository) -> Result<bool, GitError> {
    super::has_uncommitted_changes(repo)
}

fn classify_op_stderr(stderr: &str) -> GitError {
    if crate::util::retry::is_retryable_error(stderr) {
        GitError::Transient(stderr.to_string())
    } else {
        GitError::OperationFailed(stderr.to_string())
    }
}

fn commit_all_once(repo_path: &Path, message: &str) -> Result<(), GitError> {
    let mut add_cmd = Command::new("git");
    add_cmd.args(["add", "-A"]).current_dir(repo_path);
    log_cmd(&add_cmd);
    let add_output = add_cmd.output().map_err(|e| GitError::OperationFailed(e.to_string()))?;
    if !add_output.status.success() {
        return Err(classify_op_stderr(&String::from_utf8_lossy(&add_output.stderr)));
    }

    let mut commit_cmd = Command::new("git");
    commit_cmd.args(["commit", "-m", message]).current_dir(repo_path);
    log_cmd(&commit_cmd);
    let commit_output = commit_cmd.output().map_err(|e| GitError::OperationFailed(e.to_string()))?;
    if !commit_output.status.success() {
        return Err(classify_op_stderr(&String::from_utf8_lossy(&commit_output.stderr)));
    }

    Ok(())
}

/// Stage everything including deletions, then commit with `message`,
/// retrying transient failures with backoff up to `retries` attempts.
pub fn commit_all(repo: &Repository, message: &str, retries: u32) -> Result<(), GitError> {
    let repo_path = super::get_workdir(repo);
    let opts = RetryOptions {
        max_retries: retries,
        ..Default::default()
    };
    retry_with_backoff_if_sync(&opts, || commit_all_once(repo_path, message), GitError::is_transient)
}

/// Apply the executable bit to `path` in the index without touching the
/// working-tree file mode, so the commit records the mode regardless of
/// the host filesystem.
pub fn mark_executable(repo: &Repository, path: &str) -> Result<(), GitError> {
    let repo_path = super::get_workdir(repo);

    let mut cmd = Command::new("git");
    cmd.args(["update-index", "--chmod=+x", "--add", path]).current_dir(repo_path);
    log_cmd(&cmd);
    let output = cmd.output().map_err(|e| GitError::OperationFailed(e.to_string()))?;
    if !output.status.success() {
        return Err(GitError::OperationFailed(String::from_utf8_lossy(&output.stderr).to_string()));
    }
    Ok(())
}

/// Push `branch` to `origin`, force-pushing only when `force` is set
/// (reused sync branches). Transient failures are retried with backoff up
/// to `retries` attempts; a genuine rejection (`GitError::PushRejected`) is
/// not retried.
pub fn push(repo: &Repository, branch: &str, force: bool, retries: u32) -> Result<(), GitError> {
    let opts = RetryOptions {
        max_retries: retries,
        ..Default::default()
    };
    retry_with_backoff_if_sync(
        &opts,
        || {
            if force {
                force_push_branch(repo, branch, "origin")
            } else {
                push_branch(repo, branch, "origin", true)
            }
        },
        GitError::is_transient,
    )
}

/// Delete `branch` on `origin`, used by the fresh-start PR policy.
pub fn delete_remote(repo: &Repository, branch: &str) -> Result<(), GitError> {
    delete_remote_branch(repo, branch, "origin")
}

pub fn open(dir: &Path) -> Result<Repository, GitError> {
    open_repo(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    fn init_bare_remote_and_clone() -> (TempDir, TempDir, Repository) {
        let remote_dir = TempDir::new().unwrap();
        StdCommand::new("git").args(["init", "--bare", "-b", "main"]).current_dir(remote_dir.path()).output().unwrap();

        let seed_dir = TempDir::new().unwrap();
        StdCommand::new("git").args(["init", "-b", "main"]).current_dir(seed_dir.path()).output().unwrap();
        StdCommand::new("git").args(["config", "user.email", "a@b.c"]).current_dir(seed_dir.path()).output().unwrap();
        StdCommand::new("git").args(["config", "user.name", "a"]).current_dir(seed_dir.path()).output().unwrap();
        std::fs::write(seed_dir.path().join("README.md"), "hi").unwrap();
        StdCommand::new("git").args(["add", "-A"]).current_dir(seed_dir.path()).output().unwrap();
        StdCommand::new("git").args(["commit", "-m", "init"]).current_dir(seed_dir.path()).output().unwrap();
        StdCommand::new("git")
            .args(["push", remote_dir.path().to_str().unwrap(), "main"])
            .current_dir(seed_dir.path())
            .output()
            .unwrap();

        let work_dir = TempDir::new().unwrap();
        let repo = clone(remote_dir.path().to_str().unwrap(), work_dir.path(), 0).unwrap();
        (remote_dir, work_dir, repo)
    }

    #[test]
    fn clean_removes_directory_tree() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("workspace");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("f.txt"), "x").unwrap();
        clean(&target).unwrap();
        assert!(!target.exists());
    }

    #[test]
    fn clean_is_noop_when_absent() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("does-not-exist");
        clean(&target).unwrap();
    }

    #[test]
    fn default_branch_falls_back_to_main_probe() {
        let (_remote, _work, repo) = init_bare_remote_and_clone();
        let branch = default_branch(&repo).unwrap();
        assert_eq!(branch, "main");
    }

    #[test]
    fn ensure_branch_creates_fresh_when_no_remote_ref() {
        let (_remote, _work, repo) = init_bare_remote_and_clone();
        ensure_branch(&repo, "chore/sync-demo").unwrap();
        let current = super::super::get_current_branch(&repo).unwrap();
        assert_eq!(current, "chore/sync-demo");
    }

    #[test]
    fn commit_all_and_has_changes_roundtrip() {
        let (_remote, work, repo) = init_bare_remote_and_clone();
        assert!(!has_changes(&repo).unwrap());
        std::fs::write(work.path().join("new.txt"), "content").unwrap();
        assert!(has_changes(&repo).unwrap());
        commit_all(&repo, "chore: sync 1 file(s) via xfg [s1]", 0).unwrap();
        assert!(!has_changes(&repo).unwrap());
    }
}
