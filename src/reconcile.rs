//! Repo Reconciler (spec.md §4.10): the per-repo state machine that turns
//! one resolved [`RepoPlan`] into a clean, pushed (and optionally
//! PR/MR-staged) working tree.
//!
//! ```text
//! Start -> Cleaned -> Cloned -> BranchReady -> Rendered -> (NoChange -> Done)
//!                                                        -> Committed -> Pushed -> PRStage -> Done
//! Any state -> Failed (caught by the caller, run continues)
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::normalize::RepoPlan;
use crate::config::template::{RepoIdentity, TemplateContext};
use crate::config::MergeMode;
use crate::forge::detect::DetectError;
use crate::forge::{self, ForgeDriver, ForgeError, Platform, RepoInfo};
use crate::git::branch::sanitize;
use crate::git::{workspace, GitError};
use crate::manifest::{Manifest, ManifestError};
use crate::render::{render_file, RenderError};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Forge(#[from] ForgeError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("direct push rejected; repo's default branch appears protected. Consider switching prOptions.merge to \"force\" to go through a bypassed PR/MR instead")]
    DirectPushRejected,

    #[error("nothing to do for this repo")]
    NothingToDo,
}

/// Final state a repo landed in, mapped by the caller to one of the
/// user-visible statuses in spec.md §6 (`created-pr`, `updated-pr`,
/// `direct-pushed`, `no-change`, `skipped`, `failed`).
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    CreatedPr { url: String },
    UpdatedPr { url: String },
    DirectPushed,
    NoChange,
    /// `--dry-run`: no write, commit, push, or PR/MR call was made. `changed`
    /// reports whether a real run would have produced a commit.
    DryRun { changed: bool },
}

/// Run-wide knobs threaded through every repo's reconciliation. Owned (not
/// borrowed) so a single instance can be cloned into `'static` tasks when
/// the Runner processes repos in parallel.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub config_id: String,
    pub work_dir: PathBuf,
    pub dry_run: bool,
    pub branch_override: Option<String>,
    pub github_hosts: Vec<String>,
    pub pr_template: Option<String>,
    pub no_delete: bool,
    /// ISO-8601 UTC day frozen at run start, for `${xfg:date}` expansion.
    pub run_date: String,
    /// Max backoff attempts for transient git/forge failures (spec.md §5).
    pub retries: u32,
}

/// Drive one repo through the full state machine.
pub async fn reconcile_repo(plan: &RepoPlan, opts: &ReconcileOptions) -> Result<ReconcileOutcome, ReconcileError> {
    if plan.files.is_empty() {
        return Err(ReconcileError::NothingToDo);
    }

    // Start -> Cloned
    let repo_info = forge::detect_repo_info(&plan.git_url, &opts.github_hosts)?;
    let workspace_dir = opts.work_dir.join(workspace_subdir(&repo_info));
    workspace::clean(&workspace_dir)?;
    let repo = workspace::clone(&plan.git_url, &workspace_dir, opts.retries)?;
    let base_branch = workspace::default_branch(&repo)?;

    let direct = matches!(plan.pr_options.merge, MergeMode::Direct);
    let sync_branch = match &opts.branch_override {
        Some(b) => b.clone(),
        None => format!("chore/sync-{}", sanitize(&opts.config_id)),
    };
    let target_branch = if direct { base_branch.clone() } else { sync_branch.clone() };

    let driver = if direct { None } else { Some(forge::driver_for(repo_info.platform, opts.retries)) };

    // Cloned -> BranchReady
    if let Some(driver) = &driver {
        if !opts.dry_run {
            if let Some(existing) = driver.existing_pr(&repo_info, &sync_branch).await? {
                driver.close_pr(&repo_info, &existing).await?;
                workspace::delete_remote(&repo, &sync_branch).ok();
            }
        }
        workspace::ensure_branch(&repo, &sync_branch)?;
    }

    // BranchReady -> Rendered
    let mut manifest = Manifest::load(&workspace_dir, &opts.config_id)?;
    let tracked_for_orphans: Vec<String> = plan
        .files
        .iter()
        .filter(|(_, file)| file.delete_orphaned)
        .map(|(path, _)| path.clone())
        .collect();
    let orphans = manifest.compute_orphans(&opts.config_id, &tracked_for_orphans, &workspace_dir);

    let repo_identity = RepoIdentity {
        name: repo_info.repo.clone(),
        owner: repo_info.owner.clone().unwrap_or_default(),
        full_name: repo_info.full_name(),
        url: repo_info.url.clone(),
        platform: repo_info.platform.as_str().to_string(),
        host: repo_info.host.clone(),
    };

    let mut rendered: Vec<(String, Vec<u8>, bool)> = Vec::with_capacity(plan.files.len());
    for (path, file) in &plan.files {
        let empty_vars: HashMap<String, String> = HashMap::new();
        let ctx = if file.template {
            Some(TemplateContext {
                repo: &repo_identity,
                file_name: path.as_str(),
                repo_vars: &empty_vars,
                file_vars: &file.vars,
                run_date: opts.run_date.as_str(),
            })
        } else {
            None
        };
        let bytes = render_file(path, file, ctx.as_ref())?;
        rendered.push((path.clone(), bytes, file.executable));
    }

    if opts.dry_run {
        let mut changed = !orphans.is_empty();
        if !changed {
            for (path, bytes, _) in &rendered {
                let full = workspace_dir.join(path);
                let file = plan.files.get(path).expect("rendered path must come from plan.files");
                if file.create_only && full.exists() {
                    continue;
                }
                let existing = std::fs::read(&full).ok();
                if existing.as_deref() != Some(bytes.as_slice()) {
                    changed = true;
                    break;
                }
            }
        }
        return Ok(ReconcileOutcome::DryRun { changed });
    }

    if !opts.no_delete {
        for orphan in &orphans {
            let full = workspace_dir.join(orphan);
            if full.exists() {
                std::fs::remove_file(&full)?;
            }
        }
    }

    let mut written = 0usize;
    for (path, bytes, executable) in &rendered {
        let full = workspace_dir.join(path);
        let file = plan.files.get(path).expect("rendered path must come from plan.files");
        if file.create_only && full.exists() {
            continue;
        }
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full, bytes)?;
        written += 1;
        if *executable {
            workspace::mark_executable(&repo, path)?;
        }
    }

    manifest.update(&opts.config_id, tracked_for_orphans.clone());
    manifest.save()?;

    // Rendered -> NoChange | Committed
    if !workspace::has_changes(&repo)? {
        return Ok(ReconcileOutcome::NoChange);
    }

    let total_touched = written + orphans.len();
    let message = format!("chore: sync {total_touched} file(s) via xfg [{}]", &opts.config_id);
    workspace::commit_all(&repo, &message, opts.retries)?;

    // Committed -> Pushed
    let push_result = workspace::push(&repo, &target_branch, !direct, opts.retries);
    if let Err(err) = push_result {
        if direct && matches!(err, GitError::PushRejected(_)) {
            return Err(ReconcileError::DirectPushRejected);
        }
        return Err(err.into());
    }

    if direct {
        return Ok(ReconcileOutcome::DirectPushed);
    }

    // Pushed -> PRStage. The Azure DevOps force-bypass precondition is
    // enforced by the Config Normalizer, not here (spec.md §8 property 10).
    let driver = driver.expect("non-direct mode always has a driver");
    let body_path = write_pr_body(opts.pr_template.as_deref(), &rendered, &orphans)?;
    let title = format!("chore: sync {total_touched} file(s) via xfg [{}]", &opts.config_id);

    let (handle, reused) = match driver.existing_pr(&repo_info, &sync_branch).await? {
        Some(existing) => (existing, true),
        None => {
            let created = driver
                .create_pr(&repo_info, &sync_branch, &base_branch, &title, body_path.path())
                .await?;
            (created, false)
        }
    };

    match plan.pr_options.merge {
        MergeMode::Manual => {}
        MergeMode::Auto | MergeMode::Force => {
            let bypass = plan.pr_options.bypass_reason.as_deref();
            let force = matches!(plan.pr_options.merge, MergeMode::Force);
            match driver
                .merge_pr(&repo_info, &handle, plan.pr_options.merge_strategy, plan.pr_options.delete_branch, force, bypass)
                .await
            {
                Ok(()) => {}
                Err(ForgeError::AutoMergeDisabled) => {
                    tracing::warn!(repo = %repo_info.full_name(), "auto-merge disabled upstream; PR left open for manual merge");
                }
                Err(other) => return Err(other.into()),
            }
        }
        MergeMode::Direct => unreachable!("direct mode never reaches PRStage"),
    }

    if reused {
        Ok(ReconcileOutcome::UpdatedPr { url: handle.url })
    } else {
        Ok(ReconcileOutcome::CreatedPr { url: handle.url })
    }
}

fn workspace_subdir(repo: &RepoInfo) -> String {
    sanitize(&repo.full_name())
}

fn write_pr_body(
    template: Option<&str>,
    rendered: &[(String, Vec<u8>, bool)],
    orphans: &[String],
) -> Result<tempfile::NamedTempFile, ReconcileError> {
    use std::io::Write as _;

    let mut bullets = String::new();
    for (path, _, _) in rendered {
        bullets.push_str("- ");
        bullets.push_str(path);
        bullets.push('\n');
    }
    for path in orphans {
        bullets.push_str("- ");
        bullets.push_str(path);
        bullets.push_str(" [DELETED]\n");
    }

    let body = match template {
        Some(t) => t.replace("{{FILES}}", &bullets),
        None => format!("Synced by xfg.\n\n{bullets}"),
    };

    let mut file = tempfile::NamedTempFile::new().map_err(GitError::from)?;
    file.write_all(body.as_bytes()).map_err(GitError::from)?;
    Ok(file)
}
