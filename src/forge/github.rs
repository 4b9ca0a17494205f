//! GitHub driver, backed by the `gh` CLI (spec.md §4.7).

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::PrMergeStrategy;

use super::cli;
use super::detect::{Platform, RepoInfo};
use super::{ForgeDriver, ForgeError, PrHandle};

#[derive(Debug, Default)]
pub struct GitHubDriver {
    retries: u32,
}

impl GitHubDriver {
    pub fn new(retries: u32) -> Self {
        Self { retries }
    }
}

#[derive(Deserialize)]
struct GhPr {
    number: u64,
    url: String,
}

#[async_trait]
impl ForgeDriver for GitHubDriver {
    fn platform(&self) -> Platform {
        Platform::GitHub
    }

    async fn existing_pr(&self, repo: &RepoInfo, branch: &str) -> Result<Option<PrHandle>, ForgeError> {
        let args = vec![
            "pr".to_string(),
            "list".to_string(),
            "--repo".to_string(),
            repo.full_name(),
            "--head".to_string(),
            branch.to_string(),
            "--state".to_string(),
            "open".to_string(),
            "--json".to_string(),
            "number,url".to_string(),
        ];
        let stdout = cli::run("gh", &args, None, self.retries).await?;
        let prs: Vec<GhPr> = cli::parse_json("gh", &stdout)?;
        Ok(prs.into_iter().next().map(|p| PrHandle { url: p.url, number: p.number }))
    }

    async fn close_pr(&self, repo: &RepoInfo, pr: &PrHandle) -> Result<(), ForgeError> {
        let args = vec![
            "pr".to_string(),
            "close".to_string(),
            pr.number.to_string(),
            "--repo".to_string(),
            repo.full_name(),
        ];
        cli::run("gh", &args, None, self.retries).await?;
        Ok(())
    }

    async fn create_pr(
        &self,
        repo: &RepoInfo,
        branch: &str,
        base: &str,
        title: &str,
        body_path: &Path,
    ) -> Result<PrHandle, ForgeError> {
        let args = vec![
            "pr".to_string(),
            "create".to_string(),
            "--repo".to_string(),
            repo.full_name(),
            "--head".to_string(),
            branch.to_string(),
            "--base".to_string(),
            base.to_string(),
            "--title".to_string(),
            title.to_string(),
            "--body-file".to_string(),
            body_path.display().to_string(),
            "--json".to_string(),
            "number,url".to_string(),
        ];
        let stdout = cli::run("gh", &args, None, self.retries).await?;
        let pr: GhPr = cli::parse_json("gh", &stdout)?;
        Ok(PrHandle { url: pr.url, number: pr.number })
    }

    async fn merge_pr(
        &self,
        repo: &RepoInfo,
        pr: &PrHandle,
        strategy: PrMergeStrategy,
        delete_branch: bool,
        _force: bool,
        _bypass_reason: Option<&str>,
    ) -> Result<(), ForgeError> {
        let mut args = vec![
            "pr".to_string(),
            "merge".to_string(),
            pr.number.to_string(),
            "--repo".to_string(),
            repo.full_name(),
        ];
        args.push(
            match strategy {
                PrMergeStrategy::Merge => "--merge",
                PrMergeStrategy::Squash => "--squash",
                PrMergeStrategy::Rebase => "--rebase",
            }
            .to_string(),
        );
        if delete_branch {
            args.push("--delete-branch".to_string());
        }
        cli::run("gh", &args, None, self.retries).await?;
        Ok(())
    }
}
