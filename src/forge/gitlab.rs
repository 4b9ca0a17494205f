//! GitLab driver, backed by the `glab` CLI (spec.md §4.7).

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::PrMergeStrategy;

use super::cli;
use super::detect::{Platform, RepoInfo};
use super::{ForgeDriver, ForgeError, PrHandle};

#[derive(Debug, Default)]
pub struct GitLabDriver {
    retries: u32,
}

impl GitLabDriver {
    pub fn new(retries: u32) -> Self {
        Self { retries }
    }
}

#[derive(Deserialize)]
struct GlabMr {
    iid: u64,
    web_url: String,
}

#[async_trait]
impl ForgeDriver for GitLabDriver {
    fn platform(&self) -> Platform {
        Platform::GitLab
    }

    async fn existing_pr(&self, repo: &RepoInfo, branch: &str) -> Result<Option<PrHandle>, ForgeError> {
        let args = vec![
            "mr".to_string(),
            "list".to_string(),
            "--repo".to_string(),
            repo.full_name(),
            "--source-branch".to_string(),
            branch.to_string(),
            "--state".to_string(),
            "opened".to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        let stdout = cli::run("glab", &args, None, self.retries).await?;
        let mrs: Vec<GlabMr> = cli::parse_json("glab", &stdout)?;
        Ok(mrs.into_iter().next().map(|m| PrHandle { url: m.web_url, number: m.iid }))
    }

    async fn close_pr(&self, repo: &RepoInfo, pr: &PrHandle) -> Result<(), ForgeError> {
        let args = vec![
            "mr".to_string(),
            "close".to_string(),
            pr.number.to_string(),
            "--repo".to_string(),
            repo.full_name(),
        ];
        cli::run("glab", &args, None, self.retries).await?;
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
        let body = tokio::fs::read_to_string(body_path)
            .await
            .map_err(|e| ForgeError::Spawn { binary: "glab", source: e })?;
        let args = vec![
            "mr".to_string(),
            "create".to_string(),
            "--repo".to_string(),
            repo.full_name(),
            "--source-branch".to_string(),
            branch.to_string(),
            "--target-branch".to_string(),
            base.to_string(),
            "--title".to_string(),
            title.to_string(),
            "--description".to_string(),
            body,
            "--output".to_string(),
            "json".to_string(),
        ];
        let stdout = cli::run("glab", &args, None, self.retries).await?;
        let mr: GlabMr = cli::parse_json("glab", &stdout)?;
        Ok(PrHandle { url: mr.web_url, number: mr.iid })
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
            "mr".to_string(),
            "merge".to_string(),
            pr.number.to_string(),
            "--repo".to_string(),
            repo.full_name(),
        ];
        if matches!(strategy, PrMergeStrategy::Squash) {
            args.push("--squash".to_string());
        }
        if matches!(strategy, PrMergeStrategy::Rebase) {
            args.push("--rebase".to_string());
        }
        if delete_branch {
            args.push("--remove-source-branch".to_string());
        }
        cli::run("glab", &args, None, self.retries).await?;
        Ok(())
    }
}
