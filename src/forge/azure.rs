//! Azure DevOps driver, backed by the `az repos` CLI (spec.md §4.7).
//!
//! `merge_pr` with `PrMergeStrategy` mapped to `az repos pr update`'s
//! `--squash` flag, and enforces spec.md §3's "`force` with Azure DevOps
//! requires `bypassReason`" invariant before shelling out.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::PrMergeStrategy;

use super::cli;
use super::detect::{Platform, RepoInfo};
use super::{ForgeDriver, ForgeError, PrHandle};

#[derive(Debug, Default)]
pub struct AzureDriver {
    retries: u32,
}

impl AzureDriver {
    pub fn new(retries: u32) -> Self {
        Self { retries }
    }

    fn org_url(repo: &RepoInfo) -> String {
        format!("https://{}/{}", repo.host, repo.organization.as_deref().unwrap_or_default())
    }
}

#[derive(Deserialize)]
struct AzPr {
    #[serde(rename = "pullRequestId")]
    pull_request_id: u64,
    url: String,
}

#[async_trait]
impl ForgeDriver for AzureDriver {
    fn platform(&self) -> Platform {
        Platform::AzureDevOps
    }

    async fn existing_pr(&self, repo: &RepoInfo, branch: &str) -> Result<Option<PrHandle>, ForgeError> {
        let args = vec![
            "repos".to_string(),
            "pr".to_string(),
            "list".to_string(),
            "--org".to_string(),
            Self::org_url(repo),
            "--project".to_string(),
            repo.project.clone().unwrap_or_default(),
            "--repository".to_string(),
            repo.repo.clone(),
            "--source-branch".to_string(),
            branch.to_string(),
            "--status".to_string(),
            "active".to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        let stdout = cli::run("az", &args, None, self.retries).await?;
        let prs: Vec<AzPr> = cli::parse_json("az", &stdout)?;
        Ok(prs.into_iter().next().map(|p| PrHandle { url: p.url, number: p.pull_request_id }))
    }

    async fn close_pr(&self, repo: &RepoInfo, pr: &PrHandle) -> Result<(), ForgeError> {
        let args = vec![
            "repos".to_string(),
            "pr".to_string(),
            "update".to_string(),
            "--org".to_string(),
            Self::org_url(repo),
            "--id".to_string(),
            pr.number.to_string(),
            "--status".to_string(),
            "abandoned".to_string(),
        ];
        cli::run("az", &args, None, self.retries).await?;
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
        let description = tokio::fs::read_to_string(body_path)
            .await
            .map_err(|e| ForgeError::Spawn { binary: "az", source: e })?;
        let args = vec![
            "repos".to_string(),
            "pr".to_string(),
            "create".to_string(),
            "--org".to_string(),
            Self::org_url(repo),
            "--project".to_string(),
            repo.project.clone().unwrap_or_default(),
            "--repository".to_string(),
            repo.repo.clone(),
            "--source-branch".to_string(),
            branch.to_string(),
            "--target-branch".to_string(),
            base.to_string(),
            "--title".to_string(),
            title.to_string(),
            "--description".to_string(),
            description,
            "--output".to_string(),
            "json".to_string(),
        ];
        let stdout = cli::run("az", &args, None, self.retries).await?;
        let pr: AzPr = cli::parse_json("az", &stdout)?;
        Ok(PrHandle { url: pr.url, number: pr.pull_request_id })
    }

    async fn merge_pr(
        &self,
        repo: &RepoInfo,
        pr: &PrHandle,
        strategy: PrMergeStrategy,
        delete_branch: bool,
        force: bool,
        bypass_reason: Option<&str>,
    ) -> Result<(), ForgeError> {
        if force && bypass_reason.is_none() {
            return Err(ForgeError::BypassReasonRequired);
        }
        let mut args = vec![
            "repos".to_string(),
            "pr".to_string(),
            "update".to_string(),
            "--org".to_string(),
            Self::org_url(repo),
            "--id".to_string(),
            pr.number.to_string(),
            "--status".to_string(),
            "completed".to_string(),
            "--squash".to_string(),
            matches!(strategy, PrMergeStrategy::Squash).to_string(),
            "--delete-source-branch".to_string(),
            delete_branch.to_string(),
        ];
        if let Some(reason) = bypass_reason {
            args.push("--bypass-policy".to_string());
            args.push("true".to_string());
            args.push("--bypass-policy-reason".to_string());
            args.push(reason.to_string());
        }
        cli::run("az", &args, None, self.retries).await?;
        Ok(())
    }
}
