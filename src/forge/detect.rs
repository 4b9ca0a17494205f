//! Forge Detector (spec.md §2.6 / §3's `RepoInfo`).
//!
//! Classifies a repo's git URL into one of `{github, azure-devops, gitlab}`
//! and parses out the identity fields each platform's driver needs. Adapted
//! from the teacher's `core::repo::{parse_git_url, detect_platform}` — the
//! Bitbucket branch is dropped since this forge list only needs the three
//! platforms spec.md names.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("could not parse repository URL: {0}")]
    UnparseableUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    GitHub,
    AzureDevOps,
    GitLab,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::GitHub => "github",
            Platform::AzureDevOps => "azure-devops",
            Platform::GitLab => "gitlab",
        }
    }
}

/// Identity fields for one repository, as produced by the Detector.
/// Every platform populates `repo`; `owner` is used for GitHub/GitLab-flat;
/// `organization`+`project` for Azure DevOps; `namespace` (slash-joined,
/// possibly nested) for GitLab groups.
#[derive(Debug, Clone)]
pub struct RepoInfo {
    pub platform: Platform,
    pub host: String,
    pub url: String,
    pub owner: Option<String>,
    pub repo: String,
    pub organization: Option<String>,
    pub project: Option<String>,
    pub namespace: Option<String>,
}

impl RepoInfo {
    /// `owner/repo`-style display name, falling back to namespace/repo for
    /// GitLab and org/project/repo for Azure DevOps.
    pub fn full_name(&self) -> String {
        if let Some(owner) = &self.owner {
            return format!("{owner}/{}", self.repo);
        }
        if let Some(ns) = &self.namespace {
            return format!("{ns}/{}", self.repo);
        }
        if let (Some(org), Some(project)) = (&self.organization, &self.project) {
            return format!("{org}/{project}/{}", self.repo);
        }
        self.repo.clone()
    }
}

fn host_from_url(url: &str) -> Option<String> {
    if let Some(rest) = url.strip_prefix("git@") {
        return rest.split(':').next().map(str::to_string);
    }
    for prefix in ["https://", "http://"] {
        if let Some(rest) = url.strip_prefix(prefix) {
            return rest.split('/').next().map(str::to_string);
        }
    }
    None
}

/// Classify `url` into a platform and parse its identity fields.
/// `github_hosts` extends GitHub detection to self-hosted GitHub Enterprise
/// hostnames (spec.md §4.7).
pub fn detect_repo_info(url: &str, github_hosts: &[String]) -> Result<RepoInfo, DetectError> {
    let host = host_from_url(url).unwrap_or_default();
    let platform = classify(url, &host, github_hosts);

    match platform {
        Platform::AzureDevOps => parse_azure(url, &host),
        Platform::GitLab => parse_gitlab(url, &host),
        Platform::GitHub => parse_github(url, &host),
    }
}

fn classify(url: &str, host: &str, github_hosts: &[String]) -> Platform {
    if url.contains("dev.azure.com") || url.contains("visualstudio.com") {
        return Platform::AzureDevOps;
    }
    if url.contains("gitlab.com") || url.contains("gitlab.") {
        return Platform::GitLab;
    }
    if url.contains("github.com") || github_hosts.iter().any(|h| h == host) {
        return Platform::GitHub;
    }
    Platform::GitHub
}

fn strip_git_suffix(s: &str) -> &str {
    s.trim_end_matches(".git")
}

fn repo_path(url: &str) -> Result<&str, DetectError> {
    if let Some(rest) = url.strip_prefix("git@") {
        let (_, path) = rest.split_once(':').ok_or_else(|| DetectError::UnparseableUrl(url.to_string()))?;
        return Ok(strip_git_suffix(path));
    }
    for prefix in ["https://", "http://"] {
        if let Some(rest) = url.strip_prefix(prefix) {
            let (_, path) = rest.split_once('/').ok_or_else(|| DetectError::UnparseableUrl(url.to_string()))?;
            return Ok(strip_git_suffix(path));
        }
    }
    Err(DetectError::UnparseableUrl(url.to_string()))
}

fn parse_github(url: &str, host: &str) -> Result<RepoInfo, DetectError> {
    let path = repo_path(url)?;
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 2 {
        return Err(DetectError::UnparseableUrl(url.to_string()));
    }
    Ok(RepoInfo {
        platform: Platform::GitHub,
        host: if host.is_empty() { "github.com".to_string() } else { host.to_string() },
        url: url.to_string(),
        owner: Some(segments[0].to_string()),
        repo: segments[segments.len() - 1].to_string(),
        organization: None,
        project: None,
        namespace: None,
    })
}

fn parse_gitlab(url: &str, host: &str) -> Result<RepoInfo, DetectError> {
    let path = repo_path(url)?;
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 2 {
        return Err(DetectError::UnparseableUrl(url.to_string()));
    }
    let repo = segments[segments.len() - 1].to_string();
    let namespace = segments[..segments.len() - 1].join("/");
    Ok(RepoInfo {
        platform: Platform::GitLab,
        host: host.to_string(),
        url: url.to_string(),
        owner: None,
        repo,
        organization: None,
        project: None,
        namespace: Some(namespace),
    })
}

/// Azure DevOps SSH: `git@ssh.dev.azure.com:v3/org/project/repo`.
/// Azure DevOps HTTPS: `https://dev.azure.com/org/project/_git/repo`.
/// Azure DevOps (visualstudio.com): `https://org.visualstudio.com/project/_git/repo`.
fn parse_azure(url: &str, host: &str) -> Result<RepoInfo, DetectError> {
    if url.starts_with("git@") {
        let path = repo_path(url)?;
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() >= 4 && segments[0] == "v3" {
            return Ok(RepoInfo {
                platform: Platform::AzureDevOps,
                host: host.to_string(),
                url: url.to_string(),
                owner: None,
                repo: segments[3].to_string(),
                organization: Some(segments[1].to_string()),
                project: Some(segments[2].to_string()),
                namespace: None,
            });
        }
        return Err(DetectError::UnparseableUrl(url.to_string()));
    }

    if url.contains("visualstudio.com") {
        let org = host.split('.').next().unwrap_or_default().to_string();
        let path = repo_path(url)?;
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() >= 3 && segments[1] == "_git" {
            return Ok(RepoInfo {
                platform: Platform::AzureDevOps,
                host: host.to_string(),
                url: url.to_string(),
                owner: None,
                repo: segments[2].to_string(),
                organization: Some(org),
                project: Some(segments[0].to_string()),
                namespace: None,
            });
        }
        return Err(DetectError::UnparseableUrl(url.to_string()));
    }

    // dev.azure.com HTTPS
    let path = repo_path(url)?;
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() >= 4 && segments[2] == "_git" {
        return Ok(RepoInfo {
            platform: Platform::AzureDevOps,
            host: host.to_string(),
            url: url.to_string(),
            owner: None,
            repo: segments[3].to_string(),
            organization: Some(segments[0].to_string()),
            project: Some(segments[1].to_string()),
            namespace: None,
        });
    }
    Err(DetectError::UnparseableUrl(url.to_string()))
}
