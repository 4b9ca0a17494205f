//! Config Normalizer (spec.md §4.5).
//!
//! Drives the full pipeline from raw YAML text to a [`NormalizedSpec`]:
//! parse, resolve file references, validate, expand multi-URL repos,
//! resolve the three-level inheritance, and environment-interpolate.

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;

use super::merge::{merge_content, ContentValue};
use super::{
    env, fileref, ConfigError, ExpandedRepoSpec, FileSpec, GitUrls, MergeStrategy, PrOptions, RepoFileEntry,
    RepoFileOverride, Spec,
};

/// One target file fully resolved for one repo: merged content and the
/// effective rendering flags.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub content: Option<ContentValue>,
    pub merge_strategy: MergeStrategy,
    pub create_only: bool,
    pub executable: bool,
    pub header: Option<ContentValue>,
    pub schema_url: Option<String>,
    pub template: bool,
    pub vars: HashMap<String, String>,
    pub delete_orphaned: bool,
}

/// The fully resolved plan for one expanded repo entry.
#[derive(Debug, Clone)]
pub struct RepoPlan {
    pub git_url: String,
    pub files: IndexMap<String, ResolvedFile>,
    pub pr_options: PrOptions,
}

/// Output of the Config Normalizer: everything the Reconciler needs except
/// the per-repo `RepoInfo` (resolved later by the Forge Detector) and the
/// template/render pass (which needs that `RepoInfo`).
#[derive(Debug, Clone)]
pub struct NormalizedSpec {
    pub id: String,
    pub repos: Vec<RepoPlan>,
    pub pr_template: Option<String>,
    pub github_hosts: Vec<String>,
}

const ID_CHARS: fn(char) -> bool = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';

pub fn normalize(raw: &str, config_dir: &Path, runtime_env: &HashMap<String, String>) -> Result<NormalizedSpec, ConfigError> {
    // 1. Parse YAML.
    let mut spec: Spec = serde_yaml::from_str(raw)?;

    // 2. Resolve file refs (before validation, per spec.md §4.5).
    resolve_file_refs(&mut spec, config_dir)?;

    // 3. Validate.
    validate(&spec)?;

    // 4. Expand git arrays.
    let expanded = expand_git_arrays(&spec);

    // 5. Inheritance resolve.
    let mut repos = Vec::with_capacity(expanded.len());
    for repo in &expanded {
        repos.push(resolve_repo(&spec, repo)?);
    }

    // 6. Env-interpolate every string leaf.
    let env_vars: HashMap<String, String> = std::env::vars().chain(runtime_env.clone()).collect();
    for repo in &mut repos {
        repo.git_url = env::interpolate_str(&repo.git_url, &env_vars, true)?;
        for file in repo.files.values_mut() {
            if let Some(content) = file.content.take() {
                file.content = Some(interpolate_content(content, &env_vars)?);
            }
            if let Some(header) = file.header.take() {
                file.header = Some(interpolate_content(header, &env_vars)?);
            }
            for v in file.vars.values_mut() {
                *v = env::interpolate_str(v, &env_vars, true)?;
            }
        }
    }

    // Azure DevOps force-bypass precondition (spec.md §8 property 10): must
    // fail normalization, not surface as a runtime push/PR error. Platform
    // classification from a git URL is pure string parsing, so it's safe to
    // run here, after inheritance and env interpolation have settled each
    // repo's final git_url and effective pr_options.
    for repo in &repos {
        if repo.pr_options.merge != super::MergeMode::Force || repo.pr_options.bypass_reason.is_some() {
            continue;
        }
        if let Ok(info) = crate::forge::detect::detect_repo_info(&repo.git_url, &spec.github_hosts) {
            if info.platform == crate::forge::detect::Platform::AzureDevOps {
                return Err(ConfigError::MissingBypassReason {
                    git_url: repo.git_url.clone(),
                });
            }
        }
    }

    Ok(NormalizedSpec {
        id: spec.id.clone(),
        repos,
        pr_template: spec.pr_template.clone(),
        github_hosts: spec.github_hosts.clone(),
    })
}

fn interpolate_content(value: ContentValue, env_vars: &HashMap<String, String>) -> Result<ContentValue, ConfigError> {
    Ok(match value {
        ContentValue::String(s) => ContentValue::String(env::interpolate_str(&s, env_vars, true)?),
        ContentValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(interpolate_content(item, env_vars)?);
            }
            ContentValue::Array(out)
        }
        ContentValue::Object(map) => {
            let mut out = IndexMap::new();
            for (k, v) in map {
                out.insert(k, interpolate_content(v, env_vars)?);
            }
            ContentValue::Object(out)
        }
        other => other,
    })
}

fn resolve_file_refs(spec: &mut Spec, config_dir: &Path) -> Result<(), ConfigError> {
    for file in spec.files.values_mut() {
        resolve_content_ref(&mut file.content, config_dir)?;
        resolve_content_ref(&mut file.header, config_dir)?;
    }
    for repo in &mut spec.repos {
        for entry in repo.files.values_mut() {
            if let RepoFileEntry::Override(o) = entry {
                resolve_content_ref(&mut o.content, config_dir)?;
                resolve_content_ref(&mut o.header, config_dir)?;
            }
        }
    }
    Ok(())
}

fn resolve_content_ref(content: &mut Option<ContentValue>, config_dir: &Path) -> Result<(), ConfigError> {
    if let Some(ContentValue::String(s)) = content {
        if fileref::is_ref(s) {
            *content = Some(fileref::resolve_ref(s, config_dir)?);
        }
    }
    Ok(())
}

fn validate(spec: &Spec) -> Result<(), ConfigError> {
    if spec.id.is_empty() || !spec.id.chars().all(ID_CHARS) {
        return Err(ConfigError::SchemaViolation(format!(
            "id must be a non-empty token of [A-Za-z0-9_-], got '{}'",
            spec.id
        )));
    }
    if spec.files.is_empty() {
        return Err(ConfigError::SchemaViolation("files must be nonempty".to_string()));
    }
    if spec.repos.is_empty() {
        return Err(ConfigError::SchemaViolation("repos must be nonempty".to_string()));
    }

    for (path, file) in &spec.files {
        validate_path(path)?;
        validate_content_shape(path, file.content.as_ref())?;
    }

    for repo in &spec.repos {
        for (path, entry) in &repo.files {
            validate_path(path)?;
            if let RepoFileEntry::Override(o) = entry {
                validate_content_shape(path, o.content.as_ref())?;
            }
        }
    }

    Ok(())
}

fn validate_path(path: &str) -> Result<(), ConfigError> {
    if fileref::path_escapes_boundary(path) || path.starts_with('/') {
        return Err(ConfigError::PathEscape(path.to_string()));
    }
    Ok(())
}

fn validate_content_shape(path: &str, content: Option<&ContentValue>) -> Result<(), ConfigError> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    let structured_ext = matches!(ext.as_str(), "json" | "json5" | "yaml" | "yml");

    match content {
        None => Ok(()),
        Some(ContentValue::Object(_)) if structured_ext => Ok(()),
        Some(ContentValue::Object(_)) => Err(ConfigError::ContentTypeMismatch {
            path: path.to_string(),
            reason: "object content requires a .json/.json5/.yaml/.yml extension".to_string(),
        }),
        Some(ContentValue::String(_)) if !structured_ext => Ok(()),
        Some(ContentValue::Array(items)) if !structured_ext && items.iter().all(|i| matches!(i, ContentValue::String(_))) => {
            Ok(())
        }
        Some(_) if structured_ext => Err(ConfigError::ContentTypeMismatch {
            path: path.to_string(),
            reason: "structured extensions require object content".to_string(),
        }),
        Some(_) => Err(ConfigError::ContentTypeMismatch {
            path: path.to_string(),
            reason: "text extensions require string or string-sequence content".to_string(),
        }),
    }
}

fn expand_git_arrays(spec: &Spec) -> Vec<ExpandedRepoSpec> {
    let mut out = Vec::new();
    for repo in &spec.repos {
        let urls: Vec<String> = match &repo.git {
            Some(GitUrls::One(u)) => vec![u.clone()],
            Some(GitUrls::Many(us)) => us.clone(),
            None => Vec::new(),
        };
        for url in urls {
            out.push(ExpandedRepoSpec {
                git_url: url,
                files: repo.files.clone(),
                pr_options: repo.pr_options.clone(),
            });
        }
    }
    out
}

fn resolve_repo(spec: &Spec, repo: &ExpandedRepoSpec) -> Result<RepoPlan, ConfigError> {
    let mut files = IndexMap::new();

    for (path, base) in &spec.files {
        let entry = repo.files.get(path);
        match entry {
            Some(RepoFileEntry::Exclude) => continue,
            Some(RepoFileEntry::Override(o)) => {
                files.insert(path.clone(), resolve_file(base, Some(o))?);
            }
            None => {
                files.insert(path.clone(), resolve_file(base, None)?);
            }
        }
    }

    Ok(RepoPlan {
        git_url: repo.git_url.clone(),
        files,
        pr_options: repo.pr_options.clone().unwrap_or_else(|| spec.pr_options.clone()),
    })
}

fn resolve_file(base: &FileSpec, overlay: Option<&RepoFileOverride>) -> Result<ResolvedFile, ConfigError> {
    let overlay = match overlay {
        None => {
            return Ok(ResolvedFile {
                content: base.content.clone(),
                merge_strategy: base.merge_strategy,
                create_only: base.create_only,
                executable: base.executable.unwrap_or(false),
                header: base.header.clone(),
                schema_url: base.schema_url.clone(),
                template: base.template,
                vars: base.vars.clone(),
                delete_orphaned: base.delete_orphaned,
            });
        }
        Some(o) => o,
    };

    let content = if overlay.override_content {
        overlay.content.clone().or_else(|| base.content.clone())
    } else {
        merge_content(&base.content, &overlay.content, overlay.merge_strategy.unwrap_or(base.merge_strategy))?
    };

    Ok(ResolvedFile {
        content,
        merge_strategy: overlay.merge_strategy.unwrap_or(base.merge_strategy),
        create_only: overlay.create_only.unwrap_or(base.create_only),
        executable: overlay.executable.or(base.executable).unwrap_or(false),
        header: overlay.header.clone().or_else(|| base.header.clone()),
        schema_url: overlay.schema_url.clone().or_else(|| base.schema_url.clone()),
        template: overlay.template.unwrap_or(base.template),
        vars: {
            let mut v = base.vars.clone();
            if let Some(ov) = &overlay.vars {
                v.extend(ov.clone());
            }
            v
        },
        delete_orphaned: overlay.delete_orphaned.unwrap_or(base.delete_orphaned),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn normalizes_minimal_two_repo_spec() {
        let dir = TempDir::new().unwrap();
        let yaml = r#"
id: s1
files:
  .prettierrc.json:
    content:
      semi: false
  .gitignore:
    content: ["node_modules", "dist"]
repos:
  - git:
      - git@github.com:org/a.git
      - git@github.com:org/b.git
"#;
        let normalized = normalize(yaml, dir.path(), &env()).unwrap();
        assert_eq!(normalized.repos.len(), 2);
        assert_eq!(normalized.repos[0].files.len(), 2);
        assert!(normalized.repos[0].files.contains_key(".prettierrc.json"));
    }

    #[test]
    fn rejects_empty_id() {
        let dir = TempDir::new().unwrap();
        let yaml = r#"
id: ""
files:
  a.txt:
    content: "x"
repos:
  - git: git@github.com:org/a.git
"#;
        let err = normalize(yaml, dir.path(), &env()).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaViolation(_)));
    }

    #[test]
    fn env_strict_missing_required_aborts_before_repos_touched() {
        let dir = TempDir::new().unwrap();
        let yaml = r#"
id: s7
files:
  secret.txt:
    content: "${DB_PASSWORD:?Database password required}"
repos:
  - git: git@github.com:org/a.git
"#;
        let err = normalize(yaml, dir.path(), &env()).unwrap_err();
        match err {
            ConfigError::RequiredEnv { name, .. } => assert_eq!(name, "DB_PASSWORD"),
            other => panic!("wrong error: {other:?}"),
        }
    }

    #[test]
    fn per_repo_exclude_removes_file() {
        let dir = TempDir::new().unwrap();
        let yaml = r#"
id: s1
files:
  a.txt:
    content: "x"
  b.txt:
    content: "y"
repos:
  - git: git@github.com:org/a.git
    files:
      b.txt: false
"#;
        let normalized = normalize(yaml, dir.path(), &env()).unwrap();
        assert_eq!(normalized.repos[0].files.len(), 1);
        assert!(normalized.repos[0].files.contains_key("a.txt"));
    }

    #[test]
    fn azure_force_merge_without_bypass_reason_fails_normalization() {
        let dir = TempDir::new().unwrap();
        let yaml = r#"
id: s1
files:
  a.txt:
    content: "x"
repos:
  - git: git@ssh.dev.azure.com:v3/org/project/repo
prOptions:
  merge: force
"#;
        let err = normalize(yaml, dir.path(), &env()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBypassReason { .. }));
    }

    #[test]
    fn azure_force_merge_with_bypass_reason_normalizes() {
        let dir = TempDir::new().unwrap();
        let yaml = r#"
id: s1
files:
  a.txt:
    content: "x"
repos:
  - git: git@ssh.dev.azure.com:v3/org/project/repo
prOptions:
  merge: force
  bypassReason: "hotfix"
"#;
        assert!(normalize(yaml, dir.path(), &env()).is_ok());
    }
}
