//! Template Expander (spec.md §4.2).
//!
//! Expands `${xfg:<dotted>}` references inside a rendered file's content,
//! resolving against built-ins, per-repo `vars`, and file-level `vars`, in
//! that precedence order.

use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("unknown template variable: {0}")]
    UnknownVariable(String),
}

static XFG_VAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{xfg:([A-Za-z0-9_.]+)\}").expect("xfg var regex must compile")
});

/// Platform-neutral repo identity, enough to resolve every `repo.*`
/// built-in named in spec.md §4.2.
#[derive(Debug, Clone)]
pub struct RepoIdentity {
    pub name: String,
    pub owner: String,
    pub full_name: String,
    pub url: String,
    pub platform: String,
    pub host: String,
}

/// Per-run context for template expansion: the frozen run-start date plus
/// the current file/repo identity and their `vars` maps.
pub struct TemplateContext<'a> {
    pub repo: &'a RepoIdentity,
    pub file_name: &'a str,
    pub repo_vars: &'a HashMap<String, String>,
    pub file_vars: &'a HashMap<String, String>,
    /// ISO-8601 UTC day, frozen once per run (spec.md §4.2: "date is ISO-8601
    /// UTC day at run start, frozen for the whole run").
    pub run_date: &'a str,
}

/// Compute the frozen `date` built-in once, at run start.
pub fn run_date_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)[..10].to_string()
}

/// Expand every `${xfg:...}` reference in `text`.
pub fn expand(text: &str, ctx: &TemplateContext<'_>) -> Result<String, TemplateError> {
    let mut err: Option<TemplateError> = None;
    let out = XFG_VAR_RE.replace_all(text, |caps: &regex::Captures| {
        if err.is_some() {
            return String::new();
        }
        let key = &caps[1];
        match resolve(key, ctx) {
            Some(v) => v,
            None => {
                err = Some(TemplateError::UnknownVariable(key.to_string()));
                String::new()
            }
        }
    });
    if let Some(e) = err {
        return Err(e);
    }
    Ok(out.into_owned())
}

fn resolve(key: &str, ctx: &TemplateContext<'_>) -> Option<String> {
    match key {
        "repo.name" => Some(ctx.repo.name.clone()),
        "repo.owner" => Some(ctx.repo.owner.clone()),
        "repo.fullName" => Some(ctx.repo.full_name.clone()),
        "repo.url" => Some(ctx.repo.url.clone()),
        "repo.platform" => Some(ctx.repo.platform.clone()),
        "repo.host" => Some(ctx.repo.host.clone()),
        "file.name" => Some(ctx.file_name.to_string()),
        "date" => Some(ctx.run_date.to_string()),
        _ => ctx
            .repo_vars
            .get(key)
            .or_else(|| ctx.file_vars.get(key))
            .cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoIdentity {
        RepoIdentity {
            name: "foo".to_string(),
            owner: "acme".to_string(),
            full_name: "acme/foo".to_string(),
            url: "git@github.com:acme/foo.git".to_string(),
            platform: "github".to_string(),
            host: "github.com".to_string(),
        }
    }

    #[test]
    fn expands_repo_name_builtin() {
        let repo_vars = HashMap::new();
        let file_vars = HashMap::new();
        let repo = repo();
        let ctx = TemplateContext {
            repo: &repo,
            file_name: "README.md",
            repo_vars: &repo_vars,
            file_vars: &file_vars,
            run_date: "2026-07-27",
        };
        assert_eq!(expand("# ${xfg:repo.name}", &ctx).unwrap(), "# foo\n".trim_end());
        assert_eq!(expand("# ${xfg:repo.name}", &ctx).unwrap(), "# foo");
    }

    #[test]
    fn file_vars_override_precedence_falls_back_from_repo_vars() {
        let mut repo_vars = HashMap::new();
        repo_vars.insert("team".to_string(), "platform".to_string());
        let file_vars = HashMap::new();
        let repo = repo();
        let ctx = TemplateContext {
            repo: &repo,
            file_name: "README.md",
            repo_vars: &repo_vars,
            file_vars: &file_vars,
            run_date: "2026-07-27",
        };
        assert_eq!(expand("${xfg:team}", &ctx).unwrap(), "platform");
    }

    #[test]
    fn unknown_variable_errors() {
        let repo_vars = HashMap::new();
        let file_vars = HashMap::new();
        let repo = repo();
        let ctx = TemplateContext {
            repo: &repo,
            file_name: "README.md",
            repo_vars: &repo_vars,
            file_vars: &file_vars,
            run_date: "2026-07-27",
        };
        let err = expand("${xfg:nope}", &ctx).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownVariable(k) if k == "nope"));
    }
}
