//! End-to-end coverage of the literal seed scenarios: spec text in, bytes
//! and plans out, with no network or git operations involved.

use std::collections::HashMap;

use tempfile::TempDir;
use xfg::config::normalize::normalize;
use xfg::config::template::{RepoIdentity, TemplateContext};
use xfg::config::{ConfigError, MergeMode};
use xfg::manifest::Manifest;
use xfg::render::render_file;

fn env() -> HashMap<String, String> {
    HashMap::new()
}

/// S1: multi-file, two repos, no overrides. Every repo gets both files.
#[test]
fn s1_multi_file_two_repos() {
    let dir = TempDir::new().unwrap();
    let yaml = r#"
id: config
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
    let plan = normalize(yaml, dir.path(), &env()).unwrap();
    assert_eq!(plan.repos.len(), 2);
    for repo in &plan.repos {
        assert_eq!(repo.files.len(), 2);
        let prettier = render_file(".prettierrc.json", repo.files.get(".prettierrc.json").unwrap(), None).unwrap();
        assert_eq!(String::from_utf8(prettier).unwrap(), "{\n  \"semi\": false\n}\n");
    }
}

/// S2: file-level `mergeStrategy: append` joins base and overlay arrays.
#[test]
fn s2_append_strategy_joins_arrays() {
    let dir = TempDir::new().unwrap();
    let yaml = r#"
id: config
files:
  .eslintrc.json:
    content:
      extends: ["@company/base"]
repos:
  - git: git@github.com:org/a.git
    files:
      .eslintrc.json:
        content:
          extends: ["plugin:react/recommended"]
        mergeStrategy: append
"#;
    let plan = normalize(yaml, dir.path(), &env()).unwrap();
    let file = plan.repos[0].files.get(".eslintrc.json").unwrap();
    let bytes = render_file(".eslintrc.json", file, None).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("@company/base"));
    assert!(text.contains("plugin:react/recommended"));
    let company_pos = text.find("@company/base").unwrap();
    let plugin_pos = text.find("plugin:react/recommended").unwrap();
    assert!(company_pos < plugin_pos, "append must keep base before overlay");
}

/// S3: inline `$arrayMerge: prepend` puts overlay values first.
#[test]
fn s3_inline_array_merge_prepend() {
    let dir = TempDir::new().unwrap();
    let yaml = r#"
id: config
files:
  features.json:
    content:
      features: ["core"]
repos:
  - git: git@github.com:org/a.git
    files:
      features.json:
        content:
          features:
            $arrayMerge: prepend
            values: ["custom"]
"#;
    let plan = normalize(yaml, dir.path(), &env()).unwrap();
    let file = plan.repos[0].files.get("features.json").unwrap();
    let bytes = render_file("features.json", file, None).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    let custom_pos = text.find("custom").unwrap();
    let core_pos = text.find("core").unwrap();
    assert!(custom_pos < core_pos, "prepend must put overlay values first");
}

/// S5: `${xfg:repo.name}` expands to the repo's short name.
#[test]
fn s5_template_expands_repo_name() {
    let dir = TempDir::new().unwrap();
    let yaml = r#"
id: config
files:
  README.md:
    content: "# ${xfg:repo.name}"
    template: true
repos:
  - git: git@github.com:acme/foo.git
"#;
    let plan = normalize(yaml, dir.path(), &env()).unwrap();
    let file = plan.repos[0].files.get("README.md").unwrap();
    let identity = RepoIdentity {
        name: "foo".to_string(),
        owner: "acme".to_string(),
        full_name: "acme/foo".to_string(),
        url: "git@github.com:acme/foo.git".to_string(),
        platform: "github".to_string(),
        host: "github.com".to_string(),
    };
    let empty_vars = HashMap::new();
    let ctx = TemplateContext {
        repo: &identity,
        file_name: "README.md",
        repo_vars: &empty_vars,
        file_vars: &file.vars,
        run_date: "2026-07-27",
    };
    let bytes = render_file("README.md", file, Some(&ctx)).unwrap();
    assert_eq!(String::from_utf8(bytes).unwrap(), "# foo\n");
}

/// S7: a missing required env var aborts normalization before any repo is
/// touched; no `NormalizedSpec` is ever produced.
#[test]
fn s7_env_strict_missing_required_var_aborts() {
    let dir = TempDir::new().unwrap();
    let yaml = r#"
id: config
files:
  secret.txt:
    content: "${DB_PASSWORD:?Database password required}"
repos:
  - git: git@github.com:org/a.git
"#;
    let err = normalize(yaml, dir.path(), &env()).unwrap_err();
    assert!(matches!(err, ConfigError::RequiredEnv { name, .. } if name == "DB_PASSWORD"));
}

/// Property 10 / S6's companion: the force+bypassReason precondition is a
/// normalization-time failure, so it never reaches the reconcile stage.
#[test]
fn azure_force_without_bypass_reason_fails_before_any_repo_is_touched() {
    let dir = TempDir::new().unwrap();
    let yaml = r#"
id: config
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

/// Manifest round-trip (property 7): writing then reading back a manifest
/// yields the same tracked path set for the config that wrote it.
#[test]
fn manifest_round_trip_preserves_tracked_paths() {
    let dir = TempDir::new().unwrap();
    let paths = vec!["a.json".to_string(), "nested/b.yaml".to_string()];

    let mut manifest = Manifest::load(dir.path(), "config").unwrap();
    manifest.update("config", paths.clone());
    manifest.save().unwrap();

    let reloaded = Manifest::load(dir.path(), "config").unwrap();
    let orphans = reloaded.compute_orphans("config", &paths, dir.path());
    assert!(orphans.is_empty(), "nothing orphaned when the tracked set is unchanged");
}

/// Orphan property (property 9): shrinking a config's tracked set surfaces
/// exactly the dropped paths as orphans.
#[test]
fn manifest_orphan_detection_is_exact() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.json"), "{}").unwrap();
    std::fs::write(dir.path().join("b.json"), "{}").unwrap();

    let mut manifest = Manifest::load(dir.path(), "config").unwrap();
    manifest.update("config", vec!["a.json".to_string(), "b.json".to_string()]);
    manifest.save().unwrap();

    let reloaded = Manifest::load(dir.path(), "config").unwrap();
    let orphans = reloaded.compute_orphans("config", &["a.json".to_string()], dir.path());
    assert_eq!(orphans, vec!["b.json".to_string()]);
}

/// Merge identity (property 3): an empty per-repo override leaves the base
/// plan's merge mode/content untouched.
#[test]
fn merge_identity_empty_override_keeps_base() {
    let dir = TempDir::new().unwrap();
    let yaml = r#"
id: config
files:
  a.json:
    content:
      key: "value"
repos:
  - git: git@github.com:org/a.git
"#;
    let plan = normalize(yaml, dir.path(), &env()).unwrap();
    assert_eq!(plan.repos[0].pr_options.merge, MergeMode::Auto);
    let bytes = render_file("a.json", plan.repos[0].files.get("a.json").unwrap(), None).unwrap();
    assert_eq!(String::from_utf8(bytes).unwrap(), "{\n  \"key\": \"value\"\n}\n");
}
