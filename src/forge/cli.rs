//! Shared subprocess-execution helper for the CLI-backed forge drivers.
//!
//! Every driver shells out to a platform CLI (`gh`, `az`, `glab`) rather
//! than calling its HTTP API directly, following the teacher's
//! `GitHubAdapter::get_token`'s own fallback to `gh auth token`. Arguments
//! are always passed as an argv vector, never concatenated into a shell
//! string.

use std::path::Path;

use crate::util::retry::{retry_with_backoff_if, RetryOptions};

use super::ForgeError;

pub(crate) async fn ensure_binary(binary: &'static str) -> Result<(), ForgeError> {
    which::which(binary).map(|_| ()).map_err(|e| ForgeError::MissingBinary { binary, source: e })
}

/// Classify a failed CLI invocation's stderr into a typed error kind
/// (spec.md §7). `gh`/`az`/`glab` only ever surface plain text, not
/// structured error codes, so this pattern-matches the same way
/// `util::retry::is_retryable_error` does for git.
fn classify(binary: &'static str, status: i32, stderr: String) -> ForgeError {
    let lower = stderr.to_lowercase();
    if lower.contains("auto-merge") && (lower.contains("not allow") || lower.contains("disabled") || lower.contains("not enabled")) {
        return ForgeError::AutoMergeDisabled;
    }
    if lower.contains("authentication") || lower.contains("not logged in") || lower.contains("bad credentials") || lower.contains("401") {
        return ForgeError::AuthFailed { binary, stderr };
    }
    if lower.contains("permission") || lower.contains("forbidden") || lower.contains("403") {
        return ForgeError::PermissionDenied { binary, stderr };
    }
    if lower.contains("not found") || lower.contains("404") || lower.contains("could not resolve") {
        return ForgeError::NotFound { binary, stderr };
    }
    if crate::util::retry::is_retryable_error(&stderr) {
        return ForgeError::Transient { binary, stderr };
    }
    ForgeError::CommandFailed { binary, status, stderr }
}

/// Run `binary` with `args`, optionally in `cwd`, retrying transient
/// failures with backoff up to `retries` attempts. Returns trimmed stdout on
/// success.
pub(crate) async fn run(binary: &'static str, args: &[String], cwd: Option<&Path>, retries: u32) -> Result<String, ForgeError> {
    ensure_binary(binary).await?;

    let opts = RetryOptions {
        max_retries: retries,
        ..Default::default()
    };
    retry_with_backoff_if(
        &opts,
        || async {
            let mut cmd = tokio::process::Command::new(binary);
            cmd.args(args);
            if let Some(dir) = cwd {
                cmd.current_dir(dir);
            }
            crate::util::cmd::log_cmd(cmd.as_std());

            let output = cmd.output().await.map_err(|e| ForgeError::Spawn { binary, source: e })?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let status = output.status.code().unwrap_or(-1);
                return Err(classify(binary, status, stderr));
            }
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        },
        ForgeError::is_transient,
    )
    .await
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(binary: &'static str, stdout: &str) -> Result<T, ForgeError> {
    serde_json::from_str(stdout).map_err(|e| ForgeError::Parse {
        binary,
        reason: e.to_string(),
    })
}
