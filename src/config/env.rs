//! Env Interpolator (spec.md §4.1).
//!
//! Walks every string leaf of the parsed spec substituting `${VAR}`,
//! `${VAR:-default}`, and `${VAR:?msg}`, honoring `$$` as an escape for a
//! literal `$`.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

use super::ConfigError;

static ESCAPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\$\{([^}]*)\}").expect("escape regex must compile")
});

static VAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*)|:\?([^}]*))?\}")
        .expect("var regex must compile")
});

/// Interpolate every string leaf of a `serde_yaml::Value` tree in place.
///
/// `strict` mirrors the default "strict mode" in spec.md §4.1: an unadorned
/// `${NAME}` missing from `env` fails the whole load; in non-strict mode the
/// placeholder is left untouched.
pub fn interpolate_value(value: &mut Value, env: &HashMap<String, String>, strict: bool) -> Result<(), ConfigError> {
    match value {
        Value::String(s) => {
            *s = interpolate_str(s, env, strict)?;
        }
        Value::Sequence(seq) => {
            for item in seq {
                interpolate_value(item, env, strict)?;
            }
        }
        Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                interpolate_value(v, env, strict)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Interpolate a single string, per spec.md §4.1's two-pass rule: escape
/// sequences first, then variable substitution.
pub fn interpolate_str(input: &str, env: &HashMap<String, String>, strict: bool) -> Result<String, ConfigError> {
    // Pass 1: `$${NAME}` → literal `${NAME}` (one `$` removed).
    let escaped = ESCAPE_RE.replace_all(input, "\u{0}{$1}");

    // Pass 2: real substitution over the remainder.
    let mut err: Option<ConfigError> = None;
    let substituted = VAR_RE.replace_all(&escaped, |caps: &regex::Captures| {
        if err.is_some() {
            return String::new();
        }
        let name = &caps[1];
        let default = caps.get(3).map(|m| m.as_str());
        let required_msg = caps.get(4).map(|m| m.as_str());

        match env.get(name) {
            Some(v) if !v.is_empty() => v.clone(),
            Some(_) | None => {
                if let Some(msg) = required_msg {
                    err = Some(ConfigError::RequiredEnv {
                        name: name.to_string(),
                        message: msg.to_string(),
                    });
                    String::new()
                } else if let Some(d) = default {
                    d.to_string()
                } else if strict {
                    err = Some(ConfigError::MissingEnv(name.to_string()));
                    String::new()
                } else {
                    caps[0].to_string()
                }
            }
        }
    });

    if let Some(e) = err {
        return Err(e);
    }

    // Restore the escaped literal marker left by pass 1.
    Ok(substituted.replace('\u{0}', "$"))
}
