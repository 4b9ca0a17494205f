//! Deep Merger (spec.md §4.3).
//!
//! Pure, deterministic recursive merge over [`ContentValue`] trees. Objects
//! union their keys; arrays pick a strategy from the inline `$arrayMerge`
//! wrapper, a sibling `$arrayMerge` key, the file's `mergeStrategy`, or the
//! enclosing context default, in that order. All `$`-prefixed directive keys
//! are stripped from the final product.

use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{ConfigError, MergeStrategy};

/// A dynamic content value: object (with ordered keys), array, or scalar.
/// Covers both the "object" and the "string / string-sequence" content
/// shapes named in spec.md §3 — the latter are just `String`/`Array`
/// instances whose elements are themselves `String`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentValue {
    Object(IndexMap<String, ContentValue>),
    Array(Vec<ContentValue>),
    String(String),
    Bool(bool),
    Number(serde_json::Number),
    Null,
}

impl ContentValue {
    pub fn as_str(&self) -> String {
        match self {
            ContentValue::String(s) => s.clone(),
            ContentValue::Bool(b) => b.to_string(),
            ContentValue::Number(n) => n.to_string(),
            ContentValue::Null => String::new(),
            ContentValue::Array(_) | ContentValue::Object(_) => String::new(),
        }
    }

    fn is_text_like(&self) -> bool {
        match self {
            ContentValue::String(_) => true,
            ContentValue::Array(items) => items.iter().all(|i| matches!(i, ContentValue::String(_))),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct MergeContext {
    default_strategy: MergeStrategy,
}

/// Merge `base` and `overlay` optional content per the identity law
/// (`merge(base, ∅) = base`, `merge(∅, overlay) = overlay`), then strip all
/// `$`-prefixed directive keys from the result.
pub fn merge_content(
    base: &Option<ContentValue>,
    overlay: &Option<ContentValue>,
    file_strategy: MergeStrategy,
) -> Result<Option<ContentValue>, ConfigError> {
    let merged = match (base, overlay) {
        (None, None) => return Ok(None),
        (Some(b), None) => b.clone(),
        (None, Some(o)) => o.clone(),
        (Some(b), Some(o)) => {
            let ctx = MergeContext {
                default_strategy: file_strategy,
            };
            merge_value(b, o, &ctx)?
        }
    };
    Ok(Some(strip_directives(merged)))
}

fn merge_value(base: &ContentValue, overlay: &ContentValue, ctx: &MergeContext) -> Result<ContentValue, ConfigError> {
    match (base, overlay) {
        (ContentValue::Object(bm), ContentValue::Object(om)) => Ok(ContentValue::Object(merge_object(bm, om, ctx)?)),
        (ContentValue::Array(b), _) => merge_array(b, overlay, ctx),
        (_, _) if base.is_text_like() && overlay.is_text_like() => Ok(merge_text(base, overlay, ctx.default_strategy)),
        _ => Ok(overlay.clone()),
    }
}

fn merge_object(
    base: &IndexMap<String, ContentValue>,
    overlay: &IndexMap<String, ContentValue>,
    ctx: &MergeContext,
) -> Result<IndexMap<String, ContentValue>, ConfigError> {
    let sibling = overlay
        .get("$arrayMerge")
        .or_else(|| base.get("$arrayMerge"))
        .map(|v| MergeStrategy::from_str(&v.as_str()))
        .transpose()?;
    let local_ctx = MergeContext {
        default_strategy: sibling.unwrap_or(ctx.default_strategy),
    };

    let mut result: IndexMap<String, ContentValue> = IndexMap::new();
    for (k, bv) in base {
        let merged = match overlay.get(k) {
            Some(ov) => merge_value(bv, ov, &local_ctx)?,
            None => bv.clone(),
        };
        result.insert(k.clone(), merged);
    }
    for (k, ov) in overlay {
        if !result.contains_key(k) {
            result.insert(k.clone(), ov.clone());
        }
    }
    Ok(result)
}

/// Detect the inline wrapped form `{ $arrayMerge: s, values: [...] }`.
fn wrapped_array(v: &ContentValue) -> Option<(MergeStrategy, &Vec<ContentValue>)> {
    if let ContentValue::Object(m) = v {
        if let (Some(ContentValue::String(s)), Some(ContentValue::Array(values))) =
            (m.get("$arrayMerge"), m.get("values"))
        {
            if let Ok(strategy) = MergeStrategy::from_str(s) {
                return Some((strategy, values));
            }
        }
    }
    None
}

fn merge_array(base: &[ContentValue], overlay: &ContentValue, ctx: &MergeContext) -> Result<ContentValue, ConfigError> {
    let (explicit_strategy, overlay_values) = if let Some((s, vals)) = wrapped_array(overlay) {
        (Some(s), vals.clone())
    } else if let ContentValue::Array(vals) = overlay {
        (None, vals.clone())
    } else {
        // Shape clash (array replaced by a non-array, non-wrapped value): overlay wins outright.
        return Ok(overlay.clone());
    };

    let strategy = explicit_strategy.unwrap_or(ctx.default_strategy);
    let merged = match strategy {
        MergeStrategy::Replace => overlay_values,
        MergeStrategy::Append => base.iter().cloned().chain(overlay_values).collect(),
        MergeStrategy::Prepend => overlay_values.into_iter().chain(base.iter().cloned()).collect(),
    };
    Ok(ContentValue::Array(merged))
}

fn to_lines(v: &ContentValue) -> Vec<String> {
    match v {
        ContentValue::String(s) => s.split('\n').map(str::to_string).collect(),
        ContentValue::Array(items) => items.iter().map(ContentValue::as_str).collect(),
        other => vec![other.as_str()],
    }
}

fn merge_text(base: &ContentValue, overlay: &ContentValue, strategy: MergeStrategy) -> ContentValue {
    let base_is_seq = matches!(base, ContentValue::Array(_));
    let overlay_is_seq = matches!(overlay, ContentValue::Array(_));

    if !base_is_seq && !overlay_is_seq {
        let (b, o) = (base.as_str(), overlay.as_str());
        let combined = match strategy {
            MergeStrategy::Replace => o,
            MergeStrategy::Append => format!("{b}{o}"),
            MergeStrategy::Prepend => format!("{o}{b}"),
        };
        return ContentValue::String(combined);
    }

    let (b_lines, o_lines) = (to_lines(base), to_lines(overlay));
    let merged = match strategy {
        MergeStrategy::Replace => o_lines,
        MergeStrategy::Append => b_lines.into_iter().chain(o_lines).collect(),
        MergeStrategy::Prepend => o_lines.into_iter().chain(b_lines).collect(),
    };
    ContentValue::Array(merged.into_iter().map(ContentValue::String).collect())
}

/// Recursively strip every `$`-prefixed key, unwrapping any leftover inline
/// array-merge wrapper shape into its bare `values` array.
fn strip_directives(v: ContentValue) -> ContentValue {
    match v {
        ContentValue::Object(map) => {
            let had_directive = map.keys().any(|k| k.starts_with('$'));
            let mut filtered: IndexMap<String, ContentValue> = IndexMap::new();
            for (k, val) in map {
                if k.starts_with('$') {
                    continue;
                }
                filtered.insert(k, strip_directives(val));
            }
            if had_directive && filtered.len() == 1 {
                if let Some(ContentValue::Array(values)) = filtered.get("values") {
                    return ContentValue::Array(values.clone());
                }
            }
            ContentValue::Object(filtered)
        }
        ContentValue::Array(items) => ContentValue::Array(items.into_iter().map(strip_directives).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: Vec<(&str, ContentValue)>) -> ContentValue {
        ContentValue::Object(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn strs(items: &[&str]) -> ContentValue {
        ContentValue::Array(items.iter().map(|s| ContentValue::String(s.to_string())).collect())
    }

    #[test]
    fn merge_identity_base_only() {
        let base = Some(obj(vec![("a", ContentValue::Bool(true))]));
        assert_eq!(merge_content(&base, &None, MergeStrategy::Replace).unwrap(), base);
    }

    #[test]
    fn merge_identity_overlay_only() {
        let overlay = Some(obj(vec![("a", ContentValue::Bool(true))]));
        assert_eq!(merge_content(&None, &overlay, MergeStrategy::Replace).unwrap(), overlay);
    }

    #[test]
    fn array_append_strategy() {
        let base = Some(obj(vec![("extends", strs(&["a", "b"]))]));
        let overlay = Some(obj(vec![("extends", strs(&["c", "d"]))]));
        let merged = merge_content(&base, &overlay, MergeStrategy::Append).unwrap().unwrap();
        assert_eq!(merged, obj(vec![("extends", strs(&["a", "b", "c", "d"]))]));
    }

    #[test]
    fn array_prepend_strategy() {
        let base = Some(obj(vec![("extends", strs(&["a", "b"]))]));
        let overlay = Some(obj(vec![("extends", strs(&["c", "d"]))]));
        let merged = merge_content(&base, &overlay, MergeStrategy::Prepend).unwrap().unwrap();
        assert_eq!(merged, obj(vec![("extends", strs(&["c", "d", "a", "b"]))]));
    }

    #[test]
    fn array_replace_strategy() {
        let base = Some(obj(vec![("extends", strs(&["a", "b"]))]));
        let overlay = Some(obj(vec![("extends", strs(&["c", "d"]))]));
        let merged = merge_content(&base, &overlay, MergeStrategy::Replace).unwrap().unwrap();
        assert_eq!(merged, obj(vec![("extends", strs(&["c", "d"]))]));
    }

    #[test]
    fn inline_array_merge_directive_prepend() {
        let base = Some(obj(vec![("features", strs(&["core"]))]));
        let wrapped = obj(vec![(
            "$arrayMerge",
            ContentValue::String("prepend".to_string()),
        )]);
        let wrapped = if let ContentValue::Object(mut m) = wrapped {
            m.insert("values".to_string(), strs(&["custom"]));
            ContentValue::Object(m)
        } else {
            unreachable!()
        };
        let overlay = Some(obj(vec![("features", wrapped)]));
        let merged = merge_content(&base, &overlay, MergeStrategy::Replace).unwrap().unwrap();
        assert_eq!(merged, obj(vec![("features", strs(&["custom", "core"]))]));
    }

    #[test]
    fn directive_keys_are_stripped() {
        let base = Some(obj(vec![("a", ContentValue::Bool(true))]));
        let mut overlay_map = IndexMap::new();
        overlay_map.insert("a".to_string(), ContentValue::Bool(false));
        overlay_map.insert("$arrayMerge".to_string(), ContentValue::String("append".to_string()));
        let overlay = Some(ContentValue::Object(overlay_map));
        let merged = merge_content(&base, &overlay, MergeStrategy::Replace).unwrap().unwrap();
        if let ContentValue::Object(m) = &merged {
            assert!(!m.keys().any(|k| k.starts_with('$')));
        } else {
            panic!("expected object");
        }
    }

    #[test]
    fn whole_file_string_sequence_content_is_replace_by_default() {
        let base = Some(strs(&["node_modules", "dist"]));
        assert_eq!(merge_content(&base, &None, MergeStrategy::Replace).unwrap(), base);
    }
}
