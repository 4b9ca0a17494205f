//! Renderer (spec.md §4.6).
//!
//! Turns a merged [`ContentValue`] plus a file's rendering flags into the
//! exact on-disk bytes for its target path: canonical JSON for
//! `.json`/`.json5`, a header-prefixed YAML document for `.yaml`/`.yml`, and
//! raw text (newline-joined if the content is a sequence) for anything
//! else.

use std::path::Path;

use thiserror::Error;

use crate::config::template::{self, TemplateContext, TemplateError};
use crate::config::ContentValue;
use crate::config::normalize::ResolvedFile;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("failed to serialize YAML output: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
    Text,
}

fn format_for(path: &str) -> Format {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "json" | "json5" => Format::Json,
        "yaml" | "yml" => Format::Yaml,
        _ => Format::Text,
    }
}

/// Render one resolved file to its final on-disk bytes.
///
/// `template_ctx` is `None` when `file.template` is false; the caller is
/// expected to have already built it from the repo's [`RepoIdentity`] when
/// needed.
pub fn render_file(
    path: &str,
    file: &ResolvedFile,
    template_ctx: Option<&TemplateContext<'_>>,
) -> Result<Vec<u8>, RenderError> {
    let format = format_for(path);

    let content = match (&file.content, file.template, template_ctx) {
        (Some(c), true, Some(ctx)) => Some(expand_template_in_content(c, ctx)?),
        (c, _, _) => c.clone(),
    };

    let body = match format {
        Format::Json => render_json(content.as_ref()),
        Format::Yaml => render_yaml(content.as_ref(), file)?,
        Format::Text => render_text(content.as_ref()),
    };

    Ok(body.into_bytes())
}

fn expand_template_in_content(value: &ContentValue, ctx: &TemplateContext<'_>) -> Result<ContentValue, TemplateError> {
    Ok(match value {
        ContentValue::String(s) => ContentValue::String(template::expand(s, ctx)?),
        ContentValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(expand_template_in_content(item, ctx)?);
            }
            ContentValue::Array(out)
        }
        ContentValue::Object(map) => {
            let mut out = indexmap::IndexMap::new();
            for (k, v) in map {
                out.insert(k.clone(), expand_template_in_content(v, ctx)?);
            }
            ContentValue::Object(out)
        }
        other => other.clone(),
    })
}

fn render_json(content: Option<&ContentValue>) -> String {
    match content {
        None => String::new(),
        Some(c) => {
            let mut out = String::new();
            write_json(c, 0, &mut out);
            out.push('\n');
            out
        }
    }
}

fn write_json(value: &ContentValue, indent: usize, out: &mut String) {
    match value {
        ContentValue::Null => out.push_str("null"),
        ContentValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        ContentValue::Number(n) => out.push_str(&n.to_string()),
        ContentValue::String(s) => out.push_str(&serde_json::to_string(s).expect("string always serializes")),
        ContentValue::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push_str("[\n");
            let child_indent = indent + 2;
            for (i, item) in items.iter().enumerate() {
                out.push_str(&" ".repeat(child_indent));
                write_json(item, child_indent, out);
                if i + 1 < items.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            out.push_str(&" ".repeat(indent));
            out.push(']');
        }
        ContentValue::Object(map) => {
            if map.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push_str("{\n");
            let child_indent = indent + 2;
            let len = map.len();
            for (i, (k, v)) in map.iter().enumerate() {
                out.push_str(&" ".repeat(child_indent));
                out.push_str(&serde_json::to_string(k).expect("string always serializes"));
                out.push_str(": ");
                write_json(v, child_indent, out);
                if i + 1 < len {
                    out.push(',');
                }
                out.push('\n');
            }
            out.push_str(&" ".repeat(indent));
            out.push('}');
        }
    }
}

fn render_yaml(content: Option<&ContentValue>, file: &ResolvedFile) -> Result<String, RenderError> {
    let mut out = String::new();

    if let Some(schema_url) = &file.schema_url {
        out.push_str(&format!("# yaml-language-server: $schema={schema_url}\n"));
    }
    for line in header_lines(file.header.as_ref()) {
        out.push_str(&format!("# {line}\n"));
    }
    if !out.is_empty() {
        out.push('\n');
    }

    if let Some(c) = content {
        let doc = serde_yaml::to_string(c)?;
        out.push_str(&doc);
    }

    Ok(out)
}

fn header_lines(header: Option<&ContentValue>) -> Vec<String> {
    match header {
        None => Vec::new(),
        Some(ContentValue::String(s)) => s.lines().map(str::to_string).collect(),
        Some(ContentValue::Array(items)) => items.iter().map(ContentValue::as_str).collect(),
        Some(other) => vec![other.as_str()],
    }
}

fn render_text(content: Option<&ContentValue>) -> String {
    match content {
        None => String::new(),
        Some(ContentValue::String(s)) => {
            if s.ends_with('\n') {
                s.clone()
            } else {
                format!("{s}\n")
            }
        }
        Some(ContentValue::Array(items)) => {
            let joined = items.iter().map(ContentValue::as_str).collect::<Vec<_>>().join("\n");
            format!("{joined}\n")
        }
        Some(other) => format!("{}\n", other.as_str()),
    }
}
