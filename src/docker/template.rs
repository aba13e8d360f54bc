//! Mustache-style build-instruction templates.
//!
//! A template references other images as `{{ repo }}` (or the unescaped
//! `{{{ repo }}}` form), which renders to that image's resolved version.
//! `{{! ... }}` comments are dropped. Names that have no value are an error
//! rather than rendering as empty text.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unresolved placeholder(s): {}", .0.join(", "))]
    Unresolved(Vec<String>),
}

/// Renders a template file with dependency versions substituted in.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &Path, values: &BTreeMap<String, String>) -> Result<String, TemplateError>;
}

fn comment_pattern() -> &'static Regex {
    static COMMENT_RE: OnceLock<Regex> = OnceLock::new();
    COMMENT_RE.get_or_init(|| Regex::new(r"(?s)\{\{!.*?\}\}").expect("comment pattern is valid"))
}

fn variable_pattern() -> &'static Regex {
    static VAR_RE: OnceLock<Regex> = OnceLock::new();
    VAR_RE.get_or_init(|| {
        Regex::new(r"\{\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}\}|\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}")
            .expect("variable pattern is valid")
    })
}

fn variable_name<'t>(caps: &Captures<'t>) -> &'t str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or_default()
}

/// Placeholder names referenced by `template`, in first-use order.
pub fn variables(template: &str) -> Vec<String> {
    let stripped = comment_pattern().replace_all(template, "");
    let mut names: Vec<String> = Vec::new();
    for caps in variable_pattern().captures_iter(&stripped) {
        let name = variable_name(&caps);
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Substitute every placeholder in `template`.
pub fn render_str(template: &str, values: &BTreeMap<String, String>) -> Result<String, TemplateError> {
    let stripped = comment_pattern().replace_all(template, "");

    let mut unresolved: Vec<String> = Vec::new();
    let rendered = variable_pattern().replace_all(&stripped, |caps: &Captures| {
        let name = variable_name(caps);
        match values.get(name) {
            Some(value) => value.clone(),
            None => {
                if !unresolved.iter().any(|n| n == name) {
                    unresolved.push(name.to_string());
                }
                String::new()
            }
        }
    });

    if !unresolved.is_empty() {
        return Err(TemplateError::Unresolved(unresolved));
    }
    Ok(rendered.into_owned())
}

/// File-backed renderer for `Dockerfile.template` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct MustacheRenderer;

impl TemplateRenderer for MustacheRenderer {
    fn render(&self, template: &Path, values: &BTreeMap<String, String>) -> Result<String, TemplateError> {
        let content = std::fs::read_to_string(template).map_err(|source| TemplateError::Read {
            path: template.to_path_buf(),
            source,
        })?;
        render_str(&content, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_variables_in_first_use_order() {
        let template = "FROM acme/base:{{base}}\n\
                        COPY --from=acme/worker:{{ worker }} /bin /bin\n\
                        LABEL base={{{base}}}\n\
                        {{! {{ignored}} }}\n";
        assert_eq!(variables(template), vec!["base", "worker"]);
    }

    #[test]
    fn test_render_substitutes_versions() {
        let out = render_str(
            "FROM acme/base:{{ base }}\nRUN echo {{{worker}}}",
            &values(&[("base", "v003"), ("worker", "v010")]),
        )
        .unwrap();
        assert_eq!(out, "FROM acme/base:v003\nRUN echo v010");
    }

    #[test]
    fn test_unresolved_placeholders_are_errors() {
        let err = render_str(
            "FROM {{base}}\nCOPY --from={{tools}} /x /x\nCOPY --from={{tools}} /y /y",
            &values(&[("unrelated", "v001")]),
        )
        .unwrap_err();
        match err {
            TemplateError::Unresolved(names) => assert_eq!(names, vec!["base", "tools"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_shell_syntax_passes_through() {
        let out = render_str("RUN echo ${HOME} $PATH", &BTreeMap::new()).unwrap();
        assert_eq!(out, "RUN echo ${HOME} $PATH");
    }

    #[test]
    fn test_missing_template_file() {
        let err = MustacheRenderer
            .render(Path::new("/nonexistent/Dockerfile.template"), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, TemplateError::Read { .. }));
    }
}
