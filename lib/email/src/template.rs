//! Placeholder substitution for email templates.
//!
//! Templates address fields on the target document with `{{ path }}`
//! placeholders, where `path` is a dotted path (`customer.firstName`).
//! Unresolvable placeholders render as empty strings, matching how
//! authored templates degrade when a record is missing a field; the
//! renderer reports them so callers can log the misses.

use amber_relay_core::json::{lookup_path, value_to_display_string};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_][A-Za-z0-9_.]*)\s*\}\}").expect("placeholder regex is valid")
});

/// The result of rendering a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate {
    /// The rendered text.
    pub text: String,
    /// Placeholder paths that did not resolve on the target.
    pub missing_paths: Vec<String>,
}

impl RenderedTemplate {
    /// Returns true if every placeholder resolved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_paths.is_empty()
    }
}

/// Renders a template against a target document.
#[must_use]
pub fn render(template: &str, target: &JsonValue) -> RenderedTemplate {
    let mut missing_paths = Vec::new();

    let text = PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let path = &caps[1];
            match lookup_path(target, path) {
                Some(value) if !value.is_null() => value_to_display_string(value),
                _ => {
                    missing_paths.push(path.to_string());
                    String::new()
                }
            }
        })
        .into_owned();

    RenderedTemplate {
        text,
        missing_paths,
    }
}
