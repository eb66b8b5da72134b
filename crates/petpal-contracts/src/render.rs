//! Template Renderer
//!
//! Substitutes `{TOKEN}` placeholders in an HTML body with values from a
//! [`TokenTable`]. Substitution is a single pass over the body:
//! - table keys are regex-escaped and tried longest first, so `{NOME}` never
//!   eats the prefix of `{NOME_COMPLETO}`
//! - every occurrence is replaced, not only the first
//! - substituted values are never re-scanned, so a value that happens to look
//!   like a token stays literal
//! - anything brace-shaped left over, and any `Missing` value, becomes a
//!   visible marker

use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::resolution::{TokenTable, TokenValue};

/// Any `{NAME}`-shaped placeholder.
const TOKEN_PATTERN: &str = r"\{[A-Za-z0-9_.\-]+\}";

/// CSS class on the marker that replaces unresolved tokens.
pub const MISSING_CLASS: &str = "token-missing";

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TOKEN_PATTERN).expect("token pattern is valid"))
}

/// How resolved values are written into the HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// HTML-escape every value
    #[default]
    Escaped,
    /// Insert values verbatim; only for values the caller already trusts
    Raw,
}

pub struct TemplateRenderer;

impl TemplateRenderer {
    pub fn render(body: &str, table: &TokenTable) -> String {
        Self::render_with(body, table, RenderMode::Escaped)
    }

    pub fn render_with(body: &str, table: &TokenTable, mode: RenderMode) -> String {
        let pattern = Self::substitution_pattern(table);
        pattern
            .replace_all(body, |caps: &Captures<'_>| {
                let token = &caps[0];
                match table.get(token) {
                    Some(TokenValue::Resolved(value)) if !value.trim().is_empty() => match mode {
                        RenderMode::Escaped => escape_html(value),
                        RenderMode::Raw => value.clone(),
                    },
                    Some(_) | None => missing_marker(token),
                }
            })
            .into_owned()
    }

    /// Distinct `{TOKEN}` placeholders in order of first appearance.
    pub fn referenced_tokens(body: &str) -> Vec<String> {
        let mut seen = Vec::new();
        for m in token_regex().find_iter(body) {
            let token = m.as_str();
            if !seen.iter().any(|t: &String| t == token) {
                seen.push(token.to_string());
            }
        }
        seen
    }

    fn substitution_pattern(table: &TokenTable) -> Regex {
        let mut keys: Vec<&str> = table
            .iter()
            .map(|(k, _)| k.as_str())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return token_regex().clone();
        }
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let mut alternatives: Vec<String> = keys.into_iter().map(regex::escape).collect();
        alternatives.push(TOKEN_PATTERN.to_string());

        match Regex::new(&alternatives.join("|")) {
            Ok(re) => re,
            Err(e) => {
                // Only reachable past the regex size limit; brace-shaped keys still match
                tracing::warn!("token table too large for a single pattern: {e}");
                token_regex().clone()
            }
        }
    }
}

/// Visible stand-in for a token that could not be resolved.
pub fn missing_marker(token: &str) -> String {
    let name = token.trim_start_matches('{').trim_end_matches('}');
    format!(
        "<span class=\"{MISSING_CLASS}\">MISSING: {}</span>",
        escape_html(name)
    )
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
