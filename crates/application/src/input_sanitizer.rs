use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tessera_core::{AppError, AppResult};

/// Longest filename the filename cleaner returns, in characters.
pub const MAX_FILENAME_LENGTH: usize = 255;

const ALLOWED_URL_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];

/// Cleaner selected by [`InputSanitizer::sanitize_input`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizeKind {
    /// Keeps benign markup, drops scripts and active content.
    Html,
    /// Plain text escaped for HTML output.
    Text,
    /// Link targets limited to safe schemes.
    Url,
    /// Single path component safe for a filesystem.
    Filename,
    /// String literal content for hand-built SQL.
    Database,
}

impl SanitizeKind {
    /// Returns a stable value for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Text => "text",
            Self::Url => "url",
            Self::Filename => "filename",
            Self::Database => "database",
        }
    }
}

impl FromStr for SanitizeKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "html" => Ok(Self::Html),
            "text" => Ok(Self::Text),
            "url" => Ok(Self::Url),
            "filename" => Ok(Self::Filename),
            "database" => Ok(Self::Database),
            _ => Err(AppError::Validation(format!(
                "unknown sanitize kind '{value}'"
            ))),
        }
    }
}

/// Regex-based input cleaners.
///
/// The cleaners are heuristic and meant as one layer among others; output
/// encoding at render time is still required.
#[derive(Debug, Clone)]
pub struct InputSanitizer {
    active_blocks: Regex,
    dangerous_tags: Regex,
    event_handlers: Regex,
    script_urls: Regex,
    any_tag: Regex,
}

impl InputSanitizer {
    /// Compiles the cleaner patterns.
    pub fn new() -> AppResult<Self> {
        Ok(Self {
            active_blocks: compile_pattern(
                r"(?is)<\s*(script|style|noscript|template)\b[^>]*>.*?<\s*/\s*(script|style|noscript|template)\s*>",
            )?,
            dangerous_tags: compile_pattern(
                r"(?i)<\s*/?\s*(script|style|iframe|frame|frameset|object|embed|applet|form|meta|link|base|svg|math)\b[^>]*>",
            )?,
            event_handlers: compile_pattern(
                r#"(?i)\s+on[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#,
            )?,
            script_urls: compile_pattern(r"(?i)(javascript|vbscript|data)\s*:")?,
            any_tag: compile_pattern(r"(?s)<[^>]*>")?,
        })
    }

    /// Dispatches to the cleaner for `kind`.
    #[must_use]
    pub fn sanitize_input(&self, value: &str, kind: SanitizeKind) -> String {
        match kind {
            SanitizeKind::Html => self.sanitize_html(value),
            SanitizeKind::Text => self.sanitize_text(value),
            SanitizeKind::Url => sanitize_url(value),
            SanitizeKind::Filename => sanitize_filename(value),
            SanitizeKind::Database => sanitize_database(value),
        }
    }

    /// Removes scripts, active elements, event handlers and script URLs.
    #[must_use]
    pub fn sanitize_html(&self, value: &str) -> String {
        let cleaned = strip_control_characters(value);
        let cleaned = self.active_blocks.replace_all(&cleaned, "");
        let cleaned = self.dangerous_tags.replace_all(&cleaned, "");
        let cleaned = self.event_handlers.replace_all(&cleaned, "");
        let cleaned = self.script_urls.replace_all(&cleaned, "");
        cleaned.trim().to_owned()
    }

    /// Drops all markup and escapes what is left.
    #[must_use]
    pub fn sanitize_text(&self, value: &str) -> String {
        let cleaned = strip_control_characters(value);
        let cleaned = self.active_blocks.replace_all(&cleaned, "");
        let cleaned = self.any_tag.replace_all(&cleaned, "");
        escape_html(cleaned.trim())
    }
}

/// Escapes the characters that are significant in HTML text and attributes.
#[must_use]
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '/' => escaped.push_str("&#x2F;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Keeps absolute URLs with an allowed scheme and rooted relative paths.
///
/// Anything else becomes an empty string.
#[must_use]
pub fn sanitize_url(value: &str) -> String {
    let candidate: String = value.chars().filter(|c| !c.is_control()).collect();
    let candidate = candidate.trim();

    if candidate.starts_with('/') && !candidate.starts_with("//") && !candidate.starts_with("/\\") {
        return candidate.to_owned();
    }

    match url::Url::parse(candidate) {
        Ok(parsed) if ALLOWED_URL_SCHEMES.contains(&parsed.scheme()) => candidate.to_owned(),
        _ => String::new(),
    }
}

/// Reduces a name to one safe path component.
#[must_use]
pub fn sanitize_filename(value: &str) -> String {
    let last_component = value.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = last_component
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*'))
        .collect();
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());

    cleaned.chars().take(MAX_FILENAME_LENGTH).collect()
}

/// Escapes quotes and drops statement separators and comments.
///
/// Parameterized queries remain the real defence; this only hardens
/// string literal content.
#[must_use]
pub fn sanitize_database(value: &str) -> String {
    // Each removal can join its neighbours into a new marker, so repeat
    // until nothing changes.
    let mut current = value.to_owned();
    loop {
        let stripped = current
            .replace('\0', "")
            .replace("/*", "")
            .replace("*/", "")
            .replace("--", "")
            .replace(';', "");
        if stripped == current {
            break;
        }
        current = stripped;
    }

    current.replace('\'', "''")
}

/// Compiles a built-in pattern, mapping failures to an internal error.
pub(crate) fn compile_pattern(pattern: &str) -> AppResult<Regex> {
    Regex::new(pattern)
        .map_err(|error| AppError::Internal(format!("invalid built-in pattern: {error}")))
}

fn strip_control_characters(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}
