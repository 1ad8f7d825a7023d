//! Heuristic cross-site scripting detection.
//!
//! A fixed battery of patterns is run in order against the input and, when
//! enabled, against a decoded copy of it. Obfuscated payloads can slip
//! through; the detector is a tripwire in front of proper output encoding.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tessera_core::AppResult;

use crate::input_sanitizer::{InputSanitizer, compile_pattern};

/// Decoding passes for nested encodings such as `%253C`.
const MAX_DECODE_PASSES: usize = 3;

const MAX_EVIDENCE_CHARS: usize = 64;

/// Threat level, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatSeverity {
    /// Suspicious but usually harmless.
    Low,
    /// Needs another ingredient to execute.
    Medium,
    /// Executes in common browsers.
    High,
    /// Direct script injection.
    Critical,
}

impl ThreatSeverity {
    /// Returns a stable value for this severity.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Detection switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XssDetectionConfig {
    /// Decode percent, hex and entity encodings and scan again.
    pub check_encoded: bool,
    /// Flag any HTML tag at low severity.
    pub strict: bool,
}

impl Default for XssDetectionConfig {
    fn default() -> Self {
        Self {
            check_encoded: true,
            strict: false,
        }
    }
}

/// One matched pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XssThreat {
    /// Pattern name.
    pub kind: String,
    /// Severity of the pattern.
    pub severity: ThreatSeverity,
    /// Matched text, truncated.
    pub evidence: String,
    /// Matched only after decoding.
    pub encoded: bool,
}

/// Detection result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XssReport {
    /// Whether any threat was found.
    #[serde(rename = "isXSS")]
    pub is_xss: bool,
    /// Matches in detection order.
    pub threats: Vec<XssThreat>,
    /// Highest severity seen; `None` when clean.
    pub severity: Option<ThreatSeverity>,
}

impl XssReport {
    fn clean() -> Self {
        Self {
            is_xss: false,
            threats: Vec::new(),
            severity: None,
        }
    }

    fn record(&mut self, kind: &str, severity: ThreatSeverity, evidence: &str, encoded: bool) {
        if self
            .threats
            .iter()
            .any(|threat| threat.kind == kind && threat.evidence == evidence)
        {
            return;
        }

        self.threats.push(XssThreat {
            kind: kind.to_owned(),
            severity,
            evidence: evidence.chars().take(MAX_EVIDENCE_CHARS).collect(),
            encoded,
        });
        self.is_xss = true;
        self.severity = self.severity.max(Some(severity));
    }
}

#[derive(Debug, Clone)]
struct ThreatPattern {
    kind: &'static str,
    severity: ThreatSeverity,
    pattern: Regex,
}

#[derive(Debug, Clone)]
struct Decoders {
    percent: Regex,
    hex_entity: Regex,
    decimal_entity: Regex,
    unicode_escape: Regex,
    hex_escape: Regex,
    named_entity: Regex,
}

/// Pattern battery for XSS detection and cleanup.
#[derive(Debug, Clone)]
pub struct XssDetector {
    patterns: Vec<ThreatPattern>,
    encoded_marker: Regex,
    any_tag: Regex,
    decoders: Decoders,
    sanitizer: InputSanitizer,
}

impl XssDetector {
    /// Compiles the pattern battery.
    pub fn new(sanitizer: InputSanitizer) -> AppResult<Self> {
        let battery: &[(&'static str, ThreatSeverity, &str)] = &[
            ("script_tag", ThreatSeverity::Critical, r"(?i)<\s*/?\s*script\b"),
            (
                "event_handler",
                ThreatSeverity::High,
                r#"(?i)<[a-z][^>]*[\s/"']on[a-z]+\s*="#,
            ),
            ("javascript_url", ThreatSeverity::High, r"(?i)\b(javascript|vbscript)\s*:"),
            ("data_html_url", ThreatSeverity::High, r"(?i)\bdata\s*:\s*text/html"),
            (
                "embedded_content",
                ThreatSeverity::High,
                r"(?i)<\s*(iframe|frame|object|embed|applet|meta|base|link)\b",
            ),
            ("svg_payload", ThreatSeverity::Medium, r"(?i)<\s*svg\b[^>]*>"),
            (
                "css_expression",
                ThreatSeverity::Medium,
                r"(?i)expression\s*\(|url\s*\(\s*['\x22]?\s*javascript",
            ),
            (
                "dom_manipulation",
                ThreatSeverity::Medium,
                r"(?i)\b(document\s*\.\s*(cookie|write|writeln|domain)|window\s*\.\s*location|(inner|outer)HTML\s*=|insertAdjacentHTML|eval\s*\(|new\s+Function\s*\(|set(Timeout|Interval)\s*\(\s*['\x22])",
            ),
        ];

        let patterns = battery
            .iter()
            .map(|(kind, severity, pattern)| {
                Ok(ThreatPattern {
                    kind: *kind,
                    severity: *severity,
                    pattern: compile_pattern(pattern)?,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self {
            patterns,
            encoded_marker: compile_pattern(
                r"(?i)(%3c|%3e|&#x0*3[ce];?|&#0*6[02];?|\\u003[ce]|\\x3[ce]|&lt;|&gt;)",
            )?,
            any_tag: compile_pattern(r"(?i)<\s*/?\s*[a-z][a-z0-9-]*\b[^>]*>")?,
            decoders: Decoders {
                percent: compile_pattern(r"%([0-9a-fA-F]{2})")?,
                hex_entity: compile_pattern(r"(?i)&#x([0-9a-f]{1,6});?")?,
                decimal_entity: compile_pattern(r"&#([0-9]{1,7});?")?,
                unicode_escape: compile_pattern(r"(?i)\\u([0-9a-f]{4})")?,
                hex_escape: compile_pattern(r"(?i)\\x([0-9a-f]{2})")?,
                named_entity: compile_pattern(r"(?i)&(lt|gt|quot|apos|amp|colon|lpar|rpar);")?,
            },
            sanitizer,
        })
    }

    /// Scans input and reports every matched pattern.
    #[must_use]
    pub fn detect_xss(&self, input: &str, config: &XssDetectionConfig) -> XssReport {
        let mut report = XssReport::clean();
        if input.is_empty() {
            return report;
        }

        self.scan(input, config, false, &mut report);

        if config.check_encoded {
            if let Some(marker) = self.encoded_marker.find(input) {
                report.record("encoded_payload", ThreatSeverity::Medium, marker.as_str(), false);
            }

            let mut current = input.to_owned();
            for _ in 0..MAX_DECODE_PASSES {
                let decoded = self.decode(&current);
                if decoded == current {
                    break;
                }
                self.scan(&decoded, config, true, &mut report);
                current = decoded;
            }
        }

        report
    }

    /// Cleans markup, then escapes any remaining angle brackets.
    #[must_use]
    pub fn sanitize_xss(&self, input: &str) -> String {
        self.sanitizer
            .sanitize_html(input)
            .replace('<', "&lt;")
            .replace('>', "&gt;")
    }

    fn scan(&self, value: &str, config: &XssDetectionConfig, encoded: bool, report: &mut XssReport) {
        for threat in &self.patterns {
            if let Some(found) = threat.pattern.find(value) {
                report.record(threat.kind, threat.severity, found.as_str(), encoded);
            }
        }

        if config.strict
            && let Some(found) = self.any_tag.find(value)
        {
            report.record("html_tag", ThreatSeverity::Low, found.as_str(), encoded);
        }
    }

    fn decode(&self, value: &str) -> String {
        let decoded = self
            .decoders
            .percent
            .replace_all(value, |caps: &Captures| radix_char(&caps[1], 16, &caps[0]));
        let decoded = self
            .decoders
            .hex_entity
            .replace_all(&decoded, |caps: &Captures| radix_char(&caps[1], 16, &caps[0]));
        let decoded = self
            .decoders
            .decimal_entity
            .replace_all(&decoded, |caps: &Captures| radix_char(&caps[1], 10, &caps[0]));
        let decoded = self
            .decoders
            .unicode_escape
            .replace_all(&decoded, |caps: &Captures| radix_char(&caps[1], 16, &caps[0]));
        let decoded = self
            .decoders
            .hex_escape
            .replace_all(&decoded, |caps: &Captures| radix_char(&caps[1], 16, &caps[0]));
        let decoded = self
            .decoders
            .named_entity
            .replace_all(&decoded, |caps: &Captures| {
                let replacement = match caps[1].to_ascii_lowercase().as_str() {
                    "lt" => "<",
                    "gt" => ">",
                    "quot" => "\"",
                    "apos" => "'",
                    "amp" => "&",
                    "colon" => ":",
                    "lpar" => "(",
                    "rpar" => ")",
                    _ => "",
                };
                replacement.to_owned()
            });

        decoded.into_owned()
    }
}

fn radix_char(digits: &str, radix: u32, original: &str) -> String {
    u32::from_str_radix(digits, radix)
        .ok()
        .and_then(char::from_u32)
        .map_or_else(|| original.to_owned(), String::from)
}
