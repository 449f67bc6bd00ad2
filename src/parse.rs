//! Parse Module for BOX Compiler
//!
//! Splits a `.box` file into its `<style>`, `<template>` and `<script>`
//! sections, and reads the inline `BOX_CONFIG` of endpoint files.
//! Parsing never fails: absent sections are empty strings and a malformed
//! configuration is reported as a warning.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::str::FromStr;

use crate::markup::{find_includes, find_nested_section, find_section};
use crate::validate::{Diagnostic, DIAG_INVALID_CONFIG};

/// Filename prefix marking a request-handler file.
pub const ENDPOINT_PREFIX: &str = "api+";
pub const COMPONENT_EXTENSION: &str = "box";

lazy_static! {
    /// `/* BOX_CONFIG: { ... } */`
    static ref BLOCK_CONFIG_RE: Regex =
        Regex::new(r"/\*\s*BOX_CONFIG\s*:\s*(\{[\s\S]*?\})\s*\*/").unwrap();

    /// `// BOX_CONFIG: { ... }` on a single line
    static ref LINE_CONFIG_RE: Regex =
        Regex::new(r"(?m)//[ \t]*BOX_CONFIG[ \t]*:[ \t]*(\{.*\})[ \t]*$").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unsupported HTTP method '{}'", s))
    }
}

impl<'de> Deserialize<'de> for HttpMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Inline endpoint configuration. Unrecognized keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub method: Option<HttpMethod>,
    #[serde(default)]
    pub auth: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedComponent {
    pub style: String,
    pub template: String,
    pub script: String,
    /// Literal include paths in template order, duplicates preserved
    pub includes: Vec<String>,
    pub is_endpoint: bool,
    pub config: Option<EndpointConfig>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILENAME CONVENTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Basename of a path-like filename.
pub fn basename(filename: &str) -> &str {
    Path::new(filename)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
}

/// Whether `filename` names a request-handler file.
pub fn is_endpoint_filename(filename: &str) -> bool {
    basename(filename).starts_with(ENDPOINT_PREFIX)
}

// ═══════════════════════════════════════════════════════════════════════════════
// INLINE CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Locate the config comment. Returns the byte range of the whole comment and
/// the object text inside it.
pub fn find_config_comment(text: &str) -> Option<(Range<usize>, &str)> {
    let caps = BLOCK_CONFIG_RE
        .captures(text)
        .or_else(|| LINE_CONFIG_RE.captures(text))?;
    let whole = caps.get(0)?;
    let object = caps.get(1)?;
    Some((whole.range(), object.as_str()))
}

/// Read the inline configuration. `Ok(None)` when there is none,
/// `Err(reason)` when it is present but malformed.
pub fn parse_endpoint_config(text: &str) -> Result<Option<EndpointConfig>, String> {
    match find_config_comment(text) {
        Some((_, object)) => serde_json::from_str::<EndpointConfig>(object)
            .map(Some)
            .map_err(|e| e.to_string()),
        None if text.contains("BOX_CONFIG") => {
            Err("BOX_CONFIG marker is not followed by a { ... } object".to_string())
        }
        None => Ok(None),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN PARSING FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse a component or endpoint file.
pub fn parse(text: &str, filename: &str) -> ParsedComponent {
    parse_with_diagnostics(text, filename).0
}

/// Parse, also returning the warnings produced along the way.
pub fn parse_with_diagnostics(text: &str, filename: &str) -> (ParsedComponent, Vec<Diagnostic>) {
    if is_endpoint_filename(filename) {
        parse_endpoint(text, filename)
    } else {
        (parse_ui(text), Vec::new())
    }
}

fn parse_ui(text: &str) -> ParsedComponent {
    let style = find_section(text, "style")
        .map(|s| s.content.trim().to_string())
        .unwrap_or_default();
    let template = find_nested_section(text, "template")
        .map(|s| s.content.trim().to_string())
        .unwrap_or_default();
    let script = find_section(text, "script")
        .map(|s| s.content.trim().to_string())
        .unwrap_or_default();

    let includes = find_includes(&template)
        .into_iter()
        .map(|include| include.src)
        .collect();

    ParsedComponent {
        style,
        template,
        script,
        includes,
        is_endpoint: false,
        config: None,
    }
}

fn parse_endpoint(text: &str, filename: &str) -> (ParsedComponent, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();

    let config = match parse_endpoint_config(text) {
        Ok(config) => config,
        Err(reason) => {
            diagnostics.push(
                Diagnostic::warning(
                    DIAG_INVALID_CONFIG,
                    &format!("Invalid BOX_CONFIG in {}", basename(filename)),
                    filename,
                )
                .with_context(reason)
                .with_hint(r#"Use /* BOX_CONFIG: { "method": "GET", "auth": false } */"#)
                .emit(),
            );
            None
        }
    };

    let parsed = ParsedComponent {
        script: text.to_string(),
        is_endpoint: true,
        config,
        ..Default::default()
    };

    (parsed, diagnostics)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
