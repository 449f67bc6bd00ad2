//! Scoping for BOX components.
//!
//! Each component gets a short id derived from its filename. Styles are
//! prefixed with an attribute selector for that id, markup is wrapped in an
//! element carrying it, and scripts run inside their own function scope so
//! bundling many components cannot collide.

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::ops::Range;

use crate::markup::find_includes;

pub const SCOPE_ID_PREFIX: &str = "bx-";
pub const SCOPE_ID_HASH_LEN: usize = 5;
pub const SCOPE_ATTRIBUTE: &str = "data-box";

lazy_static! {
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"<!-- INCLUDE:(.*?) -->").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE IDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Deterministic scope id for a filename: `bx-` and 5 hex characters.
pub fn generate_id(filename: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}{}", SCOPE_ID_PREFIX, &digest[..SCOPE_ID_HASH_LEN])
}

pub fn is_scope_id(id: &str) -> bool {
    id.strip_prefix(SCOPE_ID_PREFIX).is_some_and(|hash| {
        hash.len() == SCOPE_ID_HASH_LEN
            && hash.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// CSS
// ═══════════════════════════════════════════════════════════════════════════════

/// A top-level stylesheet entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssRule {
    pub prelude: String,
    /// `None` for a statement ending in `;`, such as `@import`
    pub body: Option<String>,
}

/// Skip a quoted string starting at `i`. Returns the index past the closing quote.
fn skip_string(bytes: &[u8], i: usize) -> usize {
    let quote = bytes[i];
    let mut j = i + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b if b == quote => return j + 1,
            _ => j += 1,
        }
    }
    bytes.len()
}

/// Skip a `/* */` comment starting at `i`. Returns the index past `*/`.
fn skip_comment(css: &str, i: usize) -> usize {
    match css[i + 2..].find("*/") {
        Some(end) => i + 2 + end + 2,
        None => css.len(),
    }
}

/// Split a stylesheet into top-level rules. Only brace depth transitions
/// 0→1 and 1→0 delimit rules; anything nested inside a body is kept verbatim.
/// Top-level comments are dropped. An unterminated trailing rule is dropped.
pub fn parse_css_rules(css: &str) -> Vec<CssRule> {
    let bytes = css.as_bytes();
    let mut rules = Vec::new();
    let mut depth = 0usize;
    let mut prelude = String::new();
    let mut segment_start = 0;
    let mut body_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
            let end = skip_comment(css, i);
            if depth == 0 {
                prelude.push_str(&css[segment_start..i]);
                segment_start = end;
            }
            i = end;
            continue;
        }

        if b == b'"' || b == b'\'' {
            i = skip_string(bytes, i);
            continue;
        }

        match (b, depth) {
            (b'{', 0) => {
                prelude.push_str(&css[segment_start..i]);
                depth = 1;
                body_start = i + 1;
            }
            (b'{', _) => depth += 1,
            (b'}', 0) => {
                // Stray closing brace
                prelude.clear();
                segment_start = i + 1;
            }
            (b'}', 1) => {
                rules.push(CssRule {
                    prelude: prelude.trim().to_string(),
                    body: Some(css[body_start..i].trim().to_string()),
                });
                prelude.clear();
                depth = 0;
                segment_start = i + 1;
            }
            (b'}', _) => depth -= 1,
            (b';', 0) => {
                prelude.push_str(&css[segment_start..i]);
                let statement = prelude.trim();
                if !statement.is_empty() {
                    rules.push(CssRule {
                        prelude: statement.to_string(),
                        body: None,
                    });
                }
                prelude.clear();
                segment_start = i + 1;
            }
            _ => {}
        }

        i += 1;
    }

    rules
}

/// Split a selector list on commas that are not inside `()`, `[]` or strings.
pub fn split_selectors(prelude: &str) -> Vec<&str> {
    let bytes = prelude.as_bytes();
    let mut parts = Vec::new();
    let mut nesting = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'(' | b'[' => nesting += 1,
            b')' | b']' => nesting = nesting.saturating_sub(1),
            b',' if nesting == 0 => {
                parts.push(prelude[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(prelude[start.min(prelude.len())..].trim());

    parts.into_iter().filter(|s| !s.is_empty()).collect()
}

fn scope_prelude(prelude: &str, id: &str) -> String {
    if prelude.starts_with('@') {
        return prelude.to_string();
    }

    split_selectors(prelude)
        .into_iter()
        .map(|selector| {
            if selector.starts_with('@') {
                selector.to_string()
            } else {
                format!("[{}=\"{}\"] {}", SCOPE_ATTRIBUTE, id, selector)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Prefix every top-level selector with the component's scope attribute.
/// At-rule preludes pass through verbatim and their bodies are not rescoped.
pub fn scope_css(css: &str, id: &str) -> String {
    if css.trim().is_empty() {
        return String::new();
    }

    parse_css_rules(css)
        .into_iter()
        .filter_map(|rule| match rule.body {
            None => Some(format!("{};", rule.prelude)),
            Some(body) if !rule.prelude.is_empty() && !body.is_empty() => {
                Some(format!("{} {{ {} }}", scope_prelude(&rule.prelude, id), body))
            }
            Some(_) => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTML
// ═══════════════════════════════════════════════════════════════════════════════

/// The inert marker an include is replaced with until artifacts are assembled.
pub fn include_placeholder(src: &str) -> String {
    format!("<!-- INCLUDE:{} -->", src)
}

/// Include placeholders in `html`, with their byte ranges and literal paths.
pub fn find_placeholders(html: &str) -> Vec<(Range<usize>, &str)> {
    PLACEHOLDER_RE
        .captures_iter(html)
        .filter_map(|caps| Some((caps.get(0)?.range(), caps.get(1)?.as_str())))
        .collect()
}

/// Replace includes with placeholders and wrap the markup in a scoped element.
pub fn scope_html(html: &str, id: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let mut processed = String::with_capacity(html.len());
    let mut last = 0;
    for include in find_includes(html) {
        processed.push_str(&html[last..include.start]);
        processed.push_str(&include_placeholder(&include.src));
        last = include.end;
    }
    processed.push_str(&html[last..]);

    format!("<div {}=\"{}\">\n{}\n</div>", SCOPE_ATTRIBUTE, id, processed)
}

// ═══════════════════════════════════════════════════════════════════════════════
// JS
// ═══════════════════════════════════════════════════════════════════════════════

/// Wrap a component script in an IIFE with `__boxId` bound to the scope id.
pub fn scope_js(script: &str, id: &str) -> String {
    if script.trim().is_empty() {
        return String::new();
    }

    format!(
        "\n/* Box: {id} */\n(function() {{\n  const __boxId = \"{id}\";\n{script}\n}})();",
        id = id,
        script = script
    )
}
