//! Lint Module for BOX Compiler
//!
//! Static checks over `.box` files. UI components are checked for their
//! sections, includes and bindings; endpoints for their inline config and
//! handler shape. Lint never modifies anything and never stops at the first
//! problem.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{BoxError, BoxResult};
use crate::markup::{attribute_values, count_tags, find_includes, find_section};
use crate::parse::{find_config_comment, is_endpoint_filename, HttpMethod, COMPONENT_EXTENSION};
use crate::validate::{
    count_severity, Diagnostic, Severity, LINT_DUPLICATE_ID, LINT_EMPTY_BIND,
    LINT_INVALID_CONFIG, LINT_INVALID_INCLUDE, LINT_INVALID_METHOD, LINT_MISMATCHED_SECTION,
    LINT_MISSING_CONFIG, LINT_MISSING_EXPORT, LINT_MISSING_SCRIPT, LINT_MISSING_STYLE,
    LINT_MISSING_TEMPLATE, LINT_NO_RETURN, LINT_SHORT_SIGNATURE,
};

const SECTIONS: [&str; 3] = ["style", "template", "script"];

lazy_static! {
    static ref EXPORT_ASYNC_RE: Regex = Regex::new(r"export\s+default\s+async\b").unwrap();
    static ref SIGNATURE_RE: Regex =
        Regex::new(r"export\s+default\s+async\s*(?:function\s*[\w$]*\s*)?\(([^)]*)\)").unwrap();
    static ref RETURN_OBJECT_RE: Regex = Regex::new(r"return\s*\(?\s*\{").unwrap();
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LintReport {
    pub files_checked: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl LintReport {
    pub fn errors(&self) -> usize {
        count_severity(&self.diagnostics, Severity::Error)
    }

    pub fn warnings(&self) -> usize {
        count_severity(&self.diagnostics, Severity::Warning)
    }

    pub fn infos(&self) -> usize {
        count_severity(&self.diagnostics, Severity::Info)
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// UI COMPONENTS
// ═══════════════════════════════════════════════════════════════════════════════

fn lint_component(source: &str, path: &Path, file: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if find_section(source, "template").is_none() {
        diagnostics.push(
            Diagnostic::error(LINT_MISSING_TEMPLATE, "Missing <template> section", file)
                .with_hint("Add a <template>...</template> block with the component markup"),
        );
    }
    if find_section(source, "style").is_none() {
        diagnostics.push(
            Diagnostic::warning(LINT_MISSING_STYLE, "Missing <style> section", file)
                .with_hint("Consider adding a <style>...</style> block for component styles"),
        );
    }
    if find_section(source, "script").is_none() {
        diagnostics.push(
            Diagnostic::info(LINT_MISSING_SCRIPT, "No <script> section found", file)
                .with_hint("Add a <script>...</script> block if the component needs logic"),
        );
    }

    for name in SECTIONS {
        let (opens, closes) = count_tags(source, name);
        if opens != closes {
            diagnostics.push(
                Diagnostic::error(
                    LINT_MISMATCHED_SECTION,
                    &format!("Mismatched <{}> tags", name),
                    file,
                )
                .with_context(format!("{} opening, {} closing", opens, closes)),
            );
        }
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    for include in find_includes(source) {
        let target = dir.join(&include.src);
        if !target.is_file() {
            diagnostics.push(
                Diagnostic::error(
                    LINT_INVALID_INCLUDE,
                    &format!("Invalid include: \"{}\" not found", include.src),
                    file,
                )
                .with_context(target.display().to_string())
                .with_hint("Check the path or create the file"),
            );
        }
    }

    let empty_binds = attribute_values(source, "box-bind")
        .into_iter()
        .filter(|value| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        .count();
    for _ in 0..empty_binds {
        diagnostics.push(
            Diagnostic::error(LINT_EMPTY_BIND, "Empty box-bind attribute", file)
                .with_hint("Name a state property: box-bind=\"propertyName\""),
        );
    }

    let markup = find_section(source, "template").map_or(source, |s| s.content);
    let mut seen = HashSet::new();
    for id in attribute_values(markup, "id").into_iter().flatten() {
        if !seen.insert(id.clone()) {
            diagnostics.push(
                Diagnostic::warning(
                    LINT_DUPLICATE_ID,
                    &format!("Duplicate ID found: \"{}\"", id),
                    file,
                )
                .with_hint("Use unique IDs or switch to classes for styling"),
            );
        }
    }

    diagnostics
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENDPOINTS
// ═══════════════════════════════════════════════════════════════════════════════

fn lint_config(source: &str, file: &str) -> Vec<Diagnostic> {
    let Some((_, object)) = find_config_comment(source) else {
        let diagnostic = if source.contains("BOX_CONFIG") {
            Diagnostic::error(LINT_INVALID_CONFIG, "Invalid BOX_CONFIG JSON", file)
                .with_context("BOX_CONFIG is not followed by a { ... } object")
        } else {
            Diagnostic::warning(LINT_MISSING_CONFIG, "Missing BOX_CONFIG comment", file)
                .with_hint(r#"Add /* BOX_CONFIG: { "method": "GET", "auth": false } */ at the top"#)
        };
        return vec![diagnostic];
    };

    let value: serde_json::Value = match serde_json::from_str(object) {
        Ok(value) => value,
        Err(e) => {
            return vec![
                Diagnostic::error(LINT_INVALID_CONFIG, "Invalid BOX_CONFIG JSON", file)
                    .with_context(e.to_string())
                    .with_hint("Check the JSON syntax in the BOX_CONFIG comment"),
            ];
        }
    };

    match value.get("method") {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(serde_json::Value::String(m)) if m.parse::<HttpMethod>().is_ok() => Vec::new(),
        Some(other) => {
            let shown = other.as_str().map_or_else(|| other.to_string(), str::to_string);
            let valid: Vec<&str> = HttpMethod::ALL.iter().map(HttpMethod::as_str).collect();
            vec![Diagnostic::error(
                LINT_INVALID_METHOD,
                &format!("Invalid HTTP method: \"{}\"", shown),
                file,
            )
            .with_hint(format!("Use one of: {}", valid.join(", ")))]
        }
    }
}

fn lint_endpoint(source: &str, file: &str) -> Vec<Diagnostic> {
    let mut diagnostics = lint_config(source, file);

    if !EXPORT_ASYNC_RE.is_match(source) {
        diagnostics.push(
            Diagnostic::error(LINT_MISSING_EXPORT, "Missing default export", file)
                .with_hint("Add: export default async (req, res, ctx) => { ... }"),
        );
    }

    if let Some(caps) = SIGNATURE_RE.captures(source) {
        let params = caps
            .get(1)
            .map(|m| m.as_str().split(',').filter(|p| !p.trim().is_empty()).count())
            .unwrap_or(0);
        if params < 2 {
            diagnostics.push(
                Diagnostic::warning(LINT_SHORT_SIGNATURE, "Incomplete function signature", file)
                    .with_hint("Use: export default async (req, res, ctx) => { ... }"),
            );
        }
    }

    if !RETURN_OBJECT_RE.is_match(source) {
        diagnostics.push(
            Diagnostic::warning(LINT_NO_RETURN, "No return statement found", file)
                .with_hint(r#"Return { status: 200, data: {...} } or { status: 500, error: "..." }"#),
        );
    }

    diagnostics
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lint already-loaded text. `path` is used to resolve includes.
pub fn lint_source(source: &str, path: &Path) -> Vec<Diagnostic> {
    let file = path.display().to_string();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if is_endpoint_filename(&name) {
        lint_endpoint(source, &file)
    } else {
        lint_component(source, path, &file)
    }
}

pub fn lint_file(path: &Path) -> BoxResult<Vec<Diagnostic>> {
    let source = fs::read_to_string(path).map_err(|source| BoxError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(lint_source(&source, path))
}

fn find_box_files(src_dir: &Path) -> BoxResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(src_dir).sort_by_file_name() {
        let entry = entry.map_err(|source| BoxError::Walk {
            root: src_dir.to_path_buf(),
            source,
        })?;
        let is_box = entry
            .path()
            .extension()
            .is_some_and(|ext| ext == COMPONENT_EXTENSION);
        if entry.file_type().is_file() && is_box {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Lint every `.box` file under `src_dir`.
pub fn lint_tree(src_dir: &Path) -> BoxResult<LintReport> {
    if !src_dir.is_dir() {
        return Err(BoxError::SourceDirNotFound {
            path: src_dir.to_path_buf(),
        });
    }

    let mut report = LintReport::default();
    for path in find_box_files(src_dir)? {
        report.files_checked += 1;
        report.diagnostics.extend(lint_file(&path)?);
    }

    tracing::info!(
        files = report.files_checked,
        errors = report.errors(),
        warnings = report.warnings(),
        "lint complete"
    );

    Ok(report)
}
