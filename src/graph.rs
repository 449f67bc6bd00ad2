//! Component Graph Module for BOX Compiler
//!
//! Crawls the include graph depth-first from an entry component, scoping each
//! component exactly once. Components are keyed by canonical path; the bare
//! filename is kept as a display label and lookup alias.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::parse::parse_with_diagnostics;
use crate::scope::{generate_id, scope_css, scope_html, scope_js};
use crate::validate::{
    Diagnostic, DIAG_BASENAME_COLLISION, DIAG_MISSING_INCLUDE, DIAG_READ_FAILED,
    DIAG_SKIPPED_EDGE,
};

// ═══════════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// A parsed component with all three sections rewritten under its scope id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedComponent {
    pub filename: String,
    pub path: PathBuf,
    pub id: String,
    pub style: String,
    pub template: String,
    pub script: String,
    /// Literal include paths in template order
    pub includes: Vec<String>,
    /// Literal include path -> canonical path it resolved to
    pub resolved_includes: HashMap<String, PathBuf>,
}

/// An include edge whose target had already been visited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEdge {
    pub from: Option<PathBuf>,
    pub to: PathBuf,
}

#[derive(Debug, Default)]
pub struct ComponentGraph {
    components: Vec<ScopedComponent>,
    by_path: HashMap<PathBuf, usize>,
    visited: HashSet<PathBuf>,
    skipped_edges: Vec<SkippedEdge>,
    diagnostics: Vec<Diagnostic>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PATHS
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolve `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Canonical form of `path`, or an absolute lexical path when it does not exist.
pub fn canonical_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    normalize_lexically(&absolute)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// GRAPH
// ═══════════════════════════════════════════════════════════════════════════════

impl ComponentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crawl from `path`, the entry of this graph.
    pub fn process(&mut self, path: &Path) {
        self.process_edge(path, None, None);
    }

    fn process_edge(&mut self, path: &Path, from: Option<&Path>, literal: Option<&str>) {
        let canonical = canonical_path(path);

        if self.visited.contains(&canonical) {
            let from_label = from.map(file_label).unwrap_or_else(|| "<entry>".to_string());
            self.diagnostics.push(
                Diagnostic::info(
                    DIAG_SKIPPED_EDGE,
                    &format!("Already processed: {}", file_label(&canonical)),
                    &from_label,
                )
                .with_context(canonical.display().to_string())
                .emit(),
            );
            self.skipped_edges.push(SkippedEdge {
                from: from.map(Path::to_path_buf),
                to: canonical,
            });
            return;
        }

        let source = match fs::read_to_string(&canonical) {
            Ok(source) => source,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let reference = literal
                    .map(str::to_string)
                    .unwrap_or_else(|| canonical.display().to_string());
                let from_label = from.map(file_label).unwrap_or_else(|| "<entry>".to_string());
                self.diagnostics.push(
                    Diagnostic::warning(
                        DIAG_MISSING_INCLUDE,
                        &format!("File not found: {}", reference),
                        &from_label,
                    )
                    .with_context(canonical.display().to_string())
                    .emit(),
                );
                return;
            }
            Err(e) => {
                self.diagnostics.push(
                    Diagnostic::warning(
                        DIAG_READ_FAILED,
                        &format!("Could not read {}", file_label(&canonical)),
                        &canonical.display().to_string(),
                    )
                    .with_context(e.to_string())
                    .emit(),
                );
                return;
            }
        };

        self.visited.insert(canonical.clone());

        let filename = file_label(&canonical);
        let (parsed, parse_diagnostics) = parse_with_diagnostics(&source, &filename);
        self.diagnostics.extend(parse_diagnostics);

        if parsed.is_endpoint {
            tracing::debug!(file = %filename, "skipping endpoint in component graph");
            return;
        }

        tracing::debug!(file = %filename, path = %canonical.display(), "processing component");

        let dir = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let resolved_includes: HashMap<String, PathBuf> = parsed
            .includes
            .iter()
            .map(|literal| (literal.clone(), canonical_path(&dir.join(literal))))
            .collect();

        if let Some(other) = self
            .components
            .iter()
            .find(|c| c.filename == filename && c.path != canonical)
        {
            self.diagnostics.push(
                Diagnostic::warning(
                    DIAG_BASENAME_COLLISION,
                    &format!("{} shares its filename with another component", filename),
                    &canonical.display().to_string(),
                )
                .with_context(other.path.display().to_string())
                .with_hint("Rename one of the files to give it a distinct scope id")
                .emit(),
            );
        }

        let id = generate_id(&filename);
        let component = ScopedComponent {
            style: scope_css(&parsed.style, &id),
            template: scope_html(&parsed.template, &id),
            script: scope_js(&parsed.script, &id),
            filename,
            path: canonical.clone(),
            id,
            includes: parsed.includes.clone(),
            resolved_includes,
        };

        self.by_path.insert(canonical.clone(), self.components.len());
        self.components.push(component);

        for literal in &parsed.includes {
            let target = dir.join(literal);
            self.process_edge(&target, Some(&canonical), Some(literal));
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Lookups
    // ───────────────────────────────────────────────────────────────────────────

    /// Components in insertion order (depth-first include order).
    pub fn components(&self) -> &[ScopedComponent] {
        &self.components
    }

    /// The first component stored, which is the entry after [`process`](Self::process).
    pub fn entry(&self) -> Option<&ScopedComponent> {
        self.components.first()
    }

    pub fn get(&self, path: &Path) -> Option<&ScopedComponent> {
        self.by_path
            .get(path)
            .or_else(|| self.by_path.get(&canonical_path(path)))
            .map(|&i| &self.components[i])
    }

    /// First component in insertion order whose filename is `name`.
    pub fn get_by_filename(&self, name: &str) -> Option<&ScopedComponent> {
        self.components.iter().find(|c| c.filename == name)
    }

    /// Resolve a literal include of `from`. Literals recorded in its include
    /// map are looked up by path only; anything else falls back to basename.
    pub fn resolve_include(&self, from: &ScopedComponent, literal: &str) -> Option<&ScopedComponent> {
        match from.resolved_includes.get(literal) {
            Some(path) => self.get(path),
            None => self.get_by_filename(crate::parse::basename(literal)),
        }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn is_visited(&self, path: &Path) -> bool {
        self.visited.contains(&canonical_path(path))
    }

    pub fn skipped_edges(&self) -> &[SkippedEdge] {
        &self.skipped_edges
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/a/b/./../c/d.box")),
            PathBuf::from("/a/c/d.box")
        );
    }

    #[test]
    fn test_process_single_component() {
        let tmp = TempDir::new().unwrap();
        let entry = write(
            tmp.path(),
            "main.box",
            "<style>h1 { color: red; }</style><template><h1>Hi</h1></template><script>let a = 1;</script>",
        );

        let mut graph = ComponentGraph::new();
        graph.process(&entry);

        assert_eq!(graph.len(), 1);
        let main = graph.entry().unwrap();
        assert_eq!(main.filename, "main.box");
        assert_eq!(main.id, generate_id("main.box"));
        assert!(main.style.contains(&format!("[data-box=\"{}\"] h1", main.id)));
        assert!(main.template.starts_with(&format!("<div data-box=\"{}\">", main.id)));
        assert!(main.script.contains("let a = 1;"));
        assert!(graph.diagnostics().is_empty());
    }

    #[test]
    fn test_includes_depth_first_in_template_order() {
        let tmp = TempDir::new().unwrap();
        let entry = write(
            tmp.path(),
            "main.box",
            r#"<template><include src="./a.box" /><include src="./b.box" /></template>"#,
        );
        write(
            tmp.path(),
            "a.box",
            r#"<template><include src="./parts/c.box" /></template>"#,
        );
        write(tmp.path(), "b.box", "<template><p>b</p></template>");
        write(tmp.path(), "parts/c.box", "<template><p>c</p></template>");

        let mut graph = ComponentGraph::new();
        graph.process(&entry);

        let order: Vec<&str> = graph.components().iter().map(|c| c.filename.as_str()).collect();
        assert_eq!(order, vec!["main.box", "a.box", "c.box", "b.box"]);

        let a = graph.get_by_filename("a.box").unwrap();
        let c = graph.resolve_include(a, "./parts/c.box").unwrap();
        assert_eq!(c.filename, "c.box");
    }

    #[test]
    fn test_missing_include_is_warning() {
        let tmp = TempDir::new().unwrap();
        let entry = write(
            tmp.path(),
            "main.box",
            r#"<template><include src="./nav.box" /></template>"#,
        );

        let mut graph = ComponentGraph::new();
        graph.process(&entry);

        assert_eq!(graph.len(), 1);
        let diags = graph.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DIAG_MISSING_INCLUDE);
        assert_eq!(diags[0].file, "main.box");
        assert!(diags[0].message.contains("./nav.box"));
    }

    #[test]
    fn test_repeated_include_is_skipped_edge() {
        let tmp = TempDir::new().unwrap();
        let entry = write(
            tmp.path(),
            "main.box",
            r#"<template><include src="./x.box" /><include src="./x.box" /></template>"#,
        );
        write(tmp.path(), "x.box", "<template><p>x</p></template>");

        let mut graph = ComponentGraph::new();
        graph.process(&entry);

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.skipped_edges().len(), 1);
        assert_eq!(graph.diagnostics()[0].code, DIAG_SKIPPED_EDGE);
    }

    #[test]
    fn test_endpoints_are_not_components() {
        let tmp = TempDir::new().unwrap();
        let entry = write(
            tmp.path(),
            "main.box",
            r#"<template><include src="./api+users.box" /></template>"#,
        );
        write(tmp.path(), "api+users.box", "export default async () => ({});");

        let mut graph = ComponentGraph::new();
        graph.process(&entry);

        assert_eq!(graph.len(), 1);
        assert!(graph.is_visited(&tmp.path().join("api+users.box")));
    }

    #[test]
    fn test_basename_collision_keeps_both() {
        let tmp = TempDir::new().unwrap();
        let entry = write(
            tmp.path(),
            "main.box",
            r#"<template><include src="./a/card.box" /><include src="./b/card.box" /></template>"#,
        );
        write(tmp.path(), "a/card.box", "<template><p>a</p></template>");
        write(tmp.path(), "b/card.box", "<template><p>b</p></template>");

        let mut graph = ComponentGraph::new();
        graph.process(&entry);

        assert_eq!(graph.len(), 3);
        let main = graph.entry().unwrap();
        let a = graph.resolve_include(main, "./a/card.box").unwrap();
        let b = graph.resolve_include(main, "./b/card.box").unwrap();
        assert_ne!(a.path, b.path);
        assert!(b.template.contains("<p>b</p>"));
        assert!(graph
            .diagnostics()
            .iter()
            .any(|d| d.code == DIAG_BASENAME_COLLISION));
    }
}
