//! End-to-end build tests over on-disk projects.
//!
//! Each test lays out a small `src/` tree in a temporary directory and runs the
//! whole pipeline over it.

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    use crate::codegen::ArtifactKind;
    use crate::config::{BuildConfig, MinifyLevel};
    use crate::error::BoxError;
    use crate::finalize::PassThrough;
    use crate::graph::ComponentGraph;
    use crate::parse::HttpMethod;
    use crate::pipeline::Pipeline;
    use crate::scope::generate_id;
    use crate::validate::{DIAG_MISSING_INCLUDE, DIAG_SKIPPED_EDGE};

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    /// `main.box` including `header.box` and `footer.box`, plus one endpoint.
    fn three_file_project() -> TempDir {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "src/main.box",
            r#"<style>
main { padding: 1rem; }
</style>
<template>
<include src="./header.box" />
<main><p box-bind="greeting">Hello</p></main>
<include src="./footer.box" />
</template>
<script>
Box.state.greeting = 'Hi';
</script>"#,
        );
        write(
            tmp.path(),
            "src/header.box",
            "<style>h1 { color: navy; }</style>\n<template><header><h1>Site</h1></header></template>\n<script>Box.on('greeting:update', v => console.log(v));</script>",
        );
        write(
            tmp.path(),
            "src/footer.box",
            "<style>footer, .note { font-size: 12px; }</style>\n<template><footer>Bye</footer></template>",
        );
        write(
            tmp.path(),
            "src/api+greeting.box",
            "export default async (req, res) => {\n  return { status: 200, data: { greeting: 'Hi' } };\n};",
        );
        tmp
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // END TO END
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_three_file_project_builds() {
        let tmp = three_file_project();
        let outcome = Pipeline::for_project(tmp.path()).build().unwrap();

        assert_eq!(outcome.stats.components, 3);
        assert_eq!(outcome.stats.routes, 1);
        assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);

        let html = &outcome.artifacts.markup;
        let header = html.find("<h1>Site</h1>").unwrap();
        let main = html.find("box-bind=\"greeting\"").unwrap();
        let footer = html.find("<footer>Bye</footer>").unwrap();
        assert!(header < main && main < footer);
        for name in ["main.box", "header.box", "footer.box"] {
            assert!(html.contains(&format!("data-box=\"{}\"", generate_id(name))));
        }

        let css = &outcome.artifacts.stylesheet;
        let header_id = generate_id("header.box");
        let footer_id = generate_id("footer.box");
        assert!(css.contains(&format!("[data-box=\"{}\"] h1 {{ color: navy; }}", header_id)));
        assert!(css.contains(&format!(
            "[data-box=\"{id}\"] footer, [data-box=\"{id}\"] .note {{ font-size: 12px; }}",
            id = footer_id
        )));
        assert!(css.find("/* main.box */").unwrap() < css.find("/* header.box */").unwrap());
        assert!(css.find("/* header.box */").unwrap() < css.find("/* footer.box */").unwrap());

        let js = &outcome.artifacts.script_bundle;
        assert!(js.contains("Box.state.greeting = 'Hi';"));
        assert!(js.contains(&format!("const __boxId = \"{}\";", header_id)));
        assert!(!js.contains(&format!("const __boxId = \"{}\";", footer_id)));

        let server = &outcome.artifacts.server_module;
        assert_eq!(server.matches("async (req, res, ctx) => {").count(), 1);
        assert_eq!(
            server
                .matches("\"GET:/api/greeting\": async (req, res, ctx) => {")
                .count(),
            1
        );
        assert!(server.contains("return { status: 200, data: { greeting: 'Hi' } };"));
        // The endpoint is not part of the page
        assert!(!html.contains("greeting: 'Hi'"));
    }

    #[test]
    fn test_build_and_write_persists_artifacts() {
        let tmp = three_file_project();
        let outcome = Pipeline::for_project(tmp.path())
            .build_and_write(&PassThrough)
            .unwrap();

        assert_eq!(outcome.written.len(), 4);
        for kind in ArtifactKind::ALL {
            let on_disk = fs::read_to_string(tmp.path().join("dist").join(kind.file_name())).unwrap();
            assert_eq!(on_disk, outcome.artifacts.get(kind));
        }
        assert_eq!(
            outcome.stats.total_bytes(),
            outcome.written.iter().map(|w| w.bytes).sum::<usize>()
        );
    }

    #[test]
    fn test_minify_level_threaded_to_writer() {
        let tmp = three_file_project();
        let config = BuildConfig {
            minify: MinifyLevel::Aggressive,
            ..Default::default()
        }
        .rooted_at(tmp.path());
        let seen = std::cell::Cell::new(None);
        let minifier = |_: ArtifactKind, source: &str, level: MinifyLevel| {
            seen.set(Some(level));
            source.to_string()
        };

        Pipeline::new(config).build_and_write(&minifier).unwrap();

        assert_eq!(seen.get(), Some(MinifyLevel::Aggressive));
    }

    #[test]
    fn test_endpoints_become_routes() {
        let tmp = three_file_project();
        write(
            tmp.path(),
            "src/api/api+get-users.box",
            "export default async (req, res, context) => {\n  return { status: 200, data: { q: context.query } };\n};",
        );
        write(
            tmp.path(),
            "src/api/api+post-users.box",
            "/* BOX_CONFIG: { \"method\": \"POST\", \"auth\": true } */\nexport default async function (req, res) {\n  return { status: 201, data: req.body };\n}",
        );

        let outcome = Pipeline::for_project(tmp.path()).build().unwrap();

        // `src/api/` sorts ahead of `src/api+greeting.box`
        assert_eq!(outcome.routes.len(), 3);
        assert_eq!(outcome.routes[2].path, "/api/greeting");
        assert_eq!(outcome.routes[0].method, HttpMethod::Get);
        assert_eq!(outcome.routes[0].path, "/api/users");
        assert_eq!(outcome.routes[1].method, HttpMethod::Post);
        assert_eq!(outcome.routes[1].path, "/api/post-users");
        assert!(outcome.routes[1].auth);

        let server = &outcome.artifacts.server_module;
        assert!(server.contains("\"GET:/api/users\": async (req, res, ctx) => {"));
        assert!(server.contains("return { status: 200, data: { q: ctx.query } };"));
        assert!(server.contains("\"POST:/api/post-users\": async (req, res, ctx) => {"));
        // Endpoint files never become components
        assert_eq!(outcome.stats.components, 3);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // GRAPH PROPERTIES
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_crawl_is_idempotent() {
        let tmp = three_file_project();
        let entry = tmp.path().join("src/main.box");

        let mut first = ComponentGraph::new();
        first.process(&entry);
        let mut second = ComponentGraph::new();
        second.process(&entry);
        assert_eq!(first.components(), second.components());

        // Re-processing an already crawled entry adds nothing new
        let before = first.len();
        first.process(&entry);
        assert_eq!(first.len(), before);
        assert_eq!(first.skipped_edges().len(), 1);
        assert!(first.skipped_edges()[0].from.is_none());
    }

    #[test]
    fn test_include_cycle_terminates() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "src/main.box",
            r#"<template><include src="./a.box" /></template>"#,
        );
        write(
            tmp.path(),
            "src/a.box",
            r#"<template><p>a</p><include src="./b.box" /></template>"#,
        );
        write(
            tmp.path(),
            "src/b.box",
            r#"<template><p>b</p><include src="./a.box" /><include src="./main.box" /></template>"#,
        );

        let outcome = Pipeline::for_project(tmp.path()).build().unwrap();

        assert_eq!(outcome.stats.components, 3);
        assert_eq!(outcome.stats.skipped_edges, 2);
        let skipped = outcome
            .diagnostics
            .iter()
            .filter(|d| d.code == DIAG_SKIPPED_EDGE)
            .count();
        assert_eq!(skipped, 2);
        assert!(outcome.artifacts.markup.contains("<p>a</p>"));
        assert!(outcome.artifacts.markup.contains("<p>b</p>"));
        assert!(outcome.artifacts.markup.contains("box-missing"));
    }

    #[test]
    fn test_missing_include_does_not_fail_build() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "src/main.box",
            r#"<template><include src="./nav.box" /><p>body</p></template>"#,
        );

        let outcome = Pipeline::for_project(tmp.path()).build().unwrap();

        assert_eq!(outcome.stats.components, 1);
        assert!(outcome
            .diagnostics
            .iter()
            .any(|d| d.code == DIAG_MISSING_INCLUDE && d.message.contains("./nav.box")));
        assert!(outcome.artifacts.markup.contains("<p>body</p>"));
        assert!(outcome.artifacts.markup.contains("data-box-missing=\"./nav.box\""));
        assert!(outcome.stats.warnings >= 2);
    }

    #[test]
    fn test_missing_entry_reports_path() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        match Pipeline::for_project(tmp.path()).build() {
            Err(BoxError::EntryNotFound { path }) => assert!(path.ends_with("src/main.box")),
            other => panic!("expected EntryNotFound, got {:?}", other.map(|o| o.stats)),
        }
    }

    #[test]
    fn test_builds_are_deterministic() {
        let tmp = three_file_project();
        let pipeline = Pipeline::for_project(tmp.path());
        let a = pipeline.build().unwrap();
        let b = pipeline.build().unwrap();
        assert_eq!(a.artifacts, b.artifacts);
        assert_eq!(a.stats, b.stats);
    }
}
