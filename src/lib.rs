//! # BOX Component Compiler
//!
//! Compiles a tree of single-file `.box` components and `api+*.box` endpoint
//! files into four deployable artifacts:
//!
//! - `index.html`: the entry template with every include expanded
//! - `style.css`: each component's styles scoped under `[data-box="bx-xxxxx"]`
//! - `app.js`: the client runtime followed by each component's scoped script
//! - `server.js`: a Node server dispatching `METHOD:PATH` to the endpoint handlers
//!
//! ## Build Order
//!
//! 1. **Parse** (`parse`, `markup`): split a component into style, template and script.
//! 2. **Scope** (`scope`): derive the scope id and rewrite all three sections.
//! 3. **Crawl** (`graph`): depth-first over includes from the entry, each file once.
//! 4. **Routes** (`discovery`, `handler`): find endpoint files and lift out handler bodies.
//! 5. **Generate** (`codegen`): render the artifacts in memory.
//! 6. **Write** (`finalize`): minify through the host's [`Minifier`] and swap files into place.
//!
//! Recoverable problems are [`Diagnostic`]s collected into the build outcome;
//! only a missing entry, an unreadable source tree or a failed write is a
//! [`BoxError`].

mod codegen;
mod config;
mod dev;
mod discovery;
mod error;
mod finalize;
mod graph;
mod handler;
mod lint;
mod markup;
mod parse;
mod pipeline;
mod scope;
mod validate;

#[cfg(feature = "napi")]
mod bridge;

#[cfg(test)]
mod pipeline_tests;

pub use codegen::{
    generate_artifacts, generate_markup, generate_script_bundle, generate_server_module,
    generate_stylesheet, missing_marker, ArtifactKind, BuildArtifacts, RUNTIME_PREAMBLE,
};
pub use config::{BuildConfig, GenerateOptions, MinifyLevel};
pub use dev::{
    inject_reload_client, watch, RebuildGate, ReloadHub, WatchEvent, RELOAD_ENDPOINT,
    RELOAD_MESSAGE,
};
pub use discovery::{discover_routes, extract_api_route, route_from_source, EndpointRoute, RouteSpec};
pub use error::{BoxError, BoxResult};
pub use finalize::{write_artifacts, Minifier, PassThrough, WrittenArtifact};
pub use graph::{ComponentGraph, ScopedComponent, SkippedEdge};
pub use handler::extract_handler_body;
pub use lint::{lint_file, lint_source, lint_tree, LintReport};
pub use parse::{parse, parse_with_diagnostics, EndpointConfig, HttpMethod, ParsedComponent};
pub use pipeline::{ArtifactSize, BuildOutcome, BuildStats, Pipeline};
pub use scope::{
    generate_id, include_placeholder, is_scope_id, parse_css_rules, scope_css, scope_html, scope_js,
    CssRule,
};
pub use validate::*;

#[cfg(feature = "napi")]
pub use bridge::{compile_project_native, parse_component_native};
