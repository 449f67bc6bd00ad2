//! Node bindings for the BOX compiler.
//!
//! Inputs and outputs cross the boundary as JSON strings, so the JavaScript
//! side sees the same camelCase shapes the serde types produce.

use napi::bindgen_prelude::*;
use napi_derive::napi;
use std::path::Path;

use crate::config::BuildConfig;
use crate::finalize::PassThrough;
use crate::parse::parse_with_diagnostics;
use crate::pipeline::Pipeline;

fn to_napi_error(e: impl std::fmt::Display) -> Error {
    Error::from_reason(e.to_string())
}

/// Parse one component and return `{ component, diagnostics }` as JSON.
#[napi]
pub fn parse_component_native(text: String, filename: String) -> Result<String> {
    let (component, diagnostics) = parse_with_diagnostics(&text, &filename);
    serde_json::to_string(&serde_json::json!({
        "component": component,
        "diagnostics": diagnostics,
    }))
    .map_err(to_napi_error)
}

/// Build the project at `root`. `config_json` holds `box.config.json` fields;
/// when `write` is set the artifacts are written to the output directory.
/// Returns the build outcome as JSON.
#[napi]
pub fn compile_project_native(
    root: String,
    config_json: Option<String>,
    write: Option<bool>,
) -> Result<String> {
    let root = Path::new(&root);
    let config = match config_json.as_deref() {
        Some(json) if !json.trim().is_empty() => {
            serde_json::from_str::<BuildConfig>(json).map_err(to_napi_error)?
        }
        _ => BuildConfig::default(),
    }
    .rooted_at(root);

    let pipeline = Pipeline::new(config);
    let outcome = if write.unwrap_or(false) {
        pipeline.build_and_write(&PassThrough)
    } else {
        pipeline.build()
    }
    .map_err(to_napi_error)?;

    serde_json::to_string(&outcome).map_err(to_napi_error)
}
