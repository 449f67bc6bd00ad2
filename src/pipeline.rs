//! Build Pipeline for BOX Compiler
//!
//! One build: crawl the component graph from the entry, discover endpoint
//! routes, render the four artifacts and optionally write them out.

use serde::Serialize;
use std::path::Path;

use crate::codegen::{generate_artifacts, ArtifactKind, BuildArtifacts};
use crate::config::BuildConfig;
use crate::discovery::{discover_routes, EndpointRoute};
use crate::error::{BoxError, BoxResult};
use crate::finalize::{write_artifacts, Minifier, WrittenArtifact};
use crate::graph::ComponentGraph;
use crate::validate::{count_severity, Diagnostic, Severity};

/// Ratio used to estimate gzip size from raw size.
pub const GZIP_ESTIMATE_RATIO: f64 = 0.35;

// ═══════════════════════════════════════════════════════════════════════════════
// OUTCOME TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSize {
    pub file: &'static str,
    pub bytes: usize,
    pub gzip_estimate: usize,
}

impl ArtifactSize {
    fn new(kind: ArtifactKind, bytes: usize) -> Self {
        Self {
            file: kind.file_name(),
            bytes,
            gzip_estimate: (bytes as f64 * GZIP_ESTIMATE_RATIO).round() as usize,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStats {
    pub components: usize,
    pub routes: usize,
    pub skipped_edges: usize,
    pub warnings: usize,
    pub artifacts: Vec<ArtifactSize>,
}

impl BuildStats {
    pub fn total_bytes(&self) -> usize {
        self.artifacts.iter().map(|a| a.bytes).sum()
    }

    pub fn total_gzip_estimate(&self) -> usize {
        self.artifacts.iter().map(|a| a.gzip_estimate).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutcome {
    pub artifacts: BuildArtifacts,
    pub routes: Vec<EndpointRoute>,
    pub stats: BuildStats,
    pub diagnostics: Vec<Diagnostic>,
    /// Filled in by [`Pipeline::build_and_write`]
    pub written: Vec<WrittenArtifact>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Pipeline {
    config: BuildConfig,
    config_diagnostics: Vec<Diagnostic>,
}

impl Pipeline {
    pub fn new(mut config: BuildConfig) -> Self {
        let config_diagnostics = config.validate();
        Self {
            config,
            config_diagnostics,
        }
    }

    /// Pipeline over `root/src` writing to `root/dist` with default settings.
    pub fn for_project(root: &Path) -> Self {
        Self::new(BuildConfig::for_project(root))
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Run one build in memory.
    pub fn build(&self) -> BoxResult<BuildOutcome> {
        let entry = self.config.entry_path();
        if !entry.is_file() {
            return Err(BoxError::EntryNotFound { path: entry });
        }

        tracing::debug!(entry = %entry.display(), "crawling component graph");
        let mut graph = ComponentGraph::new();
        graph.process(&entry);

        let (routes, route_diagnostics) = discover_routes(&self.config.src_dir)?;

        let options = self.config.generate_options();
        let (artifacts, markup_diagnostics) = generate_artifacts(&graph, &routes, &options);

        let skipped_edges = graph.skipped_edges().len();
        let mut diagnostics = self.config_diagnostics.clone();
        diagnostics.extend(graph.take_diagnostics());
        diagnostics.extend(route_diagnostics);
        diagnostics.extend(markup_diagnostics);

        let stats = BuildStats {
            components: graph.len(),
            routes: routes.len(),
            skipped_edges,
            warnings: count_severity(&diagnostics, Severity::Warning),
            artifacts: artifacts
                .iter()
                .map(|(kind, text)| ArtifactSize::new(kind, text.len()))
                .collect(),
        };

        tracing::info!(
            components = stats.components,
            routes = stats.routes,
            skipped_edges = stats.skipped_edges,
            warnings = stats.warnings,
            bytes = stats.total_bytes(),
            gzip_estimate = stats.total_gzip_estimate(),
            "build complete"
        );

        Ok(BuildOutcome {
            artifacts,
            routes,
            stats,
            diagnostics,
            written: Vec::new(),
        })
    }

    /// Build, then write the artifacts to the configured output directory.
    /// Sizes in the stats reflect the written, minified files.
    pub fn build_and_write(&self, minifier: &dyn Minifier) -> BoxResult<BuildOutcome> {
        let mut outcome = self.build()?;

        let written = write_artifacts(
            &outcome.artifacts,
            &self.config.out_dir,
            self.config.minify,
            minifier,
        )?;

        outcome.stats.artifacts = written
            .iter()
            .map(|w| ArtifactSize::new(w.kind, w.bytes))
            .collect();
        outcome.written = written;

        tracing::info!(
            out_dir = %self.config.out_dir.display(),
            bytes = outcome.stats.total_bytes(),
            "artifacts written"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_estimate() {
        let size = ArtifactSize::new(ArtifactKind::Stylesheet, 1000);
        assert_eq!(size.file, "style.css");
        assert_eq!(size.gzip_estimate, 350);
    }

    #[test]
    fn test_missing_entry_is_fatal() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        let err = Pipeline::for_project(tmp.path()).build().unwrap_err();
        assert!(matches!(err, BoxError::EntryNotFound { .. }));
    }

    #[test]
    fn test_invalid_config_values_reported() {
        let config = BuildConfig {
            port: 0,
            ..Default::default()
        };
        let pipeline = Pipeline::new(config);
        assert_eq!(pipeline.config().port, 3000);
        assert_eq!(pipeline.config_diagnostics.len(), 1);
    }
}
