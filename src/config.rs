//! Build configuration.
//!
//! Every value the generators and the writer need is carried here and passed
//! down explicitly; nothing is read from process-wide state during a build.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::validate::{Diagnostic, DIAG_CONFIG_VALUE};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_TITLE: &str = "BOX App";
pub const DEFAULT_ENTRY: &str = "main.box";

/// How aggressively the writer's minifier should compress output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MinifyLevel {
    None,
    #[default]
    Basic,
    Aggressive,
}

impl FromStr for MinifyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(MinifyLevel::None),
            "basic" => Ok(MinifyLevel::Basic),
            "aggressive" => Ok(MinifyLevel::Aggressive),
            other => Err(format!("unknown minification level '{}'", other)),
        }
    }
}

impl fmt::Display for MinifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MinifyLevel::None => "none",
            MinifyLevel::Basic => "basic",
            MinifyLevel::Aggressive => "aggressive",
        };
        f.write_str(s)
    }
}

// Unknown levels degrade to `basic` instead of failing the whole config.
impl<'de> Deserialize<'de> for MinifyLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_else(|e: String| {
            tracing::warn!("{}, using 'basic'", e);
            MinifyLevel::Basic
        }))
    }
}

/// Project-level build settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildConfig {
    pub src_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Entry component, relative to `src_dir`
    pub entry: String,
    pub minify: MinifyLevel,
    pub port: u16,
    pub title: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            src_dir: PathBuf::from("src"),
            out_dir: PathBuf::from("dist"),
            entry: DEFAULT_ENTRY.to_string(),
            minify: MinifyLevel::default(),
            port: DEFAULT_PORT,
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

impl BuildConfig {
    /// Defaults with `src/` and `dist/` rooted at `root`.
    pub fn for_project(root: &Path) -> Self {
        Self::default().rooted_at(root)
    }

    /// Resolve relative source and output directories against `root`.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        if self.src_dir.is_relative() {
            self.src_dir = root.join(&self.src_dir);
        }
        if self.out_dir.is_relative() {
            self.out_dir = root.join(&self.out_dir);
        }
        self
    }

    pub fn entry_path(&self) -> PathBuf {
        self.src_dir.join(&self.entry)
    }

    /// Replace out-of-range values with defaults, reporting each replacement.
    pub fn validate(&mut self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if self.port == 0 {
            diagnostics.push(
                Diagnostic::warning(
                    DIAG_CONFIG_VALUE,
                    &format!("Invalid port: {}. Using {}", self.port, DEFAULT_PORT),
                    "box.config.json",
                )
                .emit(),
            );
            self.port = DEFAULT_PORT;
        }

        if self.entry.trim().is_empty() {
            diagnostics.push(
                Diagnostic::warning(
                    DIAG_CONFIG_VALUE,
                    &format!("Empty entry component. Using {}", DEFAULT_ENTRY),
                    "box.config.json",
                )
                .emit(),
            );
            self.entry = DEFAULT_ENTRY.to_string();
        }

        diagnostics
    }

    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            title: self.title.clone(),
            port: self.port,
        }
    }
}

/// Inputs every artifact generator reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOptions {
    pub title: String,
    pub port: u16,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        BuildConfig::default().generate_options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BuildConfig::default();
        assert_eq!(config.entry, "main.box");
        assert_eq!(config.minify, MinifyLevel::Basic);
        assert_eq!(config.port, 3000);
        assert_eq!(config.src_dir, PathBuf::from("src"));
    }

    #[test]
    fn test_deserialize_partial_camel_case() {
        let config: BuildConfig =
            serde_json::from_str(r#"{ "outDir": "build", "minify": "aggressive" }"#).unwrap();
        assert_eq!(config.out_dir, PathBuf::from("build"));
        assert_eq!(config.minify, MinifyLevel::Aggressive);
        assert_eq!(config.src_dir, PathBuf::from("src"));
    }

    #[test]
    fn test_unknown_minify_level_falls_back() {
        let config: BuildConfig = serde_json::from_str(r#"{ "minify": "extreme" }"#).unwrap();
        assert_eq!(config.minify, MinifyLevel::Basic);
    }

    #[test]
    fn test_validate_replaces_bad_port() {
        let mut config = BuildConfig {
            port: 0,
            ..Default::default()
        };
        let diags = config.validate();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DIAG_CONFIG_VALUE);
    }

    #[test]
    fn test_rooted_at_keeps_absolute_paths() {
        let config = BuildConfig {
            out_dir: PathBuf::from("/tmp/out"),
            ..Default::default()
        }
        .rooted_at(Path::new("/project"));
        assert_eq!(config.src_dir, PathBuf::from("/project/src"));
        assert_eq!(config.out_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.entry_path(), PathBuf::from("/project/src/main.box"));
    }
}
